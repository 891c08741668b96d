pub mod error;
pub mod types;

pub use error::{ProfError, Result};
pub use types::{Snapshot, in_range, truncate_millis};
