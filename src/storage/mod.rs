pub mod local_dir;
pub mod memory;
pub mod store;

pub use local_dir::LocalDirStore;
pub use memory::MemoryStore;
pub use store::{SnapshotStore, StoreConfig};
