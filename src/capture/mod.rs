//! Periodic CPU profile capture.

pub mod backend;
pub mod gate;
pub mod scheduler;
pub mod telemetry;

pub use backend::{CaptureBackend, PprofBackend};
pub use gate::{CaptureGate, CaptureSession};
pub use scheduler::CaptureScheduler;
pub use telemetry::{ErrorStream, SchedulerStats, SchedulerStatsSnapshot};
