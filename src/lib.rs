// ============================================================================
// pgoprof Library
// ============================================================================

pub mod core;
pub mod retention;
pub mod profile;
pub mod merge;
pub mod storage;
pub mod capture;
pub mod config;
pub mod profiler;

// Re-export main types for convenience
pub use crate::core::{ProfError, Result, Snapshot};
pub use config::HarnessConfig;
pub use profiler::{Profiler, aggregate_range};
pub use merge::{AggregatedProfile, merge, merge_profiles};
pub use retention::{RankedRetentionBuffer, RetentionEntry, RetentionPolicy};
pub use profile::{ProfileData, SampleType};

// Re-export capture and storage API
pub use capture::{
    CaptureBackend, CaptureGate, CaptureScheduler, CaptureSession, ErrorStream, PprofBackend,
    SchedulerStatsSnapshot,
};
pub use storage::{LocalDirStore, MemoryStore, SnapshotStore, StoreConfig};
