use crate::profile::SampleType;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProfError {
    #[error("Capture start failure: {0}")]
    CaptureStart(String),

    #[error("Capture I/O failure: {0}")]
    CaptureIo(String),

    #[error("Incompatible sample types: expected [{}], found [{}]", format_types(.expected), format_types(.found))]
    IncompatibleSampleTypes {
        expected: Vec<SampleType>,
        found: Vec<SampleType>,
    },

    #[error("Incompatible period types: expected {expected}, found {found}")]
    IncompatiblePeriodTypes { expected: SampleType, found: SampleType },

    #[error("Malformed snapshot: {0}")]
    MalformedSnapshot(String),

    #[error("Retention policy misuse: {0}")]
    RetentionPolicyMisuse(String),

    #[error("Snapshot '{0}' not found")]
    NotFound(String),

    #[error("No snapshots to merge")]
    NoSnapshots,

    #[error("Capture scheduler is already running")]
    AlreadyRunning,

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Storage error: {0}")]
    StorageError(String),

    #[error("I/O error: {0}")]
    IoError(String),
}

pub type Result<T> = std::result::Result<T, ProfError>;

impl From<std::io::Error> for ProfError {
    fn from(err: std::io::Error) -> Self {
        Self::IoError(err.to_string())
    }
}

impl ProfError {
    /// Errors the scheduler reports and keeps running after.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::CaptureStart(_) | Self::CaptureIo(_))
    }
}

fn format_types(types: &[SampleType]) -> String {
    types
        .iter()
        .map(|t| t.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}
