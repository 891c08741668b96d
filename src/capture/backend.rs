use super::gate::CaptureSession;
use crate::core::{ProfError, Result};
use crate::profile::codec;
use async_trait::async_trait;
use pprof::protos::Message;
use std::time::Duration;

/// Something that can record a CPU profile for a fixed window.
///
/// The session argument ties every capture to the gate; implementations must
/// not start the underlying profiler without one.
#[async_trait]
pub trait CaptureBackend: Send + Sync {
    /// Records for `duration` and returns the encoded profile.
    async fn capture(&self, session: &CaptureSession, duration: Duration) -> Result<Vec<u8>>;
}

/// Signal-based sampler from the `pprof` crate.
#[derive(Debug, Clone)]
pub struct PprofBackend {
    frequency: i32,
    blocklist: Vec<String>,
}

impl PprofBackend {
    pub fn new(frequency: i32, blocklist: Vec<String>) -> Self {
        Self { frequency, blocklist }
    }

    pub fn frequency(&self) -> i32 {
        self.frequency
    }

    /// Blocking; run it on the blocking pool.
    fn capture_blocking(frequency: i32, blocklist: &[String], duration: Duration) -> Result<Vec<u8>> {
        let guard = pprof::ProfilerGuardBuilder::default()
            .frequency(frequency)
            .blocklist(blocklist)
            .build()
            .map_err(|e| ProfError::CaptureStart(format!("failed to start CPU profiler: {}", e)))?;

        std::thread::sleep(duration);

        let report = guard
            .report()
            .build()
            .map_err(|e| ProfError::CaptureStart(format!("failed to build CPU report: {}", e)))?;
        drop(guard);

        let profile = report
            .pprof()
            .map_err(|e| ProfError::CaptureStart(format!("failed to convert CPU report: {}", e)))?;
        codec::compress(&profile.encode_to_vec())
    }
}

impl Default for PprofBackend {
    fn default() -> Self {
        Self::new(100, Vec::new())
    }
}

#[async_trait]
impl CaptureBackend for PprofBackend {
    async fn capture(&self, _session: &CaptureSession, duration: Duration) -> Result<Vec<u8>> {
        let frequency = self.frequency;
        let blocklist = self.blocklist.clone();
        tokio::task::spawn_blocking(move || Self::capture_blocking(frequency, blocklist.as_slice(), duration))
            .await
            .map_err(|e| ProfError::CaptureStart(format!("capture task failed: {}", e)))?
    }
}
