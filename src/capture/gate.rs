use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// Single-owner gate around the CPU profiling mechanism.
///
/// The profiler behind it can only record one session at a time, so every
/// capturer has to hold a [`CaptureSession`] from this gate. Clones share the
/// same permit.
#[derive(Debug, Clone)]
pub struct CaptureGate {
    permit: Arc<Semaphore>,
}

impl CaptureGate {
    pub fn new() -> Self {
        Self {
            permit: Arc::new(Semaphore::new(1)),
        }
    }

    /// Takes the session if nobody holds it; never waits.
    pub fn try_acquire(&self) -> Option<CaptureSession> {
        self.permit
            .clone()
            .try_acquire_owned()
            .ok()
            .map(|permit| CaptureSession { _permit: permit })
    }

    /// Waits until the current session, if any, is released.
    pub async fn acquire(&self) -> Option<CaptureSession> {
        self.permit
            .clone()
            .acquire_owned()
            .await
            .ok()
            .map(|permit| CaptureSession { _permit: permit })
    }

    pub fn is_busy(&self) -> bool {
        self.permit.available_permits() == 0
    }
}

impl Default for CaptureGate {
    fn default() -> Self {
        Self::new()
    }
}

/// Proof that the holder owns the profiling mechanism. Released on drop.
#[derive(Debug)]
pub struct CaptureSession {
    _permit: OwnedSemaphorePermit,
}
