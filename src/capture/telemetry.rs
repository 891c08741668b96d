use crate::core::ProfError;
use serde::Serialize;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::debug;

/// Counters kept by a running scheduler.
#[derive(Debug, Default)]
pub struct SchedulerStats {
    ticks: AtomicU64,
    captures_started: AtomicU64,
    captures_saved: AtomicU64,
    ticks_skipped: AtomicU64,
    capture_failures: AtomicU64,
    store_failures: AtomicU64,
    errors_dropped: AtomicU64,
}

/// Point-in-time copy of [`SchedulerStats`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct SchedulerStatsSnapshot {
    pub ticks: u64,
    pub captures_started: u64,
    pub captures_saved: u64,
    /// Ticks dropped because a capture was still running.
    pub ticks_skipped: u64,
    pub capture_failures: u64,
    pub store_failures: u64,
    /// Errors discarded because the error stream was full.
    pub errors_dropped: u64,
}

impl SchedulerStats {
    pub fn snapshot(&self) -> SchedulerStatsSnapshot {
        SchedulerStatsSnapshot {
            ticks: self.ticks.load(Ordering::Relaxed),
            captures_started: self.captures_started.load(Ordering::Relaxed),
            captures_saved: self.captures_saved.load(Ordering::Relaxed),
            ticks_skipped: self.ticks_skipped.load(Ordering::Relaxed),
            capture_failures: self.capture_failures.load(Ordering::Relaxed),
            store_failures: self.store_failures.load(Ordering::Relaxed),
            errors_dropped: self.errors_dropped.load(Ordering::Relaxed),
        }
    }

    pub(crate) fn record_tick(&self) {
        self.ticks.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_started(&self) {
        self.captures_started.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_saved(&self) {
        self.captures_saved.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_skipped(&self) {
        self.ticks_skipped.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_capture_failure(&self) {
        self.capture_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_store_failure(&self) {
        self.store_failures.fetch_add(1, Ordering::Relaxed);
    }
}

/// Receiving half of the scheduler's error channel.
///
/// Best-effort telemetry: the channel is bounded and the scheduler never
/// waits on it. When it is full, new errors are dropped and counted in
/// [`SchedulerStatsSnapshot::errors_dropped`]. `recv` returns `None` once the
/// schedule has stopped and every in-flight capture has finished.
#[derive(Debug)]
pub struct ErrorStream {
    rx: mpsc::Receiver<ProfError>,
}

impl ErrorStream {
    pub async fn recv(&mut self) -> Option<ProfError> {
        self.rx.recv().await
    }

    pub fn try_recv(&mut self) -> Option<ProfError> {
        self.rx.try_recv().ok()
    }

    /// Everything currently buffered.
    pub fn drain(&mut self) -> Vec<ProfError> {
        std::iter::from_fn(|| self.try_recv()).collect()
    }
}

#[derive(Debug, Clone)]
pub(crate) struct ErrorReporter {
    tx: mpsc::Sender<ProfError>,
    stats: Arc<SchedulerStats>,
}

impl ErrorReporter {
    pub(crate) fn channel(capacity: usize, stats: Arc<SchedulerStats>) -> (Self, ErrorStream) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx, stats }, ErrorStream { rx })
    }

    pub(crate) fn report(&self, err: ProfError) {
        match self.tx.try_send(err) {
            Ok(()) => {}
            Err(TrySendError::Full(err)) => {
                self.stats.errors_dropped.fetch_add(1, Ordering::Relaxed);
                debug!(error = %err, "error stream full, dropping error");
            }
            // Nobody listens anymore; still count it.
            Err(TrySendError::Closed(_)) => {
                self.stats.errors_dropped.fetch_add(1, Ordering::Relaxed);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_stream_drops_newest() {
        let stats = Arc::new(SchedulerStats::default());
        let (reporter, mut stream) = ErrorReporter::channel(2, stats.clone());

        reporter.report(ProfError::CaptureStart("first".into()));
        reporter.report(ProfError::CaptureStart("second".into()));
        reporter.report(ProfError::CaptureStart("third".into()));

        let messages: Vec<_> = stream.drain().iter().map(|e| e.to_string()).collect();
        assert_eq!(
            messages,
            vec!["Capture start failure: first", "Capture start failure: second"]
        );
        assert_eq!(stats.snapshot().errors_dropped, 1);
    }

    #[test]
    fn test_closed_stream_counts_drops() {
        let stats = Arc::new(SchedulerStats::default());
        let (reporter, stream) = ErrorReporter::channel(4, stats.clone());
        drop(stream);

        reporter.report(ProfError::CaptureIo("lost".into()));
        assert_eq!(stats.snapshot().errors_dropped, 1);
    }
}
