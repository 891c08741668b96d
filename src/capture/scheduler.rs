use super::backend::CaptureBackend;
use super::gate::{CaptureGate, CaptureSession};
use super::telemetry::{ErrorReporter, ErrorStream, SchedulerStats, SchedulerStatsSnapshot};
use crate::core::{ProfError, Result};
use crate::storage::SnapshotStore;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::{Instant, MissedTickBehavior, interval_at};
use tracing::{debug, info, warn};

/// Drives periodic captures through a [`CaptureGate`].
///
/// A tick that fires while the previous capture still holds the gate is
/// skipped and reported, never run concurrently.
pub struct CaptureScheduler {
    store: Arc<dyn SnapshotStore>,
    backend: Arc<dyn CaptureBackend>,
    gate: CaptureGate,
    error_buffer: usize,
    stats: Arc<SchedulerStats>,
    stop_tx: Option<oneshot::Sender<()>>,
    join_handle: Option<JoinHandle<()>>,
}

impl CaptureScheduler {
    pub fn new(store: Arc<dyn SnapshotStore>, backend: Arc<dyn CaptureBackend>) -> Self {
        Self {
            store,
            backend,
            gate: CaptureGate::new(),
            error_buffer: 32,
            stats: Arc::new(SchedulerStats::default()),
            stop_tx: None,
            join_handle: None,
        }
    }

    /// Use an existing gate, e.g. one shared with on-demand capturers.
    pub fn with_gate(mut self, gate: CaptureGate) -> Self {
        self.gate = gate;
        self
    }

    pub fn error_buffer(mut self, capacity: usize) -> Self {
        self.error_buffer = capacity.max(1);
        self
    }

    pub fn gate(&self) -> &CaptureGate {
        &self.gate
    }

    pub fn stats(&self) -> SchedulerStatsSnapshot {
        self.stats.snapshot()
    }

    pub fn is_running(&self) -> bool {
        self.stop_tx.is_some()
    }

    /// Starts capturing for `capture_duration` every `tick_interval`.
    ///
    /// The first capture starts one interval from now.
    pub fn start(&mut self, tick_interval: Duration, capture_duration: Duration) -> Result<ErrorStream> {
        if self.is_running() {
            return Err(ProfError::AlreadyRunning);
        }
        if tick_interval.is_zero() {
            return Err(ProfError::InvalidConfig("tick interval must be positive".to_string()));
        }
        if capture_duration.is_zero() {
            return Err(ProfError::InvalidConfig("capture duration must be positive".to_string()));
        }

        let (reporter, errors) = ErrorReporter::channel(self.error_buffer, self.stats.clone());
        let (stop_tx, stop_rx) = oneshot::channel::<()>();

        let ctx = Arc::new(TickContext {
            store: self.store.clone(),
            backend: self.backend.clone(),
            gate: self.gate.clone(),
            stats: self.stats.clone(),
            reporter,
            capture_duration,
            clock: Clock::start(),
        });

        info!(
            interval_ms = tick_interval.as_millis() as u64,
            duration_ms = capture_duration.as_millis() as u64,
            "capture scheduler started"
        );
        self.join_handle = Some(tokio::spawn(run_loop(ctx, tick_interval, stop_rx)));
        self.stop_tx = Some(stop_tx);
        Ok(errors)
    }

    /// Cancels future ticks. A capture already running is left to finish and
    /// is still saved. Calling this again, or before `start`, does nothing.
    pub fn stop(&mut self) {
        if let Some(stop_tx) = self.stop_tx.take() {
            let _ = stop_tx.send(());
            info!("capture scheduler stopping");
        }
    }

    /// Stops and waits for the loop and any in-flight capture to drain.
    pub async fn shutdown(&mut self) -> Result<()> {
        self.stop();
        if let Some(join_handle) = self.join_handle.take() {
            join_handle
                .await
                .map_err(|err| ProfError::CaptureStart(format!("scheduler loop join: {}", err)))?;
        }
        Ok(())
    }
}

impl Drop for CaptureScheduler {
    fn drop(&mut self) {
        // Dropping the sender ends the loop; in-flight captures still finish.
        self.stop();
    }
}

/// Wall-clock timestamps derived from the runtime's monotonic clock, so that
/// keys stay ordered and follow paused time in tests.
#[derive(Debug, Clone, Copy)]
struct Clock {
    wall: DateTime<Utc>,
    mono: Instant,
}

impl Clock {
    fn start() -> Self {
        Self {
            wall: Utc::now(),
            mono: Instant::now(),
        }
    }

    fn now(&self) -> DateTime<Utc> {
        let elapsed = chrono::Duration::from_std(self.mono.elapsed()).unwrap_or_else(|_| chrono::Duration::zero());
        self.wall + elapsed
    }
}

struct TickContext {
    store: Arc<dyn SnapshotStore>,
    backend: Arc<dyn CaptureBackend>,
    gate: CaptureGate,
    stats: Arc<SchedulerStats>,
    reporter: ErrorReporter,
    capture_duration: Duration,
    clock: Clock,
}

async fn run_loop(ctx: Arc<TickContext>, tick_interval: Duration, mut stop_rx: oneshot::Receiver<()>) {
    let mut ticker = interval_at(Instant::now() + tick_interval, tick_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut in_flight = JoinSet::new();

    loop {
        tokio::select! {
            biased;
            // Fires on stop() and when the scheduler is dropped.
            _ = &mut stop_rx => break,
            Some(joined) = in_flight.join_next(), if !in_flight.is_empty() => {
                if let Err(err) = joined {
                    warn!(error = %err, "capture task panicked");
                }
            }
            _ = ticker.tick() => on_tick(&ctx, &mut in_flight),
        }
    }

    while let Some(joined) = in_flight.join_next().await {
        if let Err(err) = joined {
            warn!(error = %err, "capture task panicked");
        }
    }
    info!("capture scheduler stopped");
}

fn on_tick(ctx: &Arc<TickContext>, in_flight: &mut JoinSet<()>) {
    let started_at = ctx.clock.now();
    ctx.stats.record_tick();

    let Some(session) = ctx.gate.try_acquire() else {
        ctx.stats.record_skipped();
        warn!(tick = %started_at.to_rfc3339(), "capture still in progress, skipping tick");
        ctx.reporter.report(ProfError::CaptureStart(format!(
            "capture already in progress, tick at {} skipped",
            started_at.to_rfc3339()
        )));
        return;
    };

    ctx.stats.record_started();
    in_flight.spawn(capture_and_save(ctx.clone(), session, started_at));
}

async fn capture_and_save(ctx: Arc<TickContext>, session: CaptureSession, started_at: DateTime<Utc>) {
    debug!(at = %started_at.to_rfc3339(), "capture started");
    let captured = ctx.backend.capture(&session, ctx.capture_duration).await;
    drop(session);

    let payload = match captured {
        Ok(payload) => payload,
        Err(err) => {
            ctx.stats.record_capture_failure();
            let err = match err {
                ProfError::CaptureStart(_) => err,
                other => ProfError::CaptureStart(format!("failed to collect CPU profile: {}", other)),
            };
            warn!(error = %err, "capture failed");
            ctx.reporter.report(err);
            return;
        }
    };

    let bytes = payload.len();
    match ctx.store.save(started_at, payload).await {
        Ok(()) => {
            ctx.stats.record_saved();
            debug!(at = %started_at.to_rfc3339(), bytes, "capture saved");
        }
        Err(err) => {
            ctx.stats.record_store_failure();
            warn!(error = %err, "failed to save capture");
            ctx.reporter.report(ProfError::CaptureIo(format!(
                "failed to save profile captured at {}: {}",
                started_at.to_rfc3339(),
                err
            )));
        }
    }
}
