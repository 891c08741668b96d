use crate::capture::{
    CaptureBackend, CaptureGate, CaptureScheduler, ErrorStream, PprofBackend, SchedulerStatsSnapshot,
};
use crate::config::HarnessConfig;
use crate::core::Result;
use crate::merge::{self, AggregatedProfile};
use crate::storage::SnapshotStore;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::info;

/// Continuous profiler: captures into a store on a schedule and turns a time
/// window of captures back into one profile.
///
/// # Examples
///
/// ```no_run
/// use pgoprof::{HarnessConfig, MemoryStore, Profiler, StoreConfig};
/// use std::sync::Arc;
///
/// # async fn run() -> pgoprof::Result<()> {
/// let store = Arc::new(MemoryStore::new(StoreConfig::new("api"))?);
/// let mut profiler = Profiler::new(store, HarnessConfig::default())?;
///
/// let mut errors = profiler.run()?;
/// tokio::spawn(async move {
///     while let Some(err) = errors.recv().await {
///         eprintln!("profiling: {}", err);
///     }
/// });
///
/// let end = chrono::Utc::now();
/// let pprof = profiler.aggregated_profile(end - chrono::Duration::hours(24), end).await?;
/// # let _ = pprof;
/// # Ok(())
/// # }
/// ```
pub struct Profiler {
    store: Arc<dyn SnapshotStore>,
    scheduler: CaptureScheduler,
    config: HarnessConfig,
}

impl Profiler {
    /// Profiler sampling this process with the `pprof` crate.
    pub fn new(store: Arc<dyn SnapshotStore>, config: HarnessConfig) -> Result<Self> {
        let backend = PprofBackend::new(config.sampling_frequency, config.blocklist.clone());
        Self::with_backend(store, Arc::new(backend), config)
    }

    pub fn with_backend(
        store: Arc<dyn SnapshotStore>,
        backend: Arc<dyn CaptureBackend>,
        config: HarnessConfig,
    ) -> Result<Self> {
        config.validate()?;
        let scheduler = CaptureScheduler::new(store.clone(), backend).error_buffer(config.error_buffer);
        Ok(Self {
            store,
            scheduler,
            config,
        })
    }

    pub fn config(&self) -> &HarnessConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn SnapshotStore> {
        &self.store
    }

    pub fn gate(&self) -> &CaptureGate {
        self.scheduler.gate()
    }

    /// Starts the capture schedule. Failures arrive on the returned stream.
    pub fn run(&mut self) -> Result<ErrorStream> {
        self.scheduler
            .start(self.config.tick_interval, self.config.capture_duration)
    }

    pub fn stop(&mut self) {
        self.scheduler.stop();
    }

    pub async fn shutdown(&mut self) -> Result<()> {
        self.scheduler.shutdown().await
    }

    pub fn is_running(&self) -> bool {
        self.scheduler.is_running()
    }

    pub fn stats(&self) -> SchedulerStatsSnapshot {
        self.scheduler.stats()
    }

    /// Merged view of the captures in `[start, end]`.
    pub async fn aggregated(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> Result<AggregatedProfile> {
        aggregate_range(self.store.as_ref(), start, end).await
    }

    /// Like [`Profiler::aggregated`], encoded as gzip pprof for PGO tooling.
    pub async fn aggregated_profile(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Vec<u8>> {
        self.aggregated(start, end).await?.encode()
    }
}

/// Loads the bounded set of captures in `[start, end]` from `store` and
/// merges them.
pub async fn aggregate_range(
    store: &dyn SnapshotStore,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
) -> Result<AggregatedProfile> {
    let snapshots = store.load_range(start, end).await?;
    info!(
        start = %start.to_rfc3339(),
        end = %end.to_rfc3339(),
        snapshots = snapshots.len(),
        "building aggregated profile"
    );
    merge::merge(&snapshots)
}
