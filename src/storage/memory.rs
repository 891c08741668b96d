use super::store::{SnapshotStore, StoreConfig};
use crate::core::{ProfError, Result, Snapshot, truncate_millis};
use crate::retention::RetentionEntry;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use tokio::sync::RwLock;

/// Process-local store, mostly for tests and short-lived tools.
pub struct MemoryStore {
    config: StoreConfig,
    snapshots: RwLock<BTreeMap<DateTime<Utc>, Vec<u8>>>,
}

impl MemoryStore {
    pub fn new(config: StoreConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            snapshots: RwLock::new(BTreeMap::new()),
        })
    }

    pub async fn len(&self) -> usize {
        self.snapshots.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.snapshots.read().await.is_empty()
    }

    /// Timestamps of every stored snapshot, oldest first.
    pub async fn keys(&self) -> Vec<DateTime<Utc>> {
        self.snapshots.read().await.keys().copied().collect()
    }
}

#[async_trait]
impl SnapshotStore for MemoryStore {
    async fn save(&self, captured_at: DateTime<Utc>, payload: Vec<u8>) -> Result<()> {
        let mut snapshots = self.snapshots.write().await;
        snapshots.insert(truncate_millis(captured_at), payload);
        Ok(())
    }

    async fn load(&self, captured_at: DateTime<Utc>) -> Result<Vec<u8>> {
        let key = truncate_millis(captured_at);
        let snapshots = self.snapshots.read().await;
        snapshots
            .get(&key)
            .cloned()
            .ok_or_else(|| ProfError::NotFound(key.to_rfc3339()))
    }

    async fn load_range(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Vec<Snapshot>> {
        // Keys are whole milliseconds; so are the bounds.
        let (start, end) = (truncate_millis(start), truncate_millis(end));
        if start > end {
            return Ok(Vec::new());
        }

        let mut buffer = self.config.retention_buffer()?;
        let snapshots = self.snapshots.read().await;
        for (at, payload) in snapshots.range(start..=end) {
            buffer.consider(RetentionEntry::new(*at, payload.len() as u64));
        }

        Ok(buffer
            .into_keys()
            .into_iter()
            .filter_map(|at| snapshots.get(&at).map(|payload| Snapshot::new(at, payload.clone())))
            .collect())
    }

    async fn delete(&self, captured_at: DateTime<Utc>) -> Result<()> {
        let key = truncate_millis(captured_at);
        let mut snapshots = self.snapshots.write().await;
        snapshots
            .remove(&key)
            .map(|_| ())
            .ok_or_else(|| ProfError::NotFound(key.to_rfc3339()))
    }

    async fn delete_range(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> Result<usize> {
        let (start, end) = (truncate_millis(start), truncate_millis(end));
        if start > end {
            return Ok(0);
        }

        let mut snapshots = self.snapshots.write().await;
        let doomed: Vec<_> = snapshots.range(start..=end).map(|(at, _)| *at).collect();
        for at in &doomed {
            snapshots.remove(at);
        }
        Ok(doomed.len())
    }
}
