//! One-file-per-snapshot store on the local filesystem.
//!
//! Files are named `{app}-{unix_millis}.pprof`. Range queries take the
//! timestamp from the name rather than the mtime, rank candidates by file
//! size from directory metadata and read only the files that survive the
//! retention buffer.

use super::store::{SnapshotStore, StoreConfig};
use crate::core::{ProfError, Result, Snapshot, in_range, truncate_millis};
use crate::retention::RetentionEntry;
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::debug;

pub const EXTENSION: &str = "pprof";

static TEMP_SEQ: AtomicU64 = AtomicU64::new(0);

pub struct LocalDirStore {
    dir: PathBuf,
    config: StoreConfig,
}

impl LocalDirStore {
    /// Opens (creating if needed) `dir` as a snapshot directory.
    pub async fn open<P: AsRef<Path>>(dir: P, config: StoreConfig) -> Result<Self> {
        config.validate()?;
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir).await.map_err(|e| {
            ProfError::StorageError(format!("Failed to create snapshot directory {}: {}", dir.display(), e))
        })?;
        Ok(Self { dir, config })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn file_name(&self, captured_at: DateTime<Utc>) -> String {
        format!("{}-{}.{}", self.config.app_name, captured_at.timestamp_millis(), EXTENSION)
    }

    pub fn path_for(&self, captured_at: DateTime<Utc>) -> PathBuf {
        self.dir.join(self.file_name(captured_at))
    }

    /// Timestamp encoded in `name`, if it belongs to this store's app.
    pub fn parse_file_name(&self, name: &str) -> Option<DateTime<Utc>> {
        let millis = name
            .strip_prefix(self.config.app_name.as_str())?
            .strip_prefix('-')?
            .strip_suffix(EXTENSION)?
            .strip_suffix('.')?
            .parse::<i64>()
            .ok()?;
        Utc.timestamp_millis_opt(millis).single()
    }

    /// Timestamps and sizes of the snapshots in `[start, end]`, oldest first.
    pub async fn list(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Vec<(DateTime<Utc>, u64)>> {
        let mut listed = Vec::new();
        self.scan(start, end, |at, _, size| listed.push((at, size))).await?;
        listed.sort_by_key(|(at, _)| *at);
        Ok(listed)
    }

    /// Visits the snapshot files of this app inside `[start, end]`, compared
    /// at millisecond precision like the file names themselves.
    async fn scan<F>(&self, start: DateTime<Utc>, end: DateTime<Utc>, mut visit: F) -> Result<usize>
    where
        F: FnMut(DateTime<Utc>, PathBuf, u64),
    {
        let (start, end) = (truncate_millis(start), truncate_millis(end));
        let mut entries = fs::read_dir(&self.dir).await.map_err(|e| {
            ProfError::StorageError(format!("Failed to read snapshot directory {}: {}", self.dir.display(), e))
        })?;

        let mut visited = 0;
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name();
            let Some(at) = name.to_str().and_then(|n| self.parse_file_name(n)) else {
                continue;
            };
            if !in_range(at, start, end) {
                continue;
            }
            let metadata = entry.metadata().await?;
            if !metadata.is_file() {
                continue;
            }
            visit(at, entry.path(), metadata.len());
            visited += 1;
        }
        Ok(visited)
    }

    async fn write_temp(temp_path: &Path, payload: &[u8]) -> Result<()> {
        let mut file = fs::File::create(temp_path)
            .await
            .map_err(|e| ProfError::StorageError(format!("Failed to create temp file: {}", e)))?;
        file.write_all(payload)
            .await
            .map_err(|e| ProfError::StorageError(format!("Failed to write snapshot: {}", e)))?;
        file.flush()
            .await
            .map_err(|e| ProfError::StorageError(format!("Failed to flush snapshot: {}", e)))?;
        file.sync_all()
            .await
            .map_err(|e| ProfError::StorageError(format!("Failed to sync snapshot: {}", e)))?;
        Ok(())
    }
}

/// Maps signed millis onto `u64` keeping their order, older first.
fn age_order(at: DateTime<Utc>) -> u64 {
    (at.timestamp_millis() as u64) ^ (1 << 63)
}

#[async_trait]
impl SnapshotStore for LocalDirStore {
    async fn save(&self, captured_at: DateTime<Utc>, payload: Vec<u8>) -> Result<()> {
        let path = self.path_for(captured_at);
        // Unique per write so two saves in the same millisecond never share one.
        let seq = TEMP_SEQ.fetch_add(1, Ordering::Relaxed);
        let temp_path = path.with_extension(format!("{}.{}.tmp", std::process::id(), seq));

        let written = match Self::write_temp(&temp_path, &payload).await {
            Ok(()) => fs::rename(&temp_path, &path)
                .await
                .map_err(|e| ProfError::StorageError(format!("Failed to rename snapshot: {}", e))),
            Err(err) => Err(err),
        };
        if let Err(err) = written {
            let _ = fs::remove_file(&temp_path).await;
            return Err(err);
        }

        debug!(path = %path.display(), bytes = payload.len(), "snapshot written");
        Ok(())
    }

    async fn load(&self, captured_at: DateTime<Utc>) -> Result<Vec<u8>> {
        let path = self.path_for(captured_at);
        match fs::read(&path).await {
            Ok(data) => Ok(data),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(ProfError::NotFound(truncate_millis(captured_at).to_rfc3339()))
            }
            Err(e) => Err(ProfError::StorageError(format!("Failed to read {}: {}", path.display(), e))),
        }
    }

    async fn load_range(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Vec<Snapshot>> {
        let mut buffer = self.config.retention_buffer()?;
        // Directory order is arbitrary; equal sizes go to the older capture.
        let scanned = self
            .scan(start, end, |at, path, size| {
                buffer.consider(RetentionEntry::new((at, path), size).with_tiebreak(age_order(at)));
            })
            .await?;

        let mut snapshots = Vec::with_capacity(buffer.len());
        for (at, path) in buffer.into_keys() {
            let payload = fs::read(&path)
                .await
                .map_err(|e| ProfError::StorageError(format!("Failed to read {}: {}", path.display(), e)))?;
            snapshots.push(Snapshot::new(at, payload));
        }

        debug!(scanned, retained = snapshots.len(), "range query");
        Ok(snapshots)
    }

    async fn delete(&self, captured_at: DateTime<Utc>) -> Result<()> {
        let path = self.path_for(captured_at);
        match fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(ProfError::NotFound(truncate_millis(captured_at).to_rfc3339()))
            }
            Err(e) => Err(ProfError::StorageError(format!("Failed to remove {}: {}", path.display(), e))),
        }
    }

    async fn delete_range(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> Result<usize> {
        let mut doomed = Vec::new();
        self.scan(start, end, |_, path, _| doomed.push(path)).await?;
        for path in &doomed {
            fs::remove_file(path)
                .await
                .map_err(|e| ProfError::StorageError(format!("Failed to remove {}: {}", path.display(), e)))?;
        }
        Ok(doomed.len())
    }
}
