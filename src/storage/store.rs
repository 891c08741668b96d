use crate::core::{ProfError, Result, Snapshot};
use crate::retention::{RankedRetentionBuffer, RetentionPolicy};
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Storage backend for profile snapshots - allows pluggable stores.
///
/// Implementations must be safe to call concurrently; the scheduler saves
/// from spawned tasks while callers may be running range queries.
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    /// Persist one capture under its start timestamp.
    async fn save(&self, captured_at: DateTime<Utc>, payload: Vec<u8>) -> Result<()>;

    /// Fetch the capture stored under `captured_at`.
    async fn load(&self, captured_at: DateTime<Utc>) -> Result<Vec<u8>>;

    /// Captures with `start <= captured_at <= end`, bounded by the store's
    /// retention capacity and returned in rank order.
    async fn load_range(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Vec<Snapshot>>;

    async fn delete(&self, captured_at: DateTime<Utc>) -> Result<()>;

    /// Removes every capture in the inclusive range, returning how many went.
    async fn delete_range(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> Result<usize>;
}

/// Settings shared by the bundled stores.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Prefix for keys / file names.
    pub app_name: String,

    /// Maximum number of snapshots a range query returns.
    pub retention_capacity: usize,

    /// Which snapshots survive when a range holds more than the capacity.
    pub retention_policy: RetentionPolicy,
}

impl StoreConfig {
    pub fn new(app_name: &str) -> Self {
        Self {
            app_name: app_name.to_string(),
            retention_capacity: 32,
            retention_policy: RetentionPolicy::KeepLargest,
        }
    }

    pub fn retention_capacity(mut self, capacity: usize) -> Self {
        self.retention_capacity = capacity;
        self
    }

    pub fn retention_policy(mut self, policy: RetentionPolicy) -> Self {
        self.retention_policy = policy;
        self
    }

    /// Reads `PGOPROF_APP`, `PGOPROF_RETENTION` and `PGOPROF_RETENTION_POLICY`
    /// on top of the defaults.
    pub fn from_env() -> Result<Self> {
        let app_name = std::env::var("PGOPROF_APP").unwrap_or_else(|_| "app".to_string());
        let mut config = Self::new(&app_name);

        if let Ok(raw) = std::env::var("PGOPROF_RETENTION") {
            config.retention_capacity = raw.trim().parse().map_err(|_| {
                ProfError::InvalidConfig(format!("PGOPROF_RETENTION must be an integer, got '{}'", raw))
            })?;
        }
        if let Ok(raw) = std::env::var("PGOPROF_RETENTION_POLICY") {
            config.retention_policy = raw.parse()?;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.app_name.is_empty() {
            return Err(ProfError::InvalidConfig("app name must not be empty".to_string()));
        }
        if self.app_name.contains(['/', '\\']) {
            return Err(ProfError::InvalidConfig(format!(
                "app name '{}' must not contain path separators",
                self.app_name
            )));
        }
        // Surfaces a zero capacity at construction instead of on the first query.
        RankedRetentionBuffer::<()>::new(self.retention_capacity, self.retention_policy)?;
        Ok(())
    }

    /// Fresh buffer for one range query.
    pub fn retention_buffer<K>(&self) -> Result<RankedRetentionBuffer<K>> {
        RankedRetentionBuffer::new(self.retention_capacity, self.retention_policy)
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self::new("app")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_keep_largest() {
        let config = StoreConfig::default();
        assert_eq!(config.retention_capacity, 32);
        assert_eq!(config.retention_policy, RetentionPolicy::KeepLargest);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_zero_capacity_is_rejected() {
        let config = StoreConfig::new("svc").retention_capacity(0);
        assert!(matches!(config.validate(), Err(ProfError::RetentionPolicyMisuse(_))));
    }

    #[test]
    fn test_app_name_with_separator_is_rejected() {
        let config = StoreConfig::new("../evil");
        assert!(matches!(config.validate(), Err(ProfError::InvalidConfig(_))));
    }
}
