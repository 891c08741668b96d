//! Bounded, rank-sorted top-K selection.
//!
//! Store range queries feed every candidate through a [`RankedRetentionBuffer`]
//! so that only `capacity` snapshots are ever materialized, no matter how many
//! keys the backing storage holds for the requested window.

use crate::core::{ProfError, Result};
use std::fmt;
use std::str::FromStr;

/// Which end of the rank ordering survives once the buffer is full.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RetentionPolicy {
    /// Keep the entries with the largest rank.
    #[default]
    KeepLargest,
    /// Keep the entries with the smallest rank.
    KeepSmallest,
}

impl RetentionPolicy {
    /// True when `candidate` should sort strictly ahead of `existing`.
    fn prefers<K>(self, candidate: &RetentionEntry<K>, existing: &RetentionEntry<K>) -> bool {
        if candidate.rank == existing.rank {
            return matches!(
                (candidate.tiebreak, existing.tiebreak),
                (Some(new), Some(old)) if new < old
            );
        }
        match self {
            Self::KeepLargest => candidate.rank > existing.rank,
            Self::KeepSmallest => candidate.rank < existing.rank,
        }
    }
}

impl fmt::Display for RetentionPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::KeepLargest => write!(f, "largest"),
            Self::KeepSmallest => write!(f, "smallest"),
        }
    }
}

impl FromStr for RetentionPolicy {
    type Err = ProfError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "largest" | "keep-largest" => Ok(Self::KeepLargest),
            "smallest" | "keep-smallest" => Ok(Self::KeepSmallest),
            other => Err(ProfError::RetentionPolicyMisuse(format!(
                "unknown retention policy '{}', expected 'largest' or 'smallest'",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetentionEntry<K> {
    pub key: K,
    pub rank: u64,
    /// Among equal ranks the lower value wins. Without one, equal ranks keep
    /// the order they were considered in.
    pub tiebreak: Option<u64>,
}

impl<K> RetentionEntry<K> {
    pub fn new(key: K, rank: u64) -> Self {
        Self {
            key,
            rank,
            tiebreak: None,
        }
    }

    /// Orders equal ranks by `tiebreak` instead of arrival, so callers that
    /// see candidates in no particular order still get a stable result.
    pub fn with_tiebreak(mut self, tiebreak: u64) -> Self {
        self.tiebreak = Some(tiebreak);
        self
    }
}

/// Fixed-capacity buffer kept sorted best-first under its policy.
///
/// Not meant to be shared between concurrent range queries; each query owns
/// its own buffer.
#[derive(Debug, Clone)]
pub struct RankedRetentionBuffer<K> {
    entries: Vec<RetentionEntry<K>>,
    capacity: usize,
    policy: RetentionPolicy,
}

impl<K> RankedRetentionBuffer<K> {
    /// Fails with [`ProfError::RetentionPolicyMisuse`] when `capacity` is zero.
    pub fn new(capacity: usize, policy: RetentionPolicy) -> Result<Self> {
        if capacity == 0 {
            return Err(ProfError::RetentionPolicyMisuse(
                "retention capacity must be at least 1".to_string(),
            ));
        }

        Ok(Self {
            entries: Vec::with_capacity(capacity),
            capacity,
            policy,
        })
    }

    /// Offers one candidate. Returns the index it now occupies, or `None`
    /// when it was rejected and the buffer is unchanged.
    pub fn consider(&mut self, entry: RetentionEntry<K>) -> Option<usize> {
        if self.entries.len() >= self.capacity {
            let boundary = self.entries.last()?;
            if !self.policy.prefers(&entry, boundary) {
                return None;
            }
            self.entries.pop();
        }

        // Equal ranks without a tiebreak stay behind earlier entries.
        let policy = self.policy;
        let index = self
            .entries
            .partition_point(|existing| !policy.prefers(&entry, existing));
        self.entries.insert(index, entry);
        Some(index)
    }

    /// Retained entries, best first.
    pub fn snapshot(&self) -> &[RetentionEntry<K>] {
        &self.entries
    }

    /// The entry that would be evicted next.
    pub fn boundary(&self) -> Option<&RetentionEntry<K>> {
        self.entries.last()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.entries.len() >= self.capacity
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn policy(&self) -> RetentionPolicy {
        self.policy
    }

    pub fn into_entries(self) -> Vec<RetentionEntry<K>> {
        self.entries
    }

    pub fn into_keys(self) -> Vec<K> {
        self.entries.into_iter().map(|entry| entry.key).collect()
    }
}
