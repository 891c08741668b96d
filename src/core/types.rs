use chrono::{DateTime, TimeZone, Utc};

/// One timestamped capture as handed out by a snapshot store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    pub captured_at: DateTime<Utc>,
    pub payload: Vec<u8>,
    pub size: u64,
}

impl Snapshot {
    pub fn new(captured_at: DateTime<Utc>, payload: Vec<u8>) -> Self {
        let size = payload.len() as u64;
        Self {
            captured_at,
            payload,
            size,
        }
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }
}

/// Truncates a timestamp to millisecond precision, the resolution snapshot keys use.
pub fn truncate_millis(at: DateTime<Utc>) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(at.timestamp_millis())
        .single()
        .unwrap_or(at)
}

/// Inclusive range check used by every store.
pub fn in_range(at: DateTime<Utc>, start: DateTime<Utc>, end: DateTime<Utc>) -> bool {
    at >= start && at <= end
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_snapshot_size_tracks_payload() {
        let snapshot = Snapshot::new(Utc::now(), vec![1, 2, 3]);
        assert_eq!(snapshot.size, 3);
    }

    #[test]
    fn test_range_is_inclusive() {
        let start = Utc::now();
        let end = start + Duration::seconds(10);
        assert!(in_range(start, start, end));
        assert!(in_range(end, start, end));
        assert!(!in_range(end + Duration::milliseconds(1), start, end));
    }

    #[test]
    fn test_truncate_millis_drops_sub_millisecond_part() {
        let at = Utc.timestamp_nanos(1_700_000_000_123_456_789);
        assert_eq!(truncate_millis(at).timestamp_nanos_opt(), Some(1_700_000_000_123_000_000));
    }
}
