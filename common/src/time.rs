//! Time utilities for SplitBook.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A timestamp with nanosecond resolution (always UTC).
pub type Timestamp = DateTime<Utc>;

/// Get the current timestamp.
pub fn now() -> Timestamp {
    Utc::now()
}

/// A timestamp split into whole seconds since the Unix epoch and nanoseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Timespec {
    /// Seconds since 1970-01-01T00:00:00Z.
    pub secs: i64,
    /// Nanoseconds within the second, `0..1_000_000_000`.
    pub nanos: u32,
}

impl Timespec {
    /// Create a new timespec.
    pub fn new(secs: i64, nanos: u32) -> Self {
        Self { secs, nanos }
    }

    /// Convert to a timestamp. `None` if out of range or `nanos` is invalid.
    pub fn to_timestamp(self) -> Option<Timestamp> {
        if self.nanos >= 1_000_000_000 {
            return None;
        }
        DateTime::from_timestamp(self.secs, self.nanos)
    }
}

impl From<Timestamp> for Timespec {
    fn from(ts: Timestamp) -> Self {
        Self {
            secs: ts.timestamp(),
            nanos: ts.timestamp_subsec_nanos(),
        }
    }
}

/// The earlier of two optional timestamps.
pub fn earliest(a: Option<Timestamp>, b: Option<Timestamp>) -> Option<Timestamp> {
    match (a, b) {
        (Some(a), Some(b)) => Some(a.min(b)),
        (a, None) => a,
        (None, b) => b,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_timespec_roundtrip_keeps_nanos() {
        let spec = Timespec::new(1_700_000_000, 123_456_789);
        let ts = spec.to_timestamp().unwrap();
        assert_eq!(Timespec::from(ts), spec);
    }

    #[test]
    fn test_timespec_rejects_bad_nanos() {
        assert!(Timespec::new(0, 1_000_000_000).to_timestamp().is_none());
    }

    #[test]
    fn test_earliest() {
        let t1 = now();
        let t0 = t1 - Duration::seconds(10);
        assert_eq!(earliest(Some(t1), Some(t0)), Some(t0));
        assert_eq!(earliest(None, Some(t1)), Some(t1));
        assert_eq!(earliest(None, None), None);
    }
}
