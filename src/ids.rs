//! Identifier and clock provider
//!
//! Every mutating store operation draws its id and timestamps from here.
//! Timestamps are RFC 3339 with fixed microsecond precision so that the stored
//! strings sort lexicographically in chronological order.

use chrono::{DateTime, Duration, SecondsFormat, Utc};
use parking_lot::Mutex;

/// Generate a fresh snippet identifier (UUIDv4, 122 random bits).
pub fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Format a timestamp the way it is persisted in the snippets table.
pub fn fmt_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Parse a persisted timestamp back. Returns None on malformed input;
/// the database layer maps that to a storage error.
pub fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Monotonically non-decreasing wall clock.
///
/// If the wall clock reads at or before the last issued instant (NTP step,
/// sub-microsecond call spacing), the next reading is last + 1µs. Every
/// mutation therefore gets a strictly distinct `updated_at`, which keeps
/// pagination order and search tie-breaks deterministic.
pub struct Clock {
    last: Mutex<DateTime<Utc>>,
}

impl Clock {
    pub fn new() -> Self {
        Self {
            last: Mutex::new(DateTime::<Utc>::MIN_UTC),
        }
    }

    pub fn now(&self) -> DateTime<Utc> {
        let mut last = self.last.lock();
        // Clamp to microsecond precision: the persisted format keeps nothing
        // finer, and a value that changes across a store round-trip would
        // break created_at/updated_at equality checks.
        let mut now = DateTime::from_timestamp_micros(Utc::now().timestamp_micros())
            .unwrap_or_else(Utc::now);
        if now <= *last {
            now = *last + Duration::microseconds(1);
        }
        *last = now;
        now
    }
}

impl Default for Clock {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_are_unique() {
        let a = new_id();
        let b = new_id();
        assert_ne!(a, b);
        assert_eq!(a.len(), 36); // canonical hyphenated UUID
    }

    #[test]
    fn test_clock_strictly_increases() {
        let clock = Clock::new();
        let mut prev = clock.now();
        for _ in 0..1000 {
            let next = clock.now();
            assert!(next > prev);
            prev = next;
        }
    }

    #[test]
    fn test_timestamp_roundtrip() {
        let clock = Clock::new();
        let ts = clock.now();
        let formatted = fmt_timestamp(ts);
        assert_eq!(parse_timestamp(&formatted), Some(ts));
    }

    #[test]
    fn test_timestamp_strings_sort_chronologically() {
        let clock = Clock::new();
        let mut strings: Vec<String> = (0..100).map(|_| fmt_timestamp(clock.now())).collect();
        let sorted = {
            let mut s = strings.clone();
            s.sort();
            s
        };
        assert_eq!(strings, sorted);
        strings.dedup();
        assert_eq!(strings.len(), 100);
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert_eq!(parse_timestamp("not a timestamp"), None);
        assert_eq!(parse_timestamp(""), None);
    }
}
