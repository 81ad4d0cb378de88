//! Reading timestamps.
//!
//! Wall-clock time is only trusted once it looks synced (after 2020-01-01).
//! Before that, readings are stamped with seconds of uptime so the receiver can
//! still order them. Whatever the source, stamps handed out by one
//! [`TimestampSource`] never go backwards.

use chrono::{DateTime, Utc};
use std::time::{Duration, Instant};

/// 2020-01-01T00:00:00Z. Anything earlier means the clock was never set.
pub const MIN_SYNCED_EPOCH: i64 = 1_577_836_800;

/// Hands out non-decreasing epoch-second timestamps.
#[derive(Debug)]
pub struct TimestampSource {
    boot: Instant,
    last: i64,
}

impl TimestampSource {
    pub fn new() -> Self {
        Self {
            boot: Instant::now(),
            last: 0,
        }
    }

    /// Timestamp for a reading taken right now.
    pub fn now(&mut self) -> i64 {
        let uptime = self.boot.elapsed();
        self.stamp(Utc::now(), uptime)
    }

    /// Timestamp for wall-clock time `wall` observed after `uptime`.
    pub fn stamp(&mut self, wall: DateTime<Utc>, uptime: Duration) -> i64 {
        let candidate = if is_synced(wall) {
            wall.timestamp()
        } else {
            uptime.as_secs() as i64
        };
        self.last = self.last.max(candidate);
        self.last
    }
}

impl Default for TimestampSource {
    fn default() -> Self {
        Self::new()
    }
}

/// True when `wall` is late enough to come from a synced clock.
pub fn is_synced(wall: DateTime<Utc>) -> bool {
    wall.timestamp() >= MIN_SYNCED_EPOCH
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn synced_clock_is_used_directly() {
        let mut source = TimestampSource::new();
        let wall = Utc.with_ymd_and_hms(2025, 7, 24, 12, 0, 0).unwrap();
        assert_eq!(source.stamp(wall, Duration::from_secs(30)), wall.timestamp());
    }

    #[test]
    fn unsynced_clock_falls_back_to_uptime() {
        let mut source = TimestampSource::new();
        let wall = Utc.with_ymd_and_hms(1970, 1, 1, 0, 5, 0).unwrap();
        assert_eq!(source.stamp(wall, Duration::from_secs(42)), 42);
    }

    #[test]
    fn stamps_never_go_backwards() {
        let mut source = TimestampSource::new();
        let later = Utc.with_ymd_and_hms(2025, 7, 24, 12, 0, 0).unwrap();
        let earlier = later - chrono::Duration::minutes(3);

        let first = source.stamp(later, Duration::from_secs(10));
        let second = source.stamp(earlier, Duration::from_secs(20));
        assert_eq!(first, second);

        // Clock loses sync after having been synced
        let unsynced = Utc.with_ymd_and_hms(1970, 1, 1, 0, 0, 0).unwrap();
        assert_eq!(source.stamp(unsynced, Duration::from_secs(30)), first);
    }
}
