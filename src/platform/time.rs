use std::sync::LazyLock;
use std::time::{Duration, Instant};

use chrono::Utc;
use serde::{Deserialize, Serialize};

static PROCESS_ANCHOR: LazyLock<Instant> = LazyLock::new(Instant::now);

/// A point in time expressed both as wall-clock milliseconds (for reporting) and as monotonic
/// nanoseconds (for every duration computation).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Time {
    pub timestamp_ms: i64,
    pub nanos: u64,
}

impl Time {
    pub const fn new(timestamp_ms: i64, nanos: u64) -> Self {
        Self {
            timestamp_ms,
            nanos,
        }
    }

    /// Returns a copy shifted forward by `delta` on both clocks.
    pub fn advanced_by(&self, delta: Duration) -> Self {
        Self {
            timestamp_ms: self
                .timestamp_ms
                .saturating_add(delta.as_millis().min(i64::MAX as u128) as i64),
            nanos: self
                .nanos
                .saturating_add(delta.as_nanos().min(u64::MAX as u128) as u64),
        }
    }

    /// Monotonic nanoseconds elapsed since `earlier`, zero if `earlier` is later.
    pub fn nanos_since(&self, earlier: &Time) -> u64 {
        self.nanos.saturating_sub(earlier.nanos)
    }
}

pub trait TimeProvider: Send + Sync {
    fn now(&self) -> Time;

    fn wall_clock_ms(&self) -> i64 {
        self.now().timestamp_ms
    }
}

/// Reads `chrono::Utc` for the wall clock and a process-wide `Instant` anchor for the
/// monotonic part, so clock adjustments never leak into durations.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemTimeProvider;

impl TimeProvider for SystemTimeProvider {
    fn now(&self) -> Time {
        let nanos = PROCESS_ANCHOR.elapsed().as_nanos().min(u64::MAX as u128) as u64;
        Time::new(Utc::now().timestamp_millis(), nanos)
    }
}

pub(crate) fn duration_nanos(duration: Duration) -> u64 {
    duration.as_nanos().min(u64::MAX as u128) as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn system_provider_is_monotonic() {
        let provider = SystemTimeProvider;
        let first = provider.now();
        let second = provider.now();
        assert!(second.nanos >= first.nanos);
        assert!(first.timestamp_ms > 0);
    }

    #[test]
    fn advancing_moves_both_clocks() {
        let start = Time::new(1_000, 5_000);
        let later = start.advanced_by(Duration::from_millis(250));
        assert_eq!(later.timestamp_ms, 1_250);
        assert_eq!(later.nanos_since(&start), 250_000_000);
        assert_eq!(start.nanos_since(&later), 0);
    }
}
