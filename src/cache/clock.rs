//! Time source for entry timestamps.
//!
//! Timestamps are milliseconds since the UNIX epoch so that persisted entries
//! keep meaningful `created_at` values across restarts.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Milliseconds since the UNIX epoch.
pub type Timestamp = u64;

pub trait Clock: Send + Sync + std::fmt::Debug {
    fn now(&self) -> Timestamp;
}

/// Wall clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(as_millis)
            .unwrap_or(0)
    }
}

/// Manually advanced clock for deterministic expiry tests.
///
/// Clones share the same underlying time.
#[derive(Debug, Default, Clone)]
pub struct ManualClock {
    millis: Arc<AtomicU64>,
}

impl ManualClock {
    pub fn new(start: Timestamp) -> Self {
        Self {
            millis: Arc::new(AtomicU64::new(start)),
        }
    }

    pub fn advance(&self, by: Duration) {
        self.millis.fetch_add(as_millis(by), Ordering::SeqCst);
    }

    pub fn set(&self, to: Timestamp) {
        self.millis.store(to, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Timestamp {
        self.millis.load(Ordering::SeqCst)
    }
}

/// `d` in whole milliseconds, saturating at `u64::MAX`.
pub fn as_millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

/// Whole seconds (fractional) between two timestamps, zero if `later < earlier`.
pub fn seconds_between(earlier: Timestamp, later: Timestamp) -> f64 {
    later.saturating_sub(earlier) as f64 / 1000.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manual_clock_shared_between_clones() {
        let clock = ManualClock::new(1_000);
        let other = clock.clone();
        clock.advance(Duration::from_millis(250));
        assert_eq!(other.now(), 1_250);
    }

    #[test]
    fn test_as_millis_saturates() {
        assert_eq!(as_millis(Duration::from_secs(30)), 30_000);
        assert_eq!(as_millis(Duration::from_secs(1 << 62)), u64::MAX);
        assert_eq!(as_millis(Duration::MAX), u64::MAX);
    }

    #[test]
    fn test_seconds_between_saturates() {
        assert_eq!(seconds_between(2_000, 1_000), 0.0);
        assert!((seconds_between(1_000, 3_500) - 2.5).abs() < 1e-12);
    }
}
