//! Time source for limiters, lockouts and session expiry.
//!
//! Wall-clock time is needed because transaction accumulators reset on
//! calendar days. [`MockClock`] lets tests move time explicitly.

use chrono::{DateTime, Duration, Utc};
use std::fmt::Debug;
use std::sync::{Arc, Mutex};

/// Port for obtaining the current time.
pub trait Clock: Send + Sync + Debug {
    fn now(&self) -> DateTime<Utc>;
}

/// Clock backed by `Utc::now()`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl SystemClock {
    pub fn new() -> Self {
        Self
    }
}

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Controllable clock. Clones share the same underlying time.
///
/// ```
/// use menuflow::clock::{Clock, MockClock};
/// use chrono::{Duration, Utc};
///
/// let start = Utc::now();
/// let clock = MockClock::new(start);
/// clock.advance(Duration::seconds(90));
/// assert_eq!(clock.now(), start + Duration::seconds(90));
/// ```
#[derive(Debug, Clone)]
pub struct MockClock {
    current_time: Arc<Mutex<DateTime<Utc>>>,
}

impl MockClock {
    /// Clock frozen at `start` until advanced.
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            current_time: Arc::new(Mutex::new(start)),
        }
    }

    /// Move time forward for every clone.
    pub fn advance(&self, duration: Duration) {
        let mut time = self
            .current_time
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *time += duration;
    }

    /// Jump to an absolute instant, forwards or backwards.
    pub fn set(&self, instant: DateTime<Utc>) {
        let mut time = self
            .current_time
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *time = instant;
    }
}

impl Clock for MockClock {
    fn now(&self) -> DateTime<Utc> {
        *self
            .current_time
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn system_clock_moves_forward() {
        let clock = SystemClock::new();
        let t1 = clock.now();
        std::thread::sleep(std::time::Duration::from_millis(5));
        assert!(clock.now() >= t1);
    }

    #[test]
    fn mock_clock_advances_and_sets() {
        let start = Utc::now();
        let clock = MockClock::new(start);
        assert_eq!(clock.now(), start);

        clock.advance(Duration::seconds(10));
        assert_eq!(clock.now(), start + Duration::seconds(10));

        let later = start + Duration::hours(2);
        clock.set(later);
        assert_eq!(clock.now(), later);
    }

    #[test]
    fn mock_clock_clones_share_time() {
        let start = Utc::now();
        let clock = MockClock::new(start);
        let shared = clock.clone();

        shared.advance(Duration::minutes(5));
        assert_eq!(clock.now(), start + Duration::minutes(5));
    }
}
