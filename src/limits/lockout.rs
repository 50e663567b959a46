//! PIN failure counting and lockout.

use crate::config::PinConfig;
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use tracing::warn;

/// Failure history of one identity.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LockoutRecord {
    /// Consecutive failures since the last success or unlock
    pub attempts: u32,
    /// End of the active lockout, if any
    pub locked_until: Option<DateTime<Utc>>,
    pub last_failure: DateTime<Utc>,
}

/// Result of recording a failed attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LockoutStatus {
    /// This failure engaged (or an earlier one already holds) a lockout
    pub locked: bool,
    /// Failures left before a lockout; 0 once locked
    pub attempts_remaining: u32,
}

/// Counts consecutive PIN failures per identity and locks the identity
/// once the threshold is reached.
///
/// Records outlive sessions: a new session does not reset a lockout.
#[derive(Debug)]
pub struct PinLockoutTracker {
    records: DashMap<String, LockoutRecord>,
    max_attempts: u32,
    lockout: Duration,
}

impl PinLockoutTracker {
    /// Tracker locking after `max_attempts` failures for `lockout`.
    ///
    /// # Example
    /// ```
    /// use menuflow::limits::PinLockoutTracker;
    /// use chrono::{Duration, Utc};
    ///
    /// let tracker = PinLockoutTracker::new(2, Duration::minutes(30));
    /// let now = Utc::now();
    ///
    /// assert_eq!(tracker.record_failure("254700", now).attempts_remaining, 1);
    /// assert!(tracker.record_failure("254700", now).locked);
    /// assert!(tracker.is_locked("254700", now + Duration::minutes(29)));
    /// assert!(!tracker.is_locked("254700", now + Duration::minutes(30)));
    /// ```
    pub fn new(max_attempts: u32, lockout: Duration) -> Self {
        Self {
            records: DashMap::new(),
            max_attempts,
            lockout,
        }
    }

    pub fn from_config(config: &PinConfig) -> Self {
        Self::new(config.max_attempts, config.lockout_duration())
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Count a failed attempt. The call that reaches the threshold locks the
    /// identity; calls made while locked keep reporting locked.
    pub fn record_failure(&self, identity_key: &str, now: DateTime<Utc>) -> LockoutStatus {
        let mut record = self
            .records
            .entry(identity_key.to_string())
            .or_insert_with(|| LockoutRecord {
                attempts: 0,
                locked_until: None,
                last_failure: now,
            });

        if let Some(until) = record.locked_until {
            if now < until {
                return LockoutStatus {
                    locked: true,
                    attempts_remaining: 0,
                };
            }
            record.attempts = 0;
            record.locked_until = None;
        }

        record.attempts = record.attempts.saturating_add(1);
        record.last_failure = now;

        if record.attempts >= self.max_attempts {
            let until = now + self.lockout;
            record.locked_until = Some(until);
            warn!(identity = %identity_key, until = %until, "PIN lockout activated");
            LockoutStatus {
                locked: true,
                attempts_remaining: 0,
            }
        } else {
            LockoutStatus {
                locked: false,
                attempts_remaining: self.max_attempts - record.attempts,
            }
        }
    }

    /// Successful authentication clears the failure count.
    pub fn record_success(&self, identity_key: &str) {
        self.records.remove(identity_key);
    }

    /// Explicit operator unlock.
    pub fn unlock(&self, identity_key: &str) {
        self.records.remove(identity_key);
    }

    /// Whether a lockout is active at `now`.
    pub fn is_locked(&self, identity_key: &str, now: DateTime<Utc>) -> bool {
        self.records
            .get(identity_key)
            .and_then(|record| record.locked_until)
            .is_some_and(|until| now < until)
    }

    /// Consecutive failures recorded for the identity.
    pub fn attempts(&self, identity_key: &str) -> u32 {
        self.records
            .get(identity_key)
            .map_or(0, |record| record.attempts)
    }

    /// Drop records whose lock has expired or whose last failure is older
    /// than one lockout period.
    pub fn sweep(&self, now: DateTime<Utc>) -> usize {
        let lockout = self.lockout;
        let before = self.records.len();
        self.records.retain(|_, record| match record.locked_until {
            Some(until) => now < until,
            None => now.signed_duration_since(record.last_failure) < lockout,
        });
        before.saturating_sub(self.records.len())
    }

    /// Identities with a failure record.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tracker() -> PinLockoutTracker {
        PinLockoutTracker::new(3, Duration::minutes(30))
    }

    #[test]
    fn counts_down_then_locks_on_threshold() {
        let tracker = tracker();
        let now = Utc::now();

        let statuses: Vec<LockoutStatus> =
            (0..3).map(|_| tracker.record_failure("a", now)).collect();

        assert_eq!(
            statuses.iter().map(|s| s.attempts_remaining).collect::<Vec<_>>(),
            vec![2, 1, 0]
        );
        assert_eq!(
            statuses.iter().map(|s| s.locked).collect::<Vec<_>>(),
            vec![false, false, true]
        );
        assert!(tracker.is_locked("a", now));
        assert!(tracker.record_failure("a", now).locked);
    }

    #[test]
    fn success_resets_attempts() {
        let tracker = tracker();
        let now = Utc::now();
        tracker.record_failure("a", now);
        tracker.record_failure("a", now);
        tracker.record_success("a");

        assert_eq!(tracker.attempts("a"), 0);
        assert_eq!(tracker.record_failure("a", now).attempts_remaining, 2);
    }

    #[test]
    fn lock_expires_after_duration() {
        let tracker = tracker();
        let now = Utc::now();
        for _ in 0..3 {
            tracker.record_failure("a", now);
        }

        let later = now + Duration::minutes(30);
        assert!(!tracker.is_locked("a", later));
        let status = tracker.record_failure("a", later);
        assert!(!status.locked);
        assert_eq!(status.attempts_remaining, 2);
    }

    #[test]
    fn unlock_clears_lock() {
        let tracker = tracker();
        let now = Utc::now();
        for _ in 0..3 {
            tracker.record_failure("a", now);
        }
        tracker.unlock("a");
        assert!(!tracker.is_locked("a", now));
    }

    #[test]
    fn sweep_removes_expired_records() {
        let tracker = tracker();
        let now = Utc::now();
        for _ in 0..3 {
            tracker.record_failure("locked", now);
        }
        tracker.record_failure("idle", now);
        tracker.record_failure("recent", now + Duration::minutes(20));

        assert_eq!(tracker.sweep(now + Duration::minutes(31)), 2);
        assert_eq!(tracker.attempts("recent"), 1);
        assert_eq!(tracker.len(), 1);
    }
}
