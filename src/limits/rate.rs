//! Per-identity request rate limiting.

use crate::config::RateLimitConfig;
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;

/// Fixed window opened by the first request an identity makes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RateLimitWindow {
    pub window_start: DateTime<Utc>,
    /// Requests allowed so far in this window
    pub count: u32,
}

/// Allows up to N requests per identity per window.
///
/// # Example
/// ```
/// use menuflow::limits::RateLimiter;
/// use chrono::{Duration, Utc};
///
/// let limiter = RateLimiter::new(2, Duration::seconds(60), Duration::seconds(0));
/// let now = Utc::now();
///
/// assert!(limiter.allow("254700", now));
/// assert!(limiter.allow("254700", now));
/// assert!(!limiter.allow("254700", now));
///
/// // The window rolls over
/// assert!(limiter.allow("254700", now + Duration::seconds(60)));
/// ```
#[derive(Debug)]
pub struct RateLimiter {
    windows: DashMap<String, RateLimitWindow>,
    max_requests: u32,
    window: Duration,
    grace: Duration,
}

impl RateLimiter {
    pub fn new(max_requests: u32, window: Duration, grace: Duration) -> Self {
        Self {
            windows: DashMap::new(),
            max_requests,
            window,
            grace,
        }
    }

    pub fn from_config(config: &RateLimitConfig) -> Self {
        Self::new(config.requests_per_window, config.window(), config.grace())
    }

    /// Record a request and decide whether it may proceed.
    ///
    /// Denied requests are not counted, so the count never exceeds the limit.
    pub fn allow(&self, identity_key: &str, now: DateTime<Utc>) -> bool {
        let mut window = self
            .windows
            .entry(identity_key.to_string())
            .or_insert_with(|| RateLimitWindow {
                window_start: now,
                count: 0,
            });

        if now.signed_duration_since(window.window_start) >= self.window {
            window.window_start = now;
            window.count = 0;
        }

        if window.count < self.max_requests {
            window.count += 1;
            true
        } else {
            false
        }
    }

    /// Drop windows that ended more than the grace period ago.
    pub fn sweep(&self, now: DateTime<Utc>) -> usize {
        let horizon = self.window + self.grace;
        let before = self.windows.len();
        self.windows
            .retain(|_, window| now.signed_duration_since(window.window_start) < horizon);
        before.saturating_sub(self.windows.len())
    }

    /// Current window for an identity, if it has one.
    pub fn window(&self, identity_key: &str) -> Option<RateLimitWindow> {
        self.windows.get(identity_key).map(|w| w.clone())
    }

    pub fn len(&self) -> usize {
        self.windows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.windows.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn limiter(max: u32) -> RateLimiter {
        RateLimiter::new(max, Duration::seconds(60), Duration::seconds(30))
    }

    #[test]
    fn denies_after_limit_within_window() {
        let limiter = limiter(3);
        let now = Utc::now();

        let results: Vec<bool> = (0..5)
            .map(|i| limiter.allow("a", now + Duration::seconds(i)))
            .collect();
        assert_eq!(results, vec![true, true, true, false, false]);
        assert_eq!(limiter.window("a").unwrap().count, 3);
    }

    #[test]
    fn window_rolls_over_after_full_length() {
        let limiter = limiter(1);
        let now = Utc::now();

        assert!(limiter.allow("a", now));
        assert!(!limiter.allow("a", now + Duration::seconds(59)));
        assert!(limiter.allow("a", now + Duration::seconds(60)));
    }

    #[test]
    fn identities_are_independent() {
        let limiter = limiter(1);
        let now = Utc::now();

        assert!(limiter.allow("a", now));
        assert!(limiter.allow("b", now));
        assert!(!limiter.allow("a", now));
    }

    #[test]
    fn sweep_evicts_only_stale_windows() {
        let limiter = limiter(5);
        let now = Utc::now();
        limiter.allow("old", now);
        limiter.allow("fresh", now + Duration::seconds(80));

        let evicted = limiter.sweep(now + Duration::seconds(91));
        assert_eq!(evicted, 1);
        assert!(limiter.window("old").is_none());
        assert!(limiter.window("fresh").is_some());
    }

    #[test]
    fn concurrent_requests_never_exceed_limit() {
        let limiter = Arc::new(limiter(50));
        let now = Utc::now();
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let limiter = Arc::clone(&limiter);
                std::thread::spawn(move || (0..20).filter(|_| limiter.allow("a", now)).count())
            })
            .collect();

        let allowed: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
        assert_eq!(allowed, 50);
    }
}
