//! Shared per-identity business limits.
//!
//! These trackers are shared by every session of an identity. Each keeps
//! its state in a `DashMap`, so unrelated identities never contend on the
//! same lock, and each exposes a `sweep` for idle entries.

mod lockout;
mod rate;
mod transaction;

pub use lockout::{LockoutRecord, LockoutStatus, PinLockoutTracker};
pub use rate::{RateLimitWindow, RateLimiter};
pub use transaction::{LimitViolation, Reservation, TransactionAccumulator, TransactionLimitEnforcer};
