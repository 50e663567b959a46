//! Guard families and their evaluator.
//!
//! - [`navigation`]: input picks a defined menu option
//! - [`validation`]: structural checks on the input or context
//! - [`system`]: service availability and maintenance flags
//! - [`domain`]: business predicates backed by the external query port
//!
//! Composite guards are built with [`crate::core::Guard::and`],
//! [`crate::core::Guard::or`] and `!guard`. Within a transition, local
//! guards must come before domain guards; definitions that break this are
//! rejected at build time.

/// Limit, lockout and lookup guards that may perform I/O.
pub mod domain;
mod engine;
/// Menu option guards.
pub mod navigation;
pub mod system;
pub mod validation;

pub use engine::{GuardEngine, GuardFuture};

/// Stable denial reasons. Formatting layers use them as message keys.
pub mod reasons {
    /// Input does not pick any offered option
    pub const INVALID_SELECTION: &str = "invalid selection";
    pub const INVALID_PIN: &str = "invalid PIN";
    /// PIN lockout is active
    pub const LOCKED: &str = "locked";
    pub const INVALID_AMOUNT: &str = "invalid amount";
    pub const INSUFFICIENT_BALANCE: &str = "insufficient balance";
    pub const SERVICE_UNAVAILABLE: &str = "service unavailable";
    pub const RATE_LIMITED: &str = "rate limited";
    /// Reported when a request arrives for an evicted session
    pub const SESSION_EXPIRED: &str = "session expired";
    /// Credential check could not be completed
    pub const IDENTITY_UNAVAILABLE: &str = "identity service unavailable";
    pub const BALANCE_UNAVAILABLE: &str = "balance service unavailable";
    pub const CLAIMS_UNAVAILABLE: &str = "claims service unavailable";
    pub const CLAIM_NOT_FOUND: &str = "claim not found";
    pub const ACCOUNT_NOT_FOUND: &str = "account not found";
    /// An OR whose children all refused without a more specific reason
    pub const NO_ALTERNATIVE: &str = "no alternative matched";
}
