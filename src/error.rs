//! Error taxonomy shared by guards, runtimes and the session engine.
//!
//! Guard rejections are values ([`Denial`]) that the runtime recovers from
//! locally; [`EngineError`] is reserved for failures the caller has to see.

use crate::builder::BuildError;
use crate::checkpoint::CheckpointError;
use crate::config::ConfigError;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Classification of every way a request can fail to advance a session.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    /// A navigation, validation or domain guard rejected the input
    InputRejected,
    /// PIN lockout is active for the identity
    Locked,
    /// The identity exceeded its request budget for the current window
    RateLimited,
    /// Maintenance mode is on or the service is switched off
    ServiceUnavailable,
    /// An external query failed or timed out
    ExternalUnavailable,
    /// The session identifier referred to an evicted session
    SessionExpired,
}

impl ErrorKind {
    /// Whether the caller may reasonably retry the same input later.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::RateLimited | Self::ServiceUnavailable | Self::ExternalUnavailable
        )
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::InputRejected => "input rejected",
            Self::Locked => "locked",
            Self::RateLimited => "rate limited",
            Self::ServiceUnavailable => "service unavailable",
            Self::ExternalUnavailable => "external service unavailable",
            Self::SessionExpired => "session expired",
        };
        f.write_str(name)
    }
}

/// A guard rejection: which guard said no, and why.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Denial {
    pub kind: ErrorKind,
    /// Identifier of the guard that produced the denial
    pub guard: String,
    /// Human-readable reason, stable enough to be used as a message key
    pub reason: String,
    /// Remaining PIN attempts, when the denial came from authentication
    pub attempts_remaining: Option<u32>,
}

impl Denial {
    pub fn new(kind: ErrorKind, guard: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            kind,
            guard: guard.into(),
            reason: reason.into(),
            attempts_remaining: None,
        }
    }

    /// Denial of kind [`ErrorKind::InputRejected`].
    pub fn rejected(guard: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::new(ErrorKind::InputRejected, guard, reason)
    }

    /// Denial of kind [`ErrorKind::ExternalUnavailable`].
    pub fn unavailable(guard: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::new(ErrorKind::ExternalUnavailable, guard, reason)
    }

    /// Attach the remaining PIN attempts.
    pub fn with_attempts_remaining(mut self, remaining: u32) -> Self {
        self.attempts_remaining = Some(remaining);
        self
    }
}

impl fmt::Display for Denial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}): {}", self.kind, self.guard, self.reason)
    }
}

/// Errors surfaced to the caller of the engine.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Session '{session_id}' expired")]
    SessionExpired { session_id: String },

    #[error("Runtime for flow '{flow}' already reached a final state")]
    RuntimeTerminated { flow: String },

    #[error("No flow registered for service code '{service_code}'")]
    UnknownService { service_code: String },

    #[error("Flow already registered for service code '{service_code}'")]
    DuplicateService { service_code: String },

    #[error(transparent)]
    Configuration(#[from] BuildError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Checkpoint(#[from] CheckpointError),
}

impl EngineError {
    /// Taxonomy kind of this error, where one applies.
    pub fn kind(&self) -> Option<ErrorKind> {
        match self {
            Self::SessionExpired { .. } => Some(ErrorKind::SessionExpired),
            _ => None,
        }
    }
}
