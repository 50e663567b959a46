//! Checkpoint error types.

use thiserror::Error;

/// Errors that can occur while writing or restoring a checkpoint
#[derive(Debug, Error)]
pub enum CheckpointError {
    /// Encoding to JSON or binary failed
    #[error("Serialization failed: {0}")]
    SerializationFailed(String),

    /// Decoding from JSON or binary failed
    #[error("Deserialization failed: {0}")]
    DeserializationFailed(String),

    #[error("Unsupported checkpoint version {found}, supported: {supported}")]
    UnsupportedVersion { found: u32, supported: u32 },

    /// The checkpoint does not fit the flow definitions it is restored into
    #[error("Checkpoint validation failed: {0}")]
    ValidationFailed(String),

    #[error("Session '{0}' not found")]
    SessionNotFound(String),
}
