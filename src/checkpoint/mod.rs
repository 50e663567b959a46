//! Checkpoint and resume for live sessions.
//!
//! A checkpoint captures everything needed to rebuild a session except the
//! flow definitions themselves (guards and actions are code, not data), so
//! restoring always takes the current definition and checks that every
//! recorded state still exists in it.

use crate::core::{MachineContext, Output, StateHistory};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub mod error;

pub use error::CheckpointError;

/// Version identifier for checkpoint format
pub const CHECKPOINT_VERSION: u32 = 1;

/// Serializable state of one runtime and, recursively, its live child.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuntimeSnapshot {
    /// Name of the definition the runtime executes
    pub flow: String,
    /// Active state; must exist in the definition on restore
    pub state: String,
    pub context: MachineContext,
    pub history: StateHistory,
    /// Set once the runtime has terminated
    pub output: Option<Output>,
    /// Live child runtime, if a sub-flow state is active
    pub child: Option<Box<RuntimeSnapshot>>,
}

/// Serializable checkpoint of a session.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionCheckpoint {
    /// Checkpoint format version
    pub version: u32,

    /// Unique checkpoint identifier
    pub id: String,

    /// When checkpoint was created
    pub timestamp: DateTime<Utc>,

    pub session_id: String,
    pub identity_key: String,
    pub service_code: String,
    pub locale: String,
    pub created_at: DateTime<Utc>,
    /// Restored sessions resume with this idle clock
    pub last_activity: DateTime<Utc>,

    /// Root runtime with nested children
    pub runtime: RuntimeSnapshot,
}

impl SessionCheckpoint {
    /// Stamp a new checkpoint with a fresh id and the current format version.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        session_id: impl Into<String>,
        identity_key: impl Into<String>,
        service_code: impl Into<String>,
        locale: impl Into<String>,
        created_at: DateTime<Utc>,
        last_activity: DateTime<Utc>,
        runtime: RuntimeSnapshot,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            version: CHECKPOINT_VERSION,
            id: Uuid::new_v4().to_string(),
            timestamp,
            session_id: session_id.into(),
            identity_key: identity_key.into(),
            service_code: service_code.into(),
            locale: locale.into(),
            created_at,
            last_activity,
            runtime,
        }
    }

    /// Serialize as JSON.
    pub fn to_json(&self) -> Result<String, CheckpointError> {
        serde_json::to_string(self).map_err(|e| CheckpointError::SerializationFailed(e.to_string()))
    }

    /// Parse a JSON checkpoint, rejecting unknown format versions.
    pub fn from_json(json: &str) -> Result<Self, CheckpointError> {
        let checkpoint: Self = serde_json::from_str(json)
            .map_err(|e| CheckpointError::DeserializationFailed(e.to_string()))?;
        checkpoint.check_version()
    }

    /// Compact binary encoding.
    pub fn to_bytes(&self) -> Result<Vec<u8>, CheckpointError> {
        bincode::serialize(self).map_err(|e| CheckpointError::SerializationFailed(e.to_string()))
    }

    /// Decode the binary encoding produced by [`Self::to_bytes`].
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CheckpointError> {
        let checkpoint: Self = bincode::deserialize(bytes)
            .map_err(|e| CheckpointError::DeserializationFailed(e.to_string()))?;
        checkpoint.check_version()
    }

    fn check_version(self) -> Result<Self, CheckpointError> {
        if self.version != CHECKPOINT_VERSION {
            return Err(CheckpointError::UnsupportedVersion {
                found: self.version,
                supported: CHECKPOINT_VERSION,
            });
        }
        Ok(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::TransitionRecord;
    use chrono::TimeZone;

    fn checkpoint() -> SessionCheckpoint {
        let at = Utc.with_ymd_and_hms(2026, 3, 10, 9, 0, 0).unwrap();
        let mut history = StateHistory::new();
        history.record(TransitionRecord {
            from: "login".to_string(),
            to: "menu".to_string(),
            event: "authenticated".to_string(),
            timestamp: at,
        });
        let context = MachineContext::new("s1", "254700", "*123#").with_field("amount", "500");

        SessionCheckpoint::new(
            "s1",
            "254700",
            "*123#",
            "sw",
            at,
            at,
            RuntimeSnapshot {
                flow: "account".to_string(),
                state: "transfer".to_string(),
                context: context.clone(),
                history,
                output: None,
                child: Some(Box::new(RuntimeSnapshot {
                    flow: "transfer".to_string(),
                    state: "confirm".to_string(),
                    context,
                    history: StateHistory::new(),
                    output: None,
                    child: None,
                })),
            },
            at,
        )
    }

    #[test]
    fn json_and_binary_encodings_agree() {
        let original = checkpoint();
        let from_json = SessionCheckpoint::from_json(&original.to_json().unwrap()).unwrap();
        let from_bytes = SessionCheckpoint::from_bytes(&original.to_bytes().unwrap()).unwrap();

        assert_eq!(from_json, original);
        assert_eq!(from_bytes, original);
    }

    #[test]
    fn checkpoints_get_distinct_ids() {
        assert_ne!(checkpoint().id, checkpoint().id);
    }

    #[test]
    fn newer_versions_are_refused() {
        let mut future = checkpoint();
        future.version = CHECKPOINT_VERSION + 1;
        let json = serde_json::to_string(&future).unwrap();

        assert!(matches!(
            SessionCheckpoint::from_json(&json),
            Err(CheckpointError::UnsupportedVersion { found: 2, supported: 1 })
        ));
    }

    #[test]
    fn garbage_fails_to_deserialize() {
        assert!(matches!(
            SessionCheckpoint::from_bytes(&[1, 2, 3]),
            Err(CheckpointError::DeserializationFailed(_))
        ));
    }
}
