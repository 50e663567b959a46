//! Per-machine context and the events that drive transitions.

use crate::error::Denial;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Event kind for raw user input arriving from the gateway.
pub const INPUT_EVENT: &str = "input";

/// Something that happened to a machine: a kind used to select candidate
/// transitions, and the raw input guards and actions look at.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    /// Selects candidate transitions, e.g. `input`
    pub kind: String,
    pub input: String,
}

impl Event {
    /// Event of an arbitrary kind, e.g. one produced by an output mapping.
    pub fn new(kind: impl Into<String>, input: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            input: input.into(),
        }
    }

    /// A user input event. Surrounding whitespace is dropped.
    pub fn input(raw: &str) -> Self {
        Self::new(INPUT_EVENT, raw.trim())
    }
}

/// Mutable payload carried through one machine's lifetime.
///
/// Never shared across sessions: sub-flows receive their own copy.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MachineContext {
    /// Session this context belongs to
    pub session_id: String,
    /// Identity the trackers key on
    pub identity_key: String,
    pub service_code: String,
    /// Locale for rendered text
    pub locale: String,
    /// Most recent denial, cleared on the next successful transition
    pub last_error: Option<Denial>,
    /// Flow-specific values (entered amounts, selected options, ...)
    pub fields: BTreeMap<String, String>,
}

impl MachineContext {
    pub fn new(
        session_id: impl Into<String>,
        identity_key: impl Into<String>,
        service_code: impl Into<String>,
    ) -> Self {
        Self {
            session_id: session_id.into(),
            identity_key: identity_key.into(),
            service_code: service_code.into(),
            locale: "en".to_string(),
            last_error: None,
            fields: BTreeMap::new(),
        }
    }

    pub fn with_locale(mut self, locale: impl Into<String>) -> Self {
        self.locale = locale.into();
        self
    }

    /// Return a copy of the context with `key` set, for use in pure actions.
    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }

    /// Return a copy of the context with `key` removed.
    pub fn without_field(mut self, key: &str) -> Self {
        self.fields.remove(key);
        self
    }

    /// Value stored under `key` by an earlier step.
    pub fn field(&self, key: &str) -> Option<&str> {
        self.fields.get(key).map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn input_event_is_trimmed() {
        let event = Event::input("  2 \n");
        assert_eq!(event.kind, INPUT_EVENT);
        assert_eq!(event.input, "2");
    }

    #[test]
    fn with_field_returns_updated_copy() {
        let ctx = MachineContext::new("s1", "254700", "*123#");
        let updated = ctx.clone().with_field("amount", "500");

        assert_eq!(ctx.field("amount"), None);
        assert_eq!(updated.field("amount"), Some("500"));
        assert_eq!(updated.without_field("amount").field("amount"), None);
    }

    #[test]
    fn context_serializes() {
        let ctx = MachineContext::new("s1", "254700", "*123#")
            .with_locale("sw")
            .with_field("menu", "1");
        let json = serde_json::to_string(&ctx).unwrap();
        let back: MachineContext = serde_json::from_str(&json).unwrap();
        assert_eq!(ctx, back);
    }
}
