//! Immutable flow definitions.

use crate::core::state::StateSpec;
use crate::core::transition::Transition;
use std::collections::HashMap;
use std::fmt;

/// Declarative description of one flow: its states, transitions, entry and
/// exit actions, and sub-flow composition.
///
/// Only obtainable through [`crate::builder::MachineDefinitionBuilder`],
/// which rejects malformed definitions, so every instance is valid.
/// Shared read-only (behind `Arc`) by all runtimes of the flow.
pub struct MachineDefinition {
    name: String,
    initial: String,
    states: HashMap<String, StateSpec>,
    transitions: Vec<Transition>,
    record_denials: bool,
}

impl MachineDefinition {
    pub(crate) fn from_parts(
        name: String,
        initial: String,
        states: HashMap<String, StateSpec>,
        transitions: Vec<Transition>,
        record_denials: bool,
    ) -> Self {
        Self {
            name,
            initial,
            states,
            transitions,
            record_denials,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// State every runtime of this definition starts in.
    pub fn initial(&self) -> &str {
        &self.initial
    }

    /// Look up a state by id.
    pub fn state(&self, id: &str) -> Option<&StateSpec> {
        self.states.get(id)
    }

    pub fn states(&self) -> impl Iterator<Item = &StateSpec> {
        self.states.values()
    }

    /// All transitions in declaration order.
    pub fn transitions(&self) -> &[Transition] {
        &self.transitions
    }

    /// Transitions leaving `state` on `event`, in declaration order.
    pub fn candidates<'a>(
        &'a self,
        state: &'a str,
        event: &'a str,
    ) -> impl Iterator<Item = &'a Transition> + 'a {
        self.transitions
            .iter()
            .filter(move |t| t.matches(state, event))
    }

    /// Whether a failed guard chain stores its denial in the context.
    pub fn records_denials(&self) -> bool {
        self.record_denials
    }
}

impl fmt::Debug for MachineDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MachineDefinition")
            .field("name", &self.name)
            .field("initial", &self.initial)
            .field("states", &self.states.len())
            .field("transitions", &self.transitions.len())
            .field("record_denials", &self.record_denials)
            .finish()
    }
}
