//! States of a machine definition.
//!
//! A state is plain, final (carrying the value the machine returns to its
//! parent), or a sub-flow that runs a child definition and turns the
//! child's output into an event for this machine.

use crate::core::context::Event;
use crate::core::definition::MachineDefinition;
use crate::core::transition::ContextAction;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Value a machine produces when it reaches a final state.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Output(String);

impl Output {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Output {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Pure mapping from a child's output to an event for the parent.
pub type OutputMapping = Arc<dyn Fn(&Output) -> Event + Send + Sync>;

/// How a state behaves once entered.
#[derive(Clone)]
pub enum StateKind {
    /// Waits for events
    Plain,
    /// Ends the machine with an output
    Final(Output),
    /// Runs a child machine until it finishes
    SubFlow {
        child: Arc<MachineDefinition>,
        mapping: OutputMapping,
    },
}

/// One state of a definition with its optional entry and exit actions.
#[derive(Clone)]
pub struct StateSpec {
    pub id: String,
    pub kind: StateKind,
    /// Applied to the context each time the state is entered
    pub on_entry: Option<ContextAction>,
    /// Applied to the context when a transition leaves the state
    pub on_exit: Option<ContextAction>,
}

impl StateSpec {
    pub fn new(id: impl Into<String>, kind: StateKind) -> Self {
        Self {
            id: id.into(),
            kind,
            on_entry: None,
            on_exit: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.id
    }

    /// Reaching this state terminates the machine.
    pub fn is_final(&self) -> bool {
        matches!(self.kind, StateKind::Final(_))
    }

    pub fn is_sub_flow(&self) -> bool {
        matches!(self.kind, StateKind::SubFlow { .. })
    }

    /// Child definition run while this state is active.
    pub fn child(&self) -> Option<&Arc<MachineDefinition>> {
        match &self.kind {
            StateKind::SubFlow { child, .. } => Some(child),
            _ => None,
        }
    }
}

impl fmt::Debug for StateSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match &self.kind {
            StateKind::Plain => "plain".to_string(),
            StateKind::Final(output) => format!("final({})", output),
            StateKind::SubFlow { child, .. } => format!("sub_flow({})", child.name()),
        };
        f.debug_struct("StateSpec")
            .field("id", &self.id)
            .field("kind", &kind)
            .field("on_entry", &self.on_entry.is_some())
            .field("on_exit", &self.on_exit.is_some())
            .finish()
    }
}
