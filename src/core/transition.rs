//! Transitions between states.

use crate::core::context::MachineContext;
use crate::core::guard::Guard;
use std::fmt;
use std::sync::Arc;

/// Pure context mutation: old context plus the event input gives the new
/// context. Used for transition actions and for state entry/exit.
pub type ContextAction = Arc<dyn Fn(&MachineContext, &str) -> MachineContext + Send + Sync>;

/// A guarded move from one state to another on a given event kind.
///
/// Guards run in order; all must pass. The first failing guard's denial is
/// the rejection reason.
#[derive(Clone)]
pub struct Transition {
    /// Source state
    pub from: String,
    /// Event kind that selects this transition
    pub event: String,
    pub to: String,
    /// Evaluated in order; all must allow
    pub guards: Vec<Guard>,
    /// Applied to the context when the transition fires
    pub action: Option<ContextAction>,
}

impl Transition {
    /// Whether this transition is a candidate for `event` in `state` (pure).
    pub fn matches(&self, state: &str, event: &str) -> bool {
        self.from == state && self.event == event
    }

    /// Run the context action, if any.
    pub fn apply_action(&self, context: &MachineContext, input: &str) -> MachineContext {
        match &self.action {
            Some(action) => action(context, input),
            None => context.clone(),
        }
    }
}

impl fmt::Debug for Transition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transition")
            .field("from", &self.from)
            .field("event", &self.event)
            .field("to", &self.to)
            .field("guards", &self.guards)
            .field("action", &self.action.is_some())
            .finish()
    }
}
