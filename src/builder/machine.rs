//! Builder for flow definitions.

use crate::builder::error::BuildError;
use crate::builder::transition::TransitionBuilder;
use crate::builder::validate::{validate, DefinitionParts};
use crate::core::{
    ContextAction, Event, MachineContext, MachineDefinition, Output, StateKind, StateSpec,
    Transition,
};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// Builder for constructing flow definitions with a fluent API.
///
/// `build()` validates the whole definition and reports every structural
/// problem at once; a definition that fails never reaches a runtime.
pub struct MachineDefinitionBuilder {
    name: String,
    initial: Option<String>,
    states: Vec<StateSpec>,
    entry_actions: Vec<(String, ContextAction)>,
    exit_actions: Vec<(String, ContextAction)>,
    transitions: Vec<Transition>,
    record_denials: bool,
}

impl MachineDefinition {
    /// Start building a definition named `name`.
    pub fn builder(name: impl Into<String>) -> MachineDefinitionBuilder {
        MachineDefinitionBuilder::new(name)
    }
}

impl MachineDefinitionBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            initial: None,
            states: Vec::new(),
            entry_actions: Vec::new(),
            exit_actions: Vec::new(),
            transitions: Vec::new(),
            record_denials: true,
        }
    }

    /// Set the initial state (required).
    pub fn initial(mut self, state: impl Into<String>) -> Self {
        self.initial = Some(state.into());
        self
    }

    /// Declare a plain state.
    pub fn state(mut self, id: impl Into<String>) -> Self {
        self.states.push(StateSpec::new(id, StateKind::Plain));
        self
    }

    /// Declare a final state that returns `output` to the parent flow.
    pub fn final_state(mut self, id: impl Into<String>, output: Output) -> Self {
        self.states.push(StateSpec::new(id, StateKind::Final(output)));
        self
    }

    /// Declare a state that runs `child` and feeds `mapping(output)` back to
    /// this flow as an event once the child finishes.
    pub fn sub_flow<F>(mut self, id: impl Into<String>, child: Arc<MachineDefinition>, mapping: F) -> Self
    where
        F: Fn(&Output) -> Event + Send + Sync + 'static,
    {
        self.states.push(StateSpec::new(
            id,
            StateKind::SubFlow {
                child,
                mapping: Arc::new(mapping),
            },
        ));
        self
    }

    /// Action applied to the context whenever `state` is entered.
    pub fn on_entry<F>(mut self, state: impl Into<String>, action: F) -> Self
    where
        F: Fn(&MachineContext, &str) -> MachineContext + Send + Sync + 'static,
    {
        self.entry_actions.push((state.into(), Arc::new(action)));
        self
    }

    pub fn on_exit<F>(mut self, state: impl Into<String>, action: F) -> Self
    where
        F: Fn(&MachineContext, &str) -> MachineContext + Send + Sync + 'static,
    {
        self.exit_actions.push((state.into(), Arc::new(action)));
        self
    }

    /// Add a transition using a builder.
    /// Returns an error if the builder is missing a required field.
    pub fn transition(mut self, builder: TransitionBuilder) -> Result<Self, BuildError> {
        let transition = builder.build()?;
        self.transitions.push(transition);
        Ok(self)
    }

    /// Add a pre-built transition.
    pub fn add_transition(mut self, transition: Transition) -> Self {
        self.transitions.push(transition);
        self
    }

    /// Whether a rejected dispatch stores its denial in `last_error`
    /// (default `true`).
    pub fn record_denials(mut self, record: bool) -> Self {
        self.record_denials = record;
        self
    }

    /// Validate and freeze the definition.
    ///
    /// Every violation is collected into one [`BuildError::InvalidDefinition`].
    pub fn build(self) -> Result<Arc<MachineDefinition>, BuildError> {
        let initial = self.initial.ok_or(BuildError::MissingInitialState)?;

        let action_states = self
            .entry_actions
            .iter()
            .chain(self.exit_actions.iter())
            .map(|(state, _)| state.as_str())
            .collect();
        validate(&DefinitionParts {
            initial: &initial,
            states: &self.states,
            transitions: &self.transitions,
            action_states,
        })
        .map_err(|violations| BuildError::InvalidDefinition {
            flow: self.name.clone(),
            violations,
        })?;

        let mut states: HashMap<String, StateSpec> = self
            .states
            .into_iter()
            .map(|state| (state.id.clone(), state))
            .collect();
        for (id, action) in self.entry_actions {
            if let Some(state) = states.get_mut(&id) {
                state.on_entry = Some(action);
            }
        }
        for (id, action) in self.exit_actions {
            if let Some(state) = states.get_mut(&id) {
                state.on_exit = Some(action);
            }
        }

        debug!(
            flow = %self.name,
            states = states.len(),
            transitions = self.transitions.len(),
            "flow definition built"
        );
        Ok(Arc::new(MachineDefinition::from_parts(
            self.name,
            initial,
            states,
            self.transitions,
            self.record_denials,
        )))
    }
}
