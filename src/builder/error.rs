//! Build errors for flow definitions and transitions.

use thiserror::Error;

/// One structural problem found while validating a definition.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum DefinitionViolation {
    #[error("definition has no states")]
    NoStates,

    #[error("initial state '{0}' is not declared")]
    UnknownInitialState(String),

    #[error("initial state '{0}' is final")]
    FinalInitialState(String),

    #[error("state '{0}' declared more than once")]
    DuplicateState(String),

    #[error("transition source '{0}' is not declared")]
    UnknownSource(String),

    #[error("transition target '{0}' is not declared")]
    UnknownTarget(String),

    #[error("final state '{0}' has outgoing transitions")]
    TransitionFromFinal(String),

    #[error("sub-flow state '{0}' has no outgoing transition")]
    SubFlowWithoutExit(String),

    #[error("entry/exit action declared for unknown state '{0}'")]
    UnknownActionState(String),

    #[error("transition {from} -> {to} has an empty composite guard")]
    EmptyComposite { from: String, to: String },

    #[error("transition {from} -> {to} evaluates local guard '{guard}' after a domain guard")]
    GuardOrder {
        from: String,
        to: String,
        guard: String,
    },

    #[error("transition {from} -> {to} can deny after guard '{guard}' has reserved limits")]
    UnsafeReservation {
        from: String,
        to: String,
        guard: String,
    },
}

/// Errors that can occur when building flow definitions and transitions.
#[derive(Debug, Error)]
pub enum BuildError {
    #[error("Initial state not specified. Call .initial(state) before .build()")]
    MissingInitialState,

    #[error("Transition source state not specified. Call .from(state)")]
    MissingFromState,

    #[error("Transition event not specified. Call .on(event)")]
    MissingEvent,

    #[error("Transition target state not specified. Call .to(state)")]
    MissingToState,

    #[error("Flow '{flow}' is invalid: {}", render(violations))]
    InvalidDefinition {
        flow: String,
        violations: Vec<DefinitionViolation>,
    },
}

fn render(violations: &[DefinitionViolation]) -> String {
    violations
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}
