//! Structural validation of flow definitions.
//!
//! Every check runs and all violations are reported together, so a broken
//! flow is fixed in one pass.

use crate::builder::error::DefinitionViolation;
use crate::core::{Guard, StateSpec, Transition};
use std::collections::HashSet;
use stillwater::validation::Validation;
use stillwater::NonEmptyVec;

type Check = Validation<(), NonEmptyVec<DefinitionViolation>>;

fn require(ok: bool, violation: impl FnOnce() -> DefinitionViolation) -> Check {
    if ok {
        Validation::success(())
    } else {
        Validation::fail(violation())
    }
}

/// Raw parts collected by the definition builder.
pub(crate) struct DefinitionParts<'a> {
    pub initial: &'a str,
    pub states: &'a [StateSpec],
    pub transitions: &'a [Transition],
    pub action_states: Vec<&'a str>,
}

pub(crate) fn validate(parts: &DefinitionParts<'_>) -> Result<(), Vec<DefinitionViolation>> {
    let mut checks: Vec<Check> = Vec::new();
    let mut declared = HashSet::new();
    let mut finals = HashSet::new();

    checks.push(require(!parts.states.is_empty(), || DefinitionViolation::NoStates));

    for state in parts.states {
        checks.push(require(declared.insert(state.id.as_str()), || {
            DefinitionViolation::DuplicateState(state.id.clone())
        }));
        if state.is_final() {
            finals.insert(state.id.as_str());
        }
    }

    checks.push(require(declared.contains(parts.initial), || {
        DefinitionViolation::UnknownInitialState(parts.initial.to_string())
    }));
    checks.push(require(!finals.contains(parts.initial), || {
        DefinitionViolation::FinalInitialState(parts.initial.to_string())
    }));

    for transition in parts.transitions {
        checks.push(require(declared.contains(transition.from.as_str()), || {
            DefinitionViolation::UnknownSource(transition.from.clone())
        }));
        checks.push(require(declared.contains(transition.to.as_str()), || {
            DefinitionViolation::UnknownTarget(transition.to.clone())
        }));
        checks.push(require(!finals.contains(transition.from.as_str()), || {
            DefinitionViolation::TransitionFromFinal(transition.from.clone())
        }));
        checks.push(check_guards(transition));
    }

    for state in parts.states.iter().filter(|s| s.is_sub_flow()) {
        let has_exit = parts.transitions.iter().any(|t| t.from == state.id);
        checks.push(require(has_exit, || {
            DefinitionViolation::SubFlowWithoutExit(state.id.clone())
        }));
    }

    for state in &parts.action_states {
        checks.push(require(declared.contains(state), || {
            DefinitionViolation::UnknownActionState(state.to_string())
        }));
    }

    match Validation::all_vec(checks).map(|_| ()) {
        Validation::Success(_) => Ok(()),
        Validation::Failure(errors) => Err(errors.iter().cloned().collect()),
    }
}

fn check_guards(transition: &Transition) -> Check {
    let mut checks = vec![require(
        !transition.guards.iter().any(Guard::has_empty_composite),
        || DefinitionViolation::EmptyComposite {
            from: transition.from.clone(),
            to: transition.to.clone(),
        },
    )];
    for guard in Guard::misordered(&transition.guards) {
        checks.push(Validation::fail(DefinitionViolation::GuardOrder {
            from: transition.from.clone(),
            to: transition.to.clone(),
            guard,
        }));
    }
    for guard in Guard::unsafe_reservations(&transition.guards) {
        checks.push(Validation::fail(DefinitionViolation::UnsafeReservation {
            from: transition.from.clone(),
            to: transition.to.clone(),
            guard,
        }));
    }
    Validation::all_vec(checks).map(|_| ())
}
