//! Core state machine types.
//!
//! This module contains the data model of the engine:
//! - Events and the per-machine context
//! - State specifications, outputs and sub-flow mappings
//! - The guard tree and its verdicts
//! - Transitions and immutable machine definitions
//! - Transition history
//!
//! Nothing in here performs I/O; evaluation lives in `guards` and
//! execution in `runtime`.

mod context;
mod definition;
mod guard;
mod history;
mod state;
mod transition;

pub use context::{Event, MachineContext, INPUT_EVENT};
pub use definition::MachineDefinition;
pub use guard::{DomainCheck, Guard, GuardFamily, LocalCheck, Verdict};
pub use history::{StateHistory, TransitionRecord};
pub use state::{Output, OutputMapping, StateKind, StateSpec};
pub use transition::{ContextAction, Transition};
