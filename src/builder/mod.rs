//! Builder API for flow definitions.
//!
//! Definitions are assembled with fluent builders and validated as a whole
//! before they can be registered with an engine.

/// Errors reported by `build()`.
pub mod error;
pub mod machine;
pub mod transition;
mod validate;

pub use error::{BuildError, DefinitionViolation};
pub use machine::MachineDefinitionBuilder;
pub use transition::TransitionBuilder;
