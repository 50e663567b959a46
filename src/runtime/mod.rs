//! Execution of flow definitions.

mod machine;

pub use machine::{MachineRuntime, RuntimeResult};
