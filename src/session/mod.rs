//! Sessions and the registry that owns them.

mod handle;
mod registry;

pub use handle::{Session, SessionHandle, SessionSeed};
pub use registry::{Continuity, Resolved, SessionRegistry};
