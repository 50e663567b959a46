//! Menuflow: guarded hierarchical session machines for menu-driven channels
//!
//! Every inbound request on a request/response telecom channel belongs to a
//! session. Each session runs a flow definition: a finite-state machine
//! whose transitions are protected by guards (menu navigation, input
//! validation, service availability, PIN lockout, transaction limits) and
//! whose states may delegate to nested sub-flows that hand a typed result
//! back to their parent.
//!
//! # Core Concepts
//!
//! - **Definitions**: immutable flows built and validated by
//!   [`builder::MachineDefinitionBuilder`]
//! - **Guards**: a tree of local and domain predicates evaluated in order
//!   with short-circuiting ([`guards`])
//! - **Runtimes**: live executions that dispatch one event at a time
//!   ([`runtime::MachineRuntime`])
//! - **Sessions**: runtimes keyed by session id with idle expiry
//!   ([`session::SessionRegistry`])
//! - **Engine**: the facade that turns gateway events into replies
//!   ([`Engine`])
//!
//! # Example
//!
//! ```rust
//! use menuflow::builder::TransitionBuilder;
//! use menuflow::core::{MachineDefinition, Output};
//! use menuflow::guards::navigation;
//! use menuflow::port::InMemoryQueryPort;
//! use menuflow::{Engine, EngineConfig, InboundEvent};
//! use std::sync::Arc;
//!
//! # tokio_test();
//! # fn tokio_test() {
//! # let rt = tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap();
//! # rt.block_on(async {
//! let menu = MachineDefinition::builder("menu")
//!     .initial("home")
//!     .state("home")
//!     .final_state("bye", Output::new("closed"))
//!     .transition(TransitionBuilder::input("home", "bye").guard(navigation::option("0")))
//!     .unwrap()
//!     .build()
//!     .unwrap();
//!
//! let engine = Engine::builder(EngineConfig::default(), Arc::new(InMemoryQueryPort::new()))
//!     .flow("*100#", menu)
//!     .build()
//!     .unwrap();
//!
//! let opening = engine.handle(InboundEvent::new("s1", "254700", "*100#", "")).await.unwrap();
//! assert_eq!(opening.message_key, "menu.home");
//!
//! let reply = engine.handle(InboundEvent::new("s1", "254700", "*100#", "0")).await.unwrap();
//! assert!(reply.is_terminal);
//! # });
//! # }
//! ```

pub mod builder;
pub mod checkpoint;
pub mod clock;
pub mod config;
pub mod core;
pub mod engine;
pub mod env;
pub mod error;
pub mod guards;
pub mod limits;
pub mod port;
pub mod runtime;
pub mod session;

// Re-export commonly used types
pub use config::EngineConfig;
pub use core::{Event, Guard, MachineContext, MachineDefinition, StateHistory};
pub use engine::{Engine, InboundEvent, SessionReply};
pub use error::{Denial, EngineError, ErrorKind};
pub use runtime::{MachineRuntime, RuntimeResult};
