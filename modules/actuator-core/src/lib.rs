//! In-process event dispatcher.
//!
//! Provides a single dispatch loop: pull the next event from the bound
//! source → look up its command → run the handler → repeat until the source
//! is exhausted or `stop()` is observed.
//!
//! Handlers are registered by name and only ever see a [`CommandContext`],
//! which exposes dispatcher fields through an allow-list gate
//! ([`GuardedState`]) instead of handing out the dispatcher itself.

pub mod actuator;
pub mod context;
pub mod error;
pub mod event;
pub mod handler;
pub mod registry;
pub mod source;
pub mod state;

pub use actuator::{Actuator, RunSummary};
pub use context::CommandContext;
pub use error::{ActuatorError, Result};
pub use event::Event;
pub use handler::{context_handler_fn, handler_fn, CommandHandler};
pub use registry::{CommandNames, CommandRegistry, CommandsInfo, QueryMode};
pub use source::{EventSender, EventSource, EventStream};
pub use state::{GuardedState, ValueKind};
