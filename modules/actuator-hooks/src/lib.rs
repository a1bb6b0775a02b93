//! Priority-ordered hook registry.
//!
//! Hooks subscribe to named extension points. Triggering a point runs its
//! hooks one after another, highest priority first, ties in registration
//! order. Failures propagate to the caller; wrap per hook when isolation is
//! needed (see [`HookRegistry::list`]).

pub mod hook;
pub mod registry;

pub use hook::{async_hook, sync_hook, Hook};
pub use registry::{HookEntry, HookError, HookRegistry, DEFAULT_PRIORITY};
