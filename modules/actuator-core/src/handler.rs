//! Command handler trait and closure adapters.

use std::future::Future;
use std::marker::PhantomData;

use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;

use crate::context::CommandContext;

/// An externally supplied procedure run when an event names it.
///
/// Handlers receive the event payload and a [`CommandContext`]; they never
/// get a reference to the dispatcher itself. Returning `Err` (or panicking)
/// is reported by the dispatch loop and does not end it.
#[async_trait]
pub trait CommandHandler: Send + Sync {
    async fn handle(&self, ctx: &CommandContext, data: Value) -> Result<()>;

    /// Help text surfaced by `query_commands(include_help = true)`.
    fn help(&self) -> Option<&str> {
        None
    }
}

// ---------------------------------------------------------------------------
// Payload-only closures
// ---------------------------------------------------------------------------

/// Handler built from `Fn(Value) -> Future`. See [`handler_fn`].
pub struct FnHandler<F, Fut> {
    f: F,
    help: Option<String>,
    _phantom: PhantomData<fn() -> Fut>,
}

/// Wrap an async closure that only needs the payload.
pub fn handler_fn<F, Fut>(f: F) -> FnHandler<F, Fut>
where
    F: Fn(Value) -> Fut + Send + Sync,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    FnHandler {
        f,
        help: None,
        _phantom: PhantomData,
    }
}

impl<F, Fut> FnHandler<F, Fut> {
    pub fn with_help(mut self, help: impl Into<String>) -> Self {
        self.help = Some(help.into());
        self
    }
}

#[async_trait]
impl<F, Fut> CommandHandler for FnHandler<F, Fut>
where
    F: Fn(Value) -> Fut + Send + Sync,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    async fn handle(&self, _ctx: &CommandContext, data: Value) -> Result<()> {
        (self.f)(data).await
    }

    fn help(&self) -> Option<&str> {
        self.help.as_deref()
    }
}

// ---------------------------------------------------------------------------
// Closures that talk back to the dispatcher
// ---------------------------------------------------------------------------

/// Handler built from `Fn(CommandContext, Value) -> Future`. See [`context_handler_fn`].
pub struct ContextFnHandler<F, Fut> {
    f: F,
    help: Option<String>,
    _phantom: PhantomData<fn() -> Fut>,
}

/// Wrap an async closure that also needs the gated dispatcher context
/// (to stop the loop, read `end_msg`, list commands, ...).
pub fn context_handler_fn<F, Fut>(f: F) -> ContextFnHandler<F, Fut>
where
    F: Fn(CommandContext, Value) -> Fut + Send + Sync,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    ContextFnHandler {
        f,
        help: None,
        _phantom: PhantomData,
    }
}

impl<F, Fut> ContextFnHandler<F, Fut> {
    pub fn with_help(mut self, help: impl Into<String>) -> Self {
        self.help = Some(help.into());
        self
    }
}

#[async_trait]
impl<F, Fut> CommandHandler for ContextFnHandler<F, Fut>
where
    F: Fn(CommandContext, Value) -> Fut + Send + Sync,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    async fn handle(&self, ctx: &CommandContext, data: Value) -> Result<()> {
        (self.f)(ctx.clone(), data).await
    }

    fn help(&self) -> Option<&str> {
        self.help.as_deref()
    }
}
