//! The hook trait and adapters for plain and async closures.

use std::future::Future;
use std::marker::PhantomData;

use anyhow::Result;
use async_trait::async_trait;

/// A callback fired with the context of its hook point.
#[async_trait]
pub trait Hook<C: Sync>: Send + Sync {
    /// Used in logs and for [`crate::HookRegistry::unregister`].
    fn name(&self) -> &str;

    async fn call(&self, ctx: &C) -> Result<()>;
}

// ---------------------------------------------------------------------------
// Synchronous closures
// ---------------------------------------------------------------------------

pub struct SyncHook<F> {
    name: String,
    f: F,
}

/// A hook run inline: `Fn(&C) -> Result<()>`.
pub fn sync_hook<C, F>(name: impl Into<String>, f: F) -> SyncHook<F>
where
    F: Fn(&C) -> Result<()> + Send + Sync,
{
    SyncHook {
        name: name.into(),
        f,
    }
}

#[async_trait]
impl<C, F> Hook<C> for SyncHook<F>
where
    C: Sync,
    F: Fn(&C) -> Result<()> + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn call(&self, ctx: &C) -> Result<()> {
        (self.f)(ctx)
    }
}

// ---------------------------------------------------------------------------
// Async closures
// ---------------------------------------------------------------------------

pub struct AsyncHook<F, Fut> {
    name: String,
    f: F,
    _phantom: PhantomData<fn() -> Fut>,
}

/// A hook that is awaited: `Fn(C) -> Future`. The context is cloned in.
pub fn async_hook<C, F, Fut>(name: impl Into<String>, f: F) -> AsyncHook<F, Fut>
where
    C: Clone,
    F: Fn(C) -> Fut + Send + Sync,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    AsyncHook {
        name: name.into(),
        f,
        _phantom: PhantomData,
    }
}

#[async_trait]
impl<C, F, Fut> Hook<C> for AsyncHook<F, Fut>
where
    C: Clone + Sync,
    F: Fn(C) -> Fut + Send + Sync,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn call(&self, ctx: &C) -> Result<()> {
        (self.f)(ctx.clone()).await
    }
}
