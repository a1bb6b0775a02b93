//! Hook table keyed by extension point.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tracing::debug;

use crate::hook::Hook;

/// Priority used when the caller has no preference.
pub const DEFAULT_PRIORITY: i32 = 100;

#[derive(Debug, thiserror::Error)]
#[error("hook '{hook}' failed at '{point}': {source}")]
pub struct HookError {
    pub point: String,
    pub hook: String,
    #[source]
    pub source: anyhow::Error,
}

/// One registered hook.
pub struct HookEntry<C: Sync> {
    pub name: String,
    pub priority: i32,
    pub hook: Arc<dyn Hook<C>>,
}

impl<C: Sync> Clone for HookEntry<C> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            priority: self.priority,
            hook: Arc::clone(&self.hook),
        }
    }
}

impl<C: Sync> fmt::Debug for HookEntry<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HookEntry")
            .field("name", &self.name)
            .field("priority", &self.priority)
            .finish()
    }
}

/// Hooks per extension point, kept sorted by descending priority.
pub struct HookRegistry<C: Sync> {
    hooks: RwLock<HashMap<String, Vec<HookEntry<C>>>>,
}

impl<C: Sync> Default for HookRegistry<C> {
    fn default() -> Self {
        Self {
            hooks: RwLock::new(HashMap::new()),
        }
    }
}

impl<C: Sync> HookRegistry<C> {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, Vec<HookEntry<C>>>> {
        self.hooks.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, Vec<HookEntry<C>>>> {
        self.hooks.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append `hook` to `point` and re-sort. Equal priorities keep
    /// registration order.
    pub fn register(&self, point: impl Into<String>, hook: impl Hook<C> + 'static, priority: i32) {
        let point = point.into();
        let name = hook.name().to_string();
        let mut hooks = self.write();
        let entries = hooks.entry(point.clone()).or_default();
        entries.push(HookEntry {
            name: name.clone(),
            priority,
            hook: Arc::new(hook),
        });
        entries.sort_by(|a, b| b.priority.cmp(&a.priority));
        debug!(point = point.as_str(), hook = name.as_str(), priority, "Hook registered");
    }

    /// Remove every hook called `name` from `point`. Returns how many went.
    pub fn unregister(&self, point: &str, name: &str) -> usize {
        let mut hooks = self.write();
        let Some(entries) = hooks.get_mut(point) else {
            return 0;
        };
        let before = entries.len();
        entries.retain(|entry| entry.name != name);
        before - entries.len()
    }

    /// Copy of the hooks at `point`, in firing order.
    pub fn list(&self, point: &str) -> Vec<HookEntry<C>> {
        self.read().get(point).cloned().unwrap_or_default()
    }

    /// Points with at least one hook.
    pub fn points(&self) -> Vec<String> {
        let mut points: Vec<String> = self
            .read()
            .iter()
            .filter(|(_, entries)| !entries.is_empty())
            .map(|(point, _)| point.clone())
            .collect();
        points.sort();
        points
    }

    /// Run every hook at `point` in priority order, awaiting each before the
    /// next. Stops at the first failure and returns it.
    pub async fn trigger(&self, point: &str, ctx: &C) -> Result<(), HookError> {
        for entry in self.list(point) {
            entry.hook.call(ctx).await.map_err(|source| HookError {
                point: point.to_string(),
                hook: entry.name.clone(),
                source,
            })?;
        }
        Ok(())
    }
}
