//! StreamingEventReader: batch file to lazy event stream.
//!
//! Each `stream()` call is its own traversal. The raw read of a file is
//! serialised per reader; production of each item waits while the reader
//! is paused and resumes at the exact record it stopped on.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use actuator_core::Event;
use actuator_hooks::{Hook, HookRegistry};
use futures::Stream;
use serde_json::Value;
use tokio::sync::watch;
use tracing::{debug, info, warn};
use typed_builder::TypedBuilder;

use crate::error::StreamError;

/// Hook point fired after every produced event.
pub const DEFAULT_HOOK_POINT: &str = "stream.produced";
/// History kept before the oldest events are evicted.
pub const DEFAULT_CACHE_CAPACITY: usize = 10_000;

/// Hook context: the full history at fire time, oldest first. Entries are
/// shared with the cache, so a snapshot never copies event payloads.
pub type CacheSnapshot = Arc<[Arc<Event>]>;

/// What a traversal does with a record that has no string `type`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum MalformedPolicy {
    /// End the traversal with [`StreamError::MalformedRecord`].
    #[default]
    Abort,
    /// Log the record and move on to the next one.
    Skip,
}

#[derive(Debug, Clone, TypedBuilder)]
pub struct ReaderConfig {
    #[builder(default = DEFAULT_HOOK_POINT.to_string(), setter(into))]
    pub hook_point: String,
    /// `None` keeps every event.
    #[builder(default = Some(DEFAULT_CACHE_CAPACITY))]
    pub cache_capacity: Option<usize>,
    #[builder(default)]
    pub malformed: MalformedPolicy,
}

impl Default for ReaderConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}

pub struct StreamingEventReader {
    config: ReaderConfig,
    read_lock: tokio::sync::Mutex<()>,
    cache: Mutex<VecDeque<Arc<Event>>>,
    active: watch::Sender<bool>,
    hooks: HookRegistry<CacheSnapshot>,
}

impl Default for StreamingEventReader {
    fn default() -> Self {
        Self::new(ReaderConfig::default())
    }
}

impl StreamingEventReader {
    pub fn new(config: ReaderConfig) -> Self {
        let (active, _) = watch::channel(true);
        Self {
            config,
            read_lock: tokio::sync::Mutex::new(()),
            cache: Mutex::new(VecDeque::new()),
            active,
            hooks: HookRegistry::new(),
        }
    }

    pub fn config(&self) -> &ReaderConfig {
        &self.config
    }

    /// Hooks for this reader. Production fires `config.hook_point`.
    pub fn hooks(&self) -> &HookRegistry<CacheSnapshot> {
        &self.hooks
    }

    /// Register `hook` at this reader's notification point.
    pub fn register_hook(&self, hook: impl Hook<CacheSnapshot> + 'static, priority: i32) {
        self.hooks.register(self.config.hook_point.clone(), hook, priority);
    }

    /// Start a traversal of the JSON array at `path`.
    ///
    /// Yields one event per record in file order. A malformed record ends
    /// the traversal with an error unless the policy is `Skip`. Hook
    /// failures are logged and never end the traversal.
    pub fn stream(
        self: &Arc<Self>,
        path: impl AsRef<Path>,
    ) -> Pin<Box<dyn Stream<Item = Result<Event, StreamError>> + Send>> {
        let reader = Arc::clone(self);
        let path = path.as_ref().to_path_buf();

        Box::pin(async_stream::stream! {
            let records = match reader.load(&path).await {
                Ok(records) => records,
                Err(e) => {
                    yield Err(e);
                    return;
                }
            };
            let total = records.len();
            let mut active = reader.active.subscribe();

            for (index, record) in records.into_iter().enumerate() {
                let resumed = active.wait_for(|active| *active).await.is_ok();
                if !resumed {
                    return;
                }

                let event = match record_to_event(index, record) {
                    Ok(event) => event,
                    Err(e) if reader.config.malformed == MalformedPolicy::Skip => {
                        warn!(path = %path.display(), error = %e, "Skipping malformed record");
                        continue;
                    }
                    Err(e) => {
                        warn!(path = %path.display(), error = %e, "Aborting traversal");
                        yield Err(e);
                        return;
                    }
                };

                reader.remember(event.clone());
                reader.notify().await;
                yield Ok(event);
            }

            info!(path = %path.display(), total, "Traversal finished");
        })
    }

    /// Exclusive read of the whole file.
    async fn load(&self, path: &Path) -> Result<Vec<Value>, StreamError> {
        let _guard = self.read_lock.lock().await;
        let raw = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| StreamError::Io {
                path: path.to_path_buf(),
                source,
            })?;
        let parsed: Value = serde_json::from_str(&raw).map_err(|source| StreamError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        match parsed {
            Value::Array(records) => {
                debug!(path = %path.display(), records = records.len(), "Loaded batch file");
                Ok(records)
            }
            _ => Err(StreamError::NotAnArray {
                path: PathBuf::from(path),
            }),
        }
    }

    fn cache(&self) -> MutexGuard<'_, VecDeque<Arc<Event>>> {
        self.cache.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append to history, evicting past capacity.
    fn remember(&self, event: Event) {
        let mut cache = self.cache();
        cache.push_back(Arc::new(event));
        if let Some(capacity) = self.config.cache_capacity {
            while cache.len() > capacity {
                cache.pop_front();
            }
        }
    }

    /// Fire the hook point with the current history. No snapshot is built
    /// when nothing listens.
    async fn notify(&self) {
        let point = self.config.hook_point.as_str();
        let hooks = self.hooks.list(point);
        if hooks.is_empty() {
            return;
        }
        let snapshot = self.cached_events();
        for entry in hooks {
            if let Err(e) = entry.hook.call(&snapshot).await {
                warn!(point, hook = entry.name.as_str(), error = %e, "Hook failed, stream continues");
            }
        }
    }

    /// Suspend production before the next item.
    pub fn pause(&self) {
        self.active.send_replace(false);
    }

    /// Wake any paused traversal.
    pub fn resume(&self) {
        self.active.send_replace(true);
    }

    pub fn is_active(&self) -> bool {
        *self.active.borrow()
    }

    pub fn clear_cache(&self) {
        self.cache().clear();
    }

    pub fn cache_size(&self) -> usize {
        self.cache().len()
    }

    pub fn cached_events(&self) -> CacheSnapshot {
        self.cache().iter().cloned().collect()
    }

    /// Up to `n` most recent events, newest first.
    pub fn recent(&self, n: usize) -> Vec<Arc<Event>> {
        self.cache().iter().rev().take(n).cloned().collect()
    }
}

/// Split a raw record into `type` and the remaining fields.
fn record_to_event(index: usize, record: Value) -> Result<Event, StreamError> {
    let malformed = |reason: &str| StreamError::MalformedRecord {
        index,
        reason: reason.to_string(),
    };

    let Value::Object(mut fields) = record else {
        return Err(malformed("record is not an object"));
    };
    match fields.remove("type") {
        Some(Value::String(event_type)) => Ok(Event::new(event_type, Value::Object(fields))),
        Some(_) => Err(malformed("'type' must be a string")),
        None => Err(malformed("missing required 'type' field")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use serde_json::json;
    use std::time::Duration;

    #[test]
    fn record_splits_type_from_data() {
        let event = record_to_event(0, json!({"type": "sleep", "sleep": 2, "note": "x"})).unwrap();
        assert_eq!(event.event_type(), "sleep");
        assert_eq!(event.data(), &json!({"sleep": 2, "note": "x"}));
    }

    #[test]
    fn record_without_type_is_malformed() {
        let err = record_to_event(3, json!({"sleep": 2})).unwrap_err();
        assert!(matches!(err, StreamError::MalformedRecord { index: 3, .. }));
    }

    #[test]
    fn non_string_type_and_non_object_are_malformed() {
        assert!(record_to_event(0, json!({"type": 1})).is_err());
        assert!(record_to_event(0, json!("sleep")).is_err());
    }

    #[test]
    fn cache_evicts_oldest_past_capacity() {
        let reader = StreamingEventReader::new(ReaderConfig::builder().cache_capacity(Some(2)).build());
        reader.remember(Event::new("a", json!(null)));
        reader.remember(Event::new("b", json!(null)));
        reader.remember(Event::new("c", json!(null)));

        let snapshot = reader.cached_events();
        let names: Vec<&str> = snapshot.iter().map(|e| e.event_type()).collect();
        assert_eq!(names, vec!["b", "c"]);
        assert_eq!(reader.cache_size(), 2);
        assert_eq!(reader.recent(1)[0].event_type(), "c");
    }

    #[test]
    fn snapshots_share_cached_entries() {
        let reader = StreamingEventReader::default();
        reader.remember(Event::new("a", json!({"payload": [1, 2, 3]})));

        let first = reader.cached_events();
        reader.remember(Event::new("b", json!(null)));
        let second = reader.cached_events();

        assert!(Arc::ptr_eq(&first[0], &second[0]));
        assert_eq!(second.len(), 2);
    }

    fn batch_file(records: Value) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        std::io::Write::write_all(&mut file, records.to_string().as_bytes()).unwrap();
        file
    }

    #[tokio::test]
    async fn traversal_waits_for_the_read_section() {
        let file = batch_file(json!([{"type": "a"}]));
        let reader = Arc::new(StreamingEventReader::default());

        let held = reader.read_lock.lock().await;
        let mut stream = reader.stream(file.path());
        let blocked = tokio::time::timeout(Duration::from_millis(50), stream.next()).await;
        assert!(blocked.is_err(), "read must wait while another traversal holds the section");
        assert_eq!(reader.cache_size(), 0);

        drop(held);
        assert_eq!(stream.next().await.unwrap().unwrap().event_type(), "a");
    }

    #[tokio::test]
    async fn paused_traversal_does_not_hold_the_read_section() {
        let file = batch_file(json!([{"type": "a"}, {"type": "b"}]));
        let reader = Arc::new(StreamingEventReader::default());

        let mut first = reader.stream(file.path());
        first.next().await.unwrap().unwrap();
        reader.pause();
        assert!(
            tokio::time::timeout(Duration::from_millis(20), first.next())
                .await
                .is_err()
        );

        assert!(reader.read_lock.try_lock().is_ok());
        reader.resume();
        assert_eq!(first.next().await.unwrap().unwrap().event_type(), "b");
    }

    #[test]
    fn pause_and_resume_flip_active() {
        let reader = StreamingEventReader::default();
        assert!(reader.is_active());
        reader.pause();
        assert!(!reader.is_active());
        reader.resume();
        assert!(reader.is_active());
    }
}
