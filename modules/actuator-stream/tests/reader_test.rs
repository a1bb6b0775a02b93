//! StreamingEventReader against real files on disk.

use std::io::Write;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use actuator_core::{handler_fn, Actuator, ActuatorError, Event};
use actuator_hooks::{async_hook, sync_hook};
use actuator_stream::{
    CacheSnapshot, MalformedPolicy, ReaderConfig, StreamError, StreamingEventReader,
};
use futures::StreamExt;
use serde_json::{json, Value};
use tempfile::NamedTempFile;

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

fn batch_file(records: Value) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    write!(file, "{records}").unwrap();
    file
}

fn numbered(n: usize) -> Value {
    Value::Array(
        (0..n)
            .map(|i| json!({"type": "step", "n": i}))
            .collect(),
    )
}

fn reader() -> Arc<StreamingEventReader> {
    Arc::new(StreamingEventReader::default())
}

// ---------------------------------------------------------------------------
// Production
// ---------------------------------------------------------------------------

#[tokio::test]
async fn produces_every_record_in_order() {
    let file = batch_file(json!([
        {"type": "sleep", "sleep": 1},
        {"type": "log_write", "path": "a.log", "content": "hi"},
        {"type": "exit"},
    ]));
    let reader = reader();

    let events: Vec<Event> = reader
        .stream(file.path())
        .map(|item| item.unwrap())
        .collect()
        .await;

    assert_eq!(
        events,
        vec![
            Event::new("sleep", json!({"sleep": 1})),
            Event::new("log_write", json!({"path": "a.log", "content": "hi"})),
            Event::new("exit", json!({})),
        ]
    );
    assert_eq!(reader.cache_size(), 3);
    let cached: Vec<Event> = reader.cached_events().iter().map(|e| (**e).clone()).collect();
    assert_eq!(cached, events);
}

#[tokio::test]
async fn malformed_record_aborts_traversal() {
    let file = batch_file(json!([
        {"type": "a"},
        {"no_type": true},
        {"type": "c"},
    ]));
    let reader = reader();
    let mut stream = reader.stream(file.path());

    assert_eq!(stream.next().await.unwrap().unwrap().event_type(), "a");
    let err = stream.next().await.unwrap().unwrap_err();
    assert!(matches!(err, StreamError::MalformedRecord { index: 1, .. }));
    assert!(stream.next().await.is_none());
    assert_eq!(reader.cache_size(), 1);
}

#[tokio::test]
async fn skip_policy_drops_malformed_records() {
    let file = batch_file(json!([{"type": "a"}, 42, {"type": "c"}]));
    let reader = Arc::new(StreamingEventReader::new(
        ReaderConfig::builder()
            .malformed(MalformedPolicy::Skip)
            .build(),
    ));

    let names: Vec<String> = reader
        .stream(file.path())
        .map(|item| item.unwrap().event_type().to_string())
        .collect()
        .await;

    assert_eq!(names, vec!["a", "c"]);
}

#[tokio::test]
async fn traversals_are_independent_and_restartable() {
    let file = batch_file(numbered(3));
    let reader = reader();

    let first = reader.stream(file.path()).count().await;
    let second = reader.stream(file.path()).count().await;

    assert_eq!((first, second), (3, 3));
    assert_eq!(reader.cache_size(), 6);

    reader.clear_cache();
    assert_eq!(reader.cache_size(), 0);
}

#[tokio::test]
async fn large_batch_without_hooks_streams_in_linear_time() {
    let file = batch_file(numbered(10_000));
    let reader = reader();

    let produced = tokio::time::timeout(Duration::from_secs(10), reader.stream(file.path()).count())
        .await
        .expect("10k records must stream well within the deadline");

    assert_eq!(produced, 10_000);
    assert_eq!(reader.cache_size(), 10_000);
    assert_eq!(reader.recent(1)[0].data()["n"], 9_999);
}

#[tokio::test]
async fn concurrent_traversals_both_complete() {
    let file = batch_file(numbered(50));
    let reader = reader();

    let (a, b) = tokio::join!(
        reader.stream(file.path()).count(),
        reader.stream(file.path()).count()
    );

    assert_eq!((a, b), (50, 50));
    assert_eq!(reader.cache_size(), 100);
}

#[tokio::test]
async fn unreadable_inputs_fail_the_traversal() {
    let reader = reader();

    let missing = reader
        .stream("/definitely/not/here.json")
        .next()
        .await
        .unwrap();
    assert!(matches!(missing, Err(StreamError::Io { .. })));

    let object = batch_file(json!({"type": "a"}));
    let not_array = reader.stream(object.path()).next().await.unwrap();
    assert!(matches!(not_array, Err(StreamError::NotAnArray { .. })));

    let mut garbage = NamedTempFile::new().unwrap();
    write!(garbage, "[{{\"type\": ").unwrap();
    let parse = reader.stream(garbage.path()).next().await.unwrap();
    assert!(matches!(parse, Err(StreamError::Parse { .. })));
}

// ---------------------------------------------------------------------------
// Flow control
// ---------------------------------------------------------------------------

#[tokio::test]
async fn pause_suspends_and_resume_continues_at_next_record() {
    let file = batch_file(numbered(4));
    let reader = reader();
    let mut stream = reader.stream(file.path());

    assert_eq!(stream.next().await.unwrap().unwrap().data()["n"], 0);
    assert_eq!(stream.next().await.unwrap().unwrap().data()["n"], 1);

    reader.pause();
    let blocked = tokio::time::timeout(Duration::from_millis(50), stream.next()).await;
    assert!(blocked.is_err(), "paused stream must not produce");
    assert_eq!(reader.cache_size(), 2);

    reader.resume();
    let rest: Vec<Value> = stream
        .map(|item| item.unwrap().data()["n"].clone())
        .collect()
        .await;
    assert_eq!(rest, vec![json!(2), json!(3)]);
}

#[tokio::test]
async fn resume_from_another_task_wakes_the_traversal() {
    let file = batch_file(numbered(2));
    let reader = reader();
    reader.pause();

    let consumer = {
        let stream = reader.stream(file.path());
        tokio::spawn(async move { stream.count().await })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(reader.cache_size(), 0);

    reader.resume();
    assert_eq!(consumer.await.unwrap(), 2);
}

// ---------------------------------------------------------------------------
// Hooks
// ---------------------------------------------------------------------------

#[tokio::test]
async fn hooks_fire_in_priority_order_with_full_history() {
    let file = batch_file(numbered(2));
    let reader = reader();
    let log: Arc<Mutex<Vec<String>>> = Arc::default();

    for (name, priority) in [("p10", 10), ("p50", 50), ("p90", 90)] {
        let log = log.clone();
        reader.register_hook(
            sync_hook(name, move |snapshot: &CacheSnapshot| {
                log.lock().unwrap().push(format!("{name}:{}", snapshot.len()));
                Ok(())
            }),
            priority,
        );
    }

    reader.stream(file.path()).count().await;

    assert_eq!(
        *log.lock().unwrap(),
        vec!["p90:1", "p50:1", "p10:1", "p90:2", "p50:2", "p10:2"]
    );
}

#[tokio::test]
async fn failing_hook_does_not_end_the_stream() {
    let file = batch_file(numbered(3));
    let reader = reader();
    let seen: Arc<Mutex<usize>> = Arc::default();

    reader.register_hook(
        sync_hook("broken", |_: &CacheSnapshot| Err(anyhow::anyhow!("hook down"))),
        90,
    );
    let counter = seen.clone();
    reader.register_hook(
        async_hook("counter", move |_: CacheSnapshot| {
            let counter = counter.clone();
            async move {
                *counter.lock().unwrap() += 1;
                Ok(())
            }
        }),
        10,
    );

    let produced = reader
        .stream(file.path())
        .filter(|item| futures::future::ready(item.is_ok()))
        .count()
        .await;

    assert_eq!(produced, 3);
    assert_eq!(*seen.lock().unwrap(), 3);
}

// ---------------------------------------------------------------------------
// Feeding the dispatcher
// ---------------------------------------------------------------------------

#[tokio::test]
async fn reader_stream_binds_as_dispatcher_source() {
    let file = batch_file(numbered(3));
    let reader = reader();
    let actuator = Actuator::new();
    let total: Arc<Mutex<i64>> = Arc::default();

    let sum = total.clone();
    actuator.register(
        "step",
        handler_fn(move |data| {
            let sum = sum.clone();
            async move {
                *sum.lock().unwrap() += data["n"].as_i64().unwrap_or_default();
                Ok(())
            }
        }),
    );

    actuator.bind(reader.stream(file.path()));
    let summary = actuator.run().await.unwrap();

    assert_eq!(summary.handled, 3);
    assert_eq!(*total.lock().unwrap(), 3);
}

#[tokio::test]
async fn malformed_input_fails_the_run() {
    let file = batch_file(json!([{"type": "step", "n": 1}, {"n": 2}]));
    let reader = reader();
    let actuator = Actuator::new();
    actuator.register("step", handler_fn(|_| async { Ok(()) }));

    actuator.bind(reader.stream(file.path()));
    let err = actuator.run().await.unwrap_err();

    assert!(matches!(err, ActuatorError::Source(_)));
    assert!(!actuator.is_running());
}
