//! Firing order and failure behaviour of HookRegistry.

use std::sync::{Arc, Mutex};

use actuator_hooks::{async_hook, sync_hook, HookRegistry, DEFAULT_PRIORITY};

type Log = Arc<Mutex<Vec<String>>>;

fn recorder(log: &Log, name: &'static str) -> impl Fn(&Vec<u32>) -> anyhow::Result<()> {
    let log = log.clone();
    move |_| {
        log.lock().unwrap().push(name.to_string());
        Ok(())
    }
}

#[tokio::test]
async fn hooks_fire_by_descending_priority() {
    let registry: HookRegistry<Vec<u32>> = HookRegistry::new();
    let log = Log::default();
    registry.register("produced", sync_hook("low", recorder(&log, "low")), 10);
    registry.register("produced", sync_hook("mid", recorder(&log, "mid")), 50);
    registry.register("produced", sync_hook("high", recorder(&log, "high")), 90);

    registry.trigger("produced", &vec![1]).await.unwrap();
    registry.trigger("produced", &vec![1, 2]).await.unwrap();

    assert_eq!(
        *log.lock().unwrap(),
        vec!["high", "mid", "low", "high", "mid", "low"]
    );
}

#[tokio::test]
async fn equal_priorities_keep_registration_order() {
    let registry: HookRegistry<Vec<u32>> = HookRegistry::new();
    let log = Log::default();
    registry.register("p", sync_hook("first", recorder(&log, "first")), DEFAULT_PRIORITY);
    registry.register("p", sync_hook("top", recorder(&log, "top")), DEFAULT_PRIORITY + 1);
    registry.register("p", sync_hook("second", recorder(&log, "second")), DEFAULT_PRIORITY);

    registry.trigger("p", &vec![]).await.unwrap();

    assert_eq!(*log.lock().unwrap(), vec!["top", "first", "second"]);
    let priorities: Vec<i32> = registry.list("p").iter().map(|e| e.priority).collect();
    assert_eq!(priorities, vec![101, 100, 100]);
}

#[tokio::test]
async fn async_hooks_are_awaited_in_sequence() {
    let registry: HookRegistry<Vec<u32>> = HookRegistry::new();
    let log = Log::default();

    let slow_log = log.clone();
    registry.register(
        "p",
        async_hook("slow", move |ctx: Vec<u32>| {
            let log = slow_log.clone();
            async move {
                tokio::time::sleep(std::time::Duration::from_millis(20)).await;
                log.lock().unwrap().push(format!("slow:{}", ctx.len()));
                Ok(())
            }
        }),
        20,
    );
    registry.register("p", sync_hook("fast", recorder(&log, "fast")), 10);

    registry.trigger("p", &vec![7, 8, 9]).await.unwrap();

    assert_eq!(*log.lock().unwrap(), vec!["slow:3", "fast"]);
}

#[tokio::test]
async fn failure_propagates_and_skips_remaining_hooks() {
    let registry: HookRegistry<Vec<u32>> = HookRegistry::new();
    let log = Log::default();
    registry.register(
        "p",
        sync_hook("broken", |_: &Vec<u32>| Err(anyhow::anyhow!("bad hook"))),
        50,
    );
    registry.register("p", sync_hook("after", recorder(&log, "after")), 10);

    let err = registry.trigger("p", &vec![]).await.unwrap_err();

    assert_eq!(err.hook, "broken");
    assert_eq!(err.point, "p");
    assert!(err.to_string().contains("bad hook"));
    assert!(log.lock().unwrap().is_empty());
}

#[tokio::test]
async fn trigger_on_empty_point_is_a_no_op() {
    let registry: HookRegistry<Vec<u32>> = HookRegistry::new();
    registry.trigger("nothing", &vec![]).await.unwrap();
}
