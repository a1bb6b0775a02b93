//! The dispatch loop.

use std::collections::BTreeSet;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use anyhow::anyhow;
use futures::{FutureExt, StreamExt};
use serde_json::Value;
use tokio::sync::Notify;
use tracing::{debug, error, info, info_span, warn, Instrument};

use crate::context::CommandContext;
use crate::error::{ActuatorError, Result};
use crate::event::Event;
use crate::handler::CommandHandler;
use crate::registry::{CommandRegistry, CommandsInfo, QueryMode};
use crate::source::{EventSource, EventStream};
use crate::state::{GuardedState, ValueKind, ALLOW, DISALLOW};

const RUNNING: &str = "running";
const COMMANDS: &str = "commands";

/// Counts from one `run()`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// Handlers that completed without error.
    pub handled: usize,
    /// Events whose type had no registered command.
    pub unknown: usize,
    /// Handlers that returned an error, panicked, or timed out.
    pub failed: usize,
}

/// State shared between the dispatcher and the contexts it hands out.
pub(crate) struct Shared {
    pub(crate) instance_id: String,
    commands: RwLock<CommandRegistry>,
    source: Mutex<Option<EventStream>>,
    running: AtomicBool,
    /// Wakes a run that is waiting on a quiet source.
    stop_signal: Notify,
    state: Mutex<GuardedState>,
}

impl Shared {
    pub(crate) fn commands(&self) -> RwLockReadGuard<'_, CommandRegistry> {
        self.commands.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn commands_mut(&self) -> RwLockWriteGuard<'_, CommandRegistry> {
        self.commands.write().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn state(&self) -> MutexGuard<'_, GuardedState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn source(&self) -> MutexGuard<'_, Option<EventStream>> {
        self.source.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
        self.stop_signal.notify_waiters();
    }

    pub(crate) fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Gate read. `running` and `commands` are served from the live
    /// dispatcher; everything else from the field table.
    pub(crate) fn gated_get(&self, name: &str) -> Result<Value> {
        let state = self.state();
        state.check_readable(name)?;
        match name {
            RUNNING => Ok(Value::Bool(self.is_running())),
            COMMANDS => Ok(Value::from(self.commands().sorted_names())),
            _ => state.get(name),
        }
    }

    /// Gate write. Checks run before anything changes.
    pub(crate) fn gated_set(&self, name: &str, value: Value, force: bool) -> Result<()> {
        let mut state = self.state();
        if name == ALLOW || name == DISALLOW {
            return state.set(name, value, force);
        }
        match name {
            RUNNING => {
                state.check_writable(name, &value, force)?;
                if value.as_bool().unwrap_or(false) {
                    self.running.store(true, Ordering::SeqCst);
                } else {
                    self.stop();
                }
                Ok(())
            }
            _ => state.set(name, value, force),
        }
    }
}

/// Sets the running flag for the life of a run and clears it on every
/// exit path, including a panic or the run future being dropped.
struct RunningGuard<'a>(&'a AtomicBool);

impl<'a> RunningGuard<'a> {
    fn engage(flag: &'a AtomicBool) -> Self {
        flag.store(true, Ordering::SeqCst);
        Self(flag)
    }
}

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Command dispatcher.
///
/// Cheap to clone; clones share the registry, source slot, running flag
/// and gated state.
#[derive(Clone)]
pub struct Actuator {
    shared: Arc<Shared>,
    handler_timeout: Option<Duration>,
}

impl Default for Actuator {
    fn default() -> Self {
        Self::new()
    }
}

impl Actuator {
    pub fn new() -> Self {
        let state = GuardedState::new(["end_msg"])
            .with_validator("end_msg", &[ValueKind::String])
            .with_validator(RUNNING, &[ValueKind::Bool])
            .with_validator(COMMANDS, &[])
            .with_field("end_msg", Value::from("0"));

        Self {
            shared: Arc::new(Shared {
                instance_id: uuid::Uuid::new_v4().to_string(),
                commands: RwLock::new(CommandRegistry::new()),
                source: Mutex::new(None),
                running: AtomicBool::new(false),
                stop_signal: Notify::new(),
                state: Mutex::new(state),
            }),
            handler_timeout: None,
        }
    }

    /// Fail any handler that has not finished within `timeout`.
    pub fn with_handler_timeout(mut self, timeout: Duration) -> Self {
        self.handler_timeout = Some(timeout);
        self
    }

    /// Fixed for the life of this dispatcher and its clones.
    pub fn instance_id(&self) -> &str {
        &self.shared.instance_id
    }

    /// Store `handler` under `name`, replacing any previous one.
    pub fn register(&self, name: impl Into<String>, handler: impl CommandHandler + 'static) {
        self.shared.commands_mut().register(name, Arc::new(handler));
    }

    /// Attach the event source for the next `run()`, replacing any unconsumed one.
    /// Do not call while a run is in progress.
    pub fn bind(&self, source: impl EventSource) {
        let previous = self.shared.source().replace(source.into_event_stream());
        if previous.is_some() {
            debug!(instance_id = self.instance_id(), "Replaced unconsumed event source");
        }
    }

    pub fn is_bound(&self) -> bool {
        self.shared.source().is_some()
    }

    /// Request termination. Observed before the next event is dispatched;
    /// an in-flight handler is never interrupted.
    pub fn stop(&self) {
        self.shared.stop();
    }

    pub fn is_running(&self) -> bool {
        self.shared.is_running()
    }

    /// Consume the bound source, dispatching each event in order.
    ///
    /// Handler failures are logged and counted; only a missing source or an
    /// error produced by the source itself ends the run with `Err`. Each run
    /// gets its own id, carried by the `dispatch` span around every handler.
    pub async fn run(&self) -> Result<RunSummary> {
        let source = self.shared.source().take().ok_or_else(|| {
            ActuatorError::Configuration("an event source must be bound before run".into())
        })?;

        let run_id = uuid::Uuid::new_v4();
        let span = info_span!("dispatch", instance_id = self.instance_id(), %run_id);
        self.drive(source).instrument(span).await
    }

    async fn drive(&self, mut source: EventStream) -> Result<RunSummary> {
        let _running = RunningGuard::engage(&self.shared.running);
        let ctx = self.context();
        let mut summary = RunSummary::default();
        info!("Dispatch loop started");

        loop {
            // Registered before the flag check so a stop in between still wakes us.
            let stopped = self.shared.stop_signal.notified();
            if !self.is_running() {
                info!("Stop requested, leaving dispatch loop");
                break;
            }
            let item = tokio::select! {
                item = source.next() => item,
                _ = stopped => continue,
            };
            let Some(item) = item else { break };
            if !self.is_running() {
                info!("Stop requested, leaving dispatch loop");
                break;
            }
            let event = item.map_err(|e| {
                error!(error = %e, "Event source failed");
                ActuatorError::Source(e)
            })?;
            self.dispatch(&ctx, event, &mut summary).await;
        }

        info!(
            handled = summary.handled,
            unknown = summary.unknown,
            failed = summary.failed,
            "Dispatch loop finished"
        );
        Ok(summary)
    }

    async fn dispatch(&self, ctx: &CommandContext, event: Event, summary: &mut RunSummary) {
        let (name, data) = event.into_parts();
        let handler = self.shared.commands().get(&name);
        let Some(handler) = handler else {
            warn!(command = name.as_str(), "Unknown command type");
            summary.unknown += 1;
            return;
        };

        let call = AssertUnwindSafe(handler.handle(ctx, data)).catch_unwind();
        let outcome = match self.handler_timeout {
            Some(limit) => match tokio::time::timeout(limit, call).await {
                Ok(result) => result,
                Err(_) => Ok(Err(anyhow!("timed out after {limit:?}"))),
            },
            None => call.await,
        };

        match outcome {
            Ok(Ok(())) => summary.handled += 1,
            Ok(Err(e)) => {
                error!(command = name.as_str(), error = %e, "HandlerError: command failed");
                summary.failed += 1;
            }
            Err(_) => {
                error!(command = name.as_str(), "HandlerError: command panicked");
                summary.failed += 1;
            }
        }
    }

    pub fn query_commands(&self, include_help: bool, mode: QueryMode) -> CommandsInfo {
        self.shared.commands().query(include_help, mode)
    }

    /// Gated write. `force` skips the allow-list check, never the validators.
    pub fn set(&self, name: &str, value: Value, force: bool) -> Result<()> {
        self.shared.gated_set(name, value, force)
    }

    pub fn get(&self, name: &str) -> Result<Value> {
        self.shared.gated_get(name)
    }

    pub fn allow_list(&self) -> BTreeSet<String> {
        self.shared.state().allow_list()
    }

    pub fn configure_allowed<I, S>(&self, names: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.shared.state().configure_allowed(names);
    }

    /// The gated handle handlers receive.
    pub fn context(&self) -> CommandContext {
        CommandContext::new(Arc::clone(&self.shared))
    }
}

impl fmt::Display for Actuator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.shared.state();
        write!(
            f,
            "Actuator(allow_list: {:?}, fields: {:?})",
            state.allow_list(),
            state.defined_fields()
        )
    }
}
