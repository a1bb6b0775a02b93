//! The handle handed to command handlers.

use std::collections::BTreeSet;
use std::sync::Arc;

use serde_json::Value;

use crate::actuator::Shared;
use crate::error::Result;
use crate::registry::{CommandsInfo, QueryMode};

/// What a handler may do to the dispatcher that runs it.
///
/// Every field access passes the allow-list gate and no call bypasses it.
/// Cloning is cheap.
#[derive(Clone)]
pub struct CommandContext {
    shared: Arc<Shared>,
}

impl CommandContext {
    pub(crate) fn new(shared: Arc<Shared>) -> Self {
        Self { shared }
    }

    /// Ask the dispatch loop to end after the current event.
    pub fn stop(&self) {
        self.shared.stop();
    }

    pub fn is_running(&self) -> bool {
        self.shared.is_running()
    }

    pub fn instance_id(&self) -> &str {
        &self.shared.instance_id
    }

    pub fn query_commands(&self, include_help: bool, mode: QueryMode) -> CommandsInfo {
        self.shared.commands().query(include_help, mode)
    }

    pub fn get(&self, name: &str) -> Result<Value> {
        self.shared.gated_get(name)
    }

    pub fn set(&self, name: &str, value: Value) -> Result<()> {
        self.shared.gated_set(name, value, false)
    }

    pub fn allow_list(&self) -> BTreeSet<String> {
        self.shared.state().allow_list()
    }
}
