//! Name → handler table and command introspection.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use tracing::debug;

use crate::error::ActuatorError;
use crate::handler::CommandHandler;

/// How `query_commands` returns command names.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryMode {
    /// A materialised set.
    Set,
    /// A single-use iterator over the same names.
    Lazy,
}

impl FromStr for QueryMode {
    type Err = ActuatorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "set" => Ok(Self::Set),
            "generator" | "lazy" => Ok(Self::Lazy),
            other => Err(ActuatorError::InvalidArgument(format!(
                "return type must be 'set' or 'generator', got '{other}'"
            ))),
        }
    }
}

/// Registered command names, in the shape asked for.
pub enum CommandNames {
    Set(HashSet<String>),
    /// Consumed by iterating; a second pass yields nothing.
    Lazy(Box<dyn Iterator<Item = String> + Send>),
}

impl fmt::Debug for CommandNames {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Set(names) => f.debug_tuple("Set").field(names).finish(),
            Self::Lazy(_) => f.write_str("Lazy(..)"),
        }
    }
}

impl Iterator for CommandNames {
    type Item = String;

    /// Drains the names. For `Set` the order is unspecified.
    fn next(&mut self) -> Option<String> {
        match self {
            Self::Set(names) => {
                let name = names.iter().next().cloned()?;
                names.remove(&name);
                Some(name)
            }
            Self::Lazy(iter) => iter.next(),
        }
    }
}

/// Result of `query_commands`.
#[derive(Debug)]
pub struct CommandsInfo {
    pub commands: CommandNames,
    /// name → help text (empty when the handler has none). Only present
    /// when help was requested.
    pub help: Option<BTreeMap<String, String>>,
}

/// Command table. Registering an existing name replaces its handler.
#[derive(Clone, Default)]
pub struct CommandRegistry {
    handlers: HashMap<String, Arc<dyn CommandHandler>>,
}

impl CommandRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, name: impl Into<String>, handler: Arc<dyn CommandHandler>) {
        let name = name.into();
        if self.handlers.insert(name.clone(), handler).is_some() {
            debug!(command = name.as_str(), "Replaced existing command handler");
        }
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn CommandHandler>> {
        self.handlers.get(name).cloned()
    }

    /// Names sorted for stable display.
    pub fn sorted_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.handlers.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn query(&self, include_help: bool, mode: QueryMode) -> CommandsInfo {
        let commands = match mode {
            QueryMode::Set => CommandNames::Set(self.handlers.keys().cloned().collect()),
            QueryMode::Lazy => {
                let names: Vec<String> = self.handlers.keys().cloned().collect();
                CommandNames::Lazy(Box::new(names.into_iter()))
            }
        };

        let help = include_help.then(|| {
            self.handlers
                .iter()
                .map(|(name, handler)| {
                    let text = handler.help().unwrap_or_default().trim().to_string();
                    (name.clone(), text)
                })
                .collect()
        });

        CommandsInfo { commands, help }
    }
}
