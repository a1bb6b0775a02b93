//! Allow-list gated field store.
//!
//! Reads and writes go through [`GuardedState::get`] / [`GuardedState::set`];
//! the backing maps are private so nothing outside this module can reach a
//! field without passing the gate.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::fmt;

use serde_json::Value;

use crate::error::{ActuatorError, Result};

/// `set(ALLOW, "name")` adds `name` to the allow-list.
pub const ALLOW: &str = "__allow__";
/// `set(DISALLOW, "name")` removes `name` from the allow-list.
pub const DISALLOW: &str = "__disallow__";
/// Names re-added by every [`GuardedState::configure_allowed`] call.
pub const ALWAYS_ALLOWED: [&str; 2] = ["running", "commands"];

/// JSON type tag used by field validators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueKind {
    Null,
    Bool,
    Number,
    String,
    Array,
    Object,
}

impl ValueKind {
    pub fn of(value: &Value) -> Self {
        match value {
            Value::Null => Self::Null,
            Value::Bool(_) => Self::Bool,
            Value::Number(_) => Self::Number,
            Value::String(_) => Self::String,
            Value::Array(_) => Self::Array,
            Value::Object(_) => Self::Object,
        }
    }

    fn as_str(self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool => "bool",
            Self::Number => "number",
            Self::String => "string",
            Self::Array => "array",
            Self::Object => "object",
        }
    }
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Default)]
pub struct GuardedState {
    fields: HashMap<String, Value>,
    allowed: HashSet<String>,
    validators: HashMap<String, Vec<ValueKind>>,
}

impl GuardedState {
    pub fn new<I, S>(allowed: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            allowed: allowed.into_iter().map(Into::into).collect(),
            ..Default::default()
        }
    }

    /// Restrict `name` to the given JSON types. An empty list makes the
    /// field read-only through the gate.
    pub fn with_validator(mut self, name: impl Into<String>, kinds: &[ValueKind]) -> Self {
        self.validators.insert(name.into(), kinds.to_vec());
        self
    }

    /// Seed a field without going through the gate.
    pub fn with_field(mut self, name: impl Into<String>, value: Value) -> Self {
        self.fields.insert(name.into(), value);
        self
    }

    /// Write `value` to `name`.
    ///
    /// [`ALLOW`] / [`DISALLOW`] edit the allow-list and return. Any other
    /// name is type-checked, then permission-checked (skipped when `force`),
    /// and only written once both checks pass.
    pub fn set(&mut self, name: &str, value: Value, force: bool) -> Result<()> {
        if self.apply_sentinel(name, &value)? {
            return Ok(());
        }
        self.check_writable(name, &value, force)?;
        self.fields.insert(name.to_string(), value);
        Ok(())
    }

    /// Read `name`. Allowed but never-set fields read as `Null`.
    pub fn get(&self, name: &str) -> Result<Value> {
        self.check_readable(name)?;
        Ok(self.fields.get(name).cloned().unwrap_or(Value::Null))
    }

    /// Handles the two allow-list sentinels. Returns `true` when `name` was one.
    pub(crate) fn apply_sentinel(&mut self, name: &str, value: &Value) -> Result<bool> {
        if name != ALLOW && name != DISALLOW {
            return Ok(false);
        }
        let target = value.as_str().ok_or_else(|| {
            ActuatorError::InvalidArgument(format!("{name} expects a field name string"))
        })?;
        if name == ALLOW {
            self.allowed.insert(target.to_string());
        } else {
            self.allowed.remove(target);
        }
        Ok(true)
    }

    pub(crate) fn check_writable(&self, name: &str, value: &Value, force: bool) -> Result<()> {
        if let Some(kinds) = self.validators.get(name) {
            if !kinds.contains(&ValueKind::of(value)) {
                let expected = if kinds.is_empty() {
                    "nothing (read-only)".to_string()
                } else {
                    kinds
                        .iter()
                        .copied()
                        .map(ValueKind::as_str)
                        .collect::<Vec<_>>()
                        .join("|")
                };
                return Err(ActuatorError::TypeMismatch {
                    field: name.to_string(),
                    expected,
                });
            }
        }
        if !force && !self.allowed.contains(name) {
            return Err(ActuatorError::PermissionDenied {
                field: name.to_string(),
                allowed: self.allow_list().into_iter().collect::<Vec<_>>().join(", "),
            });
        }
        Ok(())
    }

    pub(crate) fn check_readable(&self, name: &str) -> Result<()> {
        if self.allowed.contains(name) {
            Ok(())
        } else {
            Err(ActuatorError::UndefinedOrForbidden(name.to_string()))
        }
    }

    /// Snapshot of the allow-list.
    pub fn allow_list(&self) -> BTreeSet<String> {
        self.allowed.iter().cloned().collect()
    }

    /// Merge `names` into the allow-list; `running` and `commands` are
    /// always present afterwards.
    pub fn configure_allowed<I, S>(&mut self, names: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allowed.extend(names.into_iter().map(Into::into));
        self.allowed
            .extend(ALWAYS_ALLOWED.iter().map(|name| name.to_string()));
    }

    /// Every field written so far, for diagnostics.
    pub fn defined_fields(&self) -> BTreeMap<String, Value> {
        self.fields
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }
}
