//! The event shape shared by every source and the dispatcher.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A named message routed to the command registered under `event_type`.
///
/// Fields are private so an event cannot change after a source produced it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    #[serde(rename = "type")]
    event_type: String,
    data: Value,
}

impl Event {
    pub fn new(event_type: impl Into<String>, data: Value) -> Self {
        Self {
            event_type: event_type.into(),
            data,
        }
    }

    /// The command name this event is routed to.
    pub fn event_type(&self) -> &str {
        &self.event_type
    }

    /// The payload handed to the handler.
    pub fn data(&self) -> &Value {
        &self.data
    }

    pub fn into_parts(self) -> (String, Value) {
        (self.event_type, self.data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn serializes_with_type_key() {
        let event = Event::new("sleep", json!({"sleep": 1}));
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value, json!({"type": "sleep", "data": {"sleep": 1}}));
    }

    #[test]
    fn into_parts_splits_name_and_payload() {
        let (name, data) = Event::new("exit", Value::Null).into_parts();
        assert_eq!(name, "exit");
        assert!(data.is_null());
    }
}
