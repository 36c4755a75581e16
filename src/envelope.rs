//! Response-shape adapter.
//!
//! Backend responses come in three shapes: `{ "data": ... }`, a bare array,
//! or a single object. The shape is resolved once, at the call site, into a
//! [`Payload`], and business code only ever sees typed values.

use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::deserializers::parse_lenient_list;
use crate::error::{Result, RideAlongError};

#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    /// `{ "data": <inner> }`; the inner value is itself unwrapped recursively.
    Wrapped(Box<Payload>),
    Array(Vec<Value>),
    Single(Value),
}

impl Payload {
    pub fn from_value(value: Value) -> Self {
        match value {
            Value::Array(items) => Payload::Array(items),
            Value::Object(mut obj) if obj.contains_key("data") => {
                let inner = obj.remove("data").unwrap_or(Value::Null);
                Payload::Wrapped(Box::new(Payload::from_value(inner)))
            }
            other => Payload::Single(other),
        }
    }

    fn unwrap_data(self) -> Payload {
        match self {
            Payload::Wrapped(inner) => inner.unwrap_data(),
            other => other,
        }
    }

    /// Interpret the payload as a list. A single object becomes a list of one;
    /// `null` becomes an empty list. Elements that fail to parse are dropped.
    pub fn into_list<T: DeserializeOwned>(self) -> Vec<T> {
        match self.unwrap_data() {
            Payload::Array(items) => parse_lenient_list(items),
            Payload::Single(Value::Null) => Vec::new(),
            Payload::Single(Value::Object(mut obj)) => {
                // Some list endpoints nest the array one level deeper.
                for key in ["rides", "requests", "items", "results"] {
                    if let Some(Value::Array(items)) = obj.remove(key) {
                        return parse_lenient_list(items);
                    }
                }
                parse_lenient_list(vec![Value::Object(obj)])
            }
            Payload::Single(other) => parse_lenient_list(vec![other]),
            Payload::Wrapped(_) => Vec::new(),
        }
    }

    /// Interpret the payload as one record. An array yields its first element.
    pub fn into_one<T: DeserializeOwned>(self, resource: &str) -> Result<T> {
        let value = match self.unwrap_data() {
            Payload::Array(items) => items.into_iter().next(),
            Payload::Single(Value::Null) => None,
            Payload::Single(value) => Some(value),
            Payload::Wrapped(_) => None,
        };
        let value = value.ok_or_else(|| RideAlongError::NotFound {
            resource: resource.to_string(),
        })?;
        Ok(serde_json::from_value(value)?)
    }
}

/// Pull a human message out of an error body (`message` or `error`, possibly
/// under `data`).
pub fn error_message(body: &str) -> Option<String> {
    let value: Value = serde_json::from_str(body).ok()?;
    let pick = |v: &Value| {
        ["message", "error", "msg"]
            .iter()
            .find_map(|k| v.get(*k).and_then(Value::as_str))
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    };
    pick(&value).or_else(|| value.get("data").and_then(pick))
}
