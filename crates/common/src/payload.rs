//! Open key/value payload carried through a saga run.

use serde::{Deserialize, Serialize, de::DeserializeOwned};
use serde_json::{Map, Value};
use thiserror::Error;

/// Errors raised when a step reads a field it depends on.
#[derive(Debug, Error)]
pub enum PayloadError {
    /// The key is not present.
    #[error("Payload field '{0}' is missing")]
    Missing(String),

    /// The key is present but does not have the expected shape.
    #[error("Payload field '{key}' is invalid: {reason}")]
    Invalid { key: String, reason: String },
}

/// JSON object shared by every step of a run.
///
/// The initiating request seeds it, and each step may add fields that later
/// steps (or the caller, once the run is over) read back. Typed accessors let
/// a step validate exactly the fields it consumes without closing the map.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Payload(Map<String, Value>);

impl Payload {
    /// Creates an empty payload.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true if no fields are set.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Returns the number of fields.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true if `key` is set.
    pub fn contains(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    /// Returns the raw value for `key`.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// Returns `key` as a string slice, if it is a string.
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(Value::as_str)
    }

    /// Reads and deserializes a required field.
    pub fn require<T: DeserializeOwned>(&self, key: &str) -> Result<T, PayloadError> {
        let value = self
            .0
            .get(key)
            .ok_or_else(|| PayloadError::Missing(key.to_string()))?;
        serde_json::from_value(value.clone()).map_err(|e| PayloadError::Invalid {
            key: key.to_string(),
            reason: e.to_string(),
        })
    }

    /// Reads a required string field.
    pub fn require_str(&self, key: &str) -> Result<&str, PayloadError> {
        match self.0.get(key) {
            Some(Value::String(s)) => Ok(s.as_str()),
            Some(other) => Err(PayloadError::Invalid {
                key: key.to_string(),
                reason: format!("expected string, found {other}"),
            }),
            None => Err(PayloadError::Missing(key.to_string())),
        }
    }

    /// Sets `key`, replacing any previous value.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.0.insert(key.into(), value.into())
    }

    /// Serializes `value` and stores it under `key`.
    pub fn insert_serialized<T: Serialize>(
        &mut self,
        key: impl Into<String>,
        value: &T,
    ) -> Result<(), serde_json::Error> {
        let value = serde_json::to_value(value)?;
        self.0.insert(key.into(), value);
        Ok(())
    }

    /// Removes `key` and returns its value.
    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.0.remove(key)
    }

    /// Iterates over all fields.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    /// Returns the payload as a JSON value.
    pub fn to_value(&self) -> Value {
        Value::Object(self.0.clone())
    }

    /// Builds a payload from a JSON value, which must be an object.
    pub fn from_value(value: Value) -> Result<Self, PayloadError> {
        match value {
            Value::Object(map) => Ok(Self(map)),
            other => Err(PayloadError::Invalid {
                key: "<root>".to_string(),
                reason: format!("expected object, found {other}"),
            }),
        }
    }
}

impl From<Map<String, Value>> for Payload {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

impl From<Payload> for Value {
    fn from(payload: Payload) -> Self {
        Value::Object(payload.0)
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Payload {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(k, v)| -> (String, Value) { (k.into(), v.into()) })
                .collect(),
        )
    }
}
