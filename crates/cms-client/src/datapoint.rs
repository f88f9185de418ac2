//! Typed view over the loosely-keyed datapoint records returned by the API.
//!
//! A datapoint is a flat map of field name to value. Which fields are
//! present varies per metric and even per record, so every accessor is
//! total: a missing or wrong-typed field yields a default instead of an
//! error.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Fields that never become labels: the sample time and the alternative
/// statistics.
pub const RESERVED_FIELDS: [&str; 4] = ["timestamp", "Maximum", "Minimum", "Average"];

/// Field carrying the resource instance identifier.
pub const INSTANCE_ID: &str = "instanceId";

/// A single datapoint field value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Number(f64),
    Text(String),
    /// Anything else (bool, null, nested). Kept so one odd field does not
    /// fail the whole batch.
    Other(serde_json::Value),
}

impl Value {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Number(n) => write!(f, "{n}"),
            Value::Text(s) => f.write_str(s),
            Value::Other(v) => write!(f, "{v}"),
        }
    }
}

/// One raw statistical sample for one time bucket.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Datapoint(BTreeMap<String, Value>);

impl Datapoint {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.0.insert(key.to_string(), value.into());
        self
    }

    pub fn field(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// Numeric value of `measure`; 0.0 when absent or not a number.
    pub fn get(&self, measure: &str) -> f64 {
        self.0.get(measure).and_then(Value::as_f64).unwrap_or(0.0)
    }

    /// Non-reserved keys of this record, sorted ascending.
    pub fn labels(&self) -> Vec<String> {
        // BTreeMap iteration is already ordered and unique.
        self.0
            .keys()
            .filter(|k| !RESERVED_FIELDS.contains(&k.as_str()))
            .cloned()
            .collect()
    }

    /// Rendered values for the given fields, in the given order. Missing
    /// fields render as the empty string.
    pub fn values<S: AsRef<str>>(&self, fields: &[S]) -> Vec<String> {
        fields
            .iter()
            .map(|f| self.0.get(f.as_ref()).map(Value::to_string).unwrap_or_default())
            .collect()
    }

    /// The `instanceId` field, only if it is a string.
    pub fn instance_id(&self) -> Option<&str> {
        self.0.get(INSTANCE_ID).and_then(Value::as_str)
    }

    /// Bucket timestamp in milliseconds, when present and numeric.
    pub fn timestamp_ms(&self) -> Option<i64> {
        self.0.get("timestamp").and_then(Value::as_f64).map(|t| t as i64)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}

impl FromIterator<(String, Value)> for Datapoint {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}
