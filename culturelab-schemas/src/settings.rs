use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// The flat key→value map of initial conditions applied by the operator.
///
/// Values stay untyped here; interpretation and defaults belong to the engine.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AppliedSettings {
    pub values: BTreeMap<String, Value>,
}

impl AppliedSettings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.values.insert(key.to_string(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    /// Reads a value as text, accepting strings and bare scalars.
    pub fn text(&self, key: &str) -> Option<String> {
        match self.values.get(key)? {
            Value::String(s) => Some(s.trim().to_string()).filter(|s| !s.is_empty()),
            Value::Number(n) => Some(n.to_string()),
            Value::Bool(b) => Some(b.to_string()),
            _ => None,
        }
    }

    /// Reads a numeric value. Numbers encoded as strings are accepted.
    ///
    /// The outer `Option` is `None` for a missing key; the inner one is `None` when the
    /// key is present but not numeric.
    pub fn number(&self, key: &str) -> Option<Option<f64>> {
        let value = self.values.get(key)?;
        Some(match value {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().parse::<f64>().ok(),
            _ => None,
        })
    }

    pub fn flag(&self, key: &str) -> Option<Option<bool>> {
        let value = self.values.get(key)?;
        Some(match value {
            Value::Bool(b) => Some(*b),
            Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
                "true" | "on" | "yes" | "1" => Some(true),
                "false" | "off" | "no" | "0" => Some(false),
                _ => None,
            },
            Value::Number(n) => n.as_f64().map(|v| v != 0.0),
            _ => None,
        })
    }
}
