//! Structured context passed alongside a task and between executors.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Key/value context for analysis and execution.
///
/// Ordered so that serialization (and therefore prompts and fingerprints) is
/// deterministic.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskContext {
    entries: BTreeMap<String, Value>,
}

impl TaskContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an entry, consuming and returning the context.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.entries.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.entries.get(key)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.entries.get(key).and_then(Value::as_str)
    }

    pub fn get_f64(&self, key: &str) -> Option<f64> {
        self.entries.get(key).and_then(Value::as_f64)
    }

    /// Reads a boolean, also accepting "true"/"false" strings.
    pub fn get_bool(&self, key: &str) -> Option<bool> {
        match self.entries.get(key)? {
            Value::Bool(b) => Some(*b),
            Value::String(s) => match s.to_lowercase().as_str() {
                "true" | "yes" | "1" => Some(true),
                "false" | "no" | "0" => Some(false),
                _ => None,
            },
            _ => None,
        }
    }

    /// Reads a list of strings, also accepting a comma-separated string.
    pub fn get_string_list(&self, key: &str) -> Vec<String> {
        match self.entries.get(key) {
            Some(Value::Array(items)) => items
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect(),
            Some(Value::String(s)) => s
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect(),
            _ => Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.entries.iter()
    }

    /// The context as a JSON object.
    pub fn to_value(&self) -> Value {
        Value::Object(
            self.entries
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        )
    }
}

impl FromIterator<(String, Value)> for TaskContext {
    fn from_iter<T: IntoIterator<Item = (String, Value)>>(iter: T) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_typed_getters() {
        let ctx = TaskContext::new()
            .with("domain", "security")
            .with("threshold", 0.5)
            .with("parallelizable", "yes")
            .with("capabilities", json!(["a", "b"]))
            .with("extra", "c, d");

        assert_eq!(ctx.get_str("domain"), Some("security"));
        assert_eq!(ctx.get_f64("threshold"), Some(0.5));
        assert_eq!(ctx.get_bool("parallelizable"), Some(true));
        assert_eq!(ctx.get_string_list("capabilities"), vec!["a", "b"]);
        assert_eq!(ctx.get_string_list("extra"), vec!["c", "d"]);
        assert!(ctx.get_string_list("missing").is_empty());
    }

    #[test]
    fn test_to_value_is_object() {
        let ctx = TaskContext::new().with("k", 1);
        assert_eq!(ctx.to_value(), json!({"k": 1}));
    }
}
