//! A recursive, dynamically-typed value.
//!
//! Step config, step output, trigger payloads and the `env` map all flow
//! through the engine as this tagged union rather than as concrete
//! structs — the workflow document is user-authored and untyped, per
//! spec.md §9's design note ("use a recursive tagged value ... for the run
//! context, with serialization adapters at action boundaries").

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// A dynamically-typed value flowing through the workflow runtime.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Bool(bool),
    Number(f64),
    String(String),
    List(Vec<Value>),
    Map(HashMap<String, Value>),
}

impl Default for Value {
    fn default() -> Self {
        Self::Null
    }
}

impl Value {
    #[must_use]
    pub fn map() -> Self {
        Self::Map(HashMap::new())
    }

    #[must_use]
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Get a field by key if this is a `Map`.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        match self {
            Self::Map(m) => m.get(key),
            _ => None,
        }
    }

    /// Get an element by index if this is a `List`.
    #[must_use]
    pub fn get_index(&self, index: usize) -> Option<&Value> {
        match self {
            Self::List(items) => items.get(index),
            _ => None,
        }
    }

    /// Navigate a dotted path (numeric segments index into lists).
    ///
    /// Missing intermediate segments resolve to `None` rather than
    /// erroring, matching the interpolator's "missing path" rule.
    #[must_use]
    pub fn get_path(&self, path: &[&str]) -> Option<&Value> {
        let mut current = self;
        for segment in path {
            current = if let Ok(index) = segment.parse::<usize>() {
                current.get_index(index)?
            } else {
                current.get(segment)?
            };
        }
        Some(current)
    }

    /// Truthiness per spec.md §4.D: booleans by value, non-empty strings
    /// other than literal `"false"`/`"0"`, non-zero numbers, non-empty
    /// collections. `Null` and empty collections are falsey.
    #[must_use]
    pub fn is_truthy(&self) -> bool {
        match self {
            Self::Null => false,
            Self::Bool(b) => *b,
            Self::Number(n) => *n != 0.0,
            Self::String(s) => !s.is_empty() && s != "false" && s != "0",
            Self::List(items) => !items.is_empty(),
            Self::Map(m) => !m.is_empty(),
        }
    }

    /// Render as plain text for splicing into a surrounding string.
    ///
    /// Strings pass through verbatim; everything else is stringified
    /// (numbers without a trailing `.0` where the value is integral,
    /// collections as compact JSON).
    #[must_use]
    pub fn stringify(&self) -> String {
        match self {
            Self::Null => String::new(),
            Self::Bool(b) => b.to_string(),
            Self::Number(n) => format_number(*n),
            Self::String(s) => s.clone(),
            Self::List(_) | Self::Map(_) => {
                serde_json::to_string(self).unwrap_or_default()
            }
        }
    }
}

fn format_number(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{n:.0}")
    } else {
        n.to_string()
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.stringify())
    }
}

impl From<serde_json::Value> for Value {
    fn from(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => Self::Null,
            serde_json::Value::Bool(b) => Self::Bool(b),
            serde_json::Value::Number(n) => Self::Number(n.as_f64().unwrap_or(0.0)),
            serde_json::Value::String(s) => Self::String(s),
            serde_json::Value::Array(items) => {
                Self::List(items.into_iter().map(Value::from).collect())
            }
            serde_json::Value::Object(map) => {
                Self::Map(map.into_iter().map(|(k, v)| (k, Value::from(v))).collect())
            }
        }
    }
}

impl From<Value> for serde_json::Value {
    fn from(value: Value) -> Self {
        match value {
            Value::Null => Self::Null,
            Value::Bool(b) => Self::Bool(b),
            Value::Number(n) => serde_json::Number::from_f64(n)
                .map(Self::Number)
                .unwrap_or(Self::Null),
            Value::String(s) => Self::String(s),
            Value::List(items) => Self::Array(items.into_iter().map(Into::into).collect()),
            Value::Map(map) => {
                Self::Object(map.into_iter().map(|(k, v)| (k, v.into())).collect())
            }
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn truthiness_rules() {
        assert!(!Value::Null.is_truthy());
        assert!(!Value::from("").is_truthy());
        assert!(!Value::from("false").is_truthy());
        assert!(!Value::from("0").is_truthy());
        assert!(Value::from("0.0").is_truthy());
        assert!(!Value::Number(0.0).is_truthy());
        assert!(Value::Number(1.0).is_truthy());
        assert!(!Value::List(vec![]).is_truthy());
        assert!(Value::List(vec![Value::Null]).is_truthy());
    }

    #[test]
    fn get_path_navigates_nested_structures() {
        let value: Value = json!({
            "items": [{"name": "first"}, {"name": "second"}]
        })
        .into();

        let name = value.get_path(&["items", "1", "name"]);
        assert_eq!(name, Some(&Value::String("second".to_string())));
    }

    #[test]
    fn get_path_missing_returns_none() {
        let value: Value = json!({"a": 1}).into();
        assert_eq!(value.get_path(&["b", "c"]), None);
    }

    #[test]
    fn stringify_preserves_integral_numbers() {
        assert_eq!(Value::Number(7.0).stringify(), "7");
        assert_eq!(Value::Number(7.5).stringify(), "7.5");
    }

    #[test]
    fn json_roundtrip() {
        let original = json!({"a": 1, "b": [true, null, "x"]});
        let value: Value = original.clone().into();
        let back: serde_json::Value = value.into();
        assert_eq!(original, back);
    }
}
