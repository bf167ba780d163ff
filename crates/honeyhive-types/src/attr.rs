use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Scalar span attribute value.
///
/// Span transports forbid nested types; list/object values are JSON-encoded
/// into `Str` at write time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttrValue {
    Str(String),
    Int(i64),
    Float(f64),
    Bool(bool),
}

/// Span attribute map, ordered by key.
///
/// Sorted iteration keeps signature hashing deterministic.
pub type AttrMap = BTreeMap<String, AttrValue>;

impl AttrValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            AttrValue::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            AttrValue::Int(n) => Some(*n),
            AttrValue::Str(s) => s.parse().ok(),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            AttrValue::Float(f) => Some(*f),
            AttrValue::Int(n) => Some(*n as f64),
            AttrValue::Str(s) => s.parse().ok(),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            AttrValue::Bool(b) => Some(*b),
            AttrValue::Str(s) => match s.as_str() {
                "true" => Some(true),
                "false" => Some(false),
                _ => None,
            },
            _ => None,
        }
    }

    /// Render the attribute as its wire string form.
    pub fn to_wire_string(&self) -> String {
        match self {
            AttrValue::Str(s) => s.clone(),
            AttrValue::Int(n) => n.to_string(),
            AttrValue::Float(f) => f.to_string(),
            AttrValue::Bool(b) => b.to_string(),
        }
    }

    /// Lossless conversion into a JSON value (strings stay strings).
    pub fn to_json(&self) -> Value {
        match self {
            AttrValue::Str(s) => Value::String(s.clone()),
            AttrValue::Int(n) => Value::from(*n),
            AttrValue::Float(f) => {
                serde_json::Number::from_f64(*f).map_or(Value::Null, Value::Number)
            }
            AttrValue::Bool(b) => Value::Bool(*b),
        }
    }

    /// Encode a JSON value as a scalar attribute.
    ///
    /// Scalars map directly; lists and objects become JSON-encoded strings.
    pub fn from_json(value: &Value) -> Option<AttrValue> {
        match value {
            Value::Null => None,
            Value::Bool(b) => Some(AttrValue::Bool(*b)),
            Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Some(AttrValue::Int(i))
                } else {
                    n.as_f64().map(AttrValue::Float)
                }
            }
            Value::String(s) => Some(AttrValue::Str(s.clone())),
            Value::Array(_) | Value::Object(_) => {
                serde_json::to_string(value).ok().map(AttrValue::Str)
            }
        }
    }
}

impl From<&str> for AttrValue {
    fn from(s: &str) -> Self {
        AttrValue::Str(s.to_string())
    }
}

impl From<String> for AttrValue {
    fn from(s: String) -> Self {
        AttrValue::Str(s)
    }
}

impl From<i64> for AttrValue {
    fn from(n: i64) -> Self {
        AttrValue::Int(n)
    }
}

impl From<u64> for AttrValue {
    fn from(n: u64) -> Self {
        AttrValue::Int(n as i64)
    }
}

impl From<f64> for AttrValue {
    fn from(f: f64) -> Self {
        AttrValue::Float(f)
    }
}

impl From<bool> for AttrValue {
    fn from(b: bool) -> Self {
        AttrValue::Bool(b)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_complex_json_encodes_to_string() {
        let value = serde_json::json!([{"role": "user", "content": "hi"}]);
        let attr = AttrValue::from_json(&value).unwrap();
        match attr {
            AttrValue::Str(s) => {
                let back: Value = serde_json::from_str(&s).unwrap();
                assert_eq!(back, value);
            }
            other => panic!("expected string encoding, got {:?}", other),
        }
    }

    #[test]
    fn test_string_number_coercion() {
        let attr = AttrValue::Str("0.7".to_string());
        assert_eq!(attr.as_f64(), Some(0.7));
        let attr = AttrValue::Str("10".to_string());
        assert_eq!(attr.as_i64(), Some(10));
    }
}
