//! Primary and index keys
//!
//! Keys follow the engine's total order: every number sorts before every string,
//! every string before every array. Numbers compare numerically, strings by UTF-16
//! code units, arrays element by element and then by length.

use std::cmp::Ordering;
use std::fmt;

use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

use crate::error::EngineError;

/// Largest integer an f64 holds exactly (2^53 - 1).
const MAX_SAFE_INTEGER: f64 = 9_007_199_254_740_991.0;

/// A valid key.
#[derive(Debug, Clone)]
pub enum Key {
    Number(f64),
    String(String),
    Array(Vec<Key>),
}

impl Key {
    /// Build a numeric key. NaN and the infinities are rejected (JSON cannot
    /// carry them to the engine) and negative zero folds into zero.
    pub fn number(n: f64) -> Option<Self> {
        if !n.is_finite() {
            None
        } else if n == 0.0 {
            Some(Key::Number(0.0))
        } else {
            Some(Key::Number(n))
        }
    }

    /// Convert a JSON value into a key.
    pub fn from_value(value: &Value) -> Result<Self, EngineError> {
        match value {
            Value::Number(n) => n
                .as_f64()
                .and_then(Key::number)
                .ok_or_else(|| invalid_key(value)),
            Value::String(s) => Ok(Key::String(s.clone())),
            Value::Array(items) => items
                .iter()
                .map(Key::from_value)
                .collect::<Result<Vec<_>, _>>()
                .map(Key::Array),
            Value::Null | Value::Bool(_) | Value::Object(_) => Err(invalid_key(value)),
        }
    }

    /// Convert back to JSON. Integral numbers become JSON integers.
    pub fn to_value(&self) -> Value {
        match self {
            Key::Number(n) => {
                if n.fract() == 0.0 && n.abs() <= MAX_SAFE_INTEGER {
                    Value::from(*n as i64)
                } else {
                    serde_json::Number::from_f64(*n)
                        .map(Value::Number)
                        .unwrap_or(Value::Null)
                }
            }
            Key::String(s) => Value::String(s.clone()),
            Key::Array(items) => Value::Array(items.iter().map(Key::to_value).collect()),
        }
    }

    fn rank(&self) -> u8 {
        match self {
            Key::Number(_) => 0,
            Key::String(_) => 1,
            Key::Array(_) => 2,
        }
    }
}

fn invalid_key(value: &Value) -> EngineError {
    EngineError::new("DataError", format!("{} is not a valid key", value))
}

impl Ord for Key {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Key::Number(a), Key::Number(b)) => {
                if a == b {
                    Ordering::Equal
                } else {
                    a.total_cmp(b)
                }
            }
            (Key::String(a), Key::String(b)) => a.encode_utf16().cmp(b.encode_utf16()),
            (Key::Array(a), Key::Array(b)) => a.cmp(b),
            _ => self.rank().cmp(&other.rank()),
        }
    }
}

impl PartialOrd for Key {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Key {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Key {}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_value())
    }
}

impl From<&str> for Key {
    fn from(s: &str) -> Self {
        Key::String(s.to_string())
    }
}

impl From<String> for Key {
    fn from(s: String) -> Self {
        Key::String(s)
    }
}

// Integers beyond 2^53 round to the nearest f64, as they do in JS.
macro_rules! key_from_int {
    ($($t:ty),*) => {
        $(
            impl From<$t> for Key {
                fn from(n: $t) -> Self {
                    Key::Number(n as f64)
                }
            }
        )*
    };
}

key_from_int!(i32, i64, u32, u64, usize);

impl From<Vec<Key>> for Key {
    fn from(items: Vec<Key>) -> Self {
        Key::Array(items)
    }
}

impl TryFrom<f64> for Key {
    type Error = EngineError;

    fn try_from(n: f64) -> Result<Self, Self::Error> {
        Key::number(n).ok_or_else(|| EngineError::new("DataError", format!("{} is not a valid key", n)))
    }
}

impl TryFrom<&Value> for Key {
    type Error = EngineError;

    fn try_from(value: &Value) -> Result<Self, Self::Error> {
        Key::from_value(value)
    }
}

impl TryFrom<Value> for Key {
    type Error = EngineError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        Key::from_value(&value)
    }
}

impl Serialize for Key {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_value().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Key {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Key::from_value(&value).map_err(|e| de::Error::custom(e.message))
    }
}
