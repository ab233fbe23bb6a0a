//! Runtime values carried by entity instances and persistence steps.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::hash::{Hash, Hasher};

/// A column value.
///
/// This maps to the logical column types of the schema graph. Floats compare
/// and hash by bit pattern so values can participate in identity keys.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Value {
    /// Null value.
    Null,
    /// Boolean value.
    Bool(bool),
    /// Signed integer.
    Int(i64),
    /// Floating point.
    Float(f64),
    /// UTF-8 string.
    String(String),
    /// Binary data.
    Bytes(Vec<u8>),
    /// UUID as 16 bytes.
    Uuid([u8; 16]),
    /// Timestamp as microseconds since Unix epoch.
    Timestamp(i64),
    /// The database's current timestamp, evaluated when the step executes.
    CurrentTimestamp,
}

impl Value {
    /// Check if this value is null.
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Try to get as i64.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(v) => Some(*v),
            _ => None,
        }
    }

    /// Try to get as string slice.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Generate a random v4 UUID value.
    #[cfg(feature = "uuid")]
    pub fn new_uuid() -> Self {
        Value::Uuid(*uuid::Uuid::new_v4().as_bytes())
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a.to_bits() == b.to_bits(),
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Bytes(a), Value::Bytes(b)) => a == b,
            (Value::Uuid(a), Value::Uuid(b)) => a == b,
            (Value::Timestamp(a), Value::Timestamp(b)) => a == b,
            (Value::CurrentTimestamp, Value::CurrentTimestamp) => true,
            _ => false,
        }
    }
}

impl Eq for Value {}

impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            Value::Null | Value::CurrentTimestamp => {}
            Value::Bool(v) => v.hash(state),
            Value::Int(v) => v.hash(state),
            Value::Float(v) => v.to_bits().hash(state),
            Value::String(v) => v.hash(state),
            Value::Bytes(v) => v.hash(state),
            Value::Uuid(v) => v.hash(state),
            Value::Timestamp(v) => v.hash(state),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "NULL"),
            Value::Bool(v) => write!(f, "{v}"),
            Value::Int(v) => write!(f, "{v}"),
            Value::Float(v) => write!(f, "{v}"),
            Value::String(v) => write!(f, "{v}"),
            Value::Bytes(v) => write!(f, "{}", hex::encode(v)),
            Value::Uuid(v) => {
                let h = hex::encode(v);
                write!(
                    f,
                    "{}-{}-{}-{}-{}",
                    &h[0..8],
                    &h[8..12],
                    &h[12..16],
                    &h[16..20],
                    &h[20..32]
                )
            }
            Value::Timestamp(v) => write!(f, "{v}"),
            Value::CurrentTimestamp => write!(f, "CURRENT_TIMESTAMP"),
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(v as i64)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}

/// Primary key values of one row, keyed by column property path.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Identifier(pub BTreeMap<String, Value>);

impl Identifier {
    /// Create an identifier from (property path, value) pairs.
    pub fn new(parts: impl IntoIterator<Item = (impl Into<String>, Value)>) -> Self {
        Identifier(parts.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    /// Single-column identifier.
    pub fn single(property: impl Into<String>, value: impl Into<Value>) -> Self {
        let mut map = BTreeMap::new();
        map.insert(property.into(), value.into());
        Identifier(map)
    }

    /// Get the value of one primary column.
    pub fn get(&self, property: &str) -> Option<&Value> {
        self.0.get(property)
    }

    /// Render the identifier as a path segment (`1`, or `1-2` for composite keys).
    pub fn path_segment(&self) -> String {
        self.0
            .values()
            .map(|v| v.to_string())
            .collect::<Vec<_>>()
            .join("-")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_float_identity() {
        let mut set = HashSet::new();
        set.insert(Value::Float(1.5));
        assert!(set.contains(&Value::Float(1.5)));
        assert_ne!(Value::Float(0.0), Value::Float(-0.0));
    }

    #[test]
    fn test_uuid_display() {
        let v = Value::Uuid([0xab; 16]);
        assert_eq!(v.to_string(), "abababab-abab-abab-abab-abababababab");
    }

    #[test]
    fn test_identifier_path_segment() {
        let id = Identifier::new([("a", Value::Int(1)), ("b", Value::Int(2))]);
        assert_eq!(id.path_segment(), "1-2");
        assert_eq!(Identifier::single("id", 7).path_segment(), "7");
    }
}
