//! Dynamic values produced and consumed by schema codecs.

use std::collections::BTreeMap;

use bytes::Bytes;

use crate::types::Checksum256;

/// Named fields of a decoded struct.
pub type Fields = BTreeMap<String, Value>;

/// A schema-typed value whose shape is only known at runtime.
///
/// Integers are widened: every unsigned ABI integer decodes to [`Value::Uint`]
/// and every signed one to [`Value::Int`]. The codec checks ranges again on
/// encode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    /// Absent optional (`T?` with flag 0).
    Null,
    Bool(bool),
    Int(i64),
    Uint(u64),
    String(String),
    Bytes(Bytes),
    Checksum256(Checksum256),
    Array(Vec<Value>),
    Struct(Fields),
    /// Variant alternative: type name and the value of that type.
    Variant(String, Box<Value>),
}

impl Value {
    /// Short name of the value kind, for error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Uint(_) => "uint",
            Value::String(_) => "string",
            Value::Bytes(_) => "bytes",
            Value::Checksum256(_) => "checksum256",
            Value::Array(_) => "array",
            Value::Struct(_) => "struct",
            Value::Variant(..) => "variant",
        }
    }

    #[inline]
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Any integer that fits in a `u32`.
    pub fn as_u32(&self) -> Option<u32> {
        match self {
            Value::Uint(n) => u32::try_from(*n).ok(),
            Value::Int(n) => u32::try_from(*n).ok(),
            _ => None,
        }
    }

    pub fn as_u64(&self) -> Option<u64> {
        match self {
            Value::Uint(n) => Some(*n),
            Value::Int(n) => u64::try_from(*n).ok(),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&Bytes> {
        match self {
            Value::Bytes(b) => Some(b),
            _ => None,
        }
    }

    pub fn as_checksum256(&self) -> Option<Checksum256> {
        match self {
            Value::Checksum256(c) => Some(*c),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Value::Array(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_struct(&self) -> Option<&Fields> {
        match self {
            Value::Struct(fields) => Some(fields),
            _ => None,
        }
    }

    /// Split a variant into its tag and payload.
    pub fn into_variant(self) -> Option<(String, Value)> {
        match self {
            Value::Variant(tag, body) => Some((tag, *body)),
            _ => None,
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<u32> for Value {
    fn from(n: u32) -> Self {
        Value::Uint(n.into())
    }
}

impl From<u64> for Value {
    fn from(n: u64) -> Self {
        Value::Uint(n)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Int(n)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_owned())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<Bytes> for Value {
    fn from(b: Bytes) -> Self {
        Value::Bytes(b)
    }
}

impl From<Checksum256> for Value {
    fn from(c: Checksum256) -> Self {
        Value::Checksum256(c)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::Array(items)
    }
}

impl From<Fields> for Value {
    fn from(fields: Fields) -> Self {
        Value::Struct(fields)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Null, Into::into)
    }
}
