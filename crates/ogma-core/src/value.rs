//! Property value model.
//!
//! Graph element properties are scalar values. `PropertyValue` is the
//! runtime representation; `ValueKind` is the matching type tag carried by
//! schema metadata so backend schema writers can emit typed index DDL.

use serde::{Deserialize, Serialize};

/// A scalar value stored under a key on a vertex or edge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PropertyValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    Bytes(Vec<u8>),
}

impl PropertyValue {
    /// The type tag of this value.
    pub fn kind(&self) -> ValueKind {
        match self {
            PropertyValue::Bool(_) => ValueKind::Bool,
            PropertyValue::Int(_) => ValueKind::Int,
            PropertyValue::Float(_) => ValueKind::Float,
            PropertyValue::String(_) => ValueKind::String,
            PropertyValue::Bytes(_) => ValueKind::Bytes,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            PropertyValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            PropertyValue::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            PropertyValue::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            PropertyValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            PropertyValue::Bytes(b) => Some(b),
            _ => None,
        }
    }
}

impl From<bool> for PropertyValue {
    fn from(v: bool) -> Self {
        PropertyValue::Bool(v)
    }
}

impl From<i32> for PropertyValue {
    fn from(v: i32) -> Self {
        PropertyValue::Int(v.into())
    }
}

impl From<i64> for PropertyValue {
    fn from(v: i64) -> Self {
        PropertyValue::Int(v)
    }
}

impl From<f64> for PropertyValue {
    fn from(v: f64) -> Self {
        PropertyValue::Float(v)
    }
}

impl From<String> for PropertyValue {
    fn from(v: String) -> Self {
        PropertyValue::String(v)
    }
}

impl From<&str> for PropertyValue {
    fn from(v: &str) -> Self {
        PropertyValue::String(v.to_string())
    }
}

impl From<Vec<u8>> for PropertyValue {
    fn from(v: Vec<u8>) -> Self {
        PropertyValue::Bytes(v)
    }
}

/// Type tag for a property value, recorded in schema metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueKind {
    Bool,
    Int,
    Float,
    String,
    Bytes,
}

impl ValueKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ValueKind::Bool => "bool",
            ValueKind::Int => "int",
            ValueKind::Float => "float",
            ValueKind::String => "string",
            ValueKind::Bytes => "bytes",
        }
    }
}

/// Rust types that map onto a scalar [`PropertyValue`].
///
/// The schema builder uses this to erase typed field accessors into the
/// value-level capability pair the materializer works with. A failed
/// reverse conversion hands the original value back so the caller can
/// report what was actually stored.
pub trait Scalar: Sized {
    const KIND: ValueKind;

    fn into_value(self) -> PropertyValue;
    fn from_value(value: PropertyValue) -> Result<Self, PropertyValue>;
}

impl Scalar for bool {
    const KIND: ValueKind = ValueKind::Bool;

    fn into_value(self) -> PropertyValue {
        PropertyValue::Bool(self)
    }

    fn from_value(value: PropertyValue) -> Result<Self, PropertyValue> {
        match value {
            PropertyValue::Bool(b) => Ok(b),
            other => Err(other),
        }
    }
}

impl Scalar for i32 {
    const KIND: ValueKind = ValueKind::Int;

    fn into_value(self) -> PropertyValue {
        PropertyValue::Int(self.into())
    }

    fn from_value(value: PropertyValue) -> Result<Self, PropertyValue> {
        match value {
            PropertyValue::Int(i) => i32::try_from(i).map_err(|_| PropertyValue::Int(i)),
            other => Err(other),
        }
    }
}

impl Scalar for i64 {
    const KIND: ValueKind = ValueKind::Int;

    fn into_value(self) -> PropertyValue {
        PropertyValue::Int(self)
    }

    fn from_value(value: PropertyValue) -> Result<Self, PropertyValue> {
        match value {
            PropertyValue::Int(i) => Ok(i),
            other => Err(other),
        }
    }
}

impl Scalar for f64 {
    const KIND: ValueKind = ValueKind::Float;

    fn into_value(self) -> PropertyValue {
        PropertyValue::Float(self)
    }

    fn from_value(value: PropertyValue) -> Result<Self, PropertyValue> {
        match value {
            PropertyValue::Float(f) => Ok(f),
            other => Err(other),
        }
    }
}

impl Scalar for String {
    const KIND: ValueKind = ValueKind::String;

    fn into_value(self) -> PropertyValue {
        PropertyValue::String(self)
    }

    fn from_value(value: PropertyValue) -> Result<Self, PropertyValue> {
        match value {
            PropertyValue::String(s) => Ok(s),
            other => Err(other),
        }
    }
}

impl Scalar for Vec<u8> {
    const KIND: ValueKind = ValueKind::Bytes;

    fn into_value(self) -> PropertyValue {
        PropertyValue::Bytes(self)
    }

    fn from_value(value: PropertyValue) -> Result<Self, PropertyValue> {
        match value {
            PropertyValue::Bytes(b) => Ok(b),
            other => Err(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_value_kind_tags() {
        assert_eq!(PropertyValue::from(true).kind(), ValueKind::Bool);
        assert_eq!(PropertyValue::from(42i64).kind(), ValueKind::Int);
        assert_eq!(PropertyValue::from(1.5).kind(), ValueKind::Float);
        assert_eq!(PropertyValue::from("x").kind(), ValueKind::String);
        assert_eq!(PropertyValue::from(vec![1u8]).kind(), ValueKind::Bytes);
    }

    #[test]
    fn test_scalar_roundtrip() {
        assert_eq!(String::from_value("abc".into()), Ok("abc".to_string()));
        assert_eq!(i64::from_value(7i64.into_value()), Ok(7));
        assert_eq!(i32::from_value(7i32.into_value()), Ok(7));
        assert_eq!(bool::from_value(true.into_value()), Ok(true));
    }

    #[test]
    fn test_scalar_mismatch_returns_original() {
        let err = i64::from_value(PropertyValue::String("nope".into())).unwrap_err();
        assert_eq!(err.kind(), ValueKind::String);
    }

    #[test]
    fn test_i32_out_of_range() {
        assert!(i32::from_value(PropertyValue::Int(i64::MAX)).is_err());
    }
}
