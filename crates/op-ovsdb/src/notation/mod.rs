//! OVSDB wire notation (RFC 7047 section 5.1)
//!
//! Typed in-memory values and their JSON encodings:
//! - [`RowUuid`]: `["uuid", id]` or `["named-uuid", name]`
//! - [`OvsSet`]: `["set", [..]]`, except a single element which is sent bare
//! - [`OvsMap`]: `["map", [[k, v], ..]]`, always wrapped
//! - [`Condition`] / [`Mutation`]: `[column, operator, value]`
//! - [`Row`]: column name to encoded value
//!
//! Everything goes through the [`Notation`] trait so nested values (a set of
//! uuids inside a mutation inside an operation) encode recursively.

mod condition;
mod map;
mod mutation;
mod row;
mod set;
mod uuid;

pub use condition::{Condition, Function};
pub use map::OvsMap;
pub use mutation::{Mutation, Mutator};
pub use row::Row;
pub use set::OvsSet;
pub use uuid::{RowUuid, NAMED_UUID_TAG, UUID_TAG};

use serde_json::Value;

use crate::error::{OvsdbError, Result};

/// Marker for an encoded set
pub const SET_TAG: &str = "set";
/// Marker for an encoded map
pub const MAP_TAG: &str = "map";

/// Encode/decode between a typed value and its OVSDB JSON shape
pub trait Notation: Sized {
    /// Encode into the wire shape
    fn to_wire(&self) -> Value;

    /// Decode from the wire shape
    fn from_wire(value: &Value) -> Result<Self>;
}

/// If `value` is a two-element `[tag, payload]` array with a string tag,
/// return both parts. Arrays whose first element is a string but whose
/// length is not two are returned with `None` payload so callers can
/// report the arity problem.
pub(crate) fn tagged(value: &Value) -> Option<(&str, Option<&Value>)> {
    let arr = value.as_array()?;
    let tag = arr.first()?.as_str()?;
    if arr.len() == 2 {
        Some((tag, arr.get(1)))
    } else {
        Some((tag, None))
    }
}

pub(crate) fn is_known_tag(tag: &str) -> bool {
    matches!(tag, UUID_TAG | NAMED_UUID_TAG | SET_TAG | MAP_TAG)
}

impl Notation for Value {
    fn to_wire(&self) -> Value {
        self.clone()
    }

    fn from_wire(value: &Value) -> Result<Self> {
        Ok(value.clone())
    }
}

impl Notation for String {
    fn to_wire(&self) -> Value {
        Value::String(self.clone())
    }

    fn from_wire(value: &Value) -> Result<Self> {
        value
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| OvsdbError::malformed(format!("expected string, got {}", value)))
    }
}

impl Notation for i64 {
    fn to_wire(&self) -> Value {
        Value::from(*self)
    }

    fn from_wire(value: &Value) -> Result<Self> {
        value
            .as_i64()
            .ok_or_else(|| OvsdbError::malformed(format!("expected integer, got {}", value)))
    }
}

impl Notation for u64 {
    fn to_wire(&self) -> Value {
        Value::from(*self)
    }

    fn from_wire(value: &Value) -> Result<Self> {
        value
            .as_u64()
            .ok_or_else(|| {
                OvsdbError::malformed(format!("expected unsigned integer, got {}", value))
            })
    }
}

impl Notation for u16 {
    fn to_wire(&self) -> Value {
        Value::from(*self)
    }

    fn from_wire(value: &Value) -> Result<Self> {
        value
            .as_u64()
            .and_then(|n| u16::try_from(n).ok())
            .ok_or_else(|| OvsdbError::malformed(format!("expected 16-bit integer, got {}", value)))
    }
}

impl Notation for f64 {
    fn to_wire(&self) -> Value {
        Value::from(*self)
    }

    fn from_wire(value: &Value) -> Result<Self> {
        value
            .as_f64()
            .ok_or_else(|| OvsdbError::malformed(format!("expected real, got {}", value)))
    }
}

impl Notation for bool {
    fn to_wire(&self) -> Value {
        Value::Bool(*self)
    }

    fn from_wire(value: &Value) -> Result<Self> {
        value
            .as_bool()
            .ok_or_else(|| OvsdbError::malformed(format!("expected boolean, got {}", value)))
    }
}

/// Implements serde traits for a non-generic type by delegating to its
/// [`Notation`] impl.
macro_rules! serde_via_notation {
    ($ty:ty) => {
        impl serde::Serialize for $ty {
            fn serialize<S: serde::Serializer>(
                &self,
                serializer: S,
            ) -> std::result::Result<S::Ok, S::Error> {
                serde::Serialize::serialize(&$crate::notation::Notation::to_wire(self), serializer)
            }
        }

        impl<'de> serde::Deserialize<'de> for $ty {
            fn deserialize<D: serde::Deserializer<'de>>(
                deserializer: D,
            ) -> std::result::Result<Self, D::Error> {
                let value = serde_json::Value::deserialize(deserializer)?;
                $crate::notation::Notation::from_wire(&value)
                    .map_err(serde::de::Error::custom)
            }
        }
    };
}

pub(crate) use serde_via_notation;

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_scalar_codec() {
        assert_eq!(String::from_wire(&json!("eth0")).unwrap(), "eth0");
        assert_eq!(i64::from_wire(&json!(-4)).unwrap(), -4);
        assert_eq!(u16::from_wire(&json!(100)).unwrap(), 100);
        assert!(bool::from_wire(&json!(true)).unwrap());
        assert!(u16::from_wire(&json!(70000)).is_err());
    }

    #[test]
    fn test_scalar_type_mismatch_is_malformed() {
        let err = String::from_wire(&json!(5)).unwrap_err();
        assert!(matches!(err, OvsdbError::MalformedValue(_)));
    }

    #[test]
    fn test_tagged_helper() {
        let v = json!(["uuid", "abc"]);
        let (tag, payload) = tagged(&v).unwrap();
        assert_eq!(tag, "uuid");
        assert_eq!(payload, Some(&json!("abc")));

        let v = json!(["uuid"]);
        assert_eq!(tagged(&v), Some(("uuid", None)));
        assert!(tagged(&json!("uuid")).is_none());
    }
}
