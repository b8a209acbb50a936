//! OVSDB sets

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{json, Value};
use std::collections::btree_set;
use std::collections::BTreeSet;

use super::{is_known_tag, tagged, Notation, SET_TAG};
use crate::error::{OvsdbError, Result};

/// Unordered collection of unique values.
///
/// On the wire a set with exactly one element is the bare element, any other
/// size is `["set", [..]]`. Decoding also accepts a raw JSON array, which some
/// older rows carry for the same columns.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OvsSet<T: Ord>(BTreeSet<T>);

impl<T: Ord> OvsSet<T> {
    pub fn new() -> Self {
        OvsSet(BTreeSet::new())
    }

    pub fn single(value: T) -> Self {
        let mut set = BTreeSet::new();
        set.insert(value);
        OvsSet(set)
    }

    /// Returns false if the value was already present
    pub fn insert(&mut self, value: T) -> bool {
        self.0.insert(value)
    }

    pub fn remove(&mut self, value: &T) -> bool {
        self.0.remove(value)
    }

    pub fn contains(&self, value: &T) -> bool {
        self.0.contains(value)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> btree_set::Iter<'_, T> {
        self.0.iter()
    }

    /// Smallest element, handy for optional columns encoded as 0..1 sets
    pub fn first(&self) -> Option<&T> {
        self.0.iter().next()
    }

    pub fn into_inner(self) -> BTreeSet<T> {
        self.0
    }
}

impl<T: Ord> Default for OvsSet<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Ord> From<BTreeSet<T>> for OvsSet<T> {
    fn from(set: BTreeSet<T>) -> Self {
        OvsSet(set)
    }
}

impl<T: Ord> FromIterator<T> for OvsSet<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        OvsSet(iter.into_iter().collect())
    }
}

impl<T: Ord> IntoIterator for OvsSet<T> {
    type Item = T;
    type IntoIter = btree_set::IntoIter<T>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl<'a, T: Ord> IntoIterator for &'a OvsSet<T> {
    type Item = &'a T;
    type IntoIter = btree_set::Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

fn decode_elements<T: Notation + Ord>(items: &[Value]) -> Result<OvsSet<T>> {
    items.iter().map(T::from_wire).collect()
}

impl<T: Notation + Ord> Notation for OvsSet<T> {
    fn to_wire(&self) -> Value {
        match self.0.len() {
            1 => self.0.iter().map(T::to_wire).next().unwrap_or(Value::Null),
            _ => json!([SET_TAG, self.0.iter().map(T::to_wire).collect::<Vec<_>>()]),
        }
    }

    fn from_wire(value: &Value) -> Result<Self> {
        match tagged(value) {
            Some((SET_TAG, payload)) => match payload {
                Some(Value::Array(items)) => decode_elements(items),
                _ => Err(OvsdbError::malformed(format!(
                    "'set' marker needs an array payload: {}",
                    value
                ))),
            },
            // A tagged element on its own (e.g. one uuid) is a singleton.
            Some((tag, _)) if is_known_tag(tag) => T::from_wire(value).map(OvsSet::single),
            _ => match value {
                Value::Array(items) => decode_elements(items),
                Value::Null => Err(OvsdbError::malformed("null is not a set")),
                scalar => T::from_wire(scalar).map(OvsSet::single),
            },
        }
    }
}

impl<T: Notation + Ord> Serialize for OvsSet<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        self.to_wire().serialize(serializer)
    }
}

impl<'de, T: Notation + Ord> Deserialize<'de> for OvsSet<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Self::from_wire(&value).map_err(serde::de::Error::custom)
    }
}
