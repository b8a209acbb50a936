//! OVSDB maps

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{json, Value};
use std::collections::btree_map;
use std::collections::BTreeMap;

use super::{tagged, Notation, MAP_TAG};
use crate::error::{OvsdbError, Result};

/// Key/value column value, always encoded as `["map", [[k, v], ..]]`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct OvsMap<K: Ord, V>(BTreeMap<K, V>);

impl<K: Ord, V> OvsMap<K, V> {
    pub fn new() -> Self {
        OvsMap(BTreeMap::new())
    }

    pub fn insert(&mut self, key: K, value: V) -> Option<V> {
        self.0.insert(key, value)
    }

    pub fn get(&self, key: &K) -> Option<&V> {
        self.0.get(key)
    }

    pub fn remove(&mut self, key: &K) -> Option<V> {
        self.0.remove(key)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> btree_map::Iter<'_, K, V> {
        self.0.iter()
    }

    pub fn into_inner(self) -> BTreeMap<K, V> {
        self.0
    }
}

impl<K: Ord, V> Default for OvsMap<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: Ord, V> From<BTreeMap<K, V>> for OvsMap<K, V> {
    fn from(map: BTreeMap<K, V>) -> Self {
        OvsMap(map)
    }
}

impl<K: Ord, V> FromIterator<(K, V)> for OvsMap<K, V> {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        OvsMap(iter.into_iter().collect())
    }
}

impl<'a, K: Ord, V> IntoIterator for &'a OvsMap<K, V> {
    type Item = (&'a K, &'a V);
    type IntoIter = btree_map::Iter<'a, K, V>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

impl<K: Notation + Ord, V: Notation> Notation for OvsMap<K, V> {
    fn to_wire(&self) -> Value {
        let pairs: Vec<Value> = self
            .0
            .iter()
            .map(|(k, v)| json!([k.to_wire(), v.to_wire()]))
            .collect();
        json!([MAP_TAG, pairs])
    }

    fn from_wire(value: &Value) -> Result<Self> {
        let pairs = match tagged(value) {
            Some((MAP_TAG, Some(Value::Array(pairs)))) => pairs,
            _ => {
                return Err(OvsdbError::malformed(format!(
                    "expected [\"map\", [..]], got {}",
                    value
                )))
            }
        };

        pairs
            .iter()
            .map(|pair| match pair.as_array().map(Vec::as_slice) {
                Some([k, v]) => Ok((K::from_wire(k)?, V::from_wire(v)?)),
                _ => Err(OvsdbError::malformed(format!(
                    "map entry must be a [key, value] pair: {}",
                    pair
                ))),
            })
            .collect()
    }
}

impl<K: Notation + Ord, V: Notation> Serialize for OvsMap<K, V> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        self.to_wire().serialize(serializer)
    }
}

impl<'de, K: Notation + Ord, V: Notation> Deserialize<'de> for OvsMap<K, V> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Self::from_wire(&value).map_err(serde::de::Error::custom)
    }
}
