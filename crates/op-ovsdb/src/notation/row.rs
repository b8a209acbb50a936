//! Table rows as column maps

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::{Notation, RowUuid};
use crate::error::Result;

/// One row: column name to encoded value.
///
/// Rows are payloads for insert/update and what select and monitor hand
/// back. Columns are written and read through [`Notation`], so a row never
/// holds a value in anything but its wire shape.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Row(Map<String, Value>);

impl Row {
    pub fn new() -> Self {
        Row(Map::new())
    }

    /// Builder-style column setter
    pub fn with(mut self, column: impl Into<String>, value: &impl Notation) -> Self {
        self.set(column, value);
        self
    }

    pub fn set(&mut self, column: impl Into<String>, value: &impl Notation) {
        self.0.insert(column.into(), value.to_wire());
    }

    /// Decode a column. Absent columns are `Ok(None)`; a present column
    /// that does not decode is an error.
    pub fn get<T: Notation>(&self, column: &str) -> Result<Option<T>> {
        self.0.get(column).map(T::from_wire).transpose()
    }

    pub fn get_raw(&self, column: &str) -> Option<&Value> {
        self.0.get(column)
    }

    pub fn remove(&mut self, column: &str) -> Option<Value> {
        self.0.remove(column)
    }

    pub fn contains(&self, column: &str) -> bool {
        self.0.contains_key(column)
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    /// The `_uuid` column, present on rows returned by the server
    pub fn uuid(&self) -> Result<Option<RowUuid>> {
        self.get("_uuid")
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Map<String, Value>> for Row {
    fn from(map: Map<String, Value>) -> Self {
        Row(map)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::OvsdbError;
    use crate::notation::OvsSet;
    use serde_json::json;

    #[test]
    fn test_row_builder_encodes_columns() {
        let row = Row::new()
            .with("name", &"eth0".to_string())
            .with("interfaces", &OvsSet::single(RowUuid::named("new_interface")));
        assert_eq!(
            serde_json::to_value(&row).unwrap(),
            json!({"name": "eth0", "interfaces": ["named-uuid", "new_interface"]})
        );
    }

    #[test]
    fn test_absent_column_differs_from_malformed() {
        let row: Row = serde_json::from_value(json!({"ports": ["set", "oops"]})).unwrap();
        assert!(row.get::<OvsSet<RowUuid>>("missing").unwrap().is_none());
        let err = row.get::<OvsSet<RowUuid>>("ports").unwrap_err();
        assert!(matches!(err, OvsdbError::MalformedValue(_)));
    }

    #[test]
    fn test_row_uuid_column() {
        let row: Row = serde_json::from_value(json!({"_uuid": ["uuid", "abc"]})).unwrap();
        assert_eq!(row.uuid().unwrap(), Some(RowUuid::committed("abc")));
    }
}
