//! OVSDB operations and their results (RFC 7047 section 5.2)

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use crate::error::{OvsdbError, Result};
use crate::notation::{Condition, Mutation, Row, RowUuid};

/// Operation kinds this engine can encode and decode
pub const OPERATION_KINDS: &[&str] = &["insert", "select", "update", "mutate", "delete"];

/// `error` of a result entry that could not be decoded
pub const MALFORMED_RESULT: &str = "malformed result";

/// One request inside a `transact` call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "lowercase")]
pub enum Operation {
    Insert {
        table: String,
        /// Name other operations in the same transaction use to refer to
        /// this row before it has a real uuid
        #[serde(rename = "uuid-name", default, skip_serializing_if = "Option::is_none")]
        uuid_name: Option<String>,
        row: Row,
    },
    Select {
        table: String,
        #[serde(rename = "where", default)]
        conditions: Vec<Condition>,
        /// `None` selects every column
        #[serde(default, skip_serializing_if = "Option::is_none")]
        columns: Option<Vec<String>>,
    },
    Update {
        table: String,
        #[serde(rename = "where", default)]
        conditions: Vec<Condition>,
        row: Row,
    },
    Mutate {
        table: String,
        #[serde(rename = "where", default)]
        conditions: Vec<Condition>,
        mutations: Vec<Mutation>,
    },
    Delete {
        table: String,
        #[serde(rename = "where", default)]
        conditions: Vec<Condition>,
    },
}

impl Operation {
    pub fn insert(table: impl Into<String>, row: Row) -> Self {
        Operation::Insert {
            table: table.into(),
            uuid_name: None,
            row,
        }
    }

    /// Insert that later operations can reference as `RowUuid::named(name)`
    pub fn insert_named(table: impl Into<String>, name: impl Into<String>, row: Row) -> Self {
        Operation::Insert {
            table: table.into(),
            uuid_name: Some(name.into()),
            row,
        }
    }

    pub fn select(table: impl Into<String>, conditions: Vec<Condition>) -> Self {
        Operation::Select {
            table: table.into(),
            conditions,
            columns: None,
        }
    }

    pub fn select_columns(
        table: impl Into<String>,
        conditions: Vec<Condition>,
        columns: Vec<String>,
    ) -> Self {
        Operation::Select {
            table: table.into(),
            conditions,
            columns: Some(columns),
        }
    }

    pub fn update(table: impl Into<String>, conditions: Vec<Condition>, row: Row) -> Self {
        Operation::Update {
            table: table.into(),
            conditions,
            row,
        }
    }

    pub fn mutate(
        table: impl Into<String>,
        conditions: Vec<Condition>,
        mutations: Vec<Mutation>,
    ) -> Self {
        Operation::Mutate {
            table: table.into(),
            conditions,
            mutations,
        }
    }

    pub fn delete(table: impl Into<String>, conditions: Vec<Condition>) -> Self {
        Operation::Delete {
            table: table.into(),
            conditions,
        }
    }

    /// Wire name of the operation kind
    pub fn kind(&self) -> &'static str {
        match self {
            Operation::Insert { .. } => "insert",
            Operation::Select { .. } => "select",
            Operation::Update { .. } => "update",
            Operation::Mutate { .. } => "mutate",
            Operation::Delete { .. } => "delete",
        }
    }

    pub fn table(&self) -> &str {
        match self {
            Operation::Insert { table, .. }
            | Operation::Select { table, .. }
            | Operation::Update { table, .. }
            | Operation::Mutate { table, .. }
            | Operation::Delete { table, .. } => table,
        }
    }

    /// The `uuid-name` of an insert
    pub fn uuid_name(&self) -> Option<&str> {
        match self {
            Operation::Insert { uuid_name, .. } => uuid_name.as_deref(),
            _ => None,
        }
    }

    pub fn to_value(&self) -> Result<Value> {
        Ok(serde_json::to_value(self)?)
    }

    /// Decode one operation object. An unknown `op` is rejected outright:
    /// dropping it would shift every later result onto the wrong request.
    pub fn from_value(value: &Value) -> Result<Self> {
        let kind = value
            .get("op")
            .and_then(Value::as_str)
            .ok_or_else(|| OvsdbError::UnknownOperation(format!("missing 'op' in {}", value)))?;
        if !OPERATION_KINDS.contains(&kind) {
            return Err(OvsdbError::UnknownOperation(kind.to_string()));
        }
        serde_json::from_value(value.clone())
            .map_err(|e| OvsdbError::malformed(format!("{} operation: {}", kind, e)))
    }
}

/// Server reply for one operation, in the same position as its request
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OperationResult {
    /// Set for inserts
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uuid: Option<RowUuid>,
    /// Set for selects
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rows: Option<Vec<Row>>,
    /// Set for update, mutate and delete
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub count: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl OperationResult {
    pub fn with_uuid(uuid: RowUuid) -> Self {
        Self {
            uuid: Some(uuid),
            ..Default::default()
        }
    }

    pub fn with_count(count: u64) -> Self {
        Self {
            count: Some(count),
            ..Default::default()
        }
    }

    pub fn with_rows(rows: Vec<Row>) -> Self {
        Self {
            rows: Some(rows),
            ..Default::default()
        }
    }

    pub fn with_error(error: impl Into<String>, details: impl Into<String>) -> Self {
        Self {
            error: Some(error.into()),
            details: Some(details.into()),
            ..Default::default()
        }
    }

    /// True when `error` is present and not blank
    pub fn has_error(&self) -> bool {
        self.error.as_deref().is_some_and(|e| !e.trim().is_empty())
    }

    /// `"<error> : <details>"`
    pub fn error_message(&self) -> String {
        format!(
            "{} : {}",
            self.error.as_deref().unwrap_or_default(),
            self.details.as_deref().unwrap_or_default()
        )
    }

    /// Decode a `transact` result array. `null` entries, which the server
    /// sends for operations skipped after an earlier failure, become empty
    /// results so positions stay aligned. An entry that does not decode
    /// becomes a failed result in its own position; only a non-array reply
    /// is an error for the whole batch.
    pub fn decode_all(value: &Value) -> Result<Vec<OperationResult>> {
        let entries = value.as_array().ok_or_else(|| {
            OvsdbError::malformed(format!("transact result must be an array, got {}", value))
        })?;
        Ok(entries
            .iter()
            .enumerate()
            .map(|(index, entry)| Self::decode_entry(index, entry))
            .collect())
    }

    fn decode_entry(index: usize, entry: &Value) -> OperationResult {
        match serde_json::from_value::<Option<OperationResult>>(entry.clone()) {
            Ok(result) => result.unwrap_or_default(),
            Err(e) => {
                warn!("Malformed result at position {}: {}", index, e);
                OperationResult::with_error(MALFORMED_RESULT, format!("{}: {}", e, entry))
            }
        }
    }
}
