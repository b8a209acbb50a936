//! Monitor requests and the table-update shapes they produce
//!
//! `monitor` params are `[db_name, monitor_id, {table: {columns, select}}]`.
//! The reply, and every later `update` notification, carries
//! `{table: {row_uuid: {old?, new?}}}`. Applying those updates to a local
//! cache is left to the caller.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::BTreeMap;

use crate::error::{OvsdbError, Result};
use crate::notation::Row;

/// JSON-RPC method name for the request
pub const MONITOR_METHOD: &str = "monitor";
/// JSON-RPC method name of the server notification
pub const UPDATE_METHOD: &str = "update";

/// Which kinds of change a monitor reports
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonitorSelect {
    pub initial: bool,
    pub insert: bool,
    pub delete: bool,
    pub modify: bool,
}

impl Default for MonitorSelect {
    fn default() -> Self {
        Self {
            initial: true,
            insert: true,
            delete: true,
            modify: true,
        }
    }
}

/// Subscription for a single table
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MonitorRequest {
    /// Columns to report; `None` means all of them
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub columns: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub select: Option<MonitorSelect>,
}

impl MonitorRequest {
    pub fn column(&mut self, column: impl Into<String>) -> &mut Self {
        self.columns.get_or_insert_with(Vec::new).push(column.into());
        self
    }

    pub fn columns<I, S>(&mut self, columns: I) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let list = self.columns.get_or_insert_with(Vec::new);
        list.extend(columns.into_iter().map(Into::into));
        self
    }

    pub fn select(&mut self, select: MonitorSelect) -> &mut Self {
        self.select = Some(select);
        self
    }
}

/// Builds the params of one `monitor` call
#[derive(Debug, Clone)]
pub struct MonitorRequestBuilder {
    db_name: String,
    requests: BTreeMap<String, MonitorRequest>,
}

impl MonitorRequestBuilder {
    pub fn new(db_name: impl Into<String>) -> Self {
        Self {
            db_name: db_name.into(),
            requests: BTreeMap::new(),
        }
    }

    pub fn db_name(&self) -> &str {
        &self.db_name
    }

    /// Subscribe to `table`, returning its request for further tuning.
    /// Calling it twice for the same table returns the existing request.
    pub fn monitor(&mut self, table: impl Into<String>) -> &mut MonitorRequest {
        self.requests.entry(table.into()).or_default()
    }

    pub fn has_requests(&self) -> bool {
        !self.requests.is_empty()
    }

    pub fn tables(&self) -> impl Iterator<Item = &str> {
        self.requests.keys().map(String::as_str)
    }

    /// `[db_name, null, {table: request, ...}]`
    pub fn params(&self) -> Result<Value> {
        Ok(json!([self.db_name, Value::Null, serde_json::to_value(&self.requests)?]))
    }
}

/// Old and new contents of one row
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RowUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub old: Option<Row>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new: Option<Row>,
}

impl RowUpdate {
    pub fn is_insert(&self) -> bool {
        self.old.is_none() && self.new.is_some()
    }

    pub fn is_delete(&self) -> bool {
        self.old.is_some() && self.new.is_none()
    }

    pub fn is_modify(&self) -> bool {
        self.old.is_some() && self.new.is_some()
    }
}

/// Row uuid to row update, for one table
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TableUpdate(pub BTreeMap<String, RowUpdate>);

impl TableUpdate {
    pub fn rows(&self) -> impl Iterator<Item = (&str, &RowUpdate)> {
        self.0.iter().map(|(uuid, update)| (uuid.as_str(), update))
    }

    pub fn get(&self, uuid: &str) -> Option<&RowUpdate> {
        self.0.get(uuid)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Table name to table update
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TableUpdates(pub BTreeMap<String, TableUpdate>);

impl TableUpdates {
    pub fn from_value(value: &Value) -> Result<Self> {
        serde_json::from_value(value.clone())
            .map_err(|e| OvsdbError::malformed(format!("table updates: {}", e)))
    }

    pub fn tables(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn table(&self, name: &str) -> Option<&TableUpdate> {
        self.0.get(name)
    }

    pub fn is_empty(&self) -> bool {
        self.0.values().all(TableUpdate::is_empty)
    }
}

/// Split the params of an `update` notification into its monitor id and
/// table updates.
pub fn parse_update_notification(params: &Value) -> Result<(Value, TableUpdates)> {
    match params.as_array().map(Vec::as_slice) {
        Some([monitor_id, updates]) => Ok((monitor_id.clone(), TableUpdates::from_value(updates)?)),
        _ => Err(OvsdbError::malformed(format!(
            "update notification must be [monitor_id, table_updates]: {}",
            params
        ))),
    }
}
