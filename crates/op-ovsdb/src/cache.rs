//! Row cache collaborator
//!
//! The relational helpers check preconditions (parent exists, child exists,
//! a logical switch of that name exists) against a local copy of the
//! database instead of round-tripping a select. Keeping that copy current is
//! the job of whoever consumes monitor updates.

use std::collections::{BTreeMap, HashMap};
use std::sync::{PoisonError, RwLock};
use tracing::debug;

use crate::monitor::TableUpdates;
use crate::notation::Row;
use crate::tables::{Database, Table};

/// Read access to locally cached rows, keyed by committed uuid
pub trait RowCache: Send + Sync {
    fn lookup(&self, table: Table, uuid: &str) -> Option<Row>;

    /// Every cached row of `table`, as (uuid, row)
    fn all_rows(&self, table: Table) -> Vec<(String, Row)>;
}

/// Process-local cache fed by monitor snapshots
#[derive(Debug, Default)]
pub struct InMemoryCache {
    tables: RwLock<HashMap<Table, BTreeMap<String, Row>>>,
}

impl InMemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&self, table: Table, uuid: impl Into<String>, row: Row) {
        let mut tables = self.tables.write().unwrap_or_else(PoisonError::into_inner);
        tables.entry(table).or_default().insert(uuid.into(), row);
    }

    pub fn remove(&self, table: Table, uuid: &str) -> Option<Row> {
        let mut tables = self.tables.write().unwrap_or_else(PoisonError::into_inner);
        tables.get_mut(&table).and_then(|rows| rows.remove(uuid))
    }

    pub fn clear(&self) {
        self.tables
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    /// Store each row's `new` contents, or drop the row when `new` is
    /// absent. Tables outside the registry are skipped.
    pub fn apply(&self, db: Database, updates: &TableUpdates) {
        for (name, update) in &updates.0 {
            let Some(table) = Table::from_name(db, name) else {
                debug!("Ignoring updates for unregistered table {}.{}", db, name);
                continue;
            };
            for (uuid, row_update) in update.rows() {
                match &row_update.new {
                    Some(row) => self.put(table, uuid, row.clone()),
                    None => {
                        self.remove(table, uuid);
                    }
                }
            }
        }
    }
}

impl RowCache for InMemoryCache {
    fn lookup(&self, table: Table, uuid: &str) -> Option<Row> {
        let tables = self.tables.read().unwrap_or_else(PoisonError::into_inner);
        tables.get(&table).and_then(|rows| rows.get(uuid)).cloned()
    }

    fn all_rows(&self, table: Table) -> Vec<(String, Row)> {
        let tables = self.tables.read().unwrap_or_else(PoisonError::into_inner);
        tables
            .get(&table)
            .map(|rows| rows.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
            .unwrap_or_default()
    }
}
