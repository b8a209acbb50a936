//! Relational row management
//!
//! OVSDB keeps referential integrity: a non-root row survives only while a
//! parent references it. Creating one therefore means "insert the child and
//! add its named uuid to the parent's column" in one transaction, and
//! removing one means "drop it from the parent's column" (and, for owned
//! rows, deleting it too). [`ConfigService`] builds those transactions from
//! the [`Table`] registry, checks preconditions against the [`RowCache`],
//! and hands the batch to the [`Transport`].
//!
//! The `build_*` functions are pure and return the transaction plus the
//! index of the insert whose committed uuid the caller wants back.

use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::cache::RowCache;
use crate::correlate::correlate_response;
use crate::notation::{Condition, Mutation, OvsSet, Row, RowUuid};
use crate::operation::Operation;
use crate::outcome::{Outcome, StatusCode};
use crate::tables::{Database, Ownership, ParentLink, Table};
use crate::transact::TransactBuilder;
use crate::transport::Transport;

/// Mutate `parent.column` to include the named child, then insert the
/// child. The returned index is the insert.
pub fn build_insert_and_link(
    db: Database,
    link: ParentLink,
    parent_uuid: &RowUuid,
    child: Table,
    row: Row,
) -> (TransactBuilder, usize) {
    let uuid_name = child.descriptor().uuid_name;
    let mut tx = TransactBuilder::new(db.name());
    tx.add_operation(Operation::mutate(
        link.table.name(),
        vec![Condition::uuid_equals(parent_uuid)],
        vec![Mutation::insert(link.column, &RowUuid::named(uuid_name))],
    ));
    let index = tx.add_operation(Operation::insert_named(child.name(), uuid_name, row));
    (tx, index)
}

/// Remove `child_uuid` from `parent.column` of every parent holding it,
/// followed by a delete of the child itself when `ownership` is
/// [`Ownership::Owned`]. Root tables are deleted directly.
pub fn build_unlink_and_delete(
    db: Database,
    table: Table,
    child_uuid: &RowUuid,
) -> TransactBuilder {
    let descriptor = table.descriptor();
    let mut tx = TransactBuilder::new(db.name());

    let link = match descriptor.ownership {
        Ownership::Root => None,
        Ownership::Owned | Ownership::Referenced => descriptor.parent,
    };
    if let Some(link) = link {
        tx.add_operation(Operation::mutate(
            link.table.name(),
            vec![Condition::includes(link.column, child_uuid)],
            vec![Mutation::delete(link.column, child_uuid)],
        ));
    }

    if link.is_none() || descriptor.ownership == Ownership::Owned {
        tx.add_operation(Operation::delete(
            table.name(),
            vec![Condition::uuid_equals(child_uuid)],
        ));
    }
    tx
}

/// Single insert of a row nobody has to reference
pub fn build_insert_root(db: Database, table: Table, row: Row) -> (TransactBuilder, usize) {
    let mut tx = TransactBuilder::new(db.name());
    let index = tx.add_operation(Operation::insert_named(
        table.name(),
        table.descriptor().uuid_name,
        row,
    ));
    (tx, index)
}

pub fn build_update(db: Database, table: Table, uuid: &RowUuid, row: Row) -> TransactBuilder {
    let mut tx = TransactBuilder::new(db.name());
    tx.add_operation(Operation::update(
        table.name(),
        vec![Condition::uuid_equals(uuid)],
        row,
    ));
    tx
}

/// A port cannot exist without an interface. Link the port into the
/// bridge, insert the port with one named interface, and insert that
/// interface.
pub fn build_insert_port(
    db: Database,
    bridge_uuid: &RowUuid,
    mut port_row: Row,
    interface_row: Row,
) -> (TransactBuilder, usize) {
    let port = Table::Port.descriptor();
    let interface = Table::Interface.descriptor();

    port_row.set(
        "interfaces",
        &OvsSet::single(RowUuid::named(interface.uuid_name)),
    );

    let mut tx = TransactBuilder::new(db.name());
    tx.add_operation(Operation::mutate(
        Table::Bridge.name(),
        vec![Condition::uuid_equals(bridge_uuid)],
        vec![Mutation::insert("ports", &RowUuid::named(port.uuid_name))],
    ));
    let index = tx.add_operation(Operation::insert_named(
        port.name,
        port.uuid_name,
        port_row,
    ));
    tx.add_operation(Operation::insert_named(
        interface.name,
        interface.uuid_name,
        interface_row,
    ));
    (tx, index)
}

/// Row-level configuration of an OVSDB server
#[derive(Clone)]
pub struct ConfigService {
    transport: Arc<dyn Transport>,
    cache: Arc<dyn RowCache>,
}

impl ConfigService {
    pub fn new(transport: Arc<dyn Transport>, cache: Arc<dyn RowCache>) -> Self {
        Self { transport, cache }
    }

    pub fn cache(&self) -> &dyn RowCache {
        self.cache.as_ref()
    }

    /// First cached row of `table` whose `name` column is `name`
    pub(crate) fn find_by_name(&self, table: Table, name: &str) -> Option<RowUuid> {
        self.cache
            .all_rows(table)
            .into_iter()
            .find(|(_, row)| matches!(row.get::<String>("name"), Ok(Some(n)) if n == name))
            .map(|(uuid, _)| RowUuid::committed(uuid))
    }

    /// Submit `tx` and correlate its results. Results are attached to `tx`
    /// for inspection whether or not the batch failed.
    pub async fn execute(
        &self,
        tx: &mut TransactBuilder,
        insert_index: Option<usize>,
    ) -> Outcome {
        if !self.transport.is_connected() {
            warn!("No connection to ovsdb-server for {} transaction", tx.db_name());
            return Outcome::failure(
                StatusCode::ServiceUnavailable,
                "Connection to ovsdb-server not available",
            );
        }

        debug!(
            "OVSDB transact on {} ({} operations)",
            tx.db_name(),
            tx.len()
        );
        let response = self.transport.transact(tx).await;
        correlate_response(tx, response, insert_index)
    }

    /// Resolve the parent row for a child of `table`: the given uuid when it
    /// is cached, or the only row of a singleton parent.
    fn resolve_parent(
        &self,
        link: ParentLink,
        parent_uuid: Option<&str>,
    ) -> Result<RowUuid, Outcome> {
        match parent_uuid {
            Some(uuid) => self
                .cache
                .lookup(link.table, uuid)
                .map(|_| RowUuid::committed(uuid))
                .ok_or_else(|| Outcome::not_found(format!("{} {}", link.table, uuid))),
            None if link.table.is_singleton() => self
                .cache
                .all_rows(link.table)
                .into_iter()
                .next()
                .map(|(uuid, _)| RowUuid::committed(uuid))
                .ok_or_else(|| Outcome::not_found(format!("{} row", link.table))),
            None => Err(Outcome::not_found(format!(
                "parent {} uuid required",
                link.table
            ))),
        }
    }

    /// Insert a child row and reference it from its parent. Root tables
    /// only get linked when a parent is named.
    pub async fn insert_and_link(
        &self,
        table: Table,
        parent_uuid: Option<&str>,
        row: Row,
    ) -> Outcome {
        let descriptor = table.descriptor();
        let link = match (descriptor.parent, descriptor.ownership, parent_uuid) {
            (Some(_), Ownership::Root, None) | (None, _, _) => {
                return self.insert_root(table, row).await
            }
            (Some(link), _, _) => link,
        };
        let parent = match self.resolve_parent(link, parent_uuid) {
            Ok(parent) => parent,
            Err(outcome) => return outcome,
        };
        let (mut tx, index) = build_insert_and_link(table.database(), link, &parent, table, row);
        self.execute(&mut tx, Some(index)).await
    }

    pub async fn insert_root(&self, table: Table, row: Row) -> Outcome {
        let (mut tx, index) = build_insert_root(table.database(), table, row);
        self.execute(&mut tx, Some(index)).await
    }

    /// Unlink a row from its parent and, depending on ownership, delete it
    pub async fn unlink_and_delete(&self, table: Table, uuid: &str) -> Outcome {
        if self.cache.lookup(table, uuid).is_none() {
            return Outcome::not_found(format!("{} {}", table, uuid));
        }
        let mut tx = build_unlink_and_delete(table.database(), table, &RowUuid::committed(uuid));
        info!("Deleting {} {} ({:?})", table, uuid, table.descriptor().ownership);
        self.execute(&mut tx, None).await
    }

    pub async fn insert_port(&self, bridge_uuid: Option<&str>, port_row: Row) -> Outcome {
        let port_name = match port_row.get::<String>("name") {
            Ok(Some(name)) => name,
            Ok(None) => return Outcome::failure(StatusCode::InternalError, "Port row has no name"),
            Err(e) => return Outcome::from(e),
        };
        let link = ParentLink {
            table: Table::Bridge,
            column: "ports",
        };
        let bridge = match self.resolve_parent(link, bridge_uuid) {
            Ok(bridge) => bridge,
            Err(outcome) => return outcome,
        };
        let interface_row = Row::new().with("name", &port_name);
        let (mut tx, index) =
            build_insert_port(Database::OpenVSwitch, &bridge, port_row, interface_row);
        self.execute(&mut tx, Some(index)).await
    }

    /// Insert a row into `table_name` of `db`, dispatching on the registry.
    /// Ports get their mandatory interface in the same transaction.
    pub async fn insert_row(
        &self,
        db: Database,
        table_name: &str,
        parent_uuid: Option<&str>,
        row: Row,
    ) -> Outcome {
        let Some(table) = Table::from_name(db, table_name) else {
            return Outcome::not_found(format!("table {} in {}", table_name, db));
        };
        if !table.descriptor().insertable {
            return Outcome::not_implemented(format!("insert into {}", table));
        }
        match table {
            Table::Port => self.insert_port(parent_uuid, row).await,
            _ => self.insert_and_link(table, parent_uuid, row).await,
        }
    }

    pub async fn delete_row(&self, db: Database, table_name: &str, uuid: &str) -> Outcome {
        let Some(table) = Table::from_name(db, table_name) else {
            return Outcome::not_found(format!("table {} in {}", table_name, db));
        };
        if !table.descriptor().deletable {
            return Outcome::not_implemented(format!("delete from {}", table));
        }
        self.unlink_and_delete(table, uuid).await
    }

    /// Overwrite the given columns of an existing row
    pub async fn update_row(
        &self,
        db: Database,
        table_name: &str,
        uuid: &str,
        row: Row,
    ) -> Outcome {
        let Some(table) = Table::from_name(db, table_name) else {
            return Outcome::not_found(format!("table {} in {}", table_name, db));
        };
        if self.cache.lookup(table, uuid).is_none() {
            return Outcome::not_found(format!("{} {}", table, uuid));
        }
        let mut tx = build_update(db, table, &RowUuid::committed(uuid), row);
        self.execute(&mut tx, None).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn params(tx: &TransactBuilder) -> serde_json::Value {
        tx.params().unwrap()
    }

    #[test]
    fn test_insert_and_link_shape() {
        let link = Table::Port.descriptor().parent.unwrap();
        let (tx, index) = build_insert_and_link(
            Database::OpenVSwitch,
            link,
            &RowUuid::committed("P"),
            Table::Port,
            Row::new().with("name", &"eth0".to_string()),
        );
        assert_eq!(index, 1);
        assert_eq!(
            params(&tx),
            json!([
                "Open_vSwitch",
                {
                    "op": "mutate",
                    "table": "Bridge",
                    "where": [["_uuid", "==", ["uuid", "P"]]],
                    "mutations": [["ports", "insert", ["named-uuid", "new_port"]]]
                },
                {
                    "op": "insert",
                    "table": "Port",
                    "uuid-name": "new_port",
                    "row": {"name": "eth0"}
                }
            ])
        );
    }

    #[test]
    fn test_delete_by_ownership() {
        let uuid = RowUuid::committed("c1");

        let owned = build_unlink_and_delete(Database::OpenVSwitch, Table::Bridge, &uuid);
        let kinds: Vec<_> = owned.operations().iter().map(|op| op.kind()).collect();
        assert_eq!(kinds, ["mutate", "delete"]);
        assert_eq!(
            params(&owned)[1]["where"],
            json!([["bridges", "includes", ["uuid", "c1"]]])
        );
        assert_eq!(
            params(&owned)[1]["mutations"],
            json!([["bridges", "delete", ["uuid", "c1"]]])
        );

        let referenced = build_unlink_and_delete(Database::OpenVSwitch, Table::Controller, &uuid);
        assert_eq!(referenced.len(), 1);
        assert_eq!(referenced.operations()[0].kind(), "mutate");
        assert_eq!(referenced.operations()[0].table(), "Bridge");

        let root = build_unlink_and_delete(Database::OpenVSwitch, Table::Queue, &uuid);
        assert_eq!(root.len(), 1);
        assert_eq!(root.operations()[0].kind(), "delete");
        assert_eq!(root.operations()[0].table(), "Queue");

        // root with a back-reference still never touches the parent
        let qos = build_unlink_and_delete(Database::OpenVSwitch, Table::Qos, &uuid);
        assert_eq!(qos.len(), 1);
        assert_eq!(qos.operations()[0].kind(), "delete");
    }

    #[test]
    fn test_insert_port_carries_interface() {
        let (tx, index) = build_insert_port(
            Database::OpenVSwitch,
            &RowUuid::committed("br"),
            Row::new().with("name", &"vif0".to_string()),
            Row::new().with("name", &"vif0".to_string()),
        );
        assert_eq!(index, 1);
        let p = params(&tx);
        assert_eq!(p[2]["row"]["interfaces"], json!(["named-uuid", "new_interface"]));
        assert_eq!(
            p[3],
            json!({
                "op": "insert",
                "table": "Interface",
                "uuid-name": "new_interface",
                "row": {"name": "vif0"}
            })
        );
    }

    #[test]
    fn test_update_targets_one_row() {
        let tx = build_update(
            Database::OpenVSwitch,
            Table::Interface,
            &RowUuid::committed("i1"),
            Row::new().with("type", &"internal".to_string()),
        );
        assert_eq!(
            params(&tx)[1],
            json!({
                "op": "update",
                "table": "Interface",
                "where": [["_uuid", "==", ["uuid", "i1"]]],
                "row": {"type": "internal"}
            })
        );
    }
}
