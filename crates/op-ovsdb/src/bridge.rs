//! Name-level `Open_vSwitch` configuration: bridges, ports and managers
//!
//! These are the `ovs-vsctl add-br` / `add-port` style requests. Names are
//! resolved against the row cache, then the row-level builders in
//! [`crate::relational`] produce the transaction.

use tracing::{debug, info};

use crate::notation::{Condition, Mutation, Mutator, OvsMap, OvsSet, Row, RowUuid};
use crate::operation::Operation;
use crate::outcome::Outcome;
use crate::relational::{build_insert_port, build_unlink_and_delete, ConfigService};
use crate::tables::{Database, Table};
use crate::transact::TransactBuilder;

/// Flavour of a port added by name
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum PortKind {
    #[default]
    Plain,
    /// Interface of `tunnel_type` (`vxlan`, `gre`, ..) towards `remote_ip`
    Tunnel {
        tunnel_type: String,
        remote_ip: String,
    },
    /// Access port carrying one vlan tag
    Vlan(u16),
    /// Patch interface; its `peer` goes in the options
    Patch,
}

fn name_of(row: &Row) -> Option<String> {
    row.get::<String>("name").ok().flatten()
}

impl ConfigService {
    /// Names of every cached bridge, sorted
    pub fn bridge_domains(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .cache()
            .all_rows(Table::Bridge)
            .iter()
            .filter_map(|(_, row)| name_of(row))
            .collect();
        names.sort();
        names
    }

    pub fn find_bridge(&self, name: &str) -> Option<RowUuid> {
        self.find_by_name(Table::Bridge, name)
    }

    /// Port named `port` among the ports of `bridge`
    fn find_bridge_port(&self, bridge: &RowUuid, port: &str) -> Option<RowUuid> {
        let ports = self
            .cache()
            .lookup(Table::Bridge, bridge.as_str())?
            .get::<OvsSet<RowUuid>>("ports")
            .ok()
            .flatten()
            .unwrap_or_default();
        self.cache()
            .all_rows(Table::Port)
            .into_iter()
            .find(|(uuid, row)| {
                ports.contains(&RowUuid::committed(uuid.as_str()))
                    && name_of(row).as_deref() == Some(port)
            })
            .map(|(uuid, _)| RowUuid::committed(uuid))
    }

    fn root_row(&self) -> Option<RowUuid> {
        self.cache()
            .all_rows(Table::OpenVSwitch)
            .into_iter()
            .next()
            .map(|(uuid, _)| RowUuid::committed(uuid))
    }

    /// Create a bridge with its internal port and interface of the same
    /// name, and bump `next_cfg` so ovs-vswitchd picks it up.
    pub async fn create_bridge_domain(&self, name: &str) -> Outcome {
        let Some(root) = self.root_row() else {
            return Outcome::not_found("Open_vSwitch row");
        };
        let bridge = Table::Bridge.descriptor();
        let port = Table::Port.descriptor();
        let interface = Table::Interface.descriptor();

        let mut tx = TransactBuilder::new(Database::OpenVSwitch.name());
        tx.add_operation(Operation::mutate(
            Table::OpenVSwitch.name(),
            vec![Condition::uuid_equals(&root)],
            vec![Mutation::insert("bridges", &RowUuid::named(bridge.uuid_name))],
        ));
        tx.add_operation(Operation::insert_named(
            interface.name,
            interface.uuid_name,
            Row::new()
                .with("name", &name.to_string())
                .with("type", &"internal".to_string()),
        ));
        tx.add_operation(Operation::insert_named(
            port.name,
            port.uuid_name,
            Row::new()
                .with("name", &name.to_string())
                .with("interfaces", &OvsSet::single(RowUuid::named(interface.uuid_name))),
        ));
        let index = tx.add_operation(Operation::insert_named(
            bridge.name,
            bridge.uuid_name,
            Row::new()
                .with("name", &name.to_string())
                .with("ports", &OvsSet::single(RowUuid::named(port.uuid_name))),
        ));
        tx.add_operation(Operation::mutate(
            Table::OpenVSwitch.name(),
            vec![Condition::uuid_equals(&root)],
            vec![Mutation::new("next_cfg", Mutator::Sum, &1i64)],
        ));

        info!("Creating bridge {}", name);
        self.execute(&mut tx, Some(index)).await
    }

    pub async fn delete_bridge_domain(&self, name: &str) -> Outcome {
        let Some(bridge) = self.find_bridge(name) else {
            return Outcome::not_found(format!("Bridge {}", name));
        };
        let mut tx = build_unlink_and_delete(Database::OpenVSwitch, Table::Bridge, &bridge);
        info!("Deleting bridge {} ({})", name, bridge);
        self.execute(&mut tx, None).await
    }

    /// Add a port and its interface to the named bridge. `options` become
    /// the interface's `options` column.
    pub async fn add_port(
        &self,
        bridge: &str,
        port: &str,
        kind: PortKind,
        mut options: OvsMap<String, String>,
    ) -> Outcome {
        let Some(bridge_uuid) = self.find_bridge(bridge) else {
            return Outcome::not_found(format!("Bridge {}", bridge));
        };

        let mut port_row = Row::new().with("name", &port.to_string());
        let mut interface_row = Row::new().with("name", &port.to_string());
        match kind {
            PortKind::Plain => {}
            PortKind::Tunnel {
                tunnel_type,
                remote_ip,
            } => {
                interface_row.set("type", &tunnel_type);
                options.insert("remote_ip".to_string(), remote_ip);
            }
            PortKind::Vlan(tag) => port_row.set("tag", &OvsSet::single(i64::from(tag))),
            PortKind::Patch => interface_row.set("type", &"patch".to_string()),
        }
        if !options.is_empty() {
            interface_row.set("options", &options);
        }

        let (mut tx, index) =
            build_insert_port(Database::OpenVSwitch, &bridge_uuid, port_row, interface_row);
        info!("Adding port {} to {}", port, bridge);
        self.execute(&mut tx, Some(index)).await
    }

    pub async fn delete_port(&self, bridge: &str, port: &str) -> Outcome {
        let Some(bridge_uuid) = self.find_bridge(bridge) else {
            return Outcome::not_found(format!("Bridge {}", bridge));
        };
        let Some(port_uuid) = self.find_bridge_port(&bridge_uuid, port) else {
            return Outcome::not_found(format!("Port {} on {}", port, bridge));
        };
        let mut tx = build_unlink_and_delete(Database::OpenVSwitch, Table::Port, &port_uuid);
        info!("Deleting port {} from {}", port, bridge);
        self.execute(&mut tx, None).await
    }

    /// Point ovsdb-server at a manager (`tcp:IP:PORT`, `ptcp:PORT`, ..).
    /// An existing Manager row with the same target is reused.
    pub async fn set_manager(&self, target: &str) -> Outcome {
        let existing = self
            .cache()
            .all_rows(Table::Manager)
            .into_iter()
            .find(|(_, row)| matches!(row.get::<String>("target"), Ok(Some(t)) if t == target));
        if let Some((uuid, _)) = existing {
            debug!("Manager {} already configured", target);
            return Outcome::success_with_uuid(RowUuid::committed(uuid));
        }
        info!("Setting manager {}", target);
        let row = Row::new().with("target", &target.to_string());
        self.insert_and_link(Table::Manager, None, row).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::InMemoryCache;
    use crate::error::Result;
    use crate::operation::OperationResult;
    use crate::outcome::StatusCode;
    use crate::transport::Transport;
    use async_trait::async_trait;
    use serde_json::{json, Value};
    use std::sync::{Arc, Mutex};

    /// Answers every operation with an empty result, remembering the params
    #[derive(Default)]
    struct Recorder {
        sent: Mutex<Vec<Value>>,
    }

    #[async_trait]
    impl Transport for Recorder {
        async fn transact(&self, tx: &TransactBuilder) -> Result<Vec<OperationResult>> {
            self.sent.lock().unwrap().push(tx.params()?);
            let mut results = vec![OperationResult::default(); tx.len()];
            if let Some(insert) = tx.operations().iter().position(|op| op.kind() == "insert") {
                results[insert] = OperationResult::with_uuid(RowUuid::committed("c0ffee"));
            }
            Ok(results)
        }

        fn is_connected(&self) -> bool {
            true
        }
    }

    fn fixture() -> (ConfigService, Arc<Recorder>) {
        let cache = InMemoryCache::new();
        cache.put(Table::OpenVSwitch, "root", Row::new());
        cache.put(
            Table::Bridge,
            "b1",
            serde_json::from_value(json!({"name": "br-int", "ports": ["uuid", "p1"]})).unwrap(),
        );
        cache.put(Table::Bridge, "b2", Row::new().with("name", &"br-ex".to_string()));
        cache.put(Table::Port, "p1", Row::new().with("name", &"vif0".to_string()));
        cache.put(Table::Port, "p2", Row::new().with("name", &"vif0".to_string()));
        cache.put(
            Table::Manager,
            "mgr1",
            Row::new().with("target", &"ptcp:6640".to_string()),
        );
        let recorder = Arc::new(Recorder::default());
        (ConfigService::new(recorder.clone(), Arc::new(cache)), recorder)
    }

    fn last(recorder: &Recorder) -> Value {
        recorder.sent.lock().unwrap().last().cloned().unwrap()
    }

    #[test]
    fn test_bridge_domains_sorted() {
        let (service, _) = fixture();
        assert_eq!(service.bridge_domains(), vec!["br-ex", "br-int"]);
    }

    #[tokio::test]
    async fn test_create_bridge_domain() {
        let (service, recorder) = fixture();
        let outcome = service.create_bridge_domain("br0").await;
        assert!(outcome.is_success());

        let sent = last(&recorder);
        let ops = sent.as_array().unwrap();
        assert_eq!(ops.len(), 6);
        assert_eq!(
            ops[1]["mutations"],
            json!([["bridges", "insert", ["named-uuid", "new_bridge"]]])
        );
        assert_eq!(ops[2]["row"], json!({"name": "br0", "type": "internal"}));
        assert_eq!(ops[3]["row"]["interfaces"], json!(["named-uuid", "new_interface"]));
        assert_eq!(ops[4]["uuid-name"], "new_bridge");
        assert_eq!(ops[4]["row"]["ports"], json!(["named-uuid", "new_port"]));
        assert_eq!(ops[5]["mutations"], json!([["next_cfg", "+=", 1]]));
    }

    #[tokio::test]
    async fn test_create_bridge_needs_root_row() {
        let recorder = Arc::new(Recorder::default());
        let service = ConfigService::new(recorder.clone(), Arc::new(InMemoryCache::new()));
        let outcome = service.create_bridge_domain("br0").await;
        assert_eq!(outcome.code(), StatusCode::NotFound);
        assert!(recorder.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_add_tunnel_port() {
        let (service, recorder) = fixture();
        let kind = PortKind::Tunnel {
            tunnel_type: "vxlan".into(),
            remote_ip: "192.0.2.7".into(),
        };
        let outcome = service
            .add_port("br-int", "vx0", kind, OvsMap::new())
            .await;
        assert_eq!(outcome.uuid(), Some(&RowUuid::committed("c0ffee")));

        let sent = last(&recorder);
        assert_eq!(sent[1]["where"], json!([["_uuid", "==", ["uuid", "b1"]]]));
        assert_eq!(
            sent[3]["row"],
            json!({
                "name": "vx0",
                "type": "vxlan",
                "options": ["map", [["remote_ip", "192.0.2.7"]]]
            })
        );
    }

    #[tokio::test]
    async fn test_add_vlan_port() {
        let (service, recorder) = fixture();
        let outcome = service
            .add_port("br-int", "vif9", PortKind::Vlan(100), OvsMap::new())
            .await;
        assert!(outcome.is_success());
        let sent = last(&recorder);
        assert_eq!(sent[2]["row"]["tag"], json!(100));
        assert_eq!(sent[3]["row"], json!({"name": "vif9"}));
    }

    #[tokio::test]
    async fn test_delete_port_only_from_its_bridge() {
        let (service, recorder) = fixture();
        assert!(service.delete_port("br-int", "vif0").await.is_success());
        let sent = last(&recorder);
        assert_eq!(sent[1]["mutations"], json!([["ports", "delete", ["uuid", "p1"]]]));
        assert_eq!(sent[2]["op"], "delete");

        let outcome = service.delete_port("br-ex", "vif0").await;
        assert_eq!(outcome.code(), StatusCode::NotFound);
    }

    #[tokio::test]
    async fn test_delete_bridge_domain() {
        let (service, recorder) = fixture();
        assert!(service.delete_bridge_domain("br-ex").await.is_success());
        let sent = last(&recorder);
        assert_eq!(sent[1]["table"], "Open_vSwitch");
        assert_eq!(sent[2]["where"], json!([["_uuid", "==", ["uuid", "b2"]]]));

        let outcome = service.delete_bridge_domain("br-nope").await;
        assert_eq!(outcome.code(), StatusCode::NotFound);
    }

    #[tokio::test]
    async fn test_set_manager() {
        let (service, recorder) = fixture();
        let outcome = service.set_manager("ptcp:6640").await;
        assert_eq!(outcome.uuid(), Some(&RowUuid::committed("mgr1")));
        assert!(recorder.sent.lock().unwrap().is_empty());

        let outcome = service.set_manager("tcp:192.0.2.1:6640").await;
        assert_eq!(outcome.uuid(), Some(&RowUuid::committed("c0ffee")));
        let sent = last(&recorder);
        assert_eq!(
            sent[1]["mutations"],
            json!([["manager_options", "insert", ["named-uuid", "new_manager"]]])
        );
        assert_eq!(sent[2]["row"], json!({"target": "tcp:192.0.2.1:6640"}));
    }
}
