//! End-to-end relational helpers against a scripted transport

use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use op_ovsdb::prelude::*;
use op_ovsdb::{OperationResult, OvsdbError, Result};

/// Hands out queued responses in order and records what was sent
struct ScriptedTransport {
    connected: bool,
    responses: Mutex<VecDeque<Result<Vec<OperationResult>>>>,
    sent: Mutex<Vec<Value>>,
}

impl ScriptedTransport {
    fn new(responses: Vec<Result<Vec<OperationResult>>>) -> Arc<Self> {
        Arc::new(Self {
            connected: true,
            responses: Mutex::new(responses.into()),
            sent: Mutex::new(Vec::new()),
        })
    }

    fn disconnected() -> Arc<Self> {
        Arc::new(Self {
            connected: false,
            responses: Mutex::new(VecDeque::new()),
            sent: Mutex::new(Vec::new()),
        })
    }

    fn sent(&self) -> Vec<Value> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn transact(&self, tx: &TransactBuilder) -> Result<Vec<OperationResult>> {
        self.sent.lock().unwrap().push(tx.params()?);
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(OvsdbError::internal("no scripted response")))
    }

    fn is_connected(&self) -> bool {
        self.connected
    }
}

fn ovs_cache() -> Arc<InMemoryCache> {
    let cache = InMemoryCache::new();
    cache.put(Table::OpenVSwitch, "root", Row::new());
    cache.put(Table::Bridge, "P", Row::new().with("name", &"br0".to_string()));
    cache.put(Table::Port, "port1", Row::new().with("name", &"eth1".to_string()));
    cache.put(Table::Controller, "ctl1", Row::new());
    Arc::new(cache)
}

fn service(transport: Arc<ScriptedTransport>) -> ConfigService {
    ConfigService::new(transport, ovs_cache())
}

#[tokio::test]
async fn test_insert_port_resolves_committed_uuid() {
    let transport = ScriptedTransport::new(vec![Ok(vec![
        OperationResult::with_count(1),
        OperationResult::with_uuid(RowUuid::committed("1234")),
        OperationResult::with_uuid(RowUuid::committed("5678")),
    ])]);
    let outcome = service(transport.clone())
        .insert_row(
            Database::OpenVSwitch,
            "Port",
            Some("P"),
            Row::new().with("name", &"eth0".to_string()),
        )
        .await;

    assert!(outcome.is_success(), "{}", outcome);
    assert_eq!(outcome.uuid(), Some(&RowUuid::committed("1234")));

    let sent = transport.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0][0], "Open_vSwitch");
    assert_eq!(
        sent[0][1]["mutations"],
        json!([["ports", "insert", ["named-uuid", "new_port"]]])
    );
    assert_eq!(sent[0][2]["uuid-name"], "new_port");
    assert_eq!(sent[0][3]["table"], "Interface");
}

#[tokio::test]
async fn test_referential_integrity_error_fails() {
    let transport = ScriptedTransport::new(vec![Ok(vec![
        OperationResult::with_error("referential integrity violation", "row is referenced"),
        OperationResult::with_uuid(RowUuid::committed("1234")),
    ])]);
    let outcome = service(transport)
        .insert_and_link(
            Table::Mirror,
            Some("P"),
            Row::new().with("name", &"m0".to_string()),
        )
        .await;
    assert_eq!(outcome.code(), StatusCode::OperationFailed);
    assert!(outcome
        .description()
        .unwrap()
        .contains("referential integrity violation"));
}

#[tokio::test]
async fn test_trailing_commit_error_is_anomaly() {
    let transport = ScriptedTransport::new(vec![Ok(vec![
        OperationResult::with_count(1),
        OperationResult::with_uuid(RowUuid::committed("1234")),
        OperationResult::with_error("constraint violation", "duplicate name"),
    ])]);
    let outcome = service(transport)
        .insert_and_link(Table::Bridge, None, Row::new().with("name", &"br1".to_string()))
        .await;
    assert_eq!(outcome.code(), StatusCode::ProtocolAnomaly);
}

#[tokio::test]
async fn test_bridge_links_into_singleton_root() {
    let transport = ScriptedTransport::new(vec![Ok(vec![
        OperationResult::with_count(1),
        OperationResult::with_uuid(RowUuid::committed("b9")),
    ])]);
    let outcome = service(transport.clone())
        .insert_row(
            Database::OpenVSwitch,
            "Bridge",
            None,
            Row::new().with("name", &"br1".to_string()),
        )
        .await;
    assert_eq!(outcome.uuid(), Some(&RowUuid::committed("b9")));
    assert_eq!(
        transport.sent()[0][1]["where"],
        json!([["_uuid", "==", ["uuid", "root"]]])
    );
}

#[tokio::test]
async fn test_preconditions_never_reach_transport() {
    let transport = ScriptedTransport::new(vec![]);
    let service = service(transport.clone());

    let outcome = service
        .insert_row(Database::OpenVSwitch, "Port", Some("missing"), Row::new())
        .await;
    assert_eq!(outcome.code(), StatusCode::NotFound);

    let outcome = service
        .insert_row(Database::OpenVSwitch, "Interface", None, Row::new())
        .await;
    assert_eq!(outcome.code(), StatusCode::NotFound);

    let outcome = service
        .delete_row(Database::OpenVSwitch, "Bridge", "missing")
        .await;
    assert_eq!(outcome.code(), StatusCode::NotFound);

    let outcome = service
        .insert_row(Database::OpenVSwitch, "Open_vSwitch", None, Row::new())
        .await;
    assert_eq!(outcome.code(), StatusCode::NotImplemented);

    let outcome = service
        .insert_row(Database::OpenVSwitch, "No_Such_Table", None, Row::new())
        .await;
    assert_eq!(outcome.code(), StatusCode::NotFound);

    assert!(transport.sent().is_empty());
}

#[tokio::test]
async fn test_delete_follows_ownership() {
    let transport = ScriptedTransport::new(vec![
        Ok(vec![OperationResult::with_count(1), OperationResult::with_count(1)]),
        Ok(vec![OperationResult::with_count(1)]),
    ]);
    let service = service(transport.clone());

    assert!(service
        .delete_row(Database::OpenVSwitch, "port", "port1")
        .await
        .is_success());
    assert!(service
        .delete_row(Database::OpenVSwitch, "Controller", "ctl1")
        .await
        .is_success());

    let sent = transport.sent();
    assert_eq!(sent[0][1]["op"], "mutate");
    assert_eq!(sent[0][1]["table"], "Bridge");
    assert_eq!(sent[0][2]["op"], "delete");
    assert_eq!(sent[0][2]["table"], "Port");
    assert_eq!(sent[1].as_array().unwrap().len(), 2);
    assert_eq!(sent[1][1]["op"], "mutate");
}

#[tokio::test]
async fn test_update_row() {
    let transport = ScriptedTransport::new(vec![Ok(vec![OperationResult::with_count(1)])]);
    let outcome = service(transport.clone())
        .update_row(
            Database::OpenVSwitch,
            "Bridge",
            "P",
            Row::new().with("stp_enable", &true),
        )
        .await;
    assert!(outcome.is_success());
    assert!(outcome.uuid().is_none());
    assert_eq!(transport.sent()[0][1]["row"], json!({"stp_enable": true}));
}

#[tokio::test]
async fn test_transport_failures_become_outcomes() {
    let outcome = service(ScriptedTransport::disconnected())
        .insert_root(Table::Queue, Row::new())
        .await;
    assert_eq!(outcome.code(), StatusCode::ServiceUnavailable);

    let transport = ScriptedTransport::new(vec![Err(OvsdbError::Rpc("unknown database".into()))]);
    let outcome = service(transport).insert_root(Table::Queue, Row::new()).await;
    assert_eq!(outcome.code(), StatusCode::InternalError);
}

#[tokio::test]
async fn test_root_table_without_parent_is_plain_insert() {
    let transport = ScriptedTransport::new(vec![
        Ok(vec![OperationResult::with_uuid(RowUuid::committed("q1"))]),
        Ok(vec![
            OperationResult::with_count(1),
            OperationResult::with_uuid(RowUuid::committed("q2")),
        ]),
    ]);
    let service = service(transport.clone());
    let qos = || Row::new().with("type", &"linux-htb".to_string());

    let outcome = service
        .insert_row(Database::OpenVSwitch, "QoS", None, qos())
        .await;
    assert_eq!(outcome.uuid(), Some(&RowUuid::committed("q1")));

    let outcome = service
        .insert_row(Database::OpenVSwitch, "QoS", Some("port1"), qos())
        .await;
    assert_eq!(outcome.uuid(), Some(&RowUuid::committed("q2")));

    let sent = transport.sent();
    assert_eq!(sent[0].as_array().unwrap().len(), 2);
    assert_eq!(sent[0][1]["op"], "insert");
    assert_eq!(sent[0][1]["table"], "QoS");
    assert_eq!(sent[1][1]["table"], "Port");
    assert_eq!(
        sent[1][1]["mutations"],
        json!([["qos", "insert", ["named-uuid", "new_qos"]]])
    );
}

#[tokio::test]
async fn test_update_requires_cached_row() {
    let transport = ScriptedTransport::new(vec![]);
    let outcome = service(transport.clone())
        .update_row(
            Database::OpenVSwitch,
            "Bridge",
            "not-cached",
            Row::new().with("stp_enable", &true),
        )
        .await;
    assert_eq!(outcome.code(), StatusCode::NotFound);
    assert!(transport.sent().is_empty());
}
