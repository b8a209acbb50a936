//! OVSDB JSON-RPC client
//!
//! Talks to ovsdb-server over its Unix socket (or a TCP remote). Each call
//! opens its own stream, sends one request and reads messages until the
//! matching reply arrives, answering server `echo` requests on the way.
//! `monitor` keeps its stream open and forwards `update` notifications.

use async_trait::async_trait;
use serde::Serialize;
use serde_json::{json, Value};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::{TcpStream, UnixStream};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use op_ovsdb::error::{OvsdbError, Result};
use op_ovsdb::monitor::{parse_update_notification, MonitorRequestBuilder, TableUpdates};
use op_ovsdb::{Condition, Database, Operation, OperationResult, Row, TransactBuilder, Transport};

use crate::config::{ClientConfig, Endpoint};
use crate::protocol::{methods, parse_message, JsonRpcRequest, JsonRpcResponse, Message};

const READ_CHUNK: usize = 8192;

trait RpcStream: AsyncRead + AsyncWrite + Unpin + Send {}
impl<T: AsyncRead + AsyncWrite + Unpin + Send> RpcStream for T {}

/// One JSON-RPC stream. Messages are concatenated JSON texts with no
/// framing, so reads accumulate until a whole value parses.
struct Connection {
    stream: Box<dyn RpcStream>,
    buf: Vec<u8>,
}

impl Connection {
    fn new(stream: Box<dyn RpcStream>) -> Self {
        Self {
            stream,
            buf: Vec::new(),
        }
    }

    async fn send(&mut self, message: &impl Serialize) -> Result<()> {
        let bytes = serde_json::to_vec(message)?;
        debug!("OVSDB send: {}", String::from_utf8_lossy(&bytes));
        self.stream.write_all(&bytes).await?;
        self.stream.flush().await?;
        Ok(())
    }

    fn take_value(&mut self) -> Result<Option<Value>> {
        let (value, consumed) = {
            let mut values = serde_json::Deserializer::from_slice(&self.buf).into_iter::<Value>();
            match values.next() {
                Some(Ok(value)) => (value, values.byte_offset()),
                Some(Err(e)) if e.is_eof() => return Ok(None),
                Some(Err(e)) => return Err(e.into()),
                None => {
                    self.buf.clear();
                    return Ok(None);
                }
            }
        };
        self.buf.drain(..consumed);
        Ok(Some(value))
    }

    /// Next whole message, or `None` once the peer closed the stream
    async fn next_message(&mut self) -> Result<Option<Message>> {
        let mut chunk = [0u8; READ_CHUNK];
        loop {
            if let Some(value) = self.take_value()? {
                debug!("OVSDB recv: {}", value);
                return Ok(Some(parse_message(value)?));
            }
            let n = self.stream.read(&mut chunk).await?;
            if n == 0 {
                if self.buf.iter().all(u8::is_ascii_whitespace) {
                    return Ok(None);
                }
                return Err(OvsdbError::malformed(format!(
                    "stream closed inside a message ({} bytes pending)",
                    self.buf.len()
                )));
            }
            self.buf.extend_from_slice(&chunk[..n]);
        }
    }

    async fn answer_echo(&mut self, request: JsonRpcRequest) -> Result<()> {
        let reply = JsonRpcResponse::success(request.id, request.params);
        self.send(&reply).await
    }

    /// Send a request and wait for the reply carrying the same id
    async fn call(&mut self, id: u64, method: &str, params: Value) -> Result<Value> {
        self.send(&JsonRpcRequest::with_id(method, params, json!(id)))
            .await?;

        loop {
            match self.next_message().await? {
                Some(Message::Response(resp)) if resp.id == json!(id) => {
                    if resp.is_error() {
                        return Err(OvsdbError::Rpc(format!("{}: {}", method, resp.error)));
                    }
                    return Ok(resp.result);
                }
                Some(Message::Response(resp)) => {
                    warn!("Dropping OVSDB reply for unknown id {}", resp.id);
                }
                Some(Message::Request(req)) if req.method == methods::ECHO => {
                    self.answer_echo(req).await?;
                }
                Some(Message::Request(req)) if req.is_notification() => {
                    debug!("Ignoring OVSDB {} notification during {}", req.method, method);
                }
                Some(Message::Request(req)) => {
                    warn!("Ignoring OVSDB {} request while waiting for {}", req.method, method);
                }
                None => {
                    return Err(OvsdbError::unavailable(format!(
                        "connection closed before {} reply",
                        method
                    )))
                }
            }
        }
    }
}

/// OVSDB JSON-RPC client
pub struct OvsdbClient {
    config: ClientConfig,
    next_id: AtomicU64,
}

impl OvsdbClient {
    /// Client for the first standard socket that exists
    pub fn new() -> Self {
        Self::with_config(ClientConfig::default())
    }

    pub fn with_config(config: ClientConfig) -> Self {
        Self {
            config,
            next_id: AtomicU64::new(1),
        }
    }

    /// Create with a custom socket path
    pub fn with_socket(socket_path: impl Into<PathBuf>) -> Self {
        Self::with_config(ClientConfig::new(Endpoint::Unix(socket_path.into())))
    }

    /// Set timeout for RPC calls
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout = timeout;
        self
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    async fn connect(&self) -> Result<Connection> {
        let endpoint = &self.config.endpoint;
        let stream: std::io::Result<Box<dyn RpcStream>> = match endpoint {
            Endpoint::Unix(path) => UnixStream::connect(path)
                .await
                .map(|s| Box::new(s) as Box<dyn RpcStream>),
            Endpoint::Tcp(addr) => TcpStream::connect(addr.as_str())
                .await
                .map(|s| Box::new(s) as Box<dyn RpcStream>),
        };
        stream
            .map(Connection::new)
            .map_err(|e| {
                OvsdbError::unavailable(format!("Failed to connect to {}: {}", endpoint, e))
            })
    }

    async fn with_timeout_of<T>(
        &self,
        method: &str,
        fut: impl std::future::Future<Output = Result<T>>,
    ) -> Result<T> {
        tokio::time::timeout(self.config.timeout, fut)
            .await
            .map_err(|_| OvsdbError::Timeout(format!("{} on {}", method, self.config.endpoint)))?
    }

    /// Send a JSON-RPC request and get its result
    async fn rpc_call(&self, method: &str, params: Value) -> Result<Value> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.with_timeout_of(method, async {
            let mut conn = self.connect().await?;
            conn.call(id, method, params).await
        })
        .await
    }

    /// List all databases
    pub async fn list_dbs(&self) -> Result<Vec<String>> {
        let result = self.rpc_call(methods::LIST_DBS, json!([])).await?;
        Ok(serde_json::from_value(result)?)
    }

    /// Get schema for a database
    pub async fn get_schema(&self, db: &str) -> Result<Value> {
        self.rpc_call(methods::GET_SCHEMA, json!([db])).await
    }

    /// Round-trip `payload` through the server
    pub async fn echo(&self, payload: Value) -> Result<Value> {
        self.rpc_call(methods::ECHO, payload).await
    }

    /// Execute a transaction and return the raw positional results
    pub async fn transact(&self, tx: &TransactBuilder) -> Result<Vec<OperationResult>> {
        let result = self.rpc_call(methods::TRANSACT, tx.params()?).await?;
        OperationResult::decode_all(&result)
    }

    /// Select rows of one table
    pub async fn select_rows(
        &self,
        db: Database,
        table: &str,
        conditions: Vec<Condition>,
    ) -> Result<Vec<Row>> {
        let mut tx = TransactBuilder::new(db.name());
        tx.add_operation(Operation::select(table, conditions));
        let mut results = self.transact(&tx).await?.into_iter();
        match results.next() {
            Some(result) if result.has_error() => Err(OvsdbError::OperationFailed {
                error: result.error.unwrap_or_default(),
                details: result.details.unwrap_or_default(),
            }),
            Some(result) => Ok(result.rows.unwrap_or_default()),
            None => Err(OvsdbError::ProtocolAnomaly(format!(
                "no result for select on {}",
                table
            ))),
        }
    }

    /// Start a monitor. The initial contents come back with the session;
    /// later changes arrive through [`MonitorSession::next_update`].
    pub async fn monitor(&self, request: &MonitorRequestBuilder) -> Result<MonitorSession> {
        if !request.has_requests() {
            return Err(OvsdbError::internal("monitor request names no tables"));
        }
        let params = request.params()?;
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (conn, initial) = self
            .with_timeout_of(methods::MONITOR, async {
                let mut conn = self.connect().await?;
                let result = conn.call(id, methods::MONITOR, params).await?;
                Ok((conn, TableUpdates::from_value(&result)?))
            })
            .await?;

        info!(
            "Monitoring {} on {}",
            request.db_name(),
            self.config.endpoint
        );
        let (sender, updates) = mpsc::channel(64);
        let task = tokio::spawn(forward_updates(conn, sender));
        Ok(MonitorSession {
            initial,
            updates,
            task,
        })
    }
}

impl Default for OvsdbClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for OvsdbClient {
    async fn transact(&self, tx: &TransactBuilder) -> Result<Vec<OperationResult>> {
        OvsdbClient::transact(self, tx).await
    }

    fn is_connected(&self) -> bool {
        match &self.config.endpoint {
            Endpoint::Unix(path) => path.exists(),
            // Reachability of a TCP remote is only known on connect
            Endpoint::Tcp(_) => true,
        }
    }
}

async fn forward_updates(mut conn: Connection, sender: mpsc::Sender<Result<TableUpdates>>) {
    loop {
        let update = match conn.next_message().await {
            Ok(Some(Message::Request(req))) if req.method == methods::UPDATE => {
                parse_update_notification(&req.params).map(|(_, updates)| updates)
            }
            Ok(Some(Message::Request(req))) if req.method == methods::ECHO => {
                if let Err(e) = conn.answer_echo(req).await {
                    warn!("Failed to answer OVSDB echo: {}", e);
                    let _ = sender.send(Err(e)).await;
                    return;
                }
                continue;
            }
            Ok(Some(other)) => {
                debug!("Ignoring OVSDB message on monitor stream: {:?}", other);
                continue;
            }
            Ok(None) => {
                info!("OVSDB monitor stream closed");
                return;
            }
            Err(e) => Err(e),
        };
        let failed = update.is_err();
        if sender.send(update).await.is_err() || failed {
            return;
        }
    }
}

/// Live monitor: initial snapshot plus a stream of changes
pub struct MonitorSession {
    initial: TableUpdates,
    updates: mpsc::Receiver<Result<TableUpdates>>,
    task: JoinHandle<()>,
}

impl MonitorSession {
    pub fn initial(&self) -> &TableUpdates {
        &self.initial
    }

    /// Next `update` notification; `None` once the stream has ended
    pub async fn next_update(&mut self) -> Option<Result<TableUpdates>> {
        self.updates.recv().await
    }
}

impl Drop for MonitorSession {
    fn drop(&mut self) {
        self.task.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use op_ovsdb::{ConfigService, InMemoryCache, RowCache, RowUuid, StatusCode, Table};
    use std::sync::Arc;
    use tokio::net::UnixListener;

    /// Fake ovsdb-server: accepts one connection and answers each request
    /// with whatever `reply` returns for it.
    fn spawn_server<F>(listener: UnixListener, reply: F) -> JoinHandle<()>
    where
        F: Fn(&JsonRpcRequest) -> Vec<Value> + Send + 'static,
    {
        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut conn = Connection::new(Box::new(stream));
            while let Ok(Some(Message::Request(req))) = conn.next_message().await {
                for message in reply(&req) {
                    conn.send(&message).await.unwrap();
                }
            }
        })
    }

    fn bind() -> (tempfile::TempDir, PathBuf, UnixListener) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("db.sock");
        let listener = UnixListener::bind(&path).unwrap();
        (dir, path, listener)
    }

    #[tokio::test]
    async fn test_list_dbs() {
        let (_dir, path, listener) = bind();
        spawn_server(listener, |req| {
            assert_eq!(req.method, "list_dbs");
            vec![json!({"result": ["Open_vSwitch", "hardware_vtep"], "error": null, "id": req.id})]
        });
        let client = OvsdbClient::with_socket(&path);
        assert_eq!(
            client.list_dbs().await.unwrap(),
            vec!["Open_vSwitch".to_string(), "hardware_vtep".to_string()]
        );
    }

    #[tokio::test]
    async fn test_transact_positional_results() {
        let (_dir, path, listener) = bind();
        spawn_server(listener, |req| {
            assert_eq!(req.method, "transact");
            assert_eq!(req.params[0], "Open_vSwitch");
            vec![json!({
                "result": [{"count": 1}, {"uuid": ["uuid", "1234"]}],
                "error": null,
                "id": req.id
            })]
        });

        let mut tx = TransactBuilder::new("Open_vSwitch");
        tx.add_operation(Operation::update("Bridge", vec![], Row::new()));
        tx.add_operation(Operation::insert("Port", Row::new()));
        let results = OvsdbClient::with_socket(&path).transact(&tx).await.unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].count, Some(1));
        assert_eq!(results[1].uuid, Some(RowUuid::committed("1234")));
    }

    #[tokio::test]
    async fn test_server_echo_answered_before_reply() {
        let (_dir, path, listener) = bind();
        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut conn = Connection::new(Box::new(stream));
            let req = match conn.next_message().await.unwrap() {
                Some(Message::Request(req)) => req,
                other => panic!("expected transact, got {:?}", other),
            };
            conn.send(&json!({"method": "echo", "params": ["ping"], "id": "keepalive"}))
                .await
                .unwrap();
            match conn.next_message().await.unwrap() {
                Some(Message::Response(resp)) => {
                    assert_eq!(resp.id, json!("keepalive"));
                    assert_eq!(resp.result, json!(["ping"]));
                }
                other => panic!("expected echo reply, got {:?}", other),
            }
            conn.send(&json!({"result": [{"count": 0}], "error": null, "id": req.id}))
                .await
                .unwrap();
        });

        let mut tx = TransactBuilder::new("Open_vSwitch");
        tx.add_operation(Operation::delete("Queue", vec![]));
        let results = OvsdbClient::with_socket(&path)
            .with_timeout(Duration::from_secs(5))
            .transact(&tx)
            .await
            .unwrap();
        assert_eq!(results[0].count, Some(0));
    }

    #[tokio::test]
    async fn test_rpc_error() {
        let (_dir, path, listener) = bind();
        spawn_server(listener, |req| {
            vec![json!({"result": null, "error": "unknown database", "id": req.id})]
        });
        let err = OvsdbClient::with_socket(&path)
            .get_schema("nope")
            .await
            .unwrap_err();
        assert!(matches!(err, OvsdbError::Rpc(ref m) if m.contains("unknown database")));
    }

    #[tokio::test]
    async fn test_split_reply_is_reassembled() {
        let (_dir, path, listener) = bind();
        tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 1024];
            let _ = stream.read(&mut buf).await.unwrap();
            stream.write_all(br#"{"result": ["Open_v"#).await.unwrap();
            stream.flush().await.unwrap();
            tokio::time::sleep(Duration::from_millis(20)).await;
            stream.write_all(br#"Switch"], "error": null, "id": 1}"#).await.unwrap();
        });
        let dbs = OvsdbClient::with_socket(&path).list_dbs().await.unwrap();
        assert_eq!(dbs, vec!["Open_vSwitch".to_string()]);
    }

    #[tokio::test]
    async fn test_missing_socket_is_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let client = OvsdbClient::with_socket(dir.path().join("absent.sock"));
        assert!(!Transport::is_connected(&client));

        let err = client.list_dbs().await.unwrap_err();
        assert!(err.is_connection_failure());

        let service = ConfigService::new(Arc::new(client), Arc::new(InMemoryCache::new()));
        let outcome = service
            .insert_root(Table::Queue, Row::new().with("dscp", &10i64))
            .await;
        assert_eq!(outcome.code(), StatusCode::ServiceUnavailable);
    }

    #[tokio::test]
    async fn test_timeout() {
        let (_dir, path, listener) = bind();
        spawn_server(listener, |_| vec![]);
        let err = OvsdbClient::with_socket(&path)
            .with_timeout(Duration::from_millis(50))
            .list_dbs()
            .await
            .unwrap_err();
        assert!(matches!(err, OvsdbError::Timeout(_)));
    }

    #[tokio::test]
    async fn test_monitor_feeds_cache() {
        let (_dir, path, listener) = bind();
        spawn_server(listener, |req| {
            assert_eq!(req.method, "monitor");
            assert_eq!(req.params[1], Value::Null);
            vec![
                json!({
                    "result": {"Bridge": {"b1": {"new": {"name": "br0"}}}},
                    "error": null,
                    "id": req.id
                }),
                json!({
                    "method": "update",
                    "params": [null, {"Bridge": {"b2": {"new": {"name": "br1"}}}}],
                    "id": null
                }),
            ]
        });

        let mut request = MonitorRequestBuilder::new("Open_vSwitch");
        request.monitor("Bridge").columns(["name", "ports"]);
        let mut session = OvsdbClient::with_socket(&path).monitor(&request).await.unwrap();
        assert!(session.initial().table("Bridge").is_some());

        let cache = InMemoryCache::new();
        cache.apply(Database::OpenVSwitch, session.initial());
        let update = session.next_update().await.unwrap().unwrap();
        cache.apply(Database::OpenVSwitch, &update);
        assert_eq!(cache.all_rows(Table::Bridge).len(), 2);
    }
}
