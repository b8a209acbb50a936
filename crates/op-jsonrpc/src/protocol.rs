//! OVSDB JSON-RPC 1.0 message types
//!
//! OVSDB speaks JSON-RPC 1.0 (RFC 7047 section 4): no `jsonrpc` field,
//! `error` is an arbitrary JSON value, and a notification is a request whose
//! `id` is null.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// JSON-RPC request (or notification when `id` is null)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcRequest {
    pub method: String,
    #[serde(default)]
    pub params: Value,
    #[serde(default)]
    pub id: Value,
}

impl JsonRpcRequest {
    /// Create a request with a specific ID
    pub fn with_id(method: impl Into<String>, params: Value, id: Value) -> Self {
        Self {
            method: method.into(),
            params,
            id,
        }
    }

    pub fn is_notification(&self) -> bool {
        self.id.is_null()
    }
}

/// JSON-RPC response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    #[serde(default)]
    pub result: Value,
    #[serde(default)]
    pub error: Value,
    pub id: Value,
}

impl JsonRpcResponse {
    /// Create a success response
    pub fn success(id: Value, result: Value) -> Self {
        Self {
            result,
            error: Value::Null,
            id,
        }
    }

    pub fn is_error(&self) -> bool {
        !self.error.is_null()
    }
}

/// Anything the server can send
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    Request(JsonRpcRequest),
    Response(JsonRpcResponse),
}

/// Method names used on the wire
pub mod methods {
    pub const LIST_DBS: &str = "list_dbs";
    pub const GET_SCHEMA: &str = "get_schema";
    pub const ECHO: &str = "echo";
    pub const TRANSACT: &str = "transact";
    pub const MONITOR: &str = "monitor";
    pub const UPDATE: &str = "update";
}

/// Classify a decoded JSON value as a request/notification or a response
pub fn parse_message(value: Value) -> Result<Message, serde_json::Error> {
    if value.get("method").is_some() {
        serde_json::from_value(value).map(Message::Request)
    } else {
        serde_json::from_value(value).map(Message::Response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_request_serialization() {
        let req = JsonRpcRequest::with_id("list_dbs", json!([]), json!(1));
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json, json!({"method": "list_dbs", "params": [], "id": 1}));
        assert!(!req.is_notification());
    }

    #[test]
    fn test_parse_notification() {
        let msg = parse_message(json!({
            "method": "update",
            "params": [null, {}],
            "id": null
        }))
        .unwrap();
        match msg {
            Message::Request(req) => {
                assert_eq!(req.method, methods::UPDATE);
                assert!(req.is_notification());
            }
            other => panic!("expected request, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_error_response() {
        let msg = parse_message(json!({
            "result": null,
            "error": "unknown database",
            "id": 3
        }))
        .unwrap();
        match msg {
            Message::Response(resp) => {
                assert!(resp.is_error());
                assert_eq!(resp.id, json!(3));
            }
            other => panic!("expected response, got {:?}", other),
        }
    }
}
