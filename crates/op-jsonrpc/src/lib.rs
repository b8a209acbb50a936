//! op-jsonrpc: OVSDB JSON-RPC client
//!
//! This crate provides:
//! - OVSDB JSON-RPC 1.0 message types
//! - Client configuration (socket probing, `OVSDB_REMOTE`)
//! - A socket client implementing the `op-ovsdb` transport, plus
//!   `list_dbs`, `get_schema`, `echo` and `monitor`

pub mod config;
pub mod ovsdb;
pub mod protocol;

pub use config::{ClientConfig, Endpoint};
pub use ovsdb::{MonitorSession, OvsdbClient};

/// Prelude for convenient imports
pub mod prelude {
    pub use super::config::{ClientConfig, Endpoint};
    pub use super::ovsdb::{MonitorSession, OvsdbClient};
    pub use super::protocol::{JsonRpcRequest, JsonRpcResponse, Message};
}
