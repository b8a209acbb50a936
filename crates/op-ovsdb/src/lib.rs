//! op-ovsdb: OVSDB protocol engine
//!
//! This crate provides:
//! - Typed OVSDB wire notation (uuids, sets, maps, conditions, mutations, rows)
//! - Transaction and monitor request builders
//! - Positional result correlation into a single [`Outcome`]
//! - A table registry for `Open_vSwitch` and `hardware_vtep`
//! - Relational insert/delete/update helpers
//! - Name-level bridge/port operations and VTEP operations
//!
//! Sockets live elsewhere: the engine talks to a [`Transport`] and reads
//! preconditions from a [`RowCache`].

pub mod bridge;
pub mod cache;
pub mod correlate;
pub mod error;
pub mod monitor;
pub mod notation;
pub mod operation;
pub mod outcome;
pub mod relational;
pub mod tables;
pub mod transact;
pub mod transport;
pub mod vtep;

pub use bridge::PortKind;
pub use cache::{InMemoryCache, RowCache};
pub use correlate::{correlate, correlate_response};
pub use error::{OvsdbError, Result};
pub use monitor::{MonitorRequestBuilder, TableUpdates};
pub use notation::{Condition, Mutation, Notation, OvsMap, OvsSet, Row, RowUuid};
pub use operation::{Operation, OperationResult};
pub use outcome::{Outcome, StatusCode};
pub use relational::ConfigService;
pub use tables::{Database, Ownership, Table};
pub use transact::TransactBuilder;
pub use transport::Transport;
pub use vtep::VlanBinding;

/// Prelude for convenient imports
pub mod prelude {
    pub use super::bridge::PortKind;
    pub use super::cache::{InMemoryCache, RowCache};
    pub use super::notation::{Condition, Mutation, Notation, OvsMap, OvsSet, Row, RowUuid};
    pub use super::operation::Operation;
    pub use super::outcome::{Outcome, StatusCode};
    pub use super::relational::ConfigService;
    pub use super::tables::{Database, Table};
    pub use super::transact::TransactBuilder;
    pub use super::transport::Transport;
}
