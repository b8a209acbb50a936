//! Transport collaborator
//!
//! The engine never opens sockets. Whatever carries `transact` to the
//! server implements [`Transport`]; `op-jsonrpc` ships the socket one.

use async_trait::async_trait;
use std::sync::Arc;

use crate::error::Result;
use crate::operation::OperationResult;
use crate::transact::TransactBuilder;

#[async_trait]
pub trait Transport: Send + Sync {
    /// Submit the transaction and return the server's result array as is,
    /// one entry per operation plus any trailing commit error.
    async fn transact(&self, tx: &TransactBuilder) -> Result<Vec<OperationResult>>;

    /// Whether a request has a chance of reaching the server
    fn is_connected(&self) -> bool;
}

#[async_trait]
impl<T: Transport + ?Sized> Transport for Arc<T> {
    async fn transact(&self, tx: &TransactBuilder) -> Result<Vec<OperationResult>> {
        (**self).transact(tx).await
    }

    fn is_connected(&self) -> bool {
        (**self).is_connected()
    }
}
