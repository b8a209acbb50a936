//! Transaction builder for the `transact` RPC

use serde_json::Value;

use crate::error::Result;
use crate::operation::{Operation, OperationResult};

/// JSON-RPC method name
pub const TRANSACT_METHOD: &str = "transact";

/// Ordered batch of operations against one database.
///
/// Positions matter: the server answers with one result per operation in
/// the same order, and that order is the only link between a request and
/// its result. Nothing here checks that named uuids resolve; the server
/// does that once the whole batch has run.
#[derive(Debug, Clone)]
pub struct TransactBuilder {
    db_name: String,
    operations: Vec<Operation>,
    results: Vec<Option<OperationResult>>,
}

impl TransactBuilder {
    pub fn new(db_name: impl Into<String>) -> Self {
        Self {
            db_name: db_name.into(),
            operations: Vec::new(),
            results: Vec::new(),
        }
    }

    pub fn db_name(&self) -> &str {
        &self.db_name
    }

    /// Append an operation and return its position
    pub fn add_operation(&mut self, op: Operation) -> usize {
        self.operations.push(op);
        self.results.push(None);
        self.operations.len() - 1
    }

    pub fn add_operations(&mut self, ops: impl IntoIterator<Item = Operation>) {
        for op in ops {
            self.add_operation(op);
        }
    }

    pub fn operations(&self) -> &[Operation] {
        &self.operations
    }

    /// Position of the first operation equal to `op`
    pub fn index_of(&self, op: &Operation) -> Option<usize> {
        self.operations.iter().position(|o| o == op)
    }

    pub fn len(&self) -> usize {
        self.operations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    /// `[db_name, op1, op2, ...]`
    pub fn params(&self) -> Result<Value> {
        let mut params = Vec::with_capacity(self.operations.len() + 1);
        params.push(Value::String(self.db_name.clone()));
        for op in &self.operations {
            params.push(op.to_value()?);
        }
        Ok(Value::Array(params))
    }

    /// Record the server result for the operation at `index`. Out of range
    /// indices are ignored and reported as `false`.
    pub fn attach_result(&mut self, index: usize, result: OperationResult) -> bool {
        match self.results.get_mut(index) {
            Some(slot) => {
                *slot = Some(result);
                true
            }
            None => false,
        }
    }

    /// Result attached to the operation at `index`, if any
    pub fn result(&self, index: usize) -> Option<&OperationResult> {
        self.results.get(index).and_then(Option::as_ref)
    }

    /// Operations paired with whatever result has been attached
    pub fn outcomes(&self) -> impl Iterator<Item = (&Operation, Option<&OperationResult>)> {
        self.operations
            .iter()
            .zip(self.results.iter().map(Option::as_ref))
    }
}
