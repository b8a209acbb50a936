//! Column mutations

use serde_json::{json, Value};
use std::fmt;
use std::str::FromStr;

use super::{serde_via_notation, Notation};
use crate::error::{OvsdbError, Result};

/// Mutation verb
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Mutator {
    Sum,
    Difference,
    Product,
    Quotient,
    Remainder,
    Insert,
    Delete,
}

impl Mutator {
    pub fn as_str(&self) -> &'static str {
        match self {
            Mutator::Sum => "+=",
            Mutator::Difference => "-=",
            Mutator::Product => "*=",
            Mutator::Quotient => "/=",
            Mutator::Remainder => "%=",
            Mutator::Insert => "insert",
            Mutator::Delete => "delete",
        }
    }
}

impl FromStr for Mutator {
    type Err = OvsdbError;

    fn from_str(s: &str) -> Result<Self> {
        Ok(match s {
            "+=" => Mutator::Sum,
            "-=" => Mutator::Difference,
            "*=" => Mutator::Product,
            "/=" => Mutator::Quotient,
            "%=" => Mutator::Remainder,
            "insert" => Mutator::Insert,
            "delete" => Mutator::Delete,
            other => return Err(OvsdbError::malformed(format!("unknown mutator '{}'", other))),
        })
    }
}

impl fmt::Display for Mutator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// `[column, mutator, value]` in-place column edit
#[derive(Debug, Clone, PartialEq)]
pub struct Mutation {
    pub column: String,
    pub mutator: Mutator,
    /// Already encoded with [`Notation`]
    pub value: Value,
}

impl Mutation {
    pub fn new(column: impl Into<String>, mutator: Mutator, value: &impl Notation) -> Self {
        Self {
            column: column.into(),
            mutator,
            value: value.to_wire(),
        }
    }

    /// Add `value` (an element, set or map) to a set or map column
    pub fn insert(column: impl Into<String>, value: &impl Notation) -> Self {
        Self::new(column, Mutator::Insert, value)
    }

    /// Remove `value` from a set column, or keys/pairs from a map column
    pub fn delete(column: impl Into<String>, value: &impl Notation) -> Self {
        Self::new(column, Mutator::Delete, value)
    }
}

impl Notation for Mutation {
    fn to_wire(&self) -> Value {
        json!([self.column, self.mutator.as_str(), self.value])
    }

    fn from_wire(value: &Value) -> Result<Self> {
        match value.as_array().map(Vec::as_slice) {
            Some([Value::String(column), Value::String(mutator), operand]) => Ok(Self {
                column: column.clone(),
                mutator: mutator.parse()?,
                value: operand.clone(),
            }),
            _ => Err(OvsdbError::malformed(format!(
                "mutation must be [column, mutator, value]: {}",
                value
            ))),
        }
    }
}

serde_via_notation!(Mutation);
