//! Row identifiers

use serde_json::{json, Value};
use std::fmt;

use super::{serde_via_notation, tagged, Notation};
use crate::error::{OvsdbError, Result};

/// Wire marker for a committed row identifier
pub const UUID_TAG: &str = "uuid";
/// Wire marker for a transaction-local forward reference
pub const NAMED_UUID_TAG: &str = "named-uuid";

/// Reference to a database row.
///
/// A `Named` identifier only means something inside the transaction that
/// declares it through an insert's `uuid-name`. Once the transaction has
/// committed, callers must switch to the `Committed` identifier returned in
/// the insert's result.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum RowUuid {
    /// Server-assigned identifier
    Committed(String),
    /// Caller-chosen name, resolved at commit time
    Named(String),
}

impl RowUuid {
    pub fn committed(id: impl Into<String>) -> Self {
        RowUuid::Committed(id.into())
    }

    pub fn named(name: impl Into<String>) -> Self {
        RowUuid::Named(name.into())
    }

    /// The identifier or name without its marker
    pub fn as_str(&self) -> &str {
        match self {
            RowUuid::Committed(id) | RowUuid::Named(id) => id,
        }
    }

    pub fn is_named(&self) -> bool {
        matches!(self, RowUuid::Named(_))
    }

    fn tag(&self) -> &'static str {
        match self {
            RowUuid::Committed(_) => UUID_TAG,
            RowUuid::Named(_) => NAMED_UUID_TAG,
        }
    }
}

impl fmt::Display for RowUuid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RowUuid::Committed(id) => write!(f, "{}", id),
            RowUuid::Named(name) => write!(f, "@{}", name),
        }
    }
}

impl Notation for RowUuid {
    fn to_wire(&self) -> Value {
        json!([self.tag(), self.as_str()])
    }

    fn from_wire(value: &Value) -> Result<Self> {
        match tagged(value) {
            Some((tag @ (UUID_TAG | NAMED_UUID_TAG), payload)) => {
                let id = payload.and_then(Value::as_str).ok_or_else(|| {
                    OvsdbError::malformed(format!(
                        "'{}' marker needs exactly one string payload: {}",
                        tag, value
                    ))
                })?;
                Ok(if tag == UUID_TAG {
                    RowUuid::committed(id)
                } else {
                    RowUuid::named(id)
                })
            }
            // Older rows carry the bare token for single-reference columns.
            _ => match value {
                Value::String(id) => Ok(RowUuid::committed(id.as_str())),
                other => Err(OvsdbError::malformed(format!(
                    "expected row identifier, got {}",
                    other
                ))),
            },
        }
    }
}

serde_via_notation!(RowUuid);
