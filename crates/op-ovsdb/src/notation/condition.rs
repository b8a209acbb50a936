//! Where-clause conditions

use serde_json::{json, Value};
use std::fmt;
use std::str::FromStr;

use super::{serde_via_notation, Notation, RowUuid};
use crate::error::{OvsdbError, Result};

/// Comparison function of a condition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Function {
    Equals,
    NotEquals,
    Includes,
    Excludes,
    LessThan,
    LessThanOrEquals,
    GreaterThan,
    GreaterThanOrEquals,
}

impl Function {
    pub fn as_str(&self) -> &'static str {
        match self {
            Function::Equals => "==",
            Function::NotEquals => "!=",
            Function::Includes => "includes",
            Function::Excludes => "excludes",
            Function::LessThan => "<",
            Function::LessThanOrEquals => "<=",
            Function::GreaterThan => ">",
            Function::GreaterThanOrEquals => ">=",
        }
    }
}

impl FromStr for Function {
    type Err = OvsdbError;

    fn from_str(s: &str) -> Result<Self> {
        Ok(match s {
            "==" => Function::Equals,
            "!=" => Function::NotEquals,
            "includes" => Function::Includes,
            "excludes" => Function::Excludes,
            "<" => Function::LessThan,
            "<=" => Function::LessThanOrEquals,
            ">" => Function::GreaterThan,
            ">=" => Function::GreaterThanOrEquals,
            other => {
                return Err(OvsdbError::malformed(format!(
                    "unknown condition function '{}'",
                    other
                )))
            }
        })
    }
}

impl fmt::Display for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// `[column, function, value]` predicate over one column
#[derive(Debug, Clone, PartialEq)]
pub struct Condition {
    pub column: String,
    pub function: Function,
    /// Already encoded with [`Notation`]
    pub value: Value,
}

impl Condition {
    pub fn new(column: impl Into<String>, function: Function, value: &impl Notation) -> Self {
        Self {
            column: column.into(),
            function,
            value: value.to_wire(),
        }
    }

    /// `_uuid == uuid`, the usual way to pick one row
    pub fn uuid_equals(uuid: &RowUuid) -> Self {
        Self::new("_uuid", Function::Equals, uuid)
    }

    pub fn equals(column: impl Into<String>, value: &impl Notation) -> Self {
        Self::new(column, Function::Equals, value)
    }

    pub fn includes(column: impl Into<String>, value: &impl Notation) -> Self {
        Self::new(column, Function::Includes, value)
    }
}

impl Notation for Condition {
    fn to_wire(&self) -> Value {
        json!([self.column, self.function.as_str(), self.value])
    }

    fn from_wire(value: &Value) -> Result<Self> {
        match value.as_array().map(Vec::as_slice) {
            Some([Value::String(column), Value::String(function), operand]) => Ok(Self {
                column: column.clone(),
                function: function.parse()?,
                value: operand.clone(),
            }),
            _ => Err(OvsdbError::malformed(format!(
                "condition must be [column, function, value]: {}",
                value
            ))),
        }
    }
}

serde_via_notation!(Condition);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notation::OvsSet;

    #[test]
    fn test_condition_wire_shape() {
        let cond = Condition::uuid_equals(&RowUuid::committed("P"));
        assert_eq!(cond.to_wire(), json!(["_uuid", "==", ["uuid", "P"]]));
    }

    #[test]
    fn test_condition_round_trip() {
        let conds = [
            Condition::equals("name", &"br-int".to_string()),
            Condition::includes("ports", &OvsSet::single(RowUuid::committed("p1"))),
            Condition::new("tag", Function::GreaterThanOrEquals, &10i64),
        ];
        for cond in conds {
            let wire = cond.to_wire();
            assert_eq!(Condition::from_wire(&wire).unwrap(), cond);
        }
    }

    #[test]
    fn test_function_literals_round_trip() {
        for f in [
            Function::Equals,
            Function::NotEquals,
            Function::Includes,
            Function::Excludes,
            Function::LessThan,
            Function::LessThanOrEquals,
            Function::GreaterThan,
            Function::GreaterThanOrEquals,
        ] {
            assert_eq!(f.as_str().parse::<Function>().unwrap(), f);
        }
    }

    #[test]
    fn test_bad_condition() {
        assert!(Condition::from_wire(&json!(["name", "=="])).is_err());
        assert!(Condition::from_wire(&json!(["name", "~=", "x"])).is_err());
    }
}
