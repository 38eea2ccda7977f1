use std::{cmp::Ordering, fmt};

use serde::{Deserialize, Serialize};

use crate::{
    storage::catalog::TableSchema,
    types::{error::DatabaseError, value::Value},
};

/// Comparison operators accepted in a WHERE clause.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ComparisonOp {
    #[serde(rename = "=")]
    Equal,
    #[serde(rename = "<")]
    LessThan,
    #[serde(rename = "<=")]
    LessThanOrEqual,
    #[serde(rename = ">")]
    GreaterThan,
    #[serde(rename = ">=")]
    GreaterThanOrEqual,
}

impl ComparisonOp {
    pub fn from_symbol(symbol: &str) -> Option<Self> {
        match symbol {
            "=" => Some(ComparisonOp::Equal),
            "<" => Some(ComparisonOp::LessThan),
            "<=" => Some(ComparisonOp::LessThanOrEqual),
            ">" => Some(ComparisonOp::GreaterThan),
            ">=" => Some(ComparisonOp::GreaterThanOrEqual),
            _ => None,
        }
    }

    pub fn symbol(&self) -> &'static str {
        match self {
            ComparisonOp::Equal => "=",
            ComparisonOp::LessThan => "<",
            ComparisonOp::LessThanOrEqual => "<=",
            ComparisonOp::GreaterThan => ">",
            ComparisonOp::GreaterThanOrEqual => ">=",
        }
    }

    pub fn matches(&self, ordering: Ordering) -> bool {
        match self {
            ComparisonOp::Equal => ordering == Ordering::Equal,
            ComparisonOp::LessThan => ordering == Ordering::Less,
            ComparisonOp::LessThanOrEqual => ordering != Ordering::Greater,
            ComparisonOp::GreaterThan => ordering == Ordering::Greater,
            ComparisonOp::GreaterThanOrEqual => ordering != Ordering::Less,
        }
    }
}

impl fmt::Display for ComparisonOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

/// A single `column OP value` condition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WhereClause {
    pub column: String,
    pub operator: ComparisonOp,
    pub value: Value,
}

impl WhereClause {
    pub fn new(column: impl Into<String>, operator: ComparisonOp, value: Value) -> Self {
        Self {
            column: column.into(),
            operator,
            value,
        }
    }
}

/// A WHERE clause bound to a column position of a concrete table.
#[derive(Debug, Clone, PartialEq)]
pub struct Predicate {
    pub column_index: usize,
    pub op: ComparisonOp,
    pub value: Value,
}

impl Predicate {
    pub fn bind(clause: &WhereClause, schema: &TableSchema) -> Result<Self, DatabaseError> {
        let column_index = schema.column_index(&clause.column)?;
        Ok(Self {
            column_index,
            op: clause.operator,
            value: clause.value.clone(),
        })
    }

    pub fn is_key_predicate(&self) -> bool {
        self.column_index == 0
    }

    pub fn evaluate(&self, values: &[Value]) -> bool {
        values
            .get(self.column_index)
            .is_some_and(|value| self.op.matches(value.compare(&self.value)))
    }
}
