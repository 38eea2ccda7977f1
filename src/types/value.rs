use std::{cmp::Ordering, fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::types::error::DatabaseError;

/// Column types accepted by `CREATE TABLE`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum DataType {
    Integer,
    Text,
    Real,
    Boolean,
    Date,
    Time,
    Timestamp,
    Blob,
}

impl DataType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DataType::Integer => "INT",
            DataType::Text => "STRING",
            DataType::Real => "FLOAT",
            DataType::Boolean => "BOOLEAN",
            DataType::Date => "DATE",
            DataType::Time => "TIME",
            DataType::Timestamp => "TIMESTAMP",
            DataType::Blob => "BLOB",
        }
    }
}

impl FromStr for DataType {
    type Err = DatabaseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "INT" | "INTEGER" => Ok(DataType::Integer),
            "STRING" | "TEXT" | "VARCHAR" | "CHAR" => Ok(DataType::Text),
            "FLOAT" | "REAL" | "DOUBLE" => Ok(DataType::Real),
            "BOOL" | "BOOLEAN" => Ok(DataType::Boolean),
            "DATE" => Ok(DataType::Date),
            "TIME" => Ok(DataType::Time),
            "TIMESTAMP" | "DATETIME" => Ok(DataType::Timestamp),
            "BLOB" => Ok(DataType::Blob),
            other => Err(DatabaseError::SchemaMismatch {
                details: format!("unknown column type '{}'", other),
            }),
        }
    }
}

impl TryFrom<String> for DataType {
    type Error = DatabaseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<DataType> for String {
    fn from(value: DataType) -> Self {
        value.as_str().to_string()
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A typed literal as it travels through commands and results.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Integer(i64),
    Boolean(bool),
    Text(String),
}

impl Value {
    /// Types a raw token: digits become integers, `true`/`false` become
    /// booleans, quoted text loses its quotes, anything else stays as text.
    pub fn from_literal(token: &str) -> Self {
        if !token.is_empty() && token.bytes().all(|b| b.is_ascii_digit()) {
            if let Ok(n) = token.parse::<i64>() {
                return Value::Integer(n);
            }
        }
        if token.eq_ignore_ascii_case("true") {
            return Value::Boolean(true);
        }
        if token.eq_ignore_ascii_case("false") {
            return Value::Boolean(false);
        }
        if let Some(inner) = strip_quotes(token) {
            return Value::Text(inner.to_string());
        }
        Value::Text(token.to_string())
    }

    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Value::Integer(n) => Some(*n),
            Value::Text(s) => s.trim().parse().ok(),
            Value::Boolean(_) => None,
        }
    }

    /// Textual form stored in string columns.
    pub fn to_text(&self) -> String {
        match self {
            Value::Integer(n) => n.to_string(),
            Value::Boolean(b) => b.to_string(),
            Value::Text(s) => s.clone(),
        }
    }

    pub fn compare(&self, other: &Value) -> Ordering {
        match (self.as_integer(), other.as_integer()) {
            (Some(a), Some(b)) => a.cmp(&b),
            _ => self.to_text().cmp(&other.to_text()),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Integer(n) => write!(f, "{}", n),
            Value::Boolean(b) => write!(f, "{}", b),
            Value::Text(s) => f.write_str(s),
        }
    }
}

impl From<Value> for serde_json::Value {
    fn from(value: Value) -> Self {
        match value {
            Value::Integer(n) => serde_json::Value::from(n),
            Value::Boolean(b) => serde_json::Value::Bool(b),
            Value::Text(s) => serde_json::Value::String(s),
        }
    }
}

fn strip_quotes(token: &str) -> Option<&str> {
    if token.len() < 2 {
        return None;
    }
    let quoted = (token.starts_with('\'') && token.ends_with('\''))
        || (token.starts_with('"') && token.ends_with('"'));
    quoted.then(|| &token[1..token.len() - 1])
}
