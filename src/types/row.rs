use std::fmt;

use serde::{Deserialize, Serialize};

use crate::types::{
    COLUMN_EMAIL_SIZE, COLUMN_USERNAME_SIZE, EMAIL_OFFSET, EMAIL_SIZE, ID_OFFSET, ID_SIZE, Key,
    ROW_SIZE, USERNAME_OFFSET, USERNAME_SIZE,
    error::DatabaseError,
    value::Value,
};

/*
 * Row Layout (293 bytes)
 * ┌──────────┬──────────────────────────┬───────────────────────────────┐
 * │ id (4)   │ username (32 + NUL)      │ email (255 + NUL)             │
 * │ u32 LE   │ zero padded              │ zero padded                   │
 * └──────────┴──────────────────────────┴───────────────────────────────┘
 *   0          4                          37                       293
 */

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Row {
    pub id: i32,
    pub username: String,
    pub email: String,
}

impl Row {
    pub fn new(id: i32, username: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            id,
            username: username.into(),
            email: email.into(),
        }
    }

    pub fn key(&self) -> Key {
        self.id as Key
    }

    pub fn validate(&self) -> Result<(), DatabaseError> {
        if self.id < 0 {
            return Err(DatabaseError::validation("ID must be positive."));
        }
        if self.username.len() > COLUMN_USERNAME_SIZE || self.email.len() > COLUMN_EMAIL_SIZE {
            return Err(DatabaseError::validation("String is too long."));
        }
        if self.username.contains('\0') || self.email.contains('\0') {
            return Err(DatabaseError::validation("String contains a NUL byte."));
        }
        Ok(())
    }

    pub fn serialize(&self) -> Result<[u8; ROW_SIZE], DatabaseError> {
        self.validate()?;
        let mut buffer = [0u8; ROW_SIZE];
        buffer[ID_OFFSET..ID_OFFSET + ID_SIZE].copy_from_slice(&(self.id as u32).to_le_bytes());
        buffer[USERNAME_OFFSET..USERNAME_OFFSET + self.username.len()]
            .copy_from_slice(self.username.as_bytes());
        buffer[EMAIL_OFFSET..EMAIL_OFFSET + self.email.len()].copy_from_slice(self.email.as_bytes());
        Ok(buffer)
    }

    pub fn deserialize(bytes: &[u8; ROW_SIZE]) -> Self {
        let mut id_bytes = [0u8; ID_SIZE];
        id_bytes.copy_from_slice(&bytes[ID_OFFSET..ID_OFFSET + ID_SIZE]);
        Self {
            id: u32::from_le_bytes(id_bytes) as i32,
            username: read_padded(&bytes[USERNAME_OFFSET..USERNAME_OFFSET + USERNAME_SIZE]),
            email: read_padded(&bytes[EMAIL_OFFSET..EMAIL_OFFSET + EMAIL_SIZE]),
        }
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, DatabaseError> {
        let block: &[u8; ROW_SIZE] =
            bytes
                .try_into()
                .map_err(|_| DatabaseError::Serialization {
                    details: format!("expected {} row bytes, got {}", ROW_SIZE, bytes.len()),
                })?;
        Ok(Self::deserialize(block))
    }

    /// Column values in schema order.
    pub fn values(&self) -> Vec<Value> {
        vec![
            Value::Integer(self.id as i64),
            Value::Text(self.username.clone()),
            Value::Text(self.email.clone()),
        ]
    }
}

impl fmt::Display for Row {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {}, {})", self.id, self.username, self.email)
    }
}

fn read_padded(field: &[u8]) -> String {
    let end = field.iter().position(|&b| b == 0).unwrap_or(field.len());
    String::from_utf8_lossy(&field[..end]).into_owned()
}
