use thiserror::Error;

use crate::{
    planner::error::PlannerError,
    types::{Key, PageNum, TransactionId},
};

#[derive(Error, Debug)]
pub enum DatabaseError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Corrupt file: {reason}")]
    CorruptFile { reason: String },

    #[error("Corrupted page: page_num={page_num}, reason={reason}")]
    CorruptedPage { page_num: PageNum, reason: String },

    #[error("Tried to fetch page number out of bounds: {page_num} (pages: {num_pages})")]
    PageOutOfBounds { page_num: PageNum, num_pages: PageNum },

    #[error("{reason}")]
    Validation { reason: String },

    #[error("Error: Duplicate key.")]
    DuplicateKey { key: Key },

    #[error("Record not found.")]
    RecordNotFound { key: Key },

    #[error("Error: Table full.")]
    TableFull,

    #[error("No table selected")]
    NoTableSelected,

    #[error("No database selected")]
    NoDatabaseSelected,

    #[error("Schema mismatch: {details}")]
    SchemaMismatch { details: String },

    #[error("Table '{name}' not found")]
    TableNotFound { name: String },

    #[error("Table '{name}' already exists")]
    TableExists { name: String },

    #[error("Database '{name}' not found")]
    DatabaseNotFound { name: String },

    #[error("Database '{name}' already exists")]
    DatabaseExists { name: String },

    #[error("Column '{name}' not found in table '{table}'")]
    ColumnNotFound { name: String, table: String },

    #[error("Index '{name}' already exists")]
    IndexExists { name: String },

    #[error("No active transaction")]
    NoActiveTransaction,

    #[error("Transaction {id} is already active")]
    TransactionActive { id: TransactionId },

    #[error("Unknown transaction {id}")]
    InvalidTransaction { id: TransactionId },

    #[error("Invalid username or password")]
    AuthenticationFailed,

    #[error("Not logged in")]
    NotAuthenticated,

    #[error("Permission denied: {username} ({role}) may not {action}")]
    PermissionDenied {
        username: String,
        role: String,
        action: String,
    },

    #[error("User '{name}' already exists")]
    UserExists { name: String },

    #[error("Authentication is disabled")]
    AuthDisabled,

    #[error(transparent)]
    Planner(#[from] PlannerError),

    #[error("Serialization/deserialization error: {details}")]
    Serialization { details: String },

    #[error("Concurrent access violation")]
    ConcurrencyError,
}

impl DatabaseError {
    pub fn validation(reason: impl Into<String>) -> Self {
        DatabaseError::Validation {
            reason: reason.into(),
        }
    }

    /// Errors after which the table file can no longer be trusted.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            DatabaseError::Io(_)
                | DatabaseError::CorruptFile { .. }
                | DatabaseError::CorruptedPage { .. }
                | DatabaseError::ConcurrencyError
        )
    }
}

pub type Result<T> = std::result::Result<T, DatabaseError>;
