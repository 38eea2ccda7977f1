use serde::{Deserialize, Serialize};

use crate::{
    executor::predicate::WhereClause,
    storage::users::Role,
    types::{
        TransactionId,
        value::{DataType, Value},
    },
};

/// A column as declared by `CREATE TABLE`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnDef {
    pub name: String,
    #[serde(rename = "type")]
    pub data_type: DataType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetaCommand {
    Exit,
    Constants,
    Btree,
}

/// Everything the executor understands. The serde form is the wire format:
/// `{"command": "<snake_case verb>", ...fields}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum Command {
    CreateDatabase {
        database: String,
    },
    UseDatabase {
        database: String,
    },
    CreateTable {
        table: String,
        columns: Vec<ColumnDef>,
    },
    UseTable {
        table: String,
    },
    ShowTables,
    ShowIndexes {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        table: Option<String>,
    },
    CreateIndex {
        index: String,
        table: String,
        column: String,
    },
    Insert {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        table: Option<String>,
        values: Vec<Value>,
    },
    Select {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        table: Option<String>,
        #[serde(default)]
        columns: Vec<String>,
        #[serde(default, rename = "where", skip_serializing_if = "Option::is_none")]
        where_clause: Option<WhereClause>,
    },
    Update {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        table: Option<String>,
        column: String,
        value: Value,
        #[serde(default, rename = "where", skip_serializing_if = "Option::is_none")]
        where_clause: Option<WhereClause>,
    },
    Delete {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        table: Option<String>,
        #[serde(default, rename = "where", skip_serializing_if = "Option::is_none")]
        where_clause: Option<WhereClause>,
    },
    Begin,
    Commit,
    Rollback,
    Login {
        username: String,
        password: String,
    },
    Logout,
    CreateUser {
        username: String,
        password: String,
        role: Role,
    },
    Ping,
    AuthStatus,
    DatabaseStatus,
    TransactionStatus,
    Meta {
        meta: MetaCommand,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub enum QueryResult {
    Message(String),
    Affected { count: usize, message: String },
    Rows { columns: Vec<String>, rows: Vec<Vec<Value>> },
    Transaction { id: TransactionId, message: String },
    Tree(String),
    Constants(String),
    Exit,
}

impl Command {
    /// The verb as it appears on the wire, used in permission errors.
    pub fn name(&self) -> &'static str {
        match self {
            Command::CreateDatabase { .. } => "create_database",
            Command::UseDatabase { .. } => "use_database",
            Command::CreateTable { .. } => "create_table",
            Command::UseTable { .. } => "use_table",
            Command::ShowTables => "show_tables",
            Command::ShowIndexes { .. } => "show_indexes",
            Command::CreateIndex { .. } => "create_index",
            Command::Insert { .. } => "insert",
            Command::Select { .. } => "select",
            Command::Update { .. } => "update",
            Command::Delete { .. } => "delete",
            Command::Begin => "begin",
            Command::Commit => "commit",
            Command::Rollback => "rollback",
            Command::Login { .. } => "login",
            Command::Logout => "logout",
            Command::CreateUser { .. } => "create_user",
            Command::Ping => "ping",
            Command::AuthStatus => "auth_status",
            Command::DatabaseStatus => "database_status",
            Command::TransactionStatus => "transaction_status",
            Command::Meta { .. } => "meta",
        }
    }

    /// Commands a session may run before logging in.
    pub fn is_public(&self) -> bool {
        matches!(
            self,
            Command::Login { .. }
                | Command::Ping
                | Command::AuthStatus
                | Command::Meta {
                    meta: MetaCommand::Exit
                }
        )
    }
}

impl QueryResult {
    pub fn message(&self) -> String {
        match self {
            QueryResult::Message(message)
            | QueryResult::Affected { message, .. }
            | QueryResult::Transaction { message, .. } => message.clone(),
            QueryResult::Rows { rows, .. } => format!("{} row(s) returned", rows.len()),
            QueryResult::Tree(_) | QueryResult::Constants(_) | QueryResult::Exit => "Executed.".to_string(),
        }
    }
}
