pub mod command;
pub mod predicate;
pub mod scan;
pub mod sequential_scan;
pub mod transaction;

use std::{
    path::{Path, PathBuf},
    sync::{Arc, Mutex},
};

use tracing::{debug, info, warn};

use crate::{
    executor::{
        command::{ColumnDef, Command, MetaCommand, QueryResult},
        predicate::{ComparisonOp, Predicate, WhereClause},
        transaction::{Transaction, TransactionManager, UndoAction},
    },
    storage::{
        bplus_tree::BPlusTree,
        catalog::{ColumnSchema, TableSchema},
        registry::{DatabaseRegistry, SharedDatabase, SharedTree, TableRegistry, lock_database, lock_tree},
        users::{Role, UserStore},
    },
    types::{Key, TransactionId, error::DatabaseError, layout_constants, row::Row, value::Value},
};

/// State shared by every session of one process.
#[derive(Clone)]
pub struct ExecutionContext {
    pub data_dir: PathBuf,
    pub registry: Arc<TableRegistry>,
    pub databases: Arc<DatabaseRegistry>,
    pub transactions: Arc<TransactionManager>,
    /// Accounts to log in against. `None` runs without authentication.
    pub users: Option<Arc<Mutex<UserStore>>>,
}

impl ExecutionContext {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            registry: Arc::new(TableRegistry::new()),
            databases: Arc::new(DatabaseRegistry::new()),
            transactions: Arc::new(TransactionManager::new()),
            users: None,
        }
    }

    /// A context whose sessions must log in, with accounts kept under
    /// `data_dir`.
    pub fn with_auth(data_dir: impl Into<PathBuf>, admin_password: &str) -> Result<Self, DatabaseError> {
        let mut context = Self::new(data_dir);
        let store = UserStore::open(&context.data_dir, admin_password)?;
        context.users = Some(Arc::new(Mutex::new(store)));
        Ok(context)
    }

    pub fn auth_enabled(&self) -> bool {
        self.users.is_some()
    }
}

#[derive(Clone)]
pub struct TableHandle {
    pub schema: TableSchema,
    pub tree: SharedTree,
}

#[derive(Clone)]
struct DatabaseHandle {
    name: String,
    shared: SharedDatabase,
}

#[derive(Debug, Clone)]
struct SessionUser {
    username: String,
    role: Role,
}

/// One session: the logged-in user, the selected database and table plus
/// the open transaction.
pub struct Executor {
    context: ExecutionContext,
    user: Option<SessionUser>,
    database: Option<DatabaseHandle>,
    table: Option<TableHandle>,
    transaction: Option<Transaction>,
}

impl Executor {
    pub fn new(context: ExecutionContext) -> Self {
        Self {
            context,
            user: None,
            database: None,
            table: None,
            transaction: None,
        }
    }

    /// A session bound to a single table file, as used by the REPL.
    pub fn open_file<P: AsRef<Path>>(path: P) -> Result<Self, DatabaseError> {
        let path = path.as_ref();
        let data_dir = path.parent().map(Path::to_path_buf).unwrap_or_default();
        let context = ExecutionContext::new(data_dir);
        let tree = context.registry.open(path)?;
        let name = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "main".to_string());
        let mut executor = Self::new(context);
        executor.table = Some(TableHandle {
            schema: TableSchema::default_users(name),
            tree,
        });
        Ok(executor)
    }

    pub fn current_database(&self) -> Option<&str> {
        self.database.as_ref().map(|db| db.name.as_str())
    }

    pub fn current_user(&self) -> Option<&str> {
        self.user.as_ref().map(|u| u.username.as_str())
    }

    pub fn current_table(&self) -> Option<&str> {
        self.table.as_ref().map(|t| t.schema.table_name.as_str())
    }

    pub fn transaction_id(&self) -> Option<TransactionId> {
        self.transaction.as_ref().map(Transaction::id)
    }

    /// Executes a command that arrived with an optional transaction id. The
    /// id must name the session's open transaction.
    pub fn execute_request(
        &mut self,
        transaction_id: Option<TransactionId>,
        command: Command,
    ) -> Result<QueryResult, DatabaseError> {
        if let Some(id) = transaction_id {
            if self.transaction_id() != Some(id) {
                return Err(DatabaseError::InvalidTransaction { id });
            }
        }
        self.execute(command)
    }

    pub fn execute(&mut self, command: Command) -> Result<QueryResult, DatabaseError> {
        debug!(command = command.name(), "executing");
        self.authorize(&command)?;
        match command {
            Command::CreateDatabase { database } => self.create_database(&database),
            Command::UseDatabase { database } => self.use_database(&database),
            Command::CreateTable { table, columns } => self.create_table(&table, columns),
            Command::UseTable { table } => self.use_table(&table),
            Command::ShowTables => self.show_tables(),
            Command::ShowIndexes { table } => self.show_indexes(table),
            Command::CreateIndex {
                index,
                table,
                column,
            } => self.create_index(&index, &table, &column),
            Command::Insert { table, values } => self.insert(table, values),
            Command::Select {
                table,
                columns,
                where_clause,
            } => self.select(table, columns, where_clause),
            Command::Update {
                table,
                column,
                value,
                where_clause,
            } => self.update(table, &column, value, where_clause),
            Command::Delete {
                table,
                where_clause,
            } => self.delete(table, where_clause),
            Command::Begin => self.begin(),
            Command::Commit => self.commit(),
            Command::Rollback => self.rollback(),
            Command::Login { username, password } => self.login(&username, &password),
            Command::Logout => self.logout(),
            Command::CreateUser {
                username,
                password,
                role,
            } => self.create_user(&username, &password, role),
            Command::Ping => Ok(QueryResult::Message("PONG".to_string())),
            Command::AuthStatus => self.auth_status(),
            Command::DatabaseStatus => self.database_status(),
            Command::TransactionStatus => self.transaction_status(),
            Command::Meta { meta } => self.meta(meta),
        }
    }

    /// Checks the session's role against `command`. Without a user store
    /// every command is allowed.
    fn authorize(&self, command: &Command) -> Result<(), DatabaseError> {
        if !self.context.auth_enabled() || command.is_public() {
            return Ok(());
        }
        let user = self.user.as_ref().ok_or(DatabaseError::NotAuthenticated)?;
        if user.role.permits(command) {
            Ok(())
        } else {
            Err(DatabaseError::PermissionDenied {
                username: user.username.clone(),
                role: user.role.to_string(),
                action: command.name().to_string(),
            })
        }
    }

    /// Ends the session: an open transaction is rolled back and the current
    /// table is flushed.
    pub fn close(&mut self) -> Result<(), DatabaseError> {
        if let Some(transaction) = self.transaction.take() {
            warn!(transaction_id = transaction.id(), "rolling back unfinished transaction");
            transaction.rollback()?;
        }
        if let Some(table) = self.table.take() {
            lock_tree(&table.tree)?.flush()?;
        }
        Ok(())
    }

    fn require_database(&self) -> Result<&SharedDatabase, DatabaseError> {
        self.database
            .as_ref()
            .map(|db| &db.shared)
            .ok_or(DatabaseError::NoDatabaseSelected)
    }

    /// Looks `name` up in the shared catalog and opens its tree.
    fn open_table(&self, name: &str) -> Result<TableHandle, DatabaseError> {
        let (schema, path) = {
            let database = lock_database(self.require_database()?)?;
            let schema = database.table(name)?.clone();
            let path = database.table_path(&schema);
            (schema, path)
        };
        let tree = self.context.registry.open(path)?;
        Ok(TableHandle { schema, tree })
    }

    fn resolve_table(&self, table: Option<&str>) -> Result<TableHandle, DatabaseError> {
        let Some(name) = table else {
            return self.table.clone().ok_or(DatabaseError::NoTableSelected);
        };
        if let Some(current) = &self.table {
            if current.schema.table_name.eq_ignore_ascii_case(name) {
                return Ok(current.clone());
            }
        }
        self.open_table(name)
    }

    fn create_database(&mut self, name: &str) -> Result<QueryResult, DatabaseError> {
        self.context.databases.create(&self.context.data_dir, name)?;
        Ok(QueryResult::Message(format!("Database '{}' created.", name)))
    }

    fn use_database(&mut self, name: &str) -> Result<QueryResult, DatabaseError> {
        let shared = self.context.databases.open(&self.context.data_dir, name)?;
        self.database = Some(DatabaseHandle {
            name: name.to_string(),
            shared,
        });
        self.table = None;
        Ok(QueryResult::Message(format!("Using database '{}'.", name)))
    }

    fn create_table(&mut self, name: &str, columns: Vec<ColumnDef>) -> Result<QueryResult, DatabaseError> {
        let columns = columns
            .into_iter()
            .enumerate()
            .map(|(position, def)| ColumnSchema::new(def.name, def.data_type, def.size, position))
            .collect();
        let schema = TableSchema::new(name, columns)?;
        let path = lock_database(self.require_database()?)?.create_table(schema)?;
        self.context.registry.open(path)?;
        Ok(QueryResult::Message(format!("Table '{}' created.", name)))
    }

    fn use_table(&mut self, name: &str) -> Result<QueryResult, DatabaseError> {
        let handle = self.open_table(name)?;
        let message = format!("Using table '{}'.", handle.schema.table_name);
        self.table = Some(handle);
        Ok(QueryResult::Message(message))
    }

    fn show_tables(&mut self) -> Result<QueryResult, DatabaseError> {
        let rows = lock_database(self.require_database()?)?
            .catalog
            .table_names()
            .into_iter()
            .map(|name| vec![Value::Text(name)])
            .collect();
        Ok(QueryResult::Rows {
            columns: vec!["table".to_string()],
            rows,
        })
    }

    fn show_indexes(&mut self, table: Option<String>) -> Result<QueryResult, DatabaseError> {
        // The catalog is authoritative; the session's copy of the current
        // schema may predate another session's CREATE INDEX.
        let name = match (table, &self.table) {
            (Some(name), _) => name,
            (None, Some(current)) => current.schema.table_name.clone(),
            (None, None) => return Err(DatabaseError::NoTableSelected),
        };
        let schema = match &self.database {
            Some(database) => lock_database(&database.shared)?.table(&name)?.clone(),
            None => self.resolve_table(Some(&name))?.schema,
        };
        let rows = schema
            .indexes
            .iter()
            .map(|index| vec![Value::Text(index.name.clone()), Value::Text(index.column.clone())])
            .collect();
        Ok(QueryResult::Rows {
            columns: vec!["index".to_string(), "column".to_string()],
            rows,
        })
    }

    fn create_index(&mut self, index: &str, table: &str, column: &str) -> Result<QueryResult, DatabaseError> {
        let updated = {
            let mut database = lock_database(self.require_database()?)?;
            database.create_index(table, index, column)?;
            database.table(table)?.clone()
        };
        if let Some(current) = self.table.as_mut() {
            if current.schema.table_name == updated.table_name {
                current.schema = updated;
            }
        }
        Ok(QueryResult::Message(format!(
            "Index '{}' created on {}({}).",
            index, table, column
        )))
    }

    fn record(&mut self, tree: &SharedTree, action: UndoAction) {
        if let Some(transaction) = self.transaction.as_mut() {
            transaction.record(tree, action);
        }
    }

    fn insert(&mut self, table: Option<String>, values: Vec<Value>) -> Result<QueryResult, DatabaseError> {
        let handle = self.resolve_table(table.as_deref())?;
        let row = build_row(&handle.schema, &values)?;
        lock_tree(&handle.tree)?.insert(&row)?;
        self.record(&handle.tree, UndoAction::Inserted { key: row.key() });
        Ok(QueryResult::Affected {
            count: 1,
            message: "1 row(s) inserted".to_string(),
        })
    }

    fn select(
        &mut self,
        table: Option<String>,
        columns: Vec<String>,
        where_clause: Option<WhereClause>,
    ) -> Result<QueryResult, DatabaseError> {
        let handle = self.resolve_table(table.as_deref())?;
        let schema = &handle.schema;
        let projection: Vec<usize> = if columns.is_empty() || columns.iter().any(|c| c == "*") {
            (0..schema.columns.len()).collect()
        } else {
            columns
                .iter()
                .map(|c| schema.column_index(c))
                .collect::<Result<_, _>>()?
        };
        let rows = {
            let mut tree = lock_tree(&handle.tree)?;
            matching_rows(&mut tree, schema, where_clause.as_ref())?
        };
        let rows = rows
            .into_iter()
            .map(|row| {
                let values = row.values();
                projection.iter().map(|&i| values[i].clone()).collect()
            })
            .collect();
        Ok(QueryResult::Rows {
            columns: projection.iter().map(|&i| schema.columns[i].name.clone()).collect(),
            rows,
        })
    }

    fn update(
        &mut self,
        table: Option<String>,
        column: &str,
        value: Value,
        where_clause: Option<WhereClause>,
    ) -> Result<QueryResult, DatabaseError> {
        let handle = self.resolve_table(table.as_deref())?;
        let position = handle.schema.column_index(column)?;
        if position == 0 {
            return Err(DatabaseError::validation("Cannot update the key column."));
        }
        let text = value.to_text();
        if text.len() > handle.schema.max_len(position) {
            return Err(DatabaseError::validation("String is too long."));
        }

        let mut tree = lock_tree(&handle.tree)?;
        let targets = matching_rows(&mut tree, &handle.schema, where_clause.as_ref())?;
        let mut count = 0;
        for target in targets {
            let previous = tree.update(target.key(), |row| {
                match position {
                    1 => row.username = text.clone(),
                    _ => row.email = text.clone(),
                }
                Ok(())
            })?;
            // Recorded per row so a later failure still leaves this one undoable.
            self.record(&handle.tree, UndoAction::Updated { previous });
            count += 1;
        }
        Ok(QueryResult::Affected {
            count,
            message: format!("{} row(s) updated", count),
        })
    }

    fn delete(&mut self, table: Option<String>, where_clause: Option<WhereClause>) -> Result<QueryResult, DatabaseError> {
        let handle = self.resolve_table(table.as_deref())?;
        let mut tree = lock_tree(&handle.tree)?;
        let targets = matching_rows(&mut tree, &handle.schema, where_clause.as_ref())?;
        let mut count = 0;
        for target in targets {
            let previous = tree.delete(target.key())?;
            self.record(&handle.tree, UndoAction::Deleted { previous });
            count += 1;
        }
        Ok(QueryResult::Affected {
            count,
            message: format!("{} row(s) deleted", count),
        })
    }

    fn begin(&mut self) -> Result<QueryResult, DatabaseError> {
        if let Some(active) = &self.transaction {
            return Err(DatabaseError::TransactionActive { id: active.id() });
        }
        let transaction = self.context.transactions.begin();
        let id = transaction.id();
        let message = format!(
            "Transaction {} started at {}.",
            id,
            transaction.started_at().to_rfc3339()
        );
        self.transaction = Some(transaction);
        Ok(QueryResult::Transaction { id, message })
    }

    fn commit(&mut self) -> Result<QueryResult, DatabaseError> {
        let transaction = self.transaction.take().ok_or(DatabaseError::NoActiveTransaction)?;
        let id = transaction.id();
        let changes = transaction.commit()?;
        Ok(QueryResult::Message(format!(
            "Transaction {} committed ({} change(s)).",
            id, changes
        )))
    }

    fn rollback(&mut self) -> Result<QueryResult, DatabaseError> {
        let transaction = self.transaction.take().ok_or(DatabaseError::NoActiveTransaction)?;
        let id = transaction.id();
        let reverted = transaction.rollback()?;
        Ok(QueryResult::Message(format!(
            "Transaction {} rolled back ({} change(s) reverted).",
            id, reverted
        )))
    }

    fn login(&mut self, username: &str, password: &str) -> Result<QueryResult, DatabaseError> {
        let users = self.context.users.as_ref().ok_or(DatabaseError::AuthDisabled)?;
        let role = users
            .lock()
            .map_err(|_| DatabaseError::ConcurrencyError)?
            .authenticate(username, password);
        let role = match role {
            Ok(role) => role,
            Err(e) => {
                warn!(username, "login failed");
                return Err(e);
            }
        };
        info!(username, %role, "logged in");
        self.user = Some(SessionUser {
            username: username.to_string(),
            role,
        });
        Ok(QueryResult::Message(format!("Logged in as '{}' ({}).", username, role)))
    }

    /// Forgets the user. An open transaction is rolled back first, like a
    /// closed connection.
    fn logout(&mut self) -> Result<QueryResult, DatabaseError> {
        let user = self.user.take().ok_or(DatabaseError::NotAuthenticated)?;
        if let Some(transaction) = self.transaction.take() {
            warn!(transaction_id = transaction.id(), "rolling back transaction on logout");
            transaction.rollback()?;
        }
        Ok(QueryResult::Message(format!("Logged out '{}'.", user.username)))
    }

    fn create_user(&mut self, username: &str, password: &str, role: Role) -> Result<QueryResult, DatabaseError> {
        let users = self.context.users.as_ref().ok_or(DatabaseError::AuthDisabled)?;
        users
            .lock()
            .map_err(|_| DatabaseError::ConcurrencyError)?
            .create_user(username, password, role)?;
        info!(username, %role, "created user");
        Ok(QueryResult::Message(format!("User '{}' created with role {}.", username, role)))
    }

    fn auth_status(&mut self) -> Result<QueryResult, DatabaseError> {
        let row = match &self.user {
            Some(user) => vec![
                Value::Boolean(true),
                Value::Text(user.username.clone()),
                Value::Text(user.role.to_string()),
            ],
            None => vec![
                Value::Boolean(!self.context.auth_enabled()),
                Value::Text(String::new()),
                Value::Text(String::new()),
            ],
        };
        Ok(QueryResult::Rows {
            columns: vec!["authenticated".to_string(), "username".to_string(), "role".to_string()],
            rows: vec![row],
        })
    }

    fn database_status(&mut self) -> Result<QueryResult, DatabaseError> {
        let database = self.current_database().unwrap_or_default().to_string();
        let table = self.current_table().unwrap_or_default().to_string();
        Ok(QueryResult::Rows {
            columns: vec!["database".to_string(), "table".to_string()],
            rows: vec![vec![Value::Text(database), Value::Text(table)]],
        })
    }

    fn transaction_status(&mut self) -> Result<QueryResult, DatabaseError> {
        let row = match &self.transaction {
            Some(transaction) => vec![
                Value::Boolean(true),
                Value::Integer(transaction.id() as i64),
                Value::Text(transaction.started_at().to_rfc3339()),
                Value::Integer(transaction.changes() as i64),
            ],
            None => vec![
                Value::Boolean(false),
                Value::Integer(0),
                Value::Text(String::new()),
                Value::Integer(0),
            ],
        };
        Ok(QueryResult::Rows {
            columns: vec![
                "active".to_string(),
                "transaction_id".to_string(),
                "started_at".to_string(),
                "changes".to_string(),
            ],
            rows: vec![row],
        })
    }

    fn meta(&mut self, meta: MetaCommand) -> Result<QueryResult, DatabaseError> {
        match meta {
            MetaCommand::Exit => Ok(QueryResult::Exit),
            MetaCommand::Constants => {
                let text = layout_constants()
                    .into_iter()
                    .map(|(name, value)| format!("{}: {}\n", name, value))
                    .collect();
                Ok(QueryResult::Constants(text))
            }
            MetaCommand::Btree => {
                let handle = self.resolve_table(None)?;
                let tree = lock_tree(&handle.tree)?.print_tree()?;
                Ok(QueryResult::Tree(tree))
            }
        }
    }
}

/// Converts a literal into a row id.
pub fn parse_id(value: &Value) -> Result<i32, DatabaseError> {
    let id = value
        .as_integer()
        .ok_or_else(|| DatabaseError::validation("ID must be an integer."))?;
    if id < 0 {
        return Err(DatabaseError::validation("ID must be positive."));
    }
    i32::try_from(id).map_err(|_| DatabaseError::validation("ID is too large."))
}

fn build_row(schema: &TableSchema, values: &[Value]) -> Result<Row, DatabaseError> {
    if values.len() != schema.columns.len() {
        return Err(DatabaseError::SchemaMismatch {
            details: format!(
                "table '{}' has {} columns but {} values were supplied",
                schema.table_name,
                schema.columns.len(),
                values.len()
            ),
        });
    }
    let id = parse_id(&values[0])?;
    let username = values[1].to_text();
    let email = values[2].to_text();
    if username.len() > schema.max_len(1) || email.len() > schema.max_len(2) {
        return Err(DatabaseError::validation("String is too long."));
    }
    let row = Row::new(id, username, email);
    row.validate()?;
    Ok(row)
}

fn matching_rows(
    tree: &mut BPlusTree,
    schema: &TableSchema,
    where_clause: Option<&WhereClause>,
) -> Result<Vec<Row>, DatabaseError> {
    let Some(clause) = where_clause else {
        return tree.scan();
    };
    let predicate = Predicate::bind(clause, schema)?;
    if !predicate.is_key_predicate() {
        let mut rows = tree.scan()?;
        rows.retain(|row| predicate.evaluate(&row.values()));
        return Ok(rows);
    }
    let key = parse_id(&predicate.value)? as Key;
    match predicate.op {
        ComparisonOp::Equal => tree
            .get(key)?
            .map(|row| vec![row])
            .ok_or(DatabaseError::RecordNotFound { key }),
        op => tree.scan_from(key, op),
    }
}
