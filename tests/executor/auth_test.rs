use pagoda::{
    executor::{
        ExecutionContext, Executor,
        command::{ColumnDef, Command, MetaCommand, QueryResult},
    },
    storage::users::Role,
    types::{
        error::DatabaseError,
        value::{DataType, Value},
    },
    utils::mock::TempDatabase,
};

fn login(username: &str, password: &str) -> Command {
    Command::Login {
        username: username.to_string(),
        password: password.to_string(),
    }
}

fn create_user(username: &str, role: Role) -> Command {
    Command::CreateUser {
        username: username.to_string(),
        password: format!("{}-pw", username),
        role,
    }
}

fn use_database(name: &str) -> Command {
    Command::UseDatabase {
        database: name.to_string(),
    }
}

fn users_table(name: &str) -> Command {
    let column = |name: &str, data_type| ColumnDef {
        name: name.to_string(),
        data_type,
        size: None,
    };
    Command::CreateTable {
        table: name.to_string(),
        columns: vec![
            column("id", DataType::Integer),
            column("username", DataType::Text),
            column("email", DataType::Text),
        ],
    }
}

fn insert(id: i64) -> Command {
    Command::Insert {
        table: Some("users".to_string()),
        values: vec![
            Value::Integer(id),
            Value::Text(format!("user{}", id)),
            Value::Text(format!("person{}@example.com", id)),
        ],
    }
}

fn first_row(result: QueryResult) -> Vec<Value> {
    match result {
        QueryResult::Rows { mut rows, .. } => rows.remove(0),
        other => panic!("expected rows, got {:?}", other),
    }
}

/// An admin session that has created `shop` with a `users` table, plus a
/// developer and a read-only account.
fn prepared(db: &TempDatabase) -> Result<ExecutionContext, DatabaseError> {
    let context = ExecutionContext::with_auth(db.path(), "root-pw")?;
    let mut admin = Executor::new(context.clone());
    admin.execute(login("admin", "root-pw"))?;
    admin.execute(Command::CreateDatabase {
        database: "shop".to_string(),
    })?;
    admin.execute(use_database("shop"))?;
    admin.execute(users_table("users"))?;
    admin.execute(create_user("dev", Role::Developer))?;
    admin.execute(create_user("reader", Role::User))?;
    Ok(context)
}

#[test]
fn test_commands_require_login() -> Result<(), DatabaseError> {
    let db = TempDatabase::with_prefix("auth")?;
    let context = prepared(&db)?;
    let mut session = Executor::new(context);

    assert!(matches!(
        session.execute(use_database("shop")),
        Err(DatabaseError::NotAuthenticated)
    ));
    assert_eq!(session.execute(Command::Ping)?, QueryResult::Message("PONG".to_string()));
    assert_eq!(
        first_row(session.execute(Command::AuthStatus)?),
        vec![Value::Boolean(false), Value::Text(String::new()), Value::Text(String::new())]
    );
    assert!(matches!(
        session.execute(login("admin", "wrong")),
        Err(DatabaseError::AuthenticationFailed)
    ));
    assert!(matches!(
        session.execute(login("nobody", "root-pw")),
        Err(DatabaseError::AuthenticationFailed)
    ));
    assert_eq!(
        session.execute(Command::Meta { meta: MetaCommand::Exit })?,
        QueryResult::Exit
    );

    session.execute(login("admin", "root-pw"))?;
    assert_eq!(session.current_user(), Some("admin"));
    assert_eq!(
        first_row(session.execute(Command::AuthStatus)?),
        vec![
            Value::Boolean(true),
            Value::Text("admin".to_string()),
            Value::Text("admin".to_string()),
        ]
    );
    session.execute(use_database("shop"))?;
    Ok(())
}

#[test]
fn test_roles_limit_commands() -> Result<(), DatabaseError> {
    let db = TempDatabase::with_prefix("auth")?;
    let context = prepared(&db)?;

    let mut dev = Executor::new(context.clone());
    dev.execute(login("dev", "dev-pw"))?;
    dev.execute(use_database("shop"))?;
    dev.execute(users_table("orders"))?;
    dev.execute(insert(1))?;
    assert!(matches!(
        dev.execute(Command::CreateDatabase {
            database: "other".to_string(),
        }),
        Err(DatabaseError::PermissionDenied { .. })
    ));
    assert!(matches!(
        dev.execute(create_user("eve", Role::Admin)),
        Err(DatabaseError::PermissionDenied { .. })
    ));

    let mut reader = Executor::new(context);
    reader.execute(login("reader", "reader-pw"))?;
    reader.execute(use_database("shop"))?;
    reader.execute(Command::UseTable {
        table: "users".to_string(),
    })?;
    let rows = reader.execute(Command::Select {
        table: None,
        columns: Vec::new(),
        where_clause: None,
    })?;
    assert_eq!(rows.message(), "1 row(s) returned");
    match reader.execute(insert(2)) {
        Err(DatabaseError::PermissionDenied {
            username,
            role,
            action,
        }) => {
            assert_eq!(username, "reader");
            assert_eq!(role, "user");
            assert_eq!(action, "insert");
        }
        other => panic!("expected a permission error, got {:?}", other),
    }
    assert_eq!(
        reader.execute(Command::Delete {
            table: None,
            where_clause: None,
        })
        .unwrap_err()
        .to_string(),
        "Permission denied: reader (user) may not delete"
    );
    Ok(())
}

#[test]
fn test_logout_rolls_back_and_locks_session() -> Result<(), DatabaseError> {
    let db = TempDatabase::with_prefix("auth")?;
    let context = prepared(&db)?;
    let mut dev = Executor::new(context);
    dev.execute(login("dev", "dev-pw"))?;
    dev.execute(use_database("shop"))?;
    dev.execute(Command::Begin)?;
    dev.execute(insert(7))?;
    assert_eq!(
        first_row(dev.execute(Command::DatabaseStatus)?),
        vec![Value::Text("shop".to_string()), Value::Text(String::new())]
    );

    dev.execute(Command::Logout)?;
    assert_eq!(dev.current_user(), None);
    assert_eq!(dev.transaction_id(), None);
    assert!(matches!(dev.execute(Command::ShowTables), Err(DatabaseError::NotAuthenticated)));

    dev.execute(login("dev", "dev-pw"))?;
    let rows = dev.execute(Command::Select {
        table: Some("users".to_string()),
        columns: Vec::new(),
        where_clause: None,
    })?;
    assert_eq!(rows.message(), "0 row(s) returned");
    Ok(())
}

#[test]
fn test_accounts_survive_restart() -> Result<(), DatabaseError> {
    let db = TempDatabase::with_prefix("auth")?;
    prepared(&db)?;

    // The admin password only seeds a new accounts file.
    let context = ExecutionContext::with_auth(db.path(), "ignored")?;
    let mut session = Executor::new(context);
    assert!(matches!(
        session.execute(login("admin", "ignored")),
        Err(DatabaseError::AuthenticationFailed)
    ));
    session.execute(login("reader", "reader-pw"))?;
    assert!(matches!(
        session.execute(create_user("reader", Role::User)),
        Err(DatabaseError::PermissionDenied { .. })
    ));

    let mut admin = Executor::new(ExecutionContext::with_auth(db.path(), "root-pw")?);
    admin.execute(login("admin", "root-pw"))?;
    assert!(matches!(
        admin.execute(create_user("reader", Role::User)),
        Err(DatabaseError::UserExists { .. })
    ));
    Ok(())
}

#[test]
fn test_open_context_skips_authentication() -> Result<(), DatabaseError> {
    let db = TempDatabase::with_prefix("auth")?;
    let mut session = db.executor();
    session.execute(Command::CreateDatabase {
        database: "open".to_string(),
    })?;
    assert_eq!(
        first_row(session.execute(Command::AuthStatus)?)[0],
        Value::Boolean(true)
    );
    assert!(matches!(
        session.execute(login("admin", "admin")),
        Err(DatabaseError::AuthDisabled)
    ));
    Ok(())
}
