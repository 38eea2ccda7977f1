use pagoda::{
    executor::{
        Executor,
        command::{ColumnDef, Command, MetaCommand, QueryResult},
        parse_id,
        predicate::{ComparisonOp, WhereClause},
    },
    types::{error::DatabaseError, value::{DataType, Value}},
    utils::mock::TempDatabase,
};

fn insert(id: i64, username: &str, email: &str) -> Command {
    Command::Insert {
        table: None,
        values: vec![
            Value::Integer(id),
            Value::Text(username.to_string()),
            Value::Text(email.to_string()),
        ],
    }
}

fn select_all() -> Command {
    Command::Select {
        table: None,
        columns: Vec::new(),
        where_clause: None,
    }
}

fn select_where(column: &str, op: ComparisonOp, value: Value) -> Command {
    Command::Select {
        table: None,
        columns: Vec::new(),
        where_clause: Some(WhereClause::new(column, op, value)),
    }
}

fn rows_of(result: QueryResult) -> Vec<Vec<Value>> {
    match result {
        QueryResult::Rows { rows, .. } => rows,
        other => panic!("expected rows, got {:?}", other),
    }
}

fn ids_of(result: QueryResult) -> Vec<i64> {
    rows_of(result)
        .into_iter()
        .map(|row| row[0].as_integer().unwrap())
        .collect()
}

fn column(name: &str, data_type: DataType, size: Option<u32>) -> ColumnDef {
    ColumnDef {
        name: name.to_string(),
        data_type,
        size,
    }
}

fn seeded(db: &TempDatabase, count: i64) -> Result<Executor, DatabaseError> {
    let mut executor = db.file_executor("main")?;
    for i in 1..=count {
        executor.execute(insert(i, &format!("user{}", i), &format!("person{}@example.com", i)))?;
    }
    Ok(executor)
}

#[test]
fn test_insert_and_select() -> Result<(), DatabaseError> {
    let db = TempDatabase::new()?;
    let mut executor = db.file_executor("main")?;
    let result = executor.execute(insert(1, "user1", "person1@example.com"))?;
    assert_eq!(result.message(), "1 row(s) inserted");

    match executor.execute(select_all())? {
        QueryResult::Rows { columns, rows } => {
            assert_eq!(columns, vec!["id", "username", "email"]);
            assert_eq!(
                rows,
                vec![vec![
                    Value::Integer(1),
                    Value::Text("user1".to_string()),
                    Value::Text("person1@example.com".to_string()),
                ]]
            );
        }
        other => panic!("unexpected {:?}", other),
    }
    Ok(())
}

#[test]
fn test_errors_do_not_poison_the_session() -> Result<(), DatabaseError> {
    let db = TempDatabase::new()?;
    let mut executor = seeded(&db, 1)?;

    let err = executor.execute(insert(1, "again", "again@example.com")).unwrap_err();
    assert_eq!(err.to_string(), "Error: Duplicate key.");
    let err = executor.execute(insert(-1, "neg", "neg@example.com")).unwrap_err();
    assert_eq!(err.to_string(), "ID must be positive.");
    let err = executor.execute(insert(2, &"a".repeat(33), "x")).unwrap_err();
    assert_eq!(err.to_string(), "String is too long.");
    let err = executor.execute(insert(2, "x", &"a".repeat(256))).unwrap_err();
    assert_eq!(err.to_string(), "String is too long.");
    assert!(!err.is_fatal());

    executor.execute(insert(2, &"a".repeat(32), &"b".repeat(255)))?;
    assert_eq!(ids_of(executor.execute(select_all())?), vec![1, 2]);
    Ok(())
}

#[test]
fn test_insert_arity_and_id_checks() -> Result<(), DatabaseError> {
    let db = TempDatabase::new()?;
    let mut executor = db.file_executor("main")?;
    let short = Command::Insert {
        table: None,
        values: vec![Value::Integer(1)],
    };
    assert!(matches!(executor.execute(short), Err(DatabaseError::SchemaMismatch { .. })));

    let text_id = Command::Insert {
        table: None,
        values: vec![
            Value::Text("abc".to_string()),
            Value::Text("u".to_string()),
            Value::Text("e".to_string()),
        ],
    };
    assert_eq!(executor.execute(text_id).unwrap_err().to_string(), "ID must be an integer.");

    assert_eq!(parse_id(&Value::Text("12".to_string()))?, 12);
    assert_eq!(parse_id(&Value::Integer(1 << 40)).unwrap_err().to_string(), "ID is too large.");
    Ok(())
}

#[test]
fn test_select_by_key() -> Result<(), DatabaseError> {
    let db = TempDatabase::new()?;
    let mut executor = seeded(&db, 30)?;
    assert_eq!(ids_of(executor.execute(select_where("id", ComparisonOp::Equal, Value::Integer(17)))?), vec![17]);
    assert_eq!(
        ids_of(executor.execute(select_where("id", ComparisonOp::GreaterThan, Value::Integer(27)))?),
        vec![28, 29, 30]
    );
    assert_eq!(
        ids_of(executor.execute(select_where("id", ComparisonOp::LessThanOrEqual, Value::Integer(2)))?),
        vec![1, 2]
    );
    let missing = executor.execute(select_where("id", ComparisonOp::Equal, Value::Integer(99)));
    assert!(matches!(missing, Err(DatabaseError::RecordNotFound { key: 99 })));
    Ok(())
}

#[test]
fn test_select_by_other_column_and_projection() -> Result<(), DatabaseError> {
    let db = TempDatabase::new()?;
    let mut executor = seeded(&db, 5)?;
    let result = executor.execute(select_where(
        "username",
        ComparisonOp::Equal,
        Value::Text("user3".to_string()),
    ))?;
    assert_eq!(ids_of(result), vec![3]);

    let projected = executor.execute(Command::Select {
        table: None,
        columns: vec!["email".to_string()],
        where_clause: Some(WhereClause::new("id", ComparisonOp::GreaterThanOrEqual, Value::Integer(5))),
    })?;
    assert_eq!(rows_of(projected), vec![vec![Value::Text("person5@example.com".to_string())]]);

    let bad = executor.execute(Command::Select {
        table: None,
        columns: vec!["nope".to_string()],
        where_clause: None,
    });
    assert!(matches!(bad, Err(DatabaseError::ColumnNotFound { .. })));
    Ok(())
}

#[test]
fn test_update_changes_one_field() -> Result<(), DatabaseError> {
    let db = TempDatabase::new()?;
    let mut executor = seeded(&db, 3)?;
    let result = executor.execute(Command::Update {
        table: None,
        column: "email".to_string(),
        value: Value::Text("changed@example.com".to_string()),
        where_clause: Some(WhereClause::new("id", ComparisonOp::Equal, Value::Integer(2))),
    })?;
    assert_eq!(result.message(), "1 row(s) updated");

    let rows = rows_of(executor.execute(select_where("id", ComparisonOp::Equal, Value::Integer(2)))?);
    assert_eq!(
        rows[0],
        vec![
            Value::Integer(2),
            Value::Text("user2".to_string()),
            Value::Text("changed@example.com".to_string()),
        ]
    );

    let key_update = executor.execute(Command::Update {
        table: None,
        column: "id".to_string(),
        value: Value::Integer(9),
        where_clause: None,
    });
    assert_eq!(key_update.unwrap_err().to_string(), "Cannot update the key column.");

    let all = executor.execute(Command::Update {
        table: None,
        column: "username".to_string(),
        value: Value::Text("same".to_string()),
        where_clause: None,
    })?;
    assert_eq!(all.message(), "3 row(s) updated");
    Ok(())
}

#[test]
fn test_delete_by_key() -> Result<(), DatabaseError> {
    let db = TempDatabase::new()?;
    let mut executor = seeded(&db, 20)?;
    let result = executor.execute(Command::Delete {
        table: None,
        where_clause: Some(WhereClause::new("id", ComparisonOp::Equal, Value::Integer(4))),
    })?;
    assert_eq!(result.message(), "1 row(s) deleted");
    assert!(matches!(
        executor.execute(select_where("id", ComparisonOp::Equal, Value::Integer(4))),
        Err(DatabaseError::RecordNotFound { .. })
    ));
    assert_eq!(ids_of(executor.execute(select_all())?).len(), 19);

    let ranged = executor.execute(Command::Delete {
        table: None,
        where_clause: Some(WhereClause::new("id", ComparisonOp::GreaterThan, Value::Integer(15))),
    })?;
    assert_eq!(ranged.message(), "5 row(s) deleted");
    Ok(())
}

#[test]
fn test_rows_persist_after_close() -> Result<(), DatabaseError> {
    let db = TempDatabase::new()?;
    {
        let mut executor = seeded(&db, 1)?;
        executor.close()?;
    }
    let mut executor = db.file_executor("main")?;
    let rows = rows_of(executor.execute(select_all())?);
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0][1], Value::Text("user1".to_string()));
    Ok(())
}

#[test]
fn test_table_full_keeps_accepted_rows() -> Result<(), DatabaseError> {
    let db = TempDatabase::new()?;
    let mut executor = db.file_executor("main")?;
    let mut accepted = 0;
    let mut full = false;
    for i in 1..=1401 {
        match executor.execute(insert(i, &format!("user{}", i), &format!("person{}@example.com", i))) {
            Ok(_) => accepted += 1,
            Err(e) => {
                assert_eq!(e.to_string(), "Error: Table full.");
                full = true;
                break;
            }
        }
    }
    assert!(full);
    assert_eq!(ids_of(executor.execute(select_all())?), (1..=accepted).collect::<Vec<i64>>());
    Ok(())
}

#[test]
fn test_meta_commands() -> Result<(), DatabaseError> {
    let db = TempDatabase::new()?;
    let mut executor = seeded(&db, 3)?;
    match executor.execute(Command::Meta { meta: MetaCommand::Constants })? {
        QueryResult::Constants(text) => {
            assert_eq!(
                text,
                "ROW_SIZE: 293\nCOMMON_NODE_HEADER_SIZE: 6\nLEAF_NODE_HEADER_SIZE: 14\n\
                 LEAF_NODE_CELL_SIZE: 297\nLEAF_NODE_SPACE_FOR_CELLS: 4082\nLEAF_NODE_MAX_CELLS: 13\n"
            );
        }
        other => panic!("unexpected {:?}", other),
    }
    assert_eq!(
        executor.execute(Command::Meta { meta: MetaCommand::Btree })?,
        QueryResult::Tree("- leaf (size 3)\n  - 1\n  - 2\n  - 3\n".to_string())
    );
    assert_eq!(executor.execute(Command::Meta { meta: MetaCommand::Exit })?, QueryResult::Exit);
    Ok(())
}

#[test]
fn test_requires_table_and_database() -> Result<(), DatabaseError> {
    let db = TempDatabase::new()?;
    let mut executor = db.executor();
    assert!(matches!(executor.execute(select_all()), Err(DatabaseError::NoTableSelected)));
    let named = Command::Select {
        table: Some("users".to_string()),
        columns: Vec::new(),
        where_clause: None,
    };
    assert!(matches!(executor.execute(named), Err(DatabaseError::NoDatabaseSelected)));
    assert!(matches!(executor.execute(Command::ShowTables), Err(DatabaseError::NoDatabaseSelected)));
    Ok(())
}

#[test]
fn test_database_and_table_lifecycle() -> Result<(), DatabaseError> {
    let db = TempDatabase::new()?;
    let mut executor = db.executor();
    executor.execute(Command::CreateDatabase {
        database: "shop".to_string(),
    })?;
    executor.execute(Command::UseDatabase {
        database: "shop".to_string(),
    })?;
    assert_eq!(executor.current_database(), Some("shop"));

    let columns = vec![
        column("id", DataType::Integer, None),
        column("name", DataType::Text, Some(16)),
        column("email", DataType::Text, Some(255)),
    ];
    executor.execute(Command::CreateTable {
        table: "customers".to_string(),
        columns: columns.clone(),
    })?;
    assert!(matches!(
        executor.execute(Command::CreateTable {
            table: "customers".to_string(),
            columns,
        }),
        Err(DatabaseError::TableExists { .. })
    ));
    let bad_layout = vec![column("id", DataType::Integer, None), column("price", DataType::Real, None)];
    assert!(matches!(
        executor.execute(Command::CreateTable {
            table: "prices".to_string(),
            columns: bad_layout,
        }),
        Err(DatabaseError::SchemaMismatch { .. })
    ));

    // A named table works without being selected.
    executor.execute(Command::Insert {
        table: Some("customers".to_string()),
        values: vec![Value::Integer(1), Value::Text("ann".to_string()), Value::Text("a@x.io".to_string())],
    })?;
    assert_eq!(executor.current_table(), None);
    let too_long = Command::Insert {
        table: Some("customers".to_string()),
        values: vec![Value::Integer(2), Value::Text("x".repeat(17)), Value::Text("b@x.io".to_string())],
    };
    assert_eq!(executor.execute(too_long).unwrap_err().to_string(), "String is too long.");

    executor.execute(Command::UseTable {
        table: "customers".to_string(),
    })?;
    assert_eq!(executor.current_table(), Some("customers"));
    assert_eq!(ids_of(executor.execute(select_all())?), vec![1]);

    executor.execute(Command::CreateIndex {
        index: "idx_name".to_string(),
        table: "customers".to_string(),
        column: "name".to_string(),
    })?;
    let indexes = rows_of(executor.execute(Command::ShowIndexes { table: None })?);
    assert_eq!(
        indexes,
        vec![vec![Value::Text("idx_name".to_string()), Value::Text("name".to_string())]]
    );
    let tables = rows_of(executor.execute(Command::ShowTables)?);
    assert_eq!(tables, vec![vec![Value::Text("customers".to_string())]]);
    Ok(())
}

#[test]
fn test_sessions_share_table_files() -> Result<(), DatabaseError> {
    let db = TempDatabase::new()?;
    let context = db.context();
    let mut first = Executor::new(context.clone());
    first.execute(Command::CreateDatabase {
        database: "shared".to_string(),
    })?;
    first.execute(Command::UseDatabase {
        database: "shared".to_string(),
    })?;
    first.execute(Command::CreateTable {
        table: "users".to_string(),
        columns: vec![
            column("id", DataType::Integer, None),
            column("username", DataType::Text, None),
            column("email", DataType::Text, None),
        ],
    })?;

    let mut second = Executor::new(context.clone());
    second.execute(Command::UseDatabase {
        database: "shared".to_string(),
    })?;
    second.execute(Command::UseTable {
        table: "users".to_string(),
    })?;
    first.execute(Command::Insert {
        table: Some("users".to_string()),
        values: vec![Value::Integer(1), Value::Text("u".to_string()), Value::Text("e".to_string())],
    })?;
    assert_eq!(ids_of(second.execute(select_all())?), vec![1]);
    assert_eq!(context.registry.len(), 1);
    Ok(())
}

#[test]
fn test_sessions_share_catalog() -> Result<(), DatabaseError> {
    let db = TempDatabase::new()?;
    let context = db.context();
    let users_columns = || {
        vec![
            column("id", DataType::Integer, None),
            column("username", DataType::Text, None),
            column("email", DataType::Text, None),
        ]
    };
    let mut first = Executor::new(context.clone());
    first.execute(Command::CreateDatabase {
        database: "d".to_string(),
    })?;
    first.execute(Command::UseDatabase {
        database: "d".to_string(),
    })?;
    let mut second = Executor::new(context.clone());
    second.execute(Command::UseDatabase {
        database: "d".to_string(),
    })?;

    second.execute(Command::CreateTable {
        table: "t1".to_string(),
        columns: users_columns(),
    })?;
    first.execute(Command::CreateTable {
        table: "t2".to_string(),
        columns: users_columns(),
    })?;
    second.execute(Command::CreateIndex {
        index: "idx_t2_name".to_string(),
        table: "t2".to_string(),
        column: "username".to_string(),
    })?;

    let mut third = Executor::new(context.clone());
    third.execute(Command::UseDatabase {
        database: "d".to_string(),
    })?;
    let tables = rows_of(third.execute(Command::ShowTables)?);
    assert_eq!(
        tables,
        vec![vec![Value::Text("t1".to_string())], vec![Value::Text("t2".to_string())]]
    );

    first.execute(Command::UseTable {
        table: "t1".to_string(),
    })?;
    assert_eq!(first.current_table(), Some("t1"));
    let indexes = rows_of(first.execute(Command::ShowIndexes {
        table: Some("t2".to_string()),
    })?);
    assert_eq!(
        indexes,
        vec![vec![Value::Text("idx_t2_name".to_string()), Value::Text("username".to_string())]]
    );

    // A fresh process reads both tables back from the catalog file.
    let mut reopened = Executor::new(db.context());
    reopened.execute(Command::UseDatabase {
        database: "d".to_string(),
    })?;
    assert_eq!(rows_of(reopened.execute(Command::ShowTables)?).len(), 2);
    Ok(())
}
