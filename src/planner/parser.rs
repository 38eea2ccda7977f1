use sqlparser::{
    dialect::SQLiteDialect,
    tokenizer::{Token, Tokenizer},
};

use crate::{
    executor::{
        command::{ColumnDef, Command},
        predicate::{ComparisonOp, WhereClause},
    },
    planner::error::PlannerError,
    storage::users::Role,
    types::value::{DataType, Value},
};

/// Translates the supported SQL subset into executor commands.
pub struct SqlParser;

impl Default for SqlParser {
    fn default() -> Self {
        Self::new()
    }
}

impl SqlParser {
    pub fn new() -> Self {
        Self
    }

    pub fn parse_sql(&self, sql: &str) -> Result<Command, PlannerError> {
        let dialect = SQLiteDialect {};
        let tokens = Tokenizer::new(&dialect, sql).tokenize()?;
        let mut stream = TokenStream::new(tokens);

        let command = match stream.next_keyword().as_deref() {
            Some("select") => parse_select(&mut stream)?,
            Some("insert") => parse_insert(&mut stream)?,
            Some("update") => parse_update(&mut stream)?,
            Some("delete") => parse_delete(&mut stream)?,
            Some("create") => parse_create(&mut stream)?,
            Some("use") => parse_use(&mut stream)?,
            Some("show") => parse_show(&mut stream)?,
            Some("begin") | Some("start") => {
                stream.consume_keyword("transaction");
                Command::Begin
            }
            Some("commit") => {
                stream.consume_keyword("transaction");
                Command::Commit
            }
            Some("rollback") => {
                stream.consume_keyword("transaction");
                Command::Rollback
            }
            Some("login") => Command::Login {
                username: stream.identifier("LOGIN")?,
                password: stream.text("LOGIN")?,
            },
            Some("logout") => Command::Logout,
            Some("ping") => Command::Ping,
            _ => return Err(PlannerError::UnrecognizedKeyword(sql.trim().to_string())),
        };

        while stream.consume(&Token::SemiColon) {}
        if let Some(token) = stream.peek() {
            return Err(PlannerError::InvalidStatement {
                statement: "SQL",
                details: format!("unexpected trailing input at '{}'", token),
            });
        }
        Ok(command)
    }
}

struct TokenStream {
    tokens: Vec<Token>,
    pos: usize,
}

impl TokenStream {
    fn new(tokens: Vec<Token>) -> Self {
        Self { tokens, pos: 0 }
    }

    fn skip_whitespace(&mut self) {
        while matches!(self.tokens.get(self.pos), Some(Token::Whitespace(_))) {
            self.pos += 1;
        }
    }

    fn peek(&mut self) -> Option<&Token> {
        self.skip_whitespace();
        self.tokens.get(self.pos).filter(|t| **t != Token::EOF)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.peek().cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn consume(&mut self, expected: &Token) -> bool {
        if self.peek() == Some(expected) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn peek_keyword(&mut self) -> Option<String> {
        match self.peek() {
            Some(Token::Word(word)) if word.quote_style.is_none() => Some(word.value.to_ascii_lowercase()),
            _ => None,
        }
    }

    fn next_keyword(&mut self) -> Option<String> {
        let keyword = self.peek_keyword();
        if keyword.is_some() {
            self.pos += 1;
        }
        keyword
    }

    fn consume_keyword(&mut self, keyword: &str) -> bool {
        if self.peek_keyword().as_deref() == Some(keyword) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect_keyword(&mut self, keyword: &str, statement: &'static str) -> Result<(), PlannerError> {
        if self.consume_keyword(keyword) {
            Ok(())
        } else {
            Err(self.unexpected(statement, &format!("expected {}", keyword.to_ascii_uppercase())))
        }
    }

    fn expect(&mut self, expected: Token, statement: &'static str) -> Result<(), PlannerError> {
        if self.consume(&expected) {
            Ok(())
        } else {
            Err(self.unexpected(statement, &format!("expected '{}'", expected)))
        }
    }

    fn identifier(&mut self, statement: &'static str) -> Result<String, PlannerError> {
        match self.peek() {
            Some(Token::Word(word)) => {
                let name = word.value.clone();
                self.pos += 1;
                Ok(name)
            }
            _ => Err(self.unexpected(statement, "expected a name")),
        }
    }

    fn literal(&mut self, statement: &'static str) -> Result<Value, PlannerError> {
        let (raw, quoted) = self.raw_literal(statement)?;
        Ok(if quoted { Value::Text(raw) } else { Value::from_literal(&raw) })
    }

    /// A literal taken verbatim, without typing digits or booleans.
    fn text(&mut self, statement: &'static str) -> Result<String, PlannerError> {
        self.raw_literal(statement).map(|(raw, _)| raw)
    }

    // A raw literal is the longest run of adjacent tokens up to whitespace,
    // a comma, a parenthesis or a semicolon.
    fn raw_literal(&mut self, statement: &'static str) -> Result<(String, bool), PlannerError> {
        match self.peek().cloned() {
            Some(Token::SingleQuotedString(s)) | Some(Token::DoubleQuotedString(s)) => {
                self.pos += 1;
                return Ok((s, true));
            }
            Some(Token::Word(word)) if word.quote_style.is_some() => {
                self.pos += 1;
                return Ok((word.value, true));
            }
            _ => {}
        }
        let mut raw = String::new();
        while let Some(token) = self.tokens.get(self.pos) {
            match token {
                Token::Whitespace(_)
                | Token::Comma
                | Token::LParen
                | Token::RParen
                | Token::SemiColon
                | Token::EOF => break,
                other => raw.push_str(&other.to_string()),
            }
            self.pos += 1;
        }
        if raw.is_empty() {
            return Err(self.unexpected(statement, "expected a value"));
        }
        Ok((raw, false))
    }

    fn unexpected(&mut self, statement: &'static str, expectation: &str) -> PlannerError {
        let found = self
            .peek()
            .map(|t| format!("'{}'", t))
            .unwrap_or_else(|| "end of input".to_string());
        PlannerError::InvalidStatement {
            statement,
            details: format!("{}, found {}", expectation, found),
        }
    }
}

fn parse_where(stream: &mut TokenStream, statement: &'static str) -> Result<Option<WhereClause>, PlannerError> {
    if !stream.consume_keyword("where") {
        return Ok(None);
    }
    let column = stream.identifier(statement)?;
    let operator = match stream.next() {
        Some(Token::Eq) | Some(Token::DoubleEq) => ComparisonOp::Equal,
        Some(Token::Lt) => ComparisonOp::LessThan,
        Some(Token::LtEq) => ComparisonOp::LessThanOrEqual,
        Some(Token::Gt) => ComparisonOp::GreaterThan,
        Some(Token::GtEq) => ComparisonOp::GreaterThanOrEqual,
        other => {
            return Err(PlannerError::InvalidStatement {
                statement,
                details: format!(
                    "unsupported comparison {}",
                    other.map(|t| format!("'{}'", t)).unwrap_or_else(|| "<none>".to_string())
                ),
            });
        }
    };
    let value = stream.literal(statement)?;
    Ok(Some(WhereClause::new(column, operator, value)))
}

fn parse_select(stream: &mut TokenStream) -> Result<Command, PlannerError> {
    let mut columns = Vec::new();
    if !stream.consume(&Token::Mul) {
        loop {
            columns.push(stream.identifier("SELECT")?);
            if !stream.consume(&Token::Comma) {
                break;
            }
        }
    }
    stream.expect_keyword("from", "SELECT")?;
    let table = stream.identifier("SELECT")?;
    let where_clause = parse_where(stream, "SELECT")?;
    Ok(Command::Select {
        table: Some(table),
        columns,
        where_clause,
    })
}

fn parse_insert(stream: &mut TokenStream) -> Result<Command, PlannerError> {
    stream.expect_keyword("into", "INSERT")?;
    let table = stream.identifier("INSERT")?;
    stream.expect_keyword("values", "INSERT")?;
    stream.expect(Token::LParen, "INSERT")?;
    let mut values = Vec::new();
    loop {
        values.push(stream.literal("INSERT")?);
        if !stream.consume(&Token::Comma) {
            break;
        }
    }
    stream.expect(Token::RParen, "INSERT")?;
    Ok(Command::Insert {
        table: Some(table),
        values,
    })
}

fn parse_update(stream: &mut TokenStream) -> Result<Command, PlannerError> {
    let table = stream.identifier("UPDATE")?;
    stream.expect_keyword("set", "UPDATE")?;
    let column = stream.identifier("UPDATE")?;
    stream.expect(Token::Eq, "UPDATE")?;
    let value = stream.literal("UPDATE")?;
    let where_clause = parse_where(stream, "UPDATE")?;
    Ok(Command::Update {
        table: Some(table),
        column,
        value,
        where_clause,
    })
}

fn parse_delete(stream: &mut TokenStream) -> Result<Command, PlannerError> {
    stream.expect_keyword("from", "DELETE")?;
    let table = stream.identifier("DELETE")?;
    let where_clause = parse_where(stream, "DELETE")?;
    Ok(Command::Delete {
        table: Some(table),
        where_clause,
    })
}

fn parse_create(stream: &mut TokenStream) -> Result<Command, PlannerError> {
    match stream.next_keyword().as_deref() {
        Some("table") => parse_create_table(stream),
        Some("index") => {
            let index = stream.identifier("CREATE INDEX")?;
            stream.expect_keyword("on", "CREATE INDEX")?;
            let table = stream.identifier("CREATE INDEX")?;
            stream.expect(Token::LParen, "CREATE INDEX")?;
            let column = stream.identifier("CREATE INDEX")?;
            stream.expect(Token::RParen, "CREATE INDEX")?;
            Ok(Command::CreateIndex {
                index,
                table,
                column,
            })
        }
        Some("database") => Ok(Command::CreateDatabase {
            database: stream.identifier("CREATE DATABASE")?,
        }),
        Some("user") => parse_create_user(stream),
        _ => Err(stream.unexpected("CREATE", "expected TABLE, INDEX, DATABASE or USER")),
    }
}

/// `CREATE USER name PASSWORD 'secret' [ROLE admin|developer|user]`
fn parse_create_user(stream: &mut TokenStream) -> Result<Command, PlannerError> {
    let username = stream.identifier("CREATE USER")?;
    stream.expect_keyword("password", "CREATE USER")?;
    let password = stream.text("CREATE USER")?;
    let role = if stream.consume_keyword("role") {
        let name = stream.identifier("CREATE USER")?;
        name.parse::<Role>().map_err(|_| PlannerError::InvalidStatement {
            statement: "CREATE USER",
            details: format!("unknown role '{}'", name),
        })?
    } else {
        Role::User
    };
    Ok(Command::CreateUser {
        username,
        password,
        role,
    })
}

fn parse_create_table(stream: &mut TokenStream) -> Result<Command, PlannerError> {
    let table = stream.identifier("CREATE TABLE")?;
    stream.expect(Token::LParen, "CREATE TABLE")?;
    let mut columns = Vec::new();
    loop {
        let name = stream.identifier("CREATE TABLE")?;
        let type_name = stream.identifier("CREATE TABLE")?;
        let data_type: DataType = type_name
            .parse()
            .map_err(|_| PlannerError::UnsupportedDataType(type_name.clone()))?;
        let mut size = None;
        if stream.consume(&Token::LParen) {
            size = match stream.next() {
                Some(Token::Number(n, _)) => Some(n.parse::<u32>().map_err(|_| PlannerError::InvalidStatement {
                    statement: "CREATE TABLE",
                    details: format!("invalid column size '{}'", n),
                })?),
                _ => return Err(stream.unexpected("CREATE TABLE", "expected a column size")),
            };
            stream.expect(Token::RParen, "CREATE TABLE")?;
        }
        columns.push(ColumnDef {
            name,
            data_type,
            size,
        });
        if !stream.consume(&Token::Comma) {
            break;
        }
    }
    stream.expect(Token::RParen, "CREATE TABLE")?;
    Ok(Command::CreateTable { table, columns })
}

fn parse_use(stream: &mut TokenStream) -> Result<Command, PlannerError> {
    match stream.next_keyword().as_deref() {
        Some("table") => Ok(Command::UseTable {
            table: stream.identifier("USE TABLE")?,
        }),
        Some("database") => Ok(Command::UseDatabase {
            database: stream.identifier("USE DATABASE")?,
        }),
        _ => Err(stream.unexpected("USE", "expected TABLE or DATABASE")),
    }
}

fn parse_show(stream: &mut TokenStream) -> Result<Command, PlannerError> {
    match stream.next_keyword().as_deref() {
        Some("tables") => Ok(Command::ShowTables),
        Some("indexes") | Some("index") => {
            let table = if stream.consume_keyword("from") || stream.consume_keyword("on") {
                Some(stream.identifier("SHOW INDEXES")?)
            } else {
                None
            };
            Ok(Command::ShowIndexes { table })
        }
        Some("auth") => Ok(Command::AuthStatus),
        Some("database") => Ok(Command::DatabaseStatus),
        Some("transaction") => Ok(Command::TransactionStatus),
        _ => Err(stream.unexpected("SHOW", "expected TABLES, INDEXES, AUTH, DATABASE or TRANSACTION")),
    }
}
