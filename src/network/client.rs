use std::time::Duration;

use thiserror::Error;
use tokio::{io::AsyncWriteExt, net::TcpStream};
use tracing::debug;

use crate::{
    config::ClientConfig,
    executor::command::Command,
    network::protocol::{Request, Response, read_frame, write_frame},
    planner::{error::PlannerError, parser::SqlParser},
    types::{TransactionId, error::DatabaseError},
};

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Query error: {0}")]
    Query(String),

    #[error(transparent)]
    Parse(#[from] PlannerError),

    #[error("Protocol error: {0}")]
    Protocol(String),
}

impl From<DatabaseError> for ClientError {
    fn from(error: DatabaseError) -> Self {
        match error {
            DatabaseError::Serialization { details } => ClientError::Protocol(details),
            other => ClientError::Connection(other.to_string()),
        }
    }
}

/// A client session. It remembers the transaction the server last reported
/// and attaches it to every request.
pub struct Connection {
    stream: TcpStream,
    parser: SqlParser,
    transaction_id: Option<TransactionId>,
}

impl Connection {
    pub async fn connect(host: &str, port: u16, timeout: Duration) -> Result<Self, ClientError> {
        let addr = format!("{}:{}", host, port);
        let stream = tokio::time::timeout(timeout, TcpStream::connect(&addr))
            .await
            .map_err(|_| ClientError::Connection(format!("timed out connecting to {}", addr)))?
            .map_err(|e| ClientError::Connection(format!("{}: {}", addr, e)))?;
        stream
            .set_nodelay(true)
            .map_err(|e| ClientError::Connection(e.to_string()))?;
        debug!(%addr, "connected");
        Ok(Self {
            stream,
            parser: SqlParser::new(),
            transaction_id: None,
        })
    }

    /// Connects, logs in with the configured credentials and selects the
    /// configured database, if any.
    pub async fn from_config(config: &ClientConfig) -> Result<Self, ClientError> {
        let mut connection = Self::connect(
            &config.host,
            config.port,
            Duration::from_secs(config.connect_timeout_secs),
        )
        .await?;
        if let Some(username) = &config.username {
            let password = config.password.as_deref().unwrap_or_default();
            connection.login(username, password).await?;
        }
        if let Some(database) = &config.database {
            connection
                .send(Command::UseDatabase {
                    database: database.clone(),
                })
                .await?;
        }
        Ok(connection)
    }

    pub fn transaction_id(&self) -> Option<TransactionId> {
        self.transaction_id
    }

    pub async fn send(&mut self, command: Command) -> Result<Response, ClientError> {
        let request = Request::new(command, self.transaction_id);
        write_frame(&mut self.stream, &request).await?;
        let response: Response = match read_frame(&mut self.stream).await? {
            Some(response) => response,
            None => {
                self.transaction_id = None;
                return Err(ClientError::Connection("server closed the connection".to_string()));
            }
        };
        self.transaction_id = response.transaction_id;
        match response.error {
            Some(error) => Err(ClientError::Query(error)),
            None => Ok(response),
        }
    }

    pub async fn execute(&mut self, sql: &str) -> Result<Response, ClientError> {
        let command = self.parser.parse_sql(sql)?;
        self.send(command).await
    }

    pub async fn login(&mut self, username: &str, password: &str) -> Result<Response, ClientError> {
        self.send(Command::Login {
            username: username.to_string(),
            password: password.to_string(),
        })
        .await
    }

    pub async fn ping(&mut self) -> Result<Response, ClientError> {
        self.send(Command::Ping).await
    }

    pub async fn begin(&mut self) -> Result<TransactionId, ClientError> {
        let response = self.send(Command::Begin).await?;
        response
            .transaction_id
            .ok_or_else(|| ClientError::Protocol("BEGIN returned no transaction id".to_string()))
    }

    pub async fn commit(&mut self) -> Result<Response, ClientError> {
        self.send(Command::Commit).await
    }

    pub async fn rollback(&mut self) -> Result<Response, ClientError> {
        self.send(Command::Rollback).await
    }

    /// Rolls back an open transaction and shuts the socket down.
    pub async fn close(mut self) -> Result<(), ClientError> {
        if self.transaction_id.is_some() {
            self.rollback().await?;
        }
        self.stream
            .shutdown()
            .await
            .map_err(|e| ClientError::Connection(e.to_string()))
    }
}
