use std::{future::Future, net::SocketAddr};

use tokio::{
    io::{AsyncRead, AsyncWrite},
    net::{TcpListener, TcpStream},
};
use tracing::{debug, error, info, warn};

use crate::{
    config::ServerConfig,
    executor::{ExecutionContext, Executor, command::QueryResult},
    network::protocol::{Request, Response, read_frame, write_frame},
    types::error::DatabaseError,
};

/// Accepts connections and runs one executor session per connection. All
/// sessions share the context, and with it one open tree per table file.
pub struct Server {
    listener: TcpListener,
    context: ExecutionContext,
}

impl Server {
    pub async fn bind(config: &ServerConfig) -> Result<Self, DatabaseError> {
        std::fs::create_dir_all(&config.data_dir)?;
        let context = if config.auth {
            ExecutionContext::with_auth(&config.data_dir, &config.admin_password)?
        } else {
            ExecutionContext::new(&config.data_dir)
        };
        Self::bind_with_context(config, context).await
    }

    pub async fn bind_with_context(config: &ServerConfig, context: ExecutionContext) -> Result<Self, DatabaseError> {
        let listener = TcpListener::bind(config.address()).await?;
        info!(
            addr = %listener.local_addr()?,
            data_dir = %context.data_dir.display(),
            auth = context.auth_enabled(),
            "listening"
        );
        Ok(Self { listener, context })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, DatabaseError> {
        Ok(self.listener.local_addr()?)
    }

    pub fn context(&self) -> &ExecutionContext {
        &self.context
    }

    pub async fn run(self) -> Result<(), DatabaseError> {
        self.run_until(std::future::pending()).await
    }

    /// Serves until `shutdown` resolves, then flushes every open table.
    pub async fn run_until<F>(self, shutdown: F) -> Result<(), DatabaseError>
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                accepted = self.listener.accept() => match accepted {
                    Ok((socket, peer)) => {
                        debug!(%peer, "connection accepted");
                        let context = self.context.clone();
                        tokio::spawn(async move {
                            if let Err(e) = handle_connection(socket, context).await {
                                error!(%peer, error = %e, "connection ended with a fatal error");
                            }
                        });
                    }
                    Err(e) => warn!(error = %e, "accept failed"),
                },
                _ = &mut shutdown => break,
            }
        }
        info!(tables = self.context.registry.len(), "shutting down");
        self.context.registry.flush_all()
    }
}

async fn handle_connection(socket: TcpStream, context: ExecutionContext) -> Result<(), DatabaseError> {
    let peer = socket.peer_addr()?;
    let (mut reader, mut writer) = socket.into_split();
    let mut executor = Executor::new(context);
    let outcome = serve_session(&mut executor, &mut reader, &mut writer).await;
    // A dropped connection abandons its transaction.
    if let Err(e) = executor.close() {
        error!(%peer, error = %e, "failed to close session");
    }
    debug!(%peer, "connection closed");
    outcome
}

pub async fn serve_session<R, W>(executor: &mut Executor, reader: &mut R, writer: &mut W) -> Result<(), DatabaseError>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    loop {
        let request: Request = match read_frame(reader).await {
            Ok(Some(request)) => request,
            Ok(None) => return Ok(()),
            Err(DatabaseError::Serialization { details }) => {
                warn!(%details, "malformed request");
                let response = Response::error(format!("Malformed request: {}", details), executor.transaction_id());
                write_frame(writer, &response).await?;
                return Ok(());
            }
            Err(e) => return Err(e),
        };

        match executor.execute_request(request.transaction_id, request.command) {
            Ok(QueryResult::Exit) => {
                write_frame(writer, &Response::from_result(QueryResult::Exit, executor.transaction_id())).await?;
                return Ok(());
            }
            Ok(result) => {
                write_frame(writer, &Response::from_result(result, executor.transaction_id())).await?;
            }
            Err(e) if e.is_fatal() => {
                error!(error = %e, "fatal error, closing connection");
                write_frame(writer, &Response::error(&e, executor.transaction_id())).await?;
                return Err(e);
            }
            Err(e) => {
                warn!(error = %e, "command failed");
                write_frame(writer, &Response::error(&e, executor.transaction_id())).await?;
            }
        }
    }
}
