//! stdio MCP server.
//!
//! This module runs one [`McpHandler`] over a line transport, normally stdio:
//!
//! 1. **Initialisation**: Capability negotiation and version agreement
//! 2. **Operation**: Handling tool calls and other requests
//! 3. **Shutdown**: EOF on stdin, SIGINT or SIGTERM (Ctrl+C on Windows)

use std::sync::Arc;

use tokio::io::{AsyncBufRead, AsyncWrite, BufReader, Stdin, Stdout};

use crate::calendar::VacationQueryEngine;
use crate::mcp::handler::{McpHandler, ServerState};
use crate::mcp::protocol::parse_message;
use crate::mcp::transport::{LineTransport, StdioTransport};

/// The MCP server for the line-delimited transports.
#[derive(Debug)]
pub struct McpServer<R = BufReader<Stdin>, W = Stdout> {
    /// Protocol state and dispatch.
    handler: McpHandler,
    /// The transport layer.
    transport: LineTransport<R, W>,
}

impl McpServer {
    /// Creates a new stdio server over the shared query engine.
    #[must_use]
    pub fn new(engine: Arc<VacationQueryEngine>) -> Self {
        Self::with_transport(engine, StdioTransport::stdio())
    }
}

impl<R, W> McpServer<R, W>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    /// Creates a server over an arbitrary line transport.
    #[must_use]
    pub fn with_transport(engine: Arc<VacationQueryEngine>, transport: LineTransport<R, W>) -> Self {
        Self {
            handler: McpHandler::new(engine),
            transport,
        }
    }

    /// Consumes the server, returning its transport.
    pub fn into_transport(self) -> LineTransport<R, W> {
        self.transport
    }

    /// Returns the current server state.
    #[must_use]
    pub const fn state(&self) -> ServerState {
        self.handler.state()
    }

    /// Runs the MCP server main loop with graceful shutdown handling.
    ///
    /// # Errors
    ///
    /// Returns an error if transport I/O fails.
    pub async fn run(&mut self) -> std::io::Result<()> {
        let shutdown = shutdown_signal();
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                signal = &mut shutdown => {
                    let signal = signal?;
                    tracing::info!(signal, "Received signal, initiating graceful shutdown");
                    self.handler.shut_down();
                    return Ok(());
                }

                line_result = self.transport.read_line() => {
                    if self.handle_transport_result(line_result).await? {
                        return Ok(());
                    }
                }
            }
        }
    }

    /// Handles the result from transport read.
    ///
    /// Returns `true` if the server should shut down.
    async fn handle_transport_result(
        &mut self,
        line_result: std::io::Result<Option<String>>,
    ) -> std::io::Result<bool> {
        let Some(line) = line_result? else {
            tracing::info!("stdin closed");
            self.handler.shut_down();
            return Ok(true);
        };

        if line.trim().is_empty() {
            return Ok(false);
        }

        self.handle_line(&line).await?;

        Ok(self.handler.state() == ServerState::ShuttingDown)
    }

    /// Handles a single line of input.
    async fn handle_line(&mut self, line: &str) -> std::io::Result<()> {
        match parse_message(line) {
            Ok(msg) => match self.handler.handle_message(msg) {
                Some(reply) => self.transport.write_message(&reply).await,
                None => Ok(()),
            },
            Err(error) => {
                tracing::debug!(code = error.error.code, "Rejected malformed message");
                self.transport.write_message(&error.into()).await
            }
        }
    }
}

/// Resolves when the process is asked to stop, yielding the signal name.
///
/// # Errors
///
/// Returns an error if the signal handlers cannot be installed.
#[cfg(unix)]
pub async fn shutdown_signal() -> std::io::Result<&'static str> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigint = signal(SignalKind::interrupt())?;
    let mut sigterm = signal(SignalKind::terminate())?;

    tokio::select! {
        _ = sigint.recv() => Ok("SIGINT"),
        _ = sigterm.recv() => Ok("SIGTERM"),
    }
}

/// Resolves when the process is asked to stop, yielding the signal name.
///
/// # Errors
///
/// Returns an error if the Ctrl+C handler cannot be installed.
#[cfg(windows)]
pub async fn shutdown_signal() -> std::io::Result<&'static str> {
    tokio::signal::ctrl_c().await?;
    Ok("Ctrl+C")
}
