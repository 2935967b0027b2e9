//! Newline-delimited transport for the stdio binding.
//!
//! Framing follows the MCP stdio transport:
//!
//! - One UTF-8 JSON-RPC message per line
//! - Messages never contain embedded newlines
//! - stdin carries client messages, stdout carries replies
//! - stderr is left to logging
//!
//! The transport is generic over its reader and writer so that the same
//! framing can run over in-memory buffers.

use std::io;

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};

use crate::mcp::protocol::OutgoingMessage;

/// Line framing over any async reader/writer pair.
#[derive(Debug)]
pub struct LineTransport<R, W> {
    reader: R,
    writer: W,
}

/// The transport bound to the process's stdin and stdout.
pub type StdioTransport = LineTransport<BufReader<tokio::io::Stdin>, tokio::io::Stdout>;

impl StdioTransport {
    /// Creates a transport over stdin and stdout.
    #[must_use]
    pub fn stdio() -> Self {
        Self::new(BufReader::new(tokio::io::stdin()), tokio::io::stdout())
    }
}

impl<R, W> LineTransport<R, W>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    /// Wraps a reader and writer.
    #[must_use]
    pub const fn new(reader: R, writer: W) -> Self {
        Self { reader, writer }
    }

    /// Reads the next line, without its terminator.
    ///
    /// Returns `None` at end of input.
    ///
    /// # Errors
    ///
    /// Returns an error if reading fails or the line is not UTF-8.
    pub async fn read_line(&mut self) -> io::Result<Option<String>> {
        let mut line = String::new();
        if self.reader.read_line(&mut line).await? == 0 {
            return Ok(None);
        }

        let trimmed = line.trim_end_matches(['\n', '\r']).len();
        line.truncate(trimmed);
        Ok(Some(line))
    }

    /// Writes one reply as a single line and flushes.
    ///
    /// # Errors
    ///
    /// Returns an error if serialisation or writing fails.
    pub async fn write_message(&mut self, message: &OutgoingMessage) -> io::Result<()> {
        let json = message
            .to_json()
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;

        // serde_json escapes newlines inside strings
        debug_assert!(!json.contains('\n'));

        self.writer.write_all(json.as_bytes()).await?;
        self.writer.write_all(b"\n").await?;
        self.writer.flush().await
    }

    /// Returns the underlying reader and writer.
    pub fn into_inner(self) -> (R, W) {
        (self.reader, self.writer)
    }
}
