//! Model Context Protocol (MCP) server implementation.
//!
//! This module exposes the school vacation calendar as MCP tools. One
//! protocol handler and one tool table serve every transport; each transport
//! only moves JSON-RPC 2.0 messages in and out.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                          MCP Server                          │
//! │                                                              │
//! │   ┌──────────────┐    ┌─────────────┐    ┌─────────────┐    │
//! │   │  Transport   │───▶│   Handler   │───▶│    Tools    │    │
//! │   │ stdio / HTTP │    │ (lifecycle) │    │ (dispatch)  │    │
//! │   └──────────────┘    └─────────────┘    └─────────────┘    │
//! │          │                  ▲                  │             │
//! │          ▼                  │                  ▼             │
//! │   ┌──────────────┐          │          ┌─────────────┐      │
//! │   │   Sessions   │──────────┘          │ QueryEngine │      │
//! │   │ (HTTP only)  │                     │  (shared)   │      │
//! │   └──────────────┘                     └─────────────┘      │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Protocol Version
//!
//! This implementation negotiates MCP protocol versions 2024-11-05,
//! 2025-03-26 and 2025-06-18.

pub mod handler;
pub mod http;
pub mod protocol;
pub mod server;
pub mod session;
pub mod tools;
pub mod transport;

pub use handler::{McpHandler, ServerState};
pub use http::{AppState, Binding};
pub use protocol::{
    IncomingMessage, JsonRpcError, JsonRpcRequest, JsonRpcResponse, OutgoingMessage,
    MCP_PROTOCOL_VERSION,
};
pub use server::McpServer;
pub use session::{SessionError, SessionRegistry, SESSION_HEADER};
pub use transport::{LineTransport, StdioTransport};
