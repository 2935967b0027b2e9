//! school-vacation-mcp: MCP server for school vacation calendar lookups
//!
//! This library answers questions about school vacations in Belgium, the
//! Netherlands and Luxembourg from a day-by-day calendar dataset, and exposes
//! those answers as MCP tools.
//!
//! # Architecture
//!
//! The dataset is loaded once at startup and never changes:
//!
//! - **Calendar**: Parse the `;`-delimited dataset into per-day records
//! - **Queries**: Vacation checks, period grouping, supported regions
//! - **Transports**: stdio, plain HTTP, SSE and streamable HTTP
//!
//! # Modules
//!
//! - [`calendar`]: Dataset loading, regions and the query engine
//! - [`config`]: Configuration loading and validation
//! - [`error`]: Configuration and startup errors
//! - [`mcp`]: MCP protocol implementation

pub mod calendar;
pub mod config;
pub mod error;
pub mod mcp;
