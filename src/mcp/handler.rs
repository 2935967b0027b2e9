//! Protocol handling for a single MCP connection or session.
//!
//! [`McpHandler`] implements the MCP lifecycle independently of the transport:
//!
//! 1. **Initialisation**: Capability negotiation and version agreement
//! 2. **Operation**: Handling tool calls and other requests
//!
//! Each stdio connection, SSE stream and streamable HTTP session owns one
//! handler. All handlers share one read-only [`VacationQueryEngine`].

use std::sync::Arc;

use serde::Deserialize;
use serde_json::{json, Value};

use crate::calendar::VacationQueryEngine;
use crate::mcp::protocol::{
    negotiate_version, IncomingMessage, JsonRpcError, JsonRpcNotification, JsonRpcRequest,
    JsonRpcResponse, OutgoingMessage, RequestId, SERVER_NAME,
};
use crate::mcp::tools;

/// Where a handler is in the MCP lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerState {
    /// No `initialize` yet; only `initialize` and `ping` are served.
    AwaitingInit,
    /// `initialize` answered, `notifications/initialized` still pending.
    Initialising,
    /// Lifecycle complete.
    Running,
    /// The transport is going away.
    ShuttingDown,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InitializeParams {
    protocol_version: String,
    #[serde(default)]
    client_info: Option<ClientInfo>,
}

#[derive(Debug, Deserialize)]
struct ClientInfo {
    name: String,
    #[serde(default)]
    version: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ToolCallParams {
    name: String,
    #[serde(default)]
    arguments: Value,
}

/// Protocol state machine and request dispatch for one client.
#[derive(Debug)]
pub struct McpHandler {
    /// Current lifecycle state.
    state: ServerState,
    /// Negotiated protocol version (set after initialisation).
    protocol_version: Option<String>,
    /// Skip the lifecycle checks (plain HTTP, one request per handler).
    stateless: bool,
    /// The shared query engine.
    engine: Arc<VacationQueryEngine>,
}

impl McpHandler {
    /// Creates a handler that requires `initialize` before tool calls.
    #[must_use]
    pub const fn new(engine: Arc<VacationQueryEngine>) -> Self {
        Self {
            state: ServerState::AwaitingInit,
            protocol_version: None,
            stateless: false,
            engine,
        }
    }

    /// Creates a handler that serves every request without prior `initialize`.
    #[must_use]
    pub const fn stateless(engine: Arc<VacationQueryEngine>) -> Self {
        Self {
            state: ServerState::AwaitingInit,
            protocol_version: None,
            stateless: true,
            engine,
        }
    }

    /// Returns the current lifecycle state.
    #[must_use]
    pub const fn state(&self) -> ServerState {
        self.state
    }

    /// Returns the negotiated protocol version, if initialised.
    #[must_use]
    pub fn protocol_version(&self) -> Option<&str> {
        self.protocol_version.as_deref()
    }

    /// Marks the handler as shutting down.
    pub fn shut_down(&mut self) {
        self.state = ServerState::ShuttingDown;
    }

    /// Handles a parsed incoming message.
    ///
    /// Returns the reply for requests and `None` for notifications.
    pub fn handle_message(&mut self, msg: IncomingMessage) -> Option<OutgoingMessage> {
        match msg {
            IncomingMessage::Request(req) => Some(self.handle_request(&req)),
            IncomingMessage::Notification(ref notif) => {
                self.handle_notification(notif);
                None
            }
        }
    }

    /// Handles an incoming request.
    fn handle_request(&mut self, req: &JsonRpcRequest) -> OutgoingMessage {
        tracing::debug!(id = %req.id, method = %req.method, "Handling request");

        let response = match req.method.as_str() {
            "initialize" => self.handle_initialize(req),
            "tools/list" => self.handle_tools_list(req),
            "tools/call" => self.handle_tools_call(req),
            "ping" => Ok(Self::handle_ping(req)),
            _ => Err(JsonRpcError::method_not_found(req.id.clone(), &req.method)),
        };

        match response {
            Ok(resp) => resp.into(),
            Err(error) => error.into(),
        }
    }

    /// Handles an incoming notification.
    fn handle_notification(&mut self, notif: &JsonRpcNotification) {
        match notif.method.as_str() {
            "notifications/initialized" if self.state == ServerState::Initialising => {
                self.state = ServerState::Running;
            }
            "notifications/cancelled" => {}
            other => tracing::debug!(method = other, "Ignoring notification"),
        }
    }

    /// Handles the initialize request.
    fn handle_initialize(&mut self, req: &JsonRpcRequest) -> Result<JsonRpcResponse, JsonRpcError> {
        if self.state != ServerState::AwaitingInit {
            return Err(JsonRpcError::invalid_request(
                Some(req.id.clone()),
                "Server already initialised",
            ));
        }

        let params: InitializeParams = parse_params(req, "initialize")?;

        let negotiated_version = negotiate_version(&params.protocol_version).to_string();

        let client = params.client_info.as_ref();
        tracing::info!(
            client = client.map(|c| c.name.as_str()),
            client_version = client.and_then(|c| c.version.as_deref()),
            requested = %params.protocol_version,
            negotiated = %negotiated_version,
            "Client initialised"
        );

        self.protocol_version = Some(negotiated_version.clone());
        self.state = if self.stateless {
            ServerState::Running
        } else {
            ServerState::Initialising
        };

        let result = json!({
            "protocolVersion": negotiated_version,
            "capabilities": {
                "tools": { "listChanged": false },
            },
            "serverInfo": {
                "name": SERVER_NAME,
                "version": env!("CARGO_PKG_VERSION"),
            },
        });

        Ok(JsonRpcResponse::success(req.id.clone(), result))
    }

    /// Handles the tools/list request.
    fn handle_tools_list(&self, req: &JsonRpcRequest) -> Result<JsonRpcResponse, JsonRpcError> {
        self.require_initialised(&req.id)?;

        let result = json!({
            "tools": tools::definitions(),
        });

        Ok(JsonRpcResponse::success(req.id.clone(), result))
    }

    /// Handles the tools/call request.
    fn handle_tools_call(&self, req: &JsonRpcRequest) -> Result<JsonRpcResponse, JsonRpcError> {
        self.require_initialised(&req.id)?;

        let params: ToolCallParams = parse_params(req, "tool call")?;

        tracing::debug!(tool = %params.name, "Calling tool");
        let result = tools::call_tool(&self.engine, &params.name, &params.arguments);

        let result_value = serde_json::to_value(&result).map_err(|e| {
            tracing::error!(error = %e, "Failed to serialise tool call result");
            JsonRpcError::internal_error(
                req.id.clone(),
                "Internal error: failed to serialise result",
            )
        })?;

        Ok(JsonRpcResponse::success(req.id.clone(), result_value))
    }

    /// Handles the ping request.
    fn handle_ping(req: &JsonRpcRequest) -> JsonRpcResponse {
        JsonRpcResponse::success(req.id.clone(), json!({}))
    }

    /// Ensures `initialize` has been answered.
    ///
    /// Requests between the initialize response and the initialized
    /// notification are served; some clients pipeline them.
    fn require_initialised(&self, id: &RequestId) -> Result<(), JsonRpcError> {
        let ready = self.stateless
            || matches!(
                self.state,
                ServerState::Initialising | ServerState::Running
            );

        if !ready {
            return Err(JsonRpcError::invalid_request(
                Some(id.clone()),
                "Server not initialised",
            ));
        }
        Ok(())
    }
}

/// Deserialises the required params object of a request.
fn parse_params<T: serde::de::DeserializeOwned>(
    req: &JsonRpcRequest,
    what: &str,
) -> Result<T, JsonRpcError> {
    req.params
        .as_ref()
        .map(|p| serde_json::from_value(p.clone()))
        .transpose()
        .map_err(|e| JsonRpcError::invalid_params(req.id.clone(), format!("Invalid {what} params: {e}")))?
        .ok_or_else(|| JsonRpcError::invalid_params(req.id.clone(), format!("Missing {what} params")))
}
