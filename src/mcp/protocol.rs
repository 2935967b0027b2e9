//! JSON-RPC 2.0 framing for MCP.
//!
//! Incoming text is classified by [`parse_message`] into requests (which carry
//! an id and get exactly one reply) and notifications (which get none). Every
//! reply is an [`OutgoingMessage`], either a result or an error object.
//!
//! # MCP-Specific Constraints
//!
//! - Request ids are strings or integers; `null` is rejected
//! - Batches are not supported
//! - Errors not tied to a request (session, auth) carry `"id": null`

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// The JSON-RPC version string every message must carry.
pub const JSONRPC_VERSION: &str = "2.0";

/// The latest MCP protocol version this implementation supports.
pub const MCP_PROTOCOL_VERSION: &str = "2025-06-18";

/// All protocol versions accepted during negotiation, oldest first.
pub const SUPPORTED_PROTOCOL_VERSIONS: &[&str] = &["2024-11-05", "2025-03-26", MCP_PROTOCOL_VERSION];

/// Server name for capability negotiation.
pub const SERVER_NAME: &str = "school-vacation-mcp";

/// Server error code for requests that do not belong to a valid session.
pub const SESSION_ERROR_CODE: i32 = -32000;

/// Server error code for a missing authorization header.
pub const UNAUTHORIZED_CODE: i32 = -32001;

/// Server error code for a rejected authentication token.
pub const FORBIDDEN_CODE: i32 = -32002;

/// Returns the protocol version to use for a client's requested version.
///
/// Supported versions are echoed back; anything else gets the latest version.
#[must_use]
pub fn negotiate_version(requested: &str) -> &'static str {
    SUPPORTED_PROTOCOL_VERSIONS
        .iter()
        .copied()
        .find(|v| *v == requested)
        .unwrap_or(MCP_PROTOCOL_VERSION)
}

/// A request identifier, echoed back in the reply.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RequestId {
    /// Numeric id.
    Number(i64),
    /// String id.
    String(String),
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{n}"),
            Self::String(s) => f.write_str(s),
        }
    }
}

/// An incoming request.
#[derive(Debug, Clone)]
pub struct JsonRpcRequest {
    /// Identifier to echo in the reply.
    pub id: RequestId,
    /// Method name.
    pub method: String,
    /// Method parameters, if any.
    pub params: Option<Value>,
}

/// An incoming notification.
#[derive(Debug, Clone)]
pub struct JsonRpcNotification {
    /// Method name.
    pub method: String,
    /// Notification parameters, if any.
    pub params: Option<Value>,
}

/// A successful reply.
#[derive(Debug, Clone, Serialize)]
pub struct JsonRpcResponse {
    /// Always [`JSONRPC_VERSION`].
    pub jsonrpc: &'static str,
    /// The id of the request being answered.
    pub id: RequestId,
    /// Method result.
    pub result: Value,
}

impl JsonRpcResponse {
    /// Creates a success reply.
    #[must_use]
    #[allow(clippy::missing_const_for_fn)] // Value is not const-compatible
    pub fn success(id: RequestId, result: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION,
            id,
            result,
        }
    }
}

/// JSON-RPC error codes used by this server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    /// The text is not JSON.
    ParseError,
    /// The JSON is not a valid message.
    InvalidRequest,
    /// No such method.
    MethodNotFound,
    /// Method parameters are missing or malformed.
    InvalidParams,
    /// The server failed while handling a valid request.
    InternalError,
    /// Implementation-defined code in the `-32000..=-32099` range.
    ServerError(i32),
}

impl ErrorCode {
    /// Returns the numeric code.
    #[must_use]
    pub const fn code(self) -> i32 {
        match self {
            Self::ParseError => -32700,
            Self::InvalidRequest => -32600,
            Self::MethodNotFound => -32601,
            Self::InvalidParams => -32602,
            Self::InternalError => -32603,
            Self::ServerError(code) => code,
        }
    }

    /// Returns the standard message for the code.
    #[must_use]
    pub const fn default_message(self) -> &'static str {
        match self {
            Self::ParseError => "Parse error",
            Self::InvalidRequest => "Invalid Request",
            Self::MethodNotFound => "Method not found",
            Self::InvalidParams => "Invalid params",
            Self::InternalError => "Internal error",
            Self::ServerError(_) => "Server error",
        }
    }
}

/// The `error` member of an error reply.
#[derive(Debug, Clone, Serialize)]
pub struct JsonRpcErrorData {
    /// Numeric code.
    pub code: i32,
    /// Short description.
    pub message: String,
    /// Extra detail for the client.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl JsonRpcErrorData {
    /// Creates an error with the code's standard message.
    #[must_use]
    pub fn from_code(code: ErrorCode) -> Self {
        Self::with_message(code, code.default_message())
    }

    /// Creates an error with a custom message.
    #[must_use]
    pub fn with_message(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code: code.code(),
            message: message.into(),
            data: None,
        }
    }

    /// Attaches extra detail.
    #[must_use]
    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }
}

/// An error reply.
#[derive(Debug, Clone, Serialize)]
pub struct JsonRpcError {
    /// Always [`JSONRPC_VERSION`].
    pub jsonrpc: &'static str,
    /// The id of the failed request, serialised as `null` when unknown.
    pub id: Option<RequestId>,
    /// Error details.
    pub error: JsonRpcErrorData,
}

impl JsonRpcError {
    /// Creates an error reply.
    #[must_use]
    #[allow(clippy::missing_const_for_fn)] // JsonRpcErrorData contains String
    pub fn new(id: Option<RequestId>, error: JsonRpcErrorData) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION,
            id,
            error,
        }
    }

    /// The message text was not JSON.
    #[must_use]
    pub fn parse_error() -> Self {
        Self::new(None, JsonRpcErrorData::from_code(ErrorCode::ParseError))
    }

    /// The message was JSON but not a valid JSON-RPC message.
    #[must_use]
    pub fn invalid_request(id: Option<RequestId>, message: impl Into<String>) -> Self {
        Self::new(
            id,
            JsonRpcErrorData::with_message(ErrorCode::InvalidRequest, message),
        )
    }

    /// The method is not served.
    #[must_use]
    pub fn method_not_found(id: RequestId, method: &str) -> Self {
        Self::new(
            Some(id),
            JsonRpcErrorData::with_message(
                ErrorCode::MethodNotFound,
                format!("Method not found: {method}"),
            ),
        )
    }

    /// The method's parameters are missing or malformed.
    #[must_use]
    pub fn invalid_params(id: RequestId, message: impl Into<String>) -> Self {
        Self::new(
            Some(id),
            JsonRpcErrorData::with_message(ErrorCode::InvalidParams, message),
        )
    }

    /// The server failed while handling the request.
    #[must_use]
    pub fn internal_error(id: RequestId, message: impl Into<String>) -> Self {
        Self::new(
            Some(id),
            JsonRpcErrorData::with_message(ErrorCode::InternalError, message),
        )
    }

    /// A server-defined error that is not tied to a request.
    #[must_use]
    pub fn server_error(code: i32, message: impl Into<String>) -> Self {
        Self::new(
            None,
            JsonRpcErrorData::with_message(ErrorCode::ServerError(code), message),
        )
    }
}

/// Any reply the server sends.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum OutgoingMessage {
    /// A result.
    Response(JsonRpcResponse),
    /// An error.
    Error(JsonRpcError),
}

impl OutgoingMessage {
    /// Returns `true` for a result.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self, Self::Response(_))
    }

    /// Serialises the reply as a single line of JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if serialisation fails.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

impl From<JsonRpcResponse> for OutgoingMessage {
    fn from(response: JsonRpcResponse) -> Self {
        Self::Response(response)
    }
}

impl From<JsonRpcError> for OutgoingMessage {
    fn from(error: JsonRpcError) -> Self {
        Self::Error(error)
    }
}

/// A classified incoming message.
#[derive(Debug, Clone)]
pub enum IncomingMessage {
    /// Expects a reply.
    Request(JsonRpcRequest),
    /// Expects no reply.
    Notification(JsonRpcNotification),
}

impl IncomingMessage {
    /// Returns the method name.
    #[must_use]
    pub fn method(&self) -> &str {
        match self {
            Self::Request(req) => &req.method,
            Self::Notification(notif) => &notif.method,
        }
    }

    /// Returns the parameters.
    #[must_use]
    #[allow(clippy::missing_const_for_fn)] // Option::as_ref is not const
    pub fn params(&self) -> Option<&Value> {
        match self {
            Self::Request(req) => req.params.as_ref(),
            Self::Notification(notif) => notif.params.as_ref(),
        }
    }

    /// Returns the request id, if this is a request.
    #[must_use]
    pub const fn id(&self) -> Option<&RequestId> {
        match self {
            Self::Request(req) => Some(&req.id),
            Self::Notification(_) => None,
        }
    }

    /// Returns `true` if this is an `initialize` request.
    #[must_use]
    pub fn is_initialize(&self) -> bool {
        matches!(self, Self::Request(req) if req.method == "initialize")
    }
}

/// Parses and classifies one message.
///
/// A message with an `id` member is a request, one without is a
/// notification.
///
/// # Errors
///
/// Returns a parse error if `json` is not JSON, and an invalid-request error
/// (carrying the id when it could be read) if it is not a single well-formed
/// JSON-RPC 2.0 message.
pub fn parse_message(json: &str) -> Result<IncomingMessage, JsonRpcError> {
    let value: Value = serde_json::from_str(json).map_err(|_| JsonRpcError::parse_error())?;

    let mut fields = match value {
        Value::Object(fields) => fields,
        Value::Array(_) => {
            return Err(JsonRpcError::invalid_request(
                None,
                "Invalid Request - batch messages are not supported",
            ))
        }
        _ => {
            return Err(JsonRpcError::invalid_request(
                None,
                "Invalid Request - message must be an object",
            ))
        }
    };

    let id = take_id(&mut fields)?;

    if fields.get("jsonrpc").and_then(Value::as_str) != Some(JSONRPC_VERSION) {
        return Err(JsonRpcError::invalid_request(
            id,
            "Invalid Request - missing or invalid jsonrpc version",
        ));
    }

    let method = match fields.remove("method") {
        Some(Value::String(method)) if !method.is_empty() => method,
        _ => {
            return Err(JsonRpcError::invalid_request(
                id,
                "Invalid Request - missing method",
            ))
        }
    };
    let params = fields.remove("params");

    Ok(match id {
        Some(id) => IncomingMessage::Request(JsonRpcRequest { id, method, params }),
        None => IncomingMessage::Notification(JsonRpcNotification { method, params }),
    })
}

/// Removes and validates the `id` member. `Ok(None)` means there was none.
fn take_id(fields: &mut Map<String, Value>) -> Result<Option<RequestId>, JsonRpcError> {
    fields
        .remove("id")
        .map(|raw| {
            serde_json::from_value(raw).map_err(|_| {
                JsonRpcError::invalid_request(
                    None,
                    "Invalid Request - id must be a string or an integer",
                )
            })
        })
        .transpose()
}
