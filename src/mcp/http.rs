//! HTTP transport bindings.
//!
//! Three bindings share one [`VacationQueryEngine`] and one tool table:
//!
//! - **Plain** (`POST /mcp`): each message is handled by a fresh stateless
//!   handler. `GET /mcp` describes the server and its tools.
//! - **SSE** (`GET /sse`, `POST /message?sessionId=`): the event stream mints
//!   a session and announces the message endpoint; replies to posted messages
//!   travel back over the stream.
//! - **Streamable** (`POST`/`GET`/`DELETE /mcp`): sessions are keyed by the
//!   `Mcp-Session-Id` header and minted by `initialize`.
//!
//! Every binding also serves `/health` and `/ping`, allows any origin, and
//! checks a bearer token on its MCP endpoints when one is configured.

use std::convert::Infallible;
use std::future::Future;
use std::sync::Arc;

use axum::body::{Body, Bytes};
use axum::extract::{Query, Request, State};
use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use axum::middleware::{self, Next};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::SecondsFormat;
use futures::stream::{self, StreamExt};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::{mpsc, watch};
use tower_http::cors::CorsLayer;

use crate::calendar::VacationQueryEngine;
use crate::config::{ServerConfig, TransportKind};
use crate::mcp::handler::McpHandler;
use crate::mcp::protocol::{
    parse_message, ErrorCode, IncomingMessage, JsonRpcError, JsonRpcErrorData, OutgoingMessage,
    RequestId, FORBIDDEN_CODE, MCP_PROTOCOL_VERSION, SERVER_NAME, SESSION_ERROR_CODE, UNAUTHORIZED_CODE,
};
use crate::mcp::server::shutdown_signal;
use crate::mcp::session::{SessionError, SessionGuard, SessionRegistry, SESSION_HEADER};
use crate::mcp::tools;

/// Largest request body the audit layer will buffer.
const MAX_BODY_BYTES: usize = 1024 * 1024;

const SERVER_DESCRIPTION: &str =
    "School vacation calendar for Belgium, the Netherlands and Luxembourg";

/// The HTTP flavour to serve.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Binding {
    /// Stateless JSON-RPC over `POST /mcp`.
    Plain,
    /// Event stream plus message endpoint.
    Sse,
    /// Session-oriented streamable HTTP.
    Streamable,
}

impl Binding {
    /// Maps a configured transport to its HTTP binding, if it has one.
    #[must_use]
    pub const fn for_transport(kind: TransportKind) -> Option<Self> {
        match kind {
            TransportKind::Stdio => None,
            TransportKind::Http => Some(Self::Plain),
            TransportKind::Sse => Some(Self::Sse),
            TransportKind::Streamable => Some(Self::Streamable),
        }
    }
}

/// Shared state handed to every request handler.
#[derive(Clone)]
pub struct AppState {
    engine: Arc<VacationQueryEngine>,
    sessions: Arc<SessionRegistry>,
    auth_token: Option<Arc<str>>,
    shutdown: Arc<watch::Sender<bool>>,
}

impl AppState {
    /// Creates the state for one server. `auth_token` of `None` disables
    /// authentication.
    #[must_use]
    pub fn new(engine: Arc<VacationQueryEngine>, auth_token: Option<String>) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            sessions: Arc::new(SessionRegistry::new(Arc::clone(&engine))),
            engine,
            auth_token: auth_token.map(Arc::from),
            shutdown: Arc::new(shutdown),
        }
    }

    /// Returns the session registry.
    #[must_use]
    pub const fn sessions(&self) -> &Arc<SessionRegistry> {
        &self.sessions
    }

    /// Ends every open event stream.
    pub fn close_streams(&self) {
        self.shutdown.send_replace(true);
    }

    fn streams_closed(&self) -> impl Future<Output = ()> + Send + 'static {
        let mut rx = self.shutdown.subscribe();
        async move {
            loop {
                if *rx.borrow_and_update() {
                    return;
                }
                // A dropped sender also ends the stream.
                if rx.changed().await.is_err() {
                    return;
                }
            }
        }
    }
}

/// Builds the router for `binding`.
#[must_use]
pub fn router(binding: Binding, state: AppState) -> Router {
    if state.auth_token.is_none() {
        tracing::warn!("No authentication token configured, authentication is DISABLED");
    }

    let mcp = match binding {
        Binding::Plain => Router::new().route("/mcp", get(server_info).post(plain_message)),
        Binding::Sse => Router::new()
            .route("/sse", get(sse_open))
            .route("/message", post(sse_message)),
        Binding::Streamable => Router::new().route(
            "/mcp",
            post(streamable_message)
                .get(streamable_stream)
                .delete(streamable_close),
        ),
    };

    let mcp = mcp
        .route_layer(middleware::from_fn_with_state(state.clone(), authenticate))
        .route_layer(middleware::from_fn(audit));

    Router::new()
        .route("/health", get(health))
        .route("/ping", get(ping))
        .merge(mcp)
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Serves `binding` until SIGINT or SIGTERM.
///
/// # Errors
///
/// Returns an error if the listener cannot be bound or the server fails.
pub async fn serve(config: &ServerConfig, binding: Binding, state: AppState) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind((config.host.as_str(), config.port)).await?;
    tracing::info!(
        address = %listener.local_addr()?,
        binding = ?binding,
        "HTTP transport listening"
    );

    let app = router(binding, state.clone());
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            match shutdown_signal().await {
                Ok(signal) => {
                    tracing::info!(signal, "Received signal, initiating graceful shutdown");
                    state.close_streams();
                }
                Err(e) => {
                    tracing::error!(error = %e, "Failed to install signal handlers");
                    std::future::pending::<()>().await;
                }
            }
        })
        .await
}

// Common endpoints

async fn health(State(state): State<AppState>) -> impl IntoResponse {
    (
        [(header::CACHE_CONTROL, "no-store, no-cache, must-revalidate")],
        Json(json!({
            "status": "healthy",
            "timestamp": timestamp(),
            "service": SERVER_NAME,
            "activeSessions": state.sessions.len(),
        })),
    )
}

async fn ping() -> Json<Value> {
    Json(json!({
        "message": "pong",
        "timestamp": timestamp(),
    }))
}

fn timestamp() -> String {
    chrono::Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

// Plain binding

async fn server_info() -> Json<Value> {
    Json(json!({
        "name": SERVER_NAME,
        "version": env!("CARGO_PKG_VERSION"),
        "description": SERVER_DESCRIPTION,
        "protocolVersion": MCP_PROTOCOL_VERSION,
        "tools": tools::definitions(),
    }))
}

async fn plain_message(State(state): State<AppState>, body: Bytes) -> Response {
    let msg = match parse_body(&body) {
        Ok(msg) => msg,
        Err(e) => return rpc_response(StatusCode::OK, &e.into()),
    };

    let mut handler = McpHandler::stateless(Arc::clone(&state.engine));
    match handler.handle_message(msg) {
        Some(reply) => rpc_response(StatusCode::OK, &reply),
        None => StatusCode::ACCEPTED.into_response(),
    }
}

// SSE binding

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MessageQuery {
    session_id: Option<String>,
}

async fn sse_open(State(state): State<AppState>) -> Response {
    let (tx, rx) = mpsc::unbounded_channel();
    let session = state.sessions.open(tx);
    let guard = SessionGuard::new(Arc::clone(&state.sessions), session.id().to_string());

    let endpoint = Event::default()
        .event("endpoint")
        .data(format!("/message?sessionId={}", session.id()));

    let replies = stream::unfold((rx, guard), |(mut rx, guard)| async move {
        let json = rx.recv().await?;
        let event = Event::default().event("message").data(json);
        Some((Ok::<_, Infallible>(event), (rx, guard)))
    });

    let events = stream::once(async move { Ok::<_, Infallible>(endpoint) })
        .chain(replies)
        .take_until(state.streams_closed());

    Sse::new(events)
        .keep_alive(KeepAlive::default())
        .into_response()
}

async fn sse_message(
    State(state): State<AppState>,
    Query(query): Query<MessageQuery>,
    body: Bytes,
) -> Response {
    let Some(id) = query.session_id.filter(|id| !id.is_empty()) else {
        return session_error(&SessionError::MissingSessionId);
    };

    let session = match state.sessions.lookup(&id) {
        Ok(session) => session,
        Err(e) => return session_error(&e),
    };

    let msg = match parse_body(&body) {
        Ok(msg) => msg,
        Err(e) => return rpc_response(StatusCode::BAD_REQUEST, &e.into()),
    };

    if let Some(reply) = session.handle(msg) {
        if let Err(e) = session.push(&reply) {
            return session_error(&e);
        }
    }

    StatusCode::ACCEPTED.into_response()
}

// Streamable binding

async fn streamable_message(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let msg = match parse_body(&body) {
        Ok(msg) => msg,
        Err(e) => return rpc_response(StatusCode::BAD_REQUEST, &e.into()),
    };

    let routed = match state.sessions.route(session_id(&headers), msg) {
        Ok(routed) => routed,
        Err(e) => return session_error(&e),
    };

    let mut response = match &routed.reply {
        Some(reply) => rpc_response(StatusCode::OK, reply),
        None => StatusCode::ACCEPTED.into_response(),
    };

    if routed.created {
        if let Ok(value) = HeaderValue::from_str(routed.session.id()) {
            response.headers_mut().insert(SESSION_HEADER, value);
        }
    }

    response
}

async fn streamable_stream(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let Some(id) = session_id(&headers) else {
        return session_error(&SessionError::MissingSessionId);
    };

    if let Err(e) = state.sessions.lookup(id) {
        return session_error(&e);
    }

    tracing::debug!(session = id, "Event stream opened");
    let events = stream::pending::<Result<Event, Infallible>>().take_until(state.streams_closed());

    Sse::new(events)
        .keep_alive(KeepAlive::default())
        .into_response()
}

async fn streamable_close(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let Some(id) = session_id(&headers) else {
        return session_error(&SessionError::MissingSessionId);
    };

    match state.sessions.close(id) {
        Ok(()) => StatusCode::OK.into_response(),
        Err(e) => session_error(&e),
    }
}

// Middleware

async fn authenticate(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let Some(expected) = state.auth_token.as_deref() else {
        return next.run(request).await;
    };

    let id = request
        .extensions()
        .get::<RpcEnvelope>()
        .and_then(|envelope| envelope.id.clone());

    let Some(value) = request.headers().get(header::AUTHORIZATION) else {
        tracing::warn!(path = request.uri().path(), "Request without authorization header");
        let error = JsonRpcErrorData::with_message(
            ErrorCode::ServerError(UNAUTHORIZED_CODE),
            "Unauthorized - missing authorization header",
        )
        .with_data(json!({ "hint": "Include \"Authorization: Bearer <token>\" header" }));
        return rpc_response(StatusCode::UNAUTHORIZED, &JsonRpcError::new(id, error).into());
    };

    if bearer_token(value.to_str().unwrap_or_default()) != expected {
        tracing::warn!(path = request.uri().path(), "Request with invalid token");
        let error = JsonRpcErrorData::with_message(
            ErrorCode::ServerError(FORBIDDEN_CODE),
            "Forbidden - invalid authentication token",
        );
        return rpc_response(StatusCode::FORBIDDEN, &JsonRpcError::new(id, error).into());
    }

    next.run(request).await
}

/// The JSON-RPC fields the audit layer reads from a buffered body.
#[derive(Debug, Clone, Default)]
struct RpcEnvelope {
    method: Option<String>,
    id: Option<RequestId>,
}

impl RpcEnvelope {
    fn peek(body: &[u8]) -> Self {
        let Ok(value) = serde_json::from_slice::<Value>(body) else {
            return Self::default();
        };
        Self {
            method: value.get("method").and_then(Value::as_str).map(str::to_owned),
            id: value
                .get("id")
                .cloned()
                .and_then(|id| serde_json::from_value(id).ok()),
        }
    }
}

async fn audit(request: Request, next: Next) -> Response {
    let (parts, body) = request.into_parts();
    let Ok(bytes) = axum::body::to_bytes(body, MAX_BODY_BYTES).await else {
        return StatusCode::PAYLOAD_TOO_LARGE.into_response();
    };

    let envelope = RpcEnvelope::peek(&bytes);
    let user_agent = parts
        .headers
        .get(header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("-");

    tracing::info!(
        method = %parts.method,
        path = parts.uri.path(),
        user_agent,
        rpc_method = envelope.method.as_deref().unwrap_or("-"),
        "[AUDIT] MCP request"
    );

    // Runs outside `authenticate`, which reads the envelope.
    let mut request = Request::from_parts(parts, Body::from(bytes));
    request.extensions_mut().insert(envelope);
    next.run(request).await
}

// Helpers

fn parse_body(body: &[u8]) -> Result<IncomingMessage, JsonRpcError> {
    let text = std::str::from_utf8(body).map_err(|_| JsonRpcError::parse_error())?;
    parse_message(text)
}

fn rpc_response(status: StatusCode, message: &OutgoingMessage) -> Response {
    (status, Json(message)).into_response()
}

fn session_error(error: &SessionError) -> Response {
    let status = match error {
        SessionError::MissingSessionId => StatusCode::BAD_REQUEST,
        SessionError::UnknownSession { .. } | SessionError::StreamClosed { .. } => {
            StatusCode::NOT_FOUND
        }
    };

    tracing::warn!(error = %error, "Rejected session request");
    let reply = JsonRpcError::server_error(SESSION_ERROR_CODE, error.to_string());
    rpc_response(status, &reply.into())
}

fn session_id(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(SESSION_HEADER)
        .and_then(|v| v.to_str().ok())
        .filter(|id| !id.is_empty())
}

/// Strips an optional, case-insensitive `Bearer` scheme.
fn bearer_token(value: &str) -> &str {
    match value.split_once(char::is_whitespace) {
        Some((scheme, token)) if scheme.eq_ignore_ascii_case("bearer") => token.trim_start(),
        _ => value,
    }
}
