//! Session registry for the session-oriented HTTP transports.
//!
//! A session binds an opaque identifier to one [`McpHandler`]. Sessions are
//! created in one of two ways:
//!
//! - **Streamable HTTP**: [`SessionRegistry::route`] mints a session for a
//!   successful `initialize` request that carries no session id.
//! - **SSE**: [`SessionRegistry::open`] mints a session when the event stream
//!   is opened, attaching the stream's outbound channel.
//!
//! Sessions end through [`SessionRegistry::close`], called on an explicit
//! close request or when the transport tears the connection down. After that
//! the id is unknown and requests bearing it are rejected.
//!
//! # Locking
//!
//! The session map sits behind one mutex that is held only for insert, lookup
//! and removal. Each session's handler has its own mutex, so requests on
//! different sessions never contend. The query engine is shared read-only and
//! never locked.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use thiserror::Error;
use tokio::sync::mpsc;

use crate::calendar::VacationQueryEngine;
use crate::mcp::handler::McpHandler;
use crate::mcp::protocol::{IncomingMessage, OutgoingMessage};

/// HTTP header carrying the session identifier.
pub const SESSION_HEADER: &str = "mcp-session-id";

/// Errors raised when a request cannot be tied to a live session.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    /// A non-initialization request arrived without a session id.
    #[error("Bad Request: No valid session ID provided")]
    MissingSessionId,

    /// The session id is not (or no longer) registered.
    #[error("Session not found: {id}")]
    UnknownSession {
        /// The unrecognised identifier.
        id: String,
    },

    /// The session's event stream has gone away.
    #[error("Session stream closed: {id}")]
    StreamClosed {
        /// The session identifier.
        id: String,
    },
}

/// One live session.
#[derive(Debug)]
pub struct Session {
    id: String,
    handler: Mutex<McpHandler>,
    outbound: Option<mpsc::UnboundedSender<String>>,
}

impl Session {
    fn new(
        engine: Arc<VacationQueryEngine>,
        outbound: Option<mpsc::UnboundedSender<String>>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            handler: Mutex::new(McpHandler::new(engine)),
            outbound,
        }
    }

    /// Returns the session identifier.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Runs one message through this session's protocol handler.
    pub fn handle(&self, msg: IncomingMessage) -> Option<OutgoingMessage> {
        self.handler.lock().handle_message(msg)
    }

    /// Sends a reply over the session's event stream.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::StreamClosed`] if the session has no stream or
    /// its receiver was dropped.
    pub fn push(&self, reply: &OutgoingMessage) -> Result<(), SessionError> {
        let closed = || SessionError::StreamClosed {
            id: self.id.clone(),
        };

        let json = reply.to_json().map_err(|e| {
            tracing::error!(session = %self.id, error = %e, "Failed to serialise reply");
            closed()
        })?;

        self.outbound
            .as_ref()
            .ok_or_else(closed)?
            .send(json)
            .map_err(|_| closed())
    }
}

/// The outcome of routing one message.
#[derive(Debug)]
pub struct Routed {
    /// The session that handled the message.
    pub session: Arc<Session>,
    /// The reply, if the message was a request.
    pub reply: Option<OutgoingMessage>,
    /// Whether the session was created by this message.
    pub created: bool,
}

/// Maps session identifiers to live sessions.
#[derive(Debug)]
pub struct SessionRegistry {
    engine: Arc<VacationQueryEngine>,
    sessions: Mutex<HashMap<String, Arc<Session>>>,
}

impl SessionRegistry {
    /// Creates an empty registry whose sessions share `engine`.
    #[must_use]
    pub fn new(engine: Arc<VacationQueryEngine>) -> Self {
        Self {
            engine,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    /// Routes a message to its session, creating one for a fresh `initialize`.
    ///
    /// An empty session id counts as absent. A new session is registered only
    /// if its `initialize` request succeeds; on failure the reply is returned
    /// and nothing is stored.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::MissingSessionId`] for a non-initialization
    /// message without an id, and [`SessionError::UnknownSession`] for an id
    /// that is not registered. Neither changes any session.
    pub fn route(
        &self,
        session_id: Option<&str>,
        msg: IncomingMessage,
    ) -> Result<Routed, SessionError> {
        match session_id.filter(|id| !id.is_empty()) {
            Some(id) => {
                let session = self.lookup(id)?;
                let reply = session.handle(msg);
                Ok(Routed {
                    session,
                    reply,
                    created: false,
                })
            }
            None if msg.is_initialize() => {
                let session = Arc::new(Session::new(Arc::clone(&self.engine), None));
                let reply = session.handle(msg);
                let created = reply.as_ref().is_some_and(OutgoingMessage::is_success);
                if created {
                    self.insert(Arc::clone(&session));
                }
                Ok(Routed {
                    session,
                    reply,
                    created,
                })
            }
            None => Err(SessionError::MissingSessionId),
        }
    }

    /// Creates and registers a session bound to an event stream.
    #[must_use]
    pub fn open(&self, outbound: mpsc::UnboundedSender<String>) -> Arc<Session> {
        let session = Arc::new(Session::new(Arc::clone(&self.engine), Some(outbound)));
        self.insert(Arc::clone(&session));
        session
    }

    /// Looks up a live session.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::UnknownSession`] if `id` is not registered.
    pub fn lookup(&self, id: &str) -> Result<Arc<Session>, SessionError> {
        self.sessions
            .lock()
            .get(id)
            .cloned()
            .ok_or_else(|| SessionError::UnknownSession { id: id.to_string() })
    }

    /// Removes a session. Requests already holding it run to completion.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::UnknownSession`] if `id` is not registered.
    pub fn close(&self, id: &str) -> Result<(), SessionError> {
        let removed = self.sessions.lock().remove(id);
        if removed.is_some() {
            tracing::info!(session = id, "Session closed");
            Ok(())
        } else {
            Err(SessionError::UnknownSession { id: id.to_string() })
        }
    }

    /// Returns the number of live sessions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.sessions.lock().len()
    }

    /// Returns `true` if there are no live sessions.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sessions.lock().is_empty()
    }

    fn insert(&self, session: Arc<Session>) {
        tracing::info!(session = %session.id, "Session initialised");
        self.sessions.lock().insert(session.id.clone(), session);
    }
}

/// Closes a session when dropped.
///
/// Held by transport streams so that a client disconnect ends the session.
#[derive(Debug)]
pub struct SessionGuard {
    registry: Arc<SessionRegistry>,
    id: String,
}

impl SessionGuard {
    /// Ties the lifetime of session `id` to this guard.
    #[must_use]
    pub const fn new(registry: Arc<SessionRegistry>, id: String) -> Self {
        Self { registry, id }
    }
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        // Already closed explicitly is fine.
        let _ = self.registry.close(&self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calendar::CalendarTable;
    use crate::mcp::protocol::parse_message;
    use crate::mcp::handler::ServerState;

    const INIT: &str = r#"{"jsonrpc":"2.0","id":1,"method":"initialize","params":{"protocolVersion":"2025-03-26","capabilities":{}}}"#;
    const LIST: &str = r#"{"jsonrpc":"2.0","id":2,"method":"tools/list"}"#;

    fn registry() -> SessionRegistry {
        let mut fields = vec![""; 20];
        fields[0] = "01/01/2019";
        let source = format!("header\n{}\n", fields.join(";"));
        let engine = VacationQueryEngine::new(CalendarTable::parse(&source).unwrap());
        SessionRegistry::new(Arc::new(engine))
    }

    fn msg(json: &str) -> IncomingMessage {
        parse_message(json).unwrap()
    }

    #[test]
    fn initialize_mints_session() {
        let registry = registry();
        let routed = registry.route(None, msg(INIT)).unwrap();

        assert!(routed.created);
        assert!(routed.reply.unwrap().is_success());
        assert_eq!(registry.len(), 1);
        assert!(registry.lookup(routed.session.id()).is_ok());
    }

    #[test]
    fn failed_initialize_registers_nothing() {
        let registry = registry();
        let routed = registry
            .route(None, msg(r#"{"jsonrpc":"2.0","id":1,"method":"initialize"}"#))
            .unwrap();

        assert!(!routed.created);
        assert!(!routed.reply.unwrap().is_success());
        assert!(registry.is_empty());
    }

    #[test]
    fn missing_id_on_non_initialize_is_rejected() {
        let registry = registry();
        assert_eq!(
            registry.route(None, msg(LIST)).unwrap_err(),
            SessionError::MissingSessionId
        );
        assert_eq!(
            registry.route(Some(""), msg(LIST)).unwrap_err(),
            SessionError::MissingSessionId
        );
        assert!(registry.is_empty());
    }

    #[test]
    fn unknown_id_never_creates_session() {
        let registry = registry();
        for json in [LIST, INIT] {
            let err = registry.route(Some("bogus"), msg(json)).unwrap_err();
            assert_eq!(err, SessionError::UnknownSession { id: "bogus".into() });
        }
        assert!(registry.is_empty());
    }

    #[test]
    fn known_id_reuses_context() {
        let registry = registry();
        let id = registry
            .route(None, msg(INIT))
            .unwrap()
            .session
            .id()
            .to_string();

        let routed = registry.route(Some(&id), msg(LIST)).unwrap();
        assert!(!routed.created);
        assert!(routed.reply.unwrap().is_success());
        assert_eq!(routed.session.handler.lock().state(), ServerState::Initialising);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn closed_session_becomes_unknown() {
        let registry = registry();
        let id = registry.route(None, msg(INIT)).unwrap().session.id().to_string();

        registry.close(&id).unwrap();
        assert!(registry.is_empty());
        assert!(matches!(
            registry.route(Some(&id), msg(LIST)),
            Err(SessionError::UnknownSession { .. })
        ));
        assert!(registry.close(&id).is_err());
    }

    #[test]
    fn sessions_are_isolated() {
        let registry = registry();
        let a = registry.route(None, msg(INIT)).unwrap().session;
        let b = registry.route(None, msg(INIT)).unwrap().session;
        assert_ne!(a.id(), b.id());
        assert_eq!(registry.len(), 2);

        registry.close(a.id()).unwrap();
        assert!(registry.route(Some(b.id()), msg(LIST)).is_ok());
    }

    #[test]
    fn open_attaches_stream_and_guard_closes() {
        let registry = Arc::new(registry());
        let (tx, mut rx) = mpsc::unbounded_channel();
        let session = registry.open(tx);
        assert_eq!(registry.len(), 1);

        let reply = session.handle(msg(INIT)).unwrap();
        session.push(&reply).unwrap();
        assert!(rx.try_recv().unwrap().contains("protocolVersion"));

        drop(SessionGuard::new(Arc::clone(&registry), session.id().to_string()));
        assert!(registry.is_empty());
    }

    #[test]
    fn push_without_stream_fails() {
        let registry = registry();
        let routed = registry.route(None, msg(INIT)).unwrap();
        let reply = routed.reply.unwrap();
        assert!(matches!(
            routed.session.push(&reply),
            Err(SessionError::StreamClosed { .. })
        ));
    }
}
