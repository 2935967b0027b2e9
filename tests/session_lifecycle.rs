//! Integration tests for session routing on the session-oriented transports.

use std::path::PathBuf;
use std::sync::Arc;

use school_vacation_mcp::calendar::{CalendarTable, VacationQueryEngine};
use school_vacation_mcp::mcp::protocol::{parse_message, IncomingMessage};
use school_vacation_mcp::mcp::session::{SessionError, SessionGuard, SessionRegistry};
use serde_json::Value;
use tokio::sync::mpsc;
use tokio_test::{assert_err, assert_ok};

const INITIALIZE: &str = r#"{"jsonrpc":"2.0","id":1,"method":"initialize","params":{"protocolVersion":"2025-03-26","capabilities":{},"clientInfo":{"name":"test-client","version":"1.0.0"}}}"#;
const CHECK: &str = r#"{"jsonrpc":"2.0","id":2,"method":"tools/call","params":{"name":"check_school_vacation","arguments":{"date":"02/01/2020","region":"zuid-nederland"}}}"#;

fn registry() -> SessionRegistry {
    let path = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures/calendar_sample.csv");
    let engine = VacationQueryEngine::new(CalendarTable::load(path).unwrap());
    SessionRegistry::new(Arc::new(engine))
}

fn msg(json: &str) -> IncomingMessage {
    parse_message(json).unwrap()
}

#[test]
fn test_unknown_session_then_minted_session() {
    let registry = registry();

    let err = assert_err!(registry.route(Some("not-a-session"), msg(CHECK)));
    assert_eq!(
        err,
        SessionError::UnknownSession {
            id: "not-a-session".to_string()
        }
    );
    assert!(registry.is_empty());

    let init = assert_ok!(registry.route(None, msg(INITIALIZE)));
    assert!(init.created);
    let id = init.session.id().to_string();

    let routed = assert_ok!(registry.route(Some(&id), msg(CHECK)));
    let reply = serde_json::to_value(routed.reply.unwrap()).unwrap();
    let text = reply["result"]["content"][0]["text"].as_str().unwrap();
    let payload: Value = serde_json::from_str(text).unwrap();
    assert_eq!(payload["isSchoolVacation"], true);
}

#[test]
fn test_missing_session_id_is_client_error() {
    let registry = registry();
    let err = assert_err!(registry.route(None, msg(CHECK)));
    assert_eq!(err, SessionError::MissingSessionId);
    assert_eq!(err.to_string(), "Bad Request: No valid session ID provided");
}

#[test]
fn test_tool_failure_keeps_session() {
    let registry = registry();
    let id = assert_ok!(registry.route(None, msg(INITIALIZE)))
        .session
        .id()
        .to_string();

    let bad = r#"{"jsonrpc":"2.0","id":3,"method":"tools/call","params":{"name":"get_vacation_periods","arguments":{"region":"mars"}}}"#;
    let routed = assert_ok!(registry.route(Some(&id), msg(bad)));
    let reply = serde_json::to_value(routed.reply.unwrap()).unwrap();
    assert_eq!(reply["result"]["isError"], true);

    assert_ok!(registry.route(Some(&id), msg(CHECK)));
    assert_eq!(registry.len(), 1);
}

#[test]
fn test_concurrent_sessions_are_independent() {
    let registry = &registry();

    let ids: Vec<String> = std::thread::scope(|scope| {
        let handles: Vec<_> = (0..8)
            .map(|_| {
                scope.spawn(move || {
                    let id = registry
                        .route(None, msg(INITIALIZE))
                        .unwrap()
                        .session
                        .id()
                        .to_string();
                    for _ in 0..16 {
                        let routed = registry.route(Some(&id), msg(CHECK)).unwrap();
                        assert!(routed.reply.unwrap().is_success());
                    }
                    id
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    assert_eq!(registry.len(), 8);
    let mut unique = ids.clone();
    unique.sort();
    unique.dedup();
    assert_eq!(unique.len(), ids.len());

    for id in &ids {
        assert_ok!(registry.close(id));
    }
    assert!(registry.is_empty());
}

#[tokio::test]
async fn test_stream_session_delivers_replies_until_dropped() {
    let registry = Arc::new(registry());
    let (tx, mut rx) = mpsc::unbounded_channel();
    let session = registry.open(tx);
    let guard = SessionGuard::new(Arc::clone(&registry), session.id().to_string());

    let reply = session.handle(msg(INITIALIZE)).unwrap();
    assert_ok!(session.push(&reply));
    let event = rx.recv().await.unwrap();
    assert!(event.contains("\"protocolVersion\":\"2025-03-26\""));

    // Notifications produce nothing to push
    assert!(session
        .handle(msg(r#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#))
        .is_none());

    drop(guard);
    assert!(registry.is_empty());
    assert_err!(registry.lookup(session.id()));
}
