//! The verification session: handshake, document open, diagnostics wait.
//!
//! Drives one fixed protocol sequence against a [`Connection`] and judges
//! the outcome against the scenario's expected diagnostic within a
//! wall-clock budget. Messages that are neither the diagnostics publish
//! nor terminal are discarded, never buffered: this harness verifies one
//! scripted exchange, it is not a general protocol client.

use std::time::{Duration, Instant};

use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::client::{Connection, PublishDiagnosticsParams};
use crate::rpc::{FramingError, Inbound, Message};

/// Default wall-clock budget for the diagnostics wait.
pub const DEFAULT_DEADLINE: Duration = Duration::from_secs(5);

/// Method name of the diagnostics publish notification.
const PUBLISH_DIAGNOSTICS: &str = "textDocument/publishDiagnostics";

/// The document to open and the diagnostic the server is expected to
/// produce for it.
#[derive(Debug, Clone)]
pub struct Scenario {
    pub uri: String,
    pub language_id: String,
    pub text: String,
    /// Substring the first diagnostic's message must contain.
    pub expected: String,
    pub deadline: Duration,
}

impl Default for Scenario {
    /// The canonical misspelled-word check: open `"Helllo World"` and
    /// expect the server to flag `Helllo`.
    fn default() -> Self {
        Scenario {
            uri: "file:///test.lex".to_string(),
            language_id: "lex".to_string(),
            text: "Helllo World".to_string(),
            expected: "Unknown word: Helllo".to_string(),
            deadline: DEFAULT_DEADLINE,
        }
    }
}

/// Terminal result of a verification session.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// The first non-empty diagnostics publish contained the expected text.
    ExpectedDiagnostic,
    /// The first non-empty diagnostics publish contained something else.
    UnexpectedDiagnostic(String),
    /// No non-empty diagnostics publish arrived within the deadline.
    Timeout,
}

impl Outcome {
    /// Process exit code for this outcome: 0 only for the expected
    /// diagnostic, 1 for every failure path.
    pub fn exit_code(&self) -> i32 {
        match self {
            Outcome::ExpectedDiagnostic => 0,
            Outcome::UnexpectedDiagnostic(_) | Outcome::Timeout => 1,
        }
    }
}

/// Session-level error types.
///
/// These cover failures that prevent the session from reaching a verdict
/// at all; a wrong or missing diagnostic is an [`Outcome`], not an error.
#[derive(Debug, Error)]
pub enum SessionError {
    /// The server closed its output stream; no further progress possible.
    #[error("server closed its output stream before the session completed")]
    ServerExited,

    /// Frame-level failure (malformed body, bad Content-Length, I/O).
    #[error("protocol error: {0}")]
    Framing(#[from] FramingError),

    /// Failure sending a request or notification.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Run the fixed verification sequence against a connected server.
///
/// 1. `initialize` request (id 1), one receive for its reply (logged, not
///    validated; ordering is trusted)
/// 2. `initialized` notification
/// 3. `textDocument/didOpen` for the scenario document
/// 4. Bounded wait for a qualifying `textDocument/publishDiagnostics`
pub fn run_session(
    conn: &mut dyn Connection,
    scenario: &Scenario,
) -> Result<Outcome, SessionError> {
    info!("Sending initialize...");
    conn.initialize()?;

    match conn.recv()? {
        Inbound::Message(reply) => info!("Initialize response: {:?}", reply),
        Inbound::NoContentLength => warn!("Initialize reply frame had no Content-Length"),
        Inbound::Eof => return Err(SessionError::ServerExited),
    }
    conn.send_initialized()?;

    info!("Opening document {}...", scenario.uri);
    conn.did_open(&scenario.uri, &scenario.language_id, &scenario.text)?;

    info!(
        "Waiting for diagnostics (deadline: {:?})...",
        scenario.deadline
    );
    wait_for_diagnostics(conn, scenario)
}

/// Pull messages off the connection until a non-empty diagnostics publish
/// arrives or the deadline expires.
///
/// The deadline is checked between blocking receives, not during one, so a
/// single receive that never returns exceeds the nominal bound.
fn wait_for_diagnostics(
    conn: &mut dyn Connection,
    scenario: &Scenario,
) -> Result<Outcome, SessionError> {
    let start = Instant::now();

    while start.elapsed() < scenario.deadline {
        match conn.recv()? {
            Inbound::Message(Message::Notification { method, params })
                if method == PUBLISH_DIAGNOSTICS =>
            {
                debug!("Received diagnostics: {}", params);
                if let Some(outcome) = judge(&params, &scenario.expected) {
                    return Ok(outcome);
                }
                // Empty diagnostics list: legitimate interim state, keep waiting
            }
            Inbound::Message(other) => debug!("Ignoring message: {:?}", other),
            Inbound::NoContentLength => warn!("Discarding frame without Content-Length"),
            Inbound::Eof => return Err(SessionError::ServerExited),
        }
    }

    Ok(Outcome::Timeout)
}

/// Judge one publishDiagnostics payload against the expected substring.
///
/// Returns `None` when the diagnostics list is empty (the wait must
/// continue). Only the first entry of a non-empty list is consulted; the
/// session terminates on it either way.
fn judge(params: &Value, expected: &str) -> Option<Outcome> {
    let params: PublishDiagnosticsParams = match serde_json::from_value(params.clone()) {
        Ok(params) => params,
        Err(e) => {
            warn!("Malformed publishDiagnostics params: {}", e);
            return None;
        }
    };

    let first = params.diagnostics.first()?;
    if first.message.contains(expected) {
        info!("Found expected diagnostic: {:?}", first.message);
        Some(Outcome::ExpectedDiagnostic)
    } else {
        Some(Outcome::UnexpectedDiagnostic(first.message.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::collections::VecDeque;

    /// Connection fed from a canned queue of inbound messages; records
    /// what the driver sends.
    struct ScriptedConnection {
        inbound: VecDeque<Inbound>,
        sent: Vec<String>,
    }

    impl ScriptedConnection {
        fn new(inbound: Vec<Inbound>) -> Self {
            ScriptedConnection {
                inbound: inbound.into(),
                sent: Vec::new(),
            }
        }
    }

    impl Connection for ScriptedConnection {
        fn initialize(&mut self) -> anyhow::Result<()> {
            self.sent.push("initialize".to_string());
            Ok(())
        }

        fn send_initialized(&mut self) -> anyhow::Result<()> {
            self.sent.push("initialized".to_string());
            Ok(())
        }

        fn did_open(&mut self, uri: &str, language_id: &str, _text: &str) -> anyhow::Result<()> {
            self.sent.push(format!("didOpen {} {}", language_id, uri));
            Ok(())
        }

        fn recv(&mut self) -> Result<Inbound, FramingError> {
            Ok(self.inbound.pop_front().unwrap_or(Inbound::Eof))
        }
    }

    /// Connection whose receives never produce a verdict, for exercising
    /// the deadline.
    struct StallingConnection;

    impl Connection for StallingConnection {
        fn initialize(&mut self) -> anyhow::Result<()> {
            Ok(())
        }

        fn send_initialized(&mut self) -> anyhow::Result<()> {
            Ok(())
        }

        fn did_open(&mut self, _uri: &str, _language_id: &str, _text: &str) -> anyhow::Result<()> {
            Ok(())
        }

        fn recv(&mut self) -> Result<Inbound, FramingError> {
            std::thread::sleep(Duration::from_millis(10));
            Ok(publish(&[]))
        }
    }

    fn init_reply() -> Inbound {
        Inbound::Message(Message::Response {
            id: 1,
            result: Some(json!({"capabilities": {}})),
            error: None,
        })
    }

    fn publish(messages: &[&str]) -> Inbound {
        let diagnostics: Vec<Value> = messages
            .iter()
            .map(|m| {
                json!({
                    "range": {
                        "start": {"line": 0, "character": 0},
                        "end": {"line": 0, "character": 6}
                    },
                    "message": m
                })
            })
            .collect();

        Inbound::Message(Message::notification(
            PUBLISH_DIAGNOSTICS,
            json!({"uri": "file:///test.lex", "diagnostics": diagnostics}),
        ))
    }

    #[test]
    fn test_expected_diagnostic_succeeds() {
        let mut conn =
            ScriptedConnection::new(vec![init_reply(), publish(&["Unknown word: Helllo"])]);

        let outcome = run_session(&mut conn, &Scenario::default()).unwrap();
        assert_eq!(outcome, Outcome::ExpectedDiagnostic);
    }

    #[test]
    fn test_session_sends_fixed_sequence_in_order() {
        let mut conn =
            ScriptedConnection::new(vec![init_reply(), publish(&["Unknown word: Helllo"])]);

        run_session(&mut conn, &Scenario::default()).unwrap();
        assert_eq!(
            conn.sent,
            vec![
                "initialize".to_string(),
                "initialized".to_string(),
                "didOpen lex file:///test.lex".to_string(),
            ]
        );
    }

    #[test]
    fn test_unexpected_diagnostic_is_content_mismatch() {
        let mut conn = ScriptedConnection::new(vec![init_reply(), publish(&["Unknown word: Foo"])]);

        let outcome = run_session(&mut conn, &Scenario::default()).unwrap();
        assert_eq!(
            outcome,
            Outcome::UnexpectedDiagnostic("Unknown word: Foo".to_string())
        );
    }

    #[test]
    fn test_empty_diagnostics_keeps_waiting() {
        let mut conn = ScriptedConnection::new(vec![
            init_reply(),
            publish(&[]),
            publish(&["Unknown word: Helllo"]),
        ]);

        let outcome = run_session(&mut conn, &Scenario::default()).unwrap();
        assert_eq!(outcome, Outcome::ExpectedDiagnostic);
    }

    #[test]
    fn test_only_first_nonempty_publish_is_judged() {
        // A later, better-matching publish must not rescue the session.
        let mut conn = ScriptedConnection::new(vec![
            init_reply(),
            publish(&["Unknown word: Foo"]),
            publish(&["Unknown word: Helllo"]),
        ]);

        let outcome = run_session(&mut conn, &Scenario::default()).unwrap();
        assert_eq!(
            outcome,
            Outcome::UnexpectedDiagnostic("Unknown word: Foo".to_string())
        );
    }

    #[test]
    fn test_first_entry_decides_among_several() {
        let mut conn = ScriptedConnection::new(vec![
            init_reply(),
            publish(&["Unknown word: Helllo", "Unknown word: Foo"]),
        ]);

        let outcome = run_session(&mut conn, &Scenario::default()).unwrap();
        assert_eq!(outcome, Outcome::ExpectedDiagnostic);
    }

    #[test]
    fn test_substring_match_not_equality() {
        let mut conn = ScriptedConnection::new(vec![
            init_reply(),
            publish(&["spell: Unknown word: Helllo (line 1)"]),
        ]);

        let outcome = run_session(&mut conn, &Scenario::default()).unwrap();
        assert_eq!(outcome, Outcome::ExpectedDiagnostic);
    }

    #[test]
    fn test_unrelated_traffic_is_discarded() {
        let mut conn = ScriptedConnection::new(vec![
            init_reply(),
            Inbound::Message(Message::Response {
                id: 99,
                result: Some(json!(null)),
                error: None,
            }),
            Inbound::Message(Message::notification(
                "window/logMessage",
                json!({"type": 3, "message": "indexing"}),
            )),
            Inbound::NoContentLength,
            publish(&["Unknown word: Helllo"]),
        ]);

        let outcome = run_session(&mut conn, &Scenario::default()).unwrap();
        assert_eq!(outcome, Outcome::ExpectedDiagnostic);
    }

    #[test]
    fn test_server_eof_is_terminal_error() {
        // Stream closes right after the handshake reply
        let mut conn = ScriptedConnection::new(vec![init_reply()]);

        let result = run_session(&mut conn, &Scenario::default());
        assert!(matches!(result, Err(SessionError::ServerExited)));
    }

    #[test]
    fn test_deadline_expiry_is_timeout() {
        let scenario = Scenario {
            deadline: Duration::from_millis(35),
            ..Scenario::default()
        };

        let outcome = run_session(&mut StallingConnection, &scenario).unwrap();
        assert_eq!(outcome, Outcome::Timeout);
    }

    #[test]
    fn test_zero_deadline_times_out_without_receiving() {
        let scenario = Scenario {
            deadline: Duration::ZERO,
            ..Scenario::default()
        };
        // Empty queue: any receive in the wait loop would error with Eof
        let mut conn = ScriptedConnection::new(vec![init_reply()]);

        let outcome = run_session(&mut conn, &scenario).unwrap();
        assert_eq!(outcome, Outcome::Timeout);
    }

    #[test]
    fn test_exit_codes() {
        assert_eq!(Outcome::ExpectedDiagnostic.exit_code(), 0);
        assert_eq!(
            Outcome::UnexpectedDiagnostic("Unknown word: Foo".to_string()).exit_code(),
            1
        );
        assert_eq!(Outcome::Timeout.exit_code(), 1);
    }

    #[test]
    fn test_judge_tolerates_malformed_params() {
        // Params missing the diagnostics array: logged and skipped
        assert_eq!(judge(&json!({"uri": "file:///test.lex"}), "x"), None);
        assert_eq!(judge(&json!(null), "x"), None);
    }
}
