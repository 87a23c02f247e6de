//! Client side of the lex-lsp stdio session.
//!
//! Spawns the server executable as a subprocess and provides the
//! message-level operations the verification session needs, speaking
//! JSON-RPC over Content-Length framed stdio (see [`crate::rpc`]).

use std::io::BufReader;
use std::path::Path;
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, info, warn};
use url::Url;

use crate::rpc::{read_message, write_message, FramingError, Inbound, Message};

// =============================================================================
// Service Trait for Dependency Injection
// =============================================================================

/// Trait for the server-facing operations of a verification session.
///
/// This trait abstracts the server connection to enable:
/// - Dependency injection for testing with mock implementations
/// - Separation of interface from implementation
/// - Driving the session logic without spawning a real server process
pub trait Connection {
    /// Send the initialize request opening the handshake.
    fn initialize(&mut self) -> anyhow::Result<()>;

    /// Send the initialized notification (required after initialize response).
    fn send_initialized(&mut self) -> anyhow::Result<()>;

    /// Notify the server that a document was opened.
    fn did_open(&mut self, uri: &str, language_id: &str, text: &str) -> anyhow::Result<()>;

    /// Receive one message from the server. Blocks until a full message is
    /// available or the server closes its output stream.
    fn recv(&mut self) -> Result<Inbound, FramingError>;
}

/// LSP Diagnostic with position and severity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Diagnostic {
    pub range: Range,
    pub message: String,
    #[serde(default)]
    pub severity: Option<i32>,
    #[serde(default)]
    pub source: Option<String>,
}

/// LSP Range (start and end positions).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Range {
    pub start: Position,
    pub end: Position,
}

/// LSP Position (line and character).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Position {
    pub line: u32,
    pub character: u32,
}

/// Parameters of a `textDocument/publishDiagnostics` notification.
#[derive(Debug, Clone, Deserialize)]
pub struct PublishDiagnosticsParams {
    pub uri: String,
    pub diagnostics: Vec<Diagnostic>,
}

/// Handle to a running lex-lsp subprocess.
///
/// # Process Cleanup Safety
/// The `ServerHandle` owns the child process and ensures cleanup via RAII.
/// Whatever the session outcome (success, mismatch, timeout, or an error
/// partway through), the `Drop` implementation sends shutdown/exit and
/// kills the process if it lingers, preventing orphaned server processes.
pub struct ServerHandle {
    stdin: ChildStdin,
    stdout: BufReader<ChildStdout>,
    request_id: i64,
    /// Child process handle - used by shutdown/Drop for cleanup.
    child: Child,
    stopped: bool,
}

impl ServerHandle {
    /// Spawn the server executable and wire up its stdio pipes.
    ///
    /// The server is launched with no arguments. Its stdin/stdout become
    /// the harness's transport; its stderr is inherited unmodified so
    /// server-side logging stays visible on the harness's own stderr.
    pub fn spawn(server_path: &Path) -> Result<Self> {
        info!("Starting lex-lsp: {}", server_path.display());

        let mut child = Command::new(server_path)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .spawn()
            .with_context(|| format!("Failed to spawn lex-lsp at {}", server_path.display()))?;

        let stdin = child
            .stdin
            .take()
            .context("Failed to get stdin handle for lex-lsp")?;
        let stdout = child
            .stdout
            .take()
            .context("Failed to get stdout handle for lex-lsp")?;

        Ok(ServerHandle {
            stdin,
            stdout: BufReader::new(stdout),
            request_id: 0,
            child,
            stopped: false,
        })
    }

    /// Get next request ID.
    fn next_id(&mut self) -> i64 {
        self.request_id += 1;
        self.request_id
    }

    /// Send a message to the server.
    pub fn send(&mut self, message: &Message) -> Result<()> {
        write_message(&mut self.stdin, message).context("Failed to write to lex-lsp stdin")
    }

    /// Receive one message from the server.
    pub fn recv(&mut self) -> Result<Inbound, FramingError> {
        read_message(&mut self.stdout)
    }

    /// Cooperatively stop the server.
    ///
    /// Sends the shutdown request and exit notification, then waits up to
    /// 500ms for the process to leave on its own before killing it. Safe
    /// to call more than once; `Drop` calls it as a backstop.
    pub fn shutdown(&mut self) {
        if self.stopped {
            return;
        }
        self.stopped = true;

        // shutdown is a request (has id), exit is a notification
        let id = self.next_id();
        let _ = self.send(&Message::request(id, "shutdown", Value::Null));
        let _ = self.send(&Message::notification("exit", Value::Null));

        for _ in 0..10 {
            match self.child.try_wait() {
                Ok(Some(_status)) => {
                    debug!("lex-lsp exited cleanly");
                    return;
                }
                Ok(None) => {
                    // Still running, wait a bit
                    thread::sleep(Duration::from_millis(50));
                }
                Err(e) => {
                    warn!("Error waiting for lex-lsp: {}", e);
                    return;
                }
            }
        }

        warn!("lex-lsp didn't exit gracefully, killing");
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

impl Connection for ServerHandle {
    fn initialize(&mut self) -> Result<()> {
        let id = self.next_id();
        debug!("Sending initialize (id: {})", id);

        let request = Message::request(
            id,
            "initialize",
            json!({
                "processId": null,
                "rootUri": null,
                "capabilities": {}
            }),
        );
        self.send(&request)
    }

    fn send_initialized(&mut self) -> Result<()> {
        debug!("Sending initialized notification");
        self.send(&Message::notification("initialized", json!({})))
    }

    fn did_open(&mut self, uri: &str, language_id: &str, text: &str) -> Result<()> {
        debug!("didOpen: {} (language: {})", uri, language_id);

        let notification = Message::notification(
            "textDocument/didOpen",
            json!({
                "textDocument": {
                    "uri": uri,
                    "languageId": language_id,
                    "version": 1,
                    "text": text
                }
            }),
        );
        self.send(&notification)
    }

    fn recv(&mut self) -> Result<Inbound, FramingError> {
        ServerHandle::recv(self)
    }
}

impl Drop for ServerHandle {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Convert a file path to a file:// URI with proper percent-encoding.
///
/// Uses the `url` crate to properly encode special characters like spaces,
/// non-ASCII characters, and other reserved URI characters.
pub fn path_to_uri(path: &Path) -> String {
    // Handle both absolute and relative paths
    let abs_path = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .map(|p| p.join(path))
            .unwrap_or_else(|_| path.to_path_buf())
    };

    match Url::from_file_path(&abs_path) {
        Ok(url) => url.to_string(),
        Err(_) => {
            // Fallback for edge cases (e.g., relative paths that couldn't
            // be resolved). Manual percent-encoding for common characters.
            let path_str = abs_path.to_string_lossy();
            let encoded = path_str
                .replace('%', "%25") // Must be first
                .replace(' ', "%20")
                .replace('#', "%23")
                .replace('?', "%3F")
                .replace('[', "%5B")
                .replace(']', "%5D");

            if cfg!(windows) {
                format!("file:///{}", encoded.replace('\\', "/"))
            } else {
                format!("file://{}", encoded)
            }
        }
    }
}
