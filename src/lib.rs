//! lex-verify Library
//!
//! This library provides the building blocks of the lex-lsp verification
//! harness:
//!
//! - `rpc` - Content-Length framed JSON-RPC transport and message types
//! - `client` - owned lex-lsp subprocess handle and LSP payload types
//! - `harness` - the fixed verification session and its outcome judgment
//!
//! The binary in `main.rs` wires these together; integration tests drive
//! the same modules against a scripted fake server.
//!
//! ```ignore
//! use lex_verify::client::ServerHandle;
//! use lex_verify::harness::{run_session, Scenario};
//!
//! let mut server = ServerHandle::spawn(Path::new("./lex-lsp"))?;
//! let outcome = run_session(&mut server, &Scenario::default())?;
//! ```

pub mod client;
pub mod harness;
pub mod rpc;
