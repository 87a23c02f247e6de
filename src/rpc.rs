//! JSON-RPC 2.0 wire layer for talking to lex-lsp.
//!
//! This module provides the framed transport the harness uses to exchange
//! messages with the language server over its stdio pipes.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐        stdin/stdout pipes       ┌─────────────────┐
//! │   lex-verify    │  ◄────────────────────────────► │    lex-lsp      │
//! │   (harness)     │     JSON-RPC 2.0 + framing      │    (server)     │
//! └─────────────────┘                                 └─────────────────┘
//! ```
//!
//! # Protocol
//!
//! Messages use HTTP-style Content-Length framing (the LSP convention):
//!
//! ```text
//! Content-Length: 52\r\n
//! \r\n
//! {"jsonrpc":"2.0","method":"initialized","params":{}}
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use lex_verify::rpc::{read_message, write_message, Inbound, Message};
//! use serde_json::json;
//!
//! write_message(&mut stdin, &Message::request(1, "initialize", json!({})))?;
//! if let Inbound::Message(reply) = read_message(&mut stdout)? {
//!     // ...
//! }
//! ```

mod framing;
mod message;

pub use framing::{read_message, write_message, FramingError, Inbound, MAX_MESSAGE_SIZE};
pub use message::{MalformedMessage, Message, RpcError, JSONRPC_VERSION};
