//! Content-Length message framing for JSON-RPC over subprocess pipes.
//!
//! This module implements HTTP-style Content-Length framing, the wire
//! convention used by the Language Server Protocol. It gives a reader
//! reliable message boundaries over stream-oriented pipes.
//!
//! # Wire Format
//!
//! ```text
//! Content-Length: <length>\r\n
//! \r\n
//! <message-body>
//! ```
//!
//! The header parsing is case-insensitive and handles both CRLF and LF line
//! endings. There is no resynchronization mechanism beyond the declared
//! length, so a body that does not decode is a hard error rather than a
//! skippable frame.

use std::io::{BufRead, ErrorKind, Write};

use serde_json::Value;
use thiserror::Error;

use crate::rpc::message::{MalformedMessage, Message};

/// Maximum message size (100MB) to prevent OOM from malicious/buggy servers.
pub const MAX_MESSAGE_SIZE: usize = 100 * 1024 * 1024;

/// Outcome of one receive operation.
#[derive(Debug)]
pub enum Inbound {
    /// A fully decoded message.
    Message(Message),
    /// The peer sent a header block without a Content-Length field; no body
    /// was consumed. A protocol violation, but not necessarily fatal.
    NoContentLength,
    /// The stream closed before a complete frame was available.
    Eof,
}

/// Framing-level errors.
///
/// All of these mean the current frame could not be decoded; since frame
/// boundaries are recovered only through the declared length, the caller
/// must treat them as surfaced failures rather than skipping ahead.
#[derive(Debug, Error)]
pub enum FramingError {
    /// Content-Length header present but not a valid integer.
    #[error("invalid Content-Length value: {0}")]
    InvalidLength(String),

    /// Declared body length exceeds MAX_MESSAGE_SIZE.
    #[error("message size {0} exceeds maximum {} bytes", MAX_MESSAGE_SIZE)]
    Oversized(usize),

    /// Body bytes are not valid UTF-8.
    #[error("message body is not valid UTF-8: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),

    /// Body bytes are not valid JSON.
    #[error("message body is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// Body is valid JSON but not a classifiable JSON-RPC message.
    #[error(transparent)]
    Malformed(#[from] MalformedMessage),

    /// Underlying stream error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Write one Content-Length framed message and flush.
///
/// The header block and body are emitted as a single contiguous write and
/// the stream is flushed before returning, so nothing stays buffered past
/// this call. Framing is deterministic: identical messages produce
/// byte-identical output.
pub fn write_message<W: Write>(writer: &mut W, message: &Message) -> std::io::Result<()> {
    let body = message.to_value().to_string();
    let framed = format!("Content-Length: {}\r\n\r\n{}", body.len(), body);

    writer.write_all(framed.as_bytes())?;
    writer.flush()
}

/// Read one Content-Length framed message.
///
/// Blocks the calling thread until a full message is available or the
/// stream closes; never busy-polls.
///
/// # Protocol
///
/// 1. Read header lines until an empty line (CRLF or LF)
/// 2. Extract the Content-Length header (case-insensitive, first `:` split)
/// 3. Read exactly that many bytes for the body and parse them as JSON
///
/// End-of-stream before a complete frame, mid-header or mid-body, yields
/// [`Inbound::Eof`] rather than partial data. A header block without a
/// Content-Length field yields [`Inbound::NoContentLength`]. Everything
/// else that prevents decoding is a [`FramingError`].
pub fn read_message<R: BufRead>(reader: &mut R) -> Result<Inbound, FramingError> {
    let mut content_length: Option<usize> = None;

    loop {
        let mut line = String::new();
        let bytes_read = reader.read_line(&mut line)?;

        // EOF before the blank-line terminator
        if bytes_read == 0 {
            return Ok(Inbound::Eof);
        }

        // Trim both CRLF and LF line endings
        let trimmed = line.trim();

        // Empty line signals end of headers
        if trimmed.is_empty() {
            break;
        }

        // Parse Content-Length header (case-insensitive per HTTP spec)
        if let Some(colon_pos) = trimmed.find(':') {
            let key = trimmed[..colon_pos].trim();
            let value = trimmed[colon_pos + 1..].trim();

            if key.eq_ignore_ascii_case("Content-Length") {
                content_length = Some(
                    value
                        .parse()
                        .map_err(|_| FramingError::InvalidLength(value.to_string()))?,
                );
            }
            // Ignore other headers (e.g., Content-Type)
        }
    }

    let size = match content_length {
        Some(size) => size,
        None => return Ok(Inbound::NoContentLength),
    };

    if size > MAX_MESSAGE_SIZE {
        return Err(FramingError::Oversized(size));
    }

    // read_exact retries short reads until the full count is obtained
    let mut body = vec![0u8; size];
    if let Err(e) = reader.read_exact(&mut body) {
        // Truncated stream: report end-of-stream, never a partial value
        if e.kind() == ErrorKind::UnexpectedEof {
            return Ok(Inbound::Eof);
        }
        return Err(e.into());
    }

    let body = String::from_utf8(body)?;
    let value: Value = serde_json::from_str(&body)?;
    Ok(Inbound::Message(Message::from_value(value)?))
}
