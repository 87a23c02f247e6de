//! Typed JSON-RPC 2.0 messages for the lex-lsp wire protocol.
//!
//! Identifier presence is the sole discriminator between message kinds:
//! a `method` with an `id` is a request awaiting a reply, a `method`
//! without an `id` is a one-way notification, and an `id` without a
//! `method` is the peer's response to an earlier request.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;

/// Protocol version tag carried by every message.
pub const JSONRPC_VERSION: &str = "2.0";

/// A single JSON-RPC message.
///
/// Messages are constructed immediately before serialization (outbound)
/// or immediately after deserialization (inbound) and are never mutated.
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    /// A call expecting a correlated reply.
    Request {
        id: i64,
        method: String,
        params: Value,
    },
    /// A one-way message; no reply expected, no identifier.
    Notification { method: String, params: Value },
    /// The peer's reply to a prior request, carrying its identifier.
    Response {
        id: i64,
        result: Option<Value>,
        error: Option<RpcError>,
    },
}

/// JSON-RPC error object attached to a failed response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcError {
    pub code: i64,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

/// A body that parsed as JSON but carries neither a `method` nor an `id`,
/// so it cannot be classified as request, notification, or response.
#[derive(Debug, Error)]
#[error("message has neither \"method\" nor \"id\" field: {0}")]
pub struct MalformedMessage(pub String);

impl Message {
    /// Construct a request with the given identifier.
    pub fn request(id: i64, method: impl Into<String>, params: Value) -> Self {
        Message::Request {
            id,
            method: method.into(),
            params,
        }
    }

    /// Construct a notification (no id field).
    pub fn notification(method: impl Into<String>, params: Value) -> Self {
        Message::Notification {
            method: method.into(),
            params,
        }
    }

    /// The method name, if this is a request or notification.
    pub fn method(&self) -> Option<&str> {
        match self {
            Message::Request { method, .. } | Message::Notification { method, .. } => Some(method),
            Message::Response { .. } => None,
        }
    }

    /// The parameter payload, if this is a request or notification.
    pub fn params(&self) -> Option<&Value> {
        match self {
            Message::Request { params, .. } | Message::Notification { params, .. } => Some(params),
            Message::Response { .. } => None,
        }
    }

    /// Build the wire JSON for this message.
    ///
    /// Requests and notifications carry `method` and `params`; requests
    /// additionally carry `id`. Responses carry `id` plus whichever of
    /// `result`/`error` is present.
    pub fn to_value(&self) -> Value {
        match self {
            Message::Request { id, method, params } => json!({
                "jsonrpc": JSONRPC_VERSION,
                "id": id,
                "method": method,
                "params": params,
            }),
            Message::Notification { method, params } => json!({
                "jsonrpc": JSONRPC_VERSION,
                "method": method,
                "params": params,
            }),
            Message::Response { id, result, error } => {
                let mut obj = json!({
                    "jsonrpc": JSONRPC_VERSION,
                    "id": id,
                });
                if let Some(result) = result {
                    obj["result"] = result.clone();
                }
                if let Some(error) = error {
                    obj["error"] = json!({
                        "code": error.code,
                        "message": error.message,
                    });
                    if let Some(data) = &error.data {
                        obj["error"]["data"] = data.clone();
                    }
                }
                obj
            }
        }
    }

    /// Classify an inbound JSON body into a message.
    ///
    /// A missing `params` field is read as `null` and a non-integer
    /// response `id` as `-1`. A body with neither `method` nor `id` is
    /// unclassifiable and rejected.
    pub fn from_value(value: Value) -> Result<Self, MalformedMessage> {
        let method = value.get("method").and_then(Value::as_str);
        let id = value.get("id").and_then(Value::as_i64);

        match (method, id) {
            (Some(method), Some(id)) => Ok(Message::Request {
                id,
                method: method.to_string(),
                params: value.get("params").cloned().unwrap_or(Value::Null),
            }),
            (Some(method), None) => Ok(Message::Notification {
                method: method.to_string(),
                params: value.get("params").cloned().unwrap_or(Value::Null),
            }),
            (None, _) if value.get("id").is_some() => Ok(Message::Response {
                id: id.unwrap_or(-1),
                result: value.get("result").cloned(),
                error: value.get("error").map(parse_rpc_error),
            }),
            _ => Err(MalformedMessage(value.to_string())),
        }
    }
}

/// Parse the error object of a response, tolerating missing fields.
fn parse_rpc_error(value: &Value) -> RpcError {
    serde_json::from_value(value.clone()).unwrap_or_else(|_| RpcError {
        code: value.get("code").and_then(Value::as_i64).unwrap_or(-1),
        message: value
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or("unknown server error")
            .to_string(),
        data: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_request_wire_shape() {
        let msg = Message::request(1, "initialize", json!({"capabilities": {}}));
        let value = msg.to_value();

        assert_eq!(value["jsonrpc"], "2.0");
        assert_eq!(value["id"], 1);
        assert_eq!(value["method"], "initialize");
        assert_eq!(value["params"], json!({"capabilities": {}}));
    }

    #[test]
    fn test_notification_has_no_id() {
        let msg = Message::notification("initialized", json!({}));
        let value = msg.to_value();

        assert_eq!(value["method"], "initialized");
        assert!(value.get("id").is_none());
    }

    #[test]
    fn test_classify_response() {
        let value = json!({"jsonrpc": "2.0", "id": 1, "result": {"capabilities": {}}});
        let msg = Message::from_value(value).unwrap();

        match msg {
            Message::Response { id, result, error } => {
                assert_eq!(id, 1);
                assert_eq!(result, Some(json!({"capabilities": {}})));
                assert!(error.is_none());
            }
            other => panic!("Expected Response, got {:?}", other),
        }
    }

    #[test]
    fn test_classify_notification() {
        let value = json!({
            "jsonrpc": "2.0",
            "method": "textDocument/publishDiagnostics",
            "params": {"uri": "file:///test.lex", "diagnostics": []}
        });
        let msg = Message::from_value(value).unwrap();

        assert_eq!(msg.method(), Some("textDocument/publishDiagnostics"));
        assert!(matches!(msg, Message::Notification { .. }));
    }

    #[test]
    fn test_classify_request_from_peer() {
        // Servers may send requests too (e.g. workspace/configuration).
        let value = json!({"jsonrpc": "2.0", "id": 7, "method": "workspace/configuration", "params": {}});
        let msg = Message::from_value(value).unwrap();

        assert!(matches!(msg, Message::Request { id: 7, .. }));
    }

    #[test]
    fn test_error_response() {
        let value = json!({
            "jsonrpc": "2.0",
            "id": 2,
            "error": {"code": -32601, "message": "Method not found"}
        });
        let msg = Message::from_value(value).unwrap();

        match msg {
            Message::Response { error: Some(err), .. } => {
                assert_eq!(err.code, -32601);
                assert_eq!(err.message, "Method not found");
                assert!(err.data.is_none());
            }
            other => panic!("Expected error response, got {:?}", other),
        }
    }

    #[test]
    fn test_unclassifiable_body_rejected() {
        let result = Message::from_value(json!({"jsonrpc": "2.0", "params": {}}));
        assert!(result.is_err());

        let result = Message::from_value(json!(42));
        assert!(result.is_err());
    }

    #[test]
    fn test_value_roundtrip_preserves_fields() {
        let original = Message::request(3, "initialize", json!({"processId": null}));
        let decoded = Message::from_value(original.to_value()).unwrap();
        assert_eq!(decoded, original);

        let original = Message::notification("initialized", json!({}));
        let decoded = Message::from_value(original.to_value()).unwrap();
        assert_eq!(decoded, original);
    }
}
