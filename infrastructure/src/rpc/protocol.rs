//! JSON-RPC 2.0 message structures.
//!
//! # Protocol Overview
//!
//! - **Requests**: one side → the other (e.g. `initialize`, `tools/list`,
//!   `tools/call`, or a forwarded gateway method)
//! - **Responses**: result or error, correlated by `id`
//! - **Notifications**: method without an id; never answered
//!
//! Ids are scoped to one connection and assigned by the owning
//! [`RpcClient`](super::client::RpcClient) — they are opaque correlation
//! tokens, not globally unique values.

use serde::{Deserialize, Serialize};

/// JSON-RPC request sent by a client.
#[derive(Debug, Clone, Serialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: &'static str,
    pub id: u64,
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<serde_json::Value>,
}

impl JsonRpcRequest {
    pub fn new(id: u64, method: impl Into<String>, params: Option<serde_json::Value>) -> Self {
        Self {
            jsonrpc: "2.0",
            id,
            method: method.into(),
            params,
        }
    }
}

/// JSON-RPC response received by a client.
#[derive(Debug, Clone, Deserialize)]
pub struct JsonRpcResponse {
    #[serde(default)]
    pub jsonrpc: String,
    #[serde(default)]
    pub id: Option<u64>,
    #[serde(default)]
    pub result: Option<serde_json::Value>,
    #[serde(default)]
    pub error: Option<RpcError>,
}

/// JSON-RPC error object
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcError {
    pub code: i64,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl RpcError {
    pub const PARSE_ERROR: i64 = -32700;
    pub const INVALID_REQUEST: i64 = -32600;
    pub const METHOD_NOT_FOUND: i64 = -32601;
    pub const INVALID_PARAMS: i64 = -32602;
    pub const INTERNAL_ERROR: i64 = -32603;

    pub fn new(code: i64, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }
}

/// JSON-RPC request as seen by a serving loop.
///
/// The id is kept as a raw JSON value so it can be echoed back verbatim
/// whatever the peer chose (number, string), and so notifications (no id)
/// are recognizable.
#[derive(Debug, Clone, Deserialize)]
pub struct IncomingRequest {
    #[serde(default)]
    pub jsonrpc: String,
    #[serde(default)]
    pub id: serde_json::Value,
    pub method: String,
    #[serde(default)]
    pub params: serde_json::Value,
}

impl IncomingRequest {
    pub fn is_notification(&self) -> bool {
        self.id.is_null()
    }
}

/// JSON-RPC response sent by a serving loop.
#[derive(Debug, Clone, Serialize)]
pub struct JsonRpcResponseOut {
    pub jsonrpc: &'static str,
    pub id: serde_json::Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
}

impl JsonRpcResponseOut {
    pub fn success(id: serde_json::Value, result: serde_json::Value) -> Self {
        Self {
            jsonrpc: "2.0",
            id,
            result: Some(result),
            error: None,
        }
    }

    pub fn error(id: serde_json::Value, error: RpcError) -> Self {
        Self {
            jsonrpc: "2.0",
            id,
            result: None,
            error: Some(error),
        }
    }
}

/// Classification of an incoming JSON-RPC message.
///
/// Used by the client's background reader task to decide how to dispatch
/// each line:
///
/// - `Response` → oneshot correlation for pending requests
/// - `IncomingRequest` → a request from the peer (clients reject these)
/// - `Notification` → informational; logged and dropped
#[derive(Debug, PartialEq, Eq)]
pub enum MessageKind {
    /// A response to a request we sent (has `id`, no `method`).
    Response,
    /// A request from the peer (has `id` + `method`).
    IncomingRequest { id: u64 },
    /// A notification (has `method`, no `id`), or anything unclassifiable.
    Notification,
}

/// Classify a JSON-RPC message by inspecting `id` and `method` fields.
///
/// Pure function, called once per line in the reader loop.
pub fn classify_message(json: &serde_json::Value) -> MessageKind {
    let has_id = json.get("id").and_then(|v| v.as_u64());
    let has_method = json.get("method").and_then(|v| v.as_str());

    match (has_id, has_method) {
        (Some(id), Some(_)) => MessageKind::IncomingRequest { id },
        (Some(_), None) => MessageKind::Response,
        _ => MessageKind::Notification,
    }
}
