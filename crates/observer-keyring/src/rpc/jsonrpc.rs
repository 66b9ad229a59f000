use crate::errors::{ErrorReply, KeyringError};
use serde::Serialize;
use serde_json::Value;

pub const INVALID_REQUEST: i64 = -32600;

#[derive(Debug, Clone, Serialize)]
pub struct JsonRpcError {
    code: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    kind: Option<&'static str>,
    message: String,
    #[serde(skip_serializing_if = "Value::is_null")]
    data: Value,
}

#[derive(Debug, Clone, Serialize)]
pub struct JsonRpcResponse {
    pub jsonrpc: &'static str,
    pub id: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
}

pub const fn ok(id: Value, result: Value) -> JsonRpcResponse {
    JsonRpcResponse {
        jsonrpc: "2.0",
        id,
        result: Some(result),
        error: None,
    }
}

/// Transport-level failure, not tied to a keyring error kind.
pub fn err(id: Value, code: i64, message: impl Into<String>) -> JsonRpcResponse {
    JsonRpcResponse {
        jsonrpc: "2.0",
        id,
        result: None,
        error: Some(JsonRpcError {
            code,
            kind: None,
            message: message.into(),
            data: Value::Null,
        }),
    }
}

pub fn keyring_err(id: Value, e: KeyringError) -> JsonRpcResponse {
    let code = e.code();
    let reply = ErrorReply::from(e);
    JsonRpcResponse {
        jsonrpc: "2.0",
        id,
        result: None,
        error: Some(JsonRpcError {
            code,
            kind: Some(reply.kind),
            message: reply.message,
            data: reply.data,
        }),
    }
}
