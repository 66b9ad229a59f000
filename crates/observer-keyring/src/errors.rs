use crate::keyring::RequestStatus;
use serde::Serialize;
use serde_json::{json, Value};
use thiserror::Error;
use uuid::Uuid;

/// A structured error suitable for returning to a keyring caller.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorReply {
    pub kind: &'static str,
    pub message: String,
    #[serde(skip_serializing_if = "Value::is_null")]
    pub data: Value,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum KeyringError {
    #[error("origin '{origin}' is not allowed to call '{method}'")]
    PermissionDenied { origin: String, method: String },

    #[error("method not supported: {0}")]
    MethodNotSupported(String),

    #[error("invalid params for {method}: {reason}")]
    InvalidParams { method: String, reason: String },

    #[error("invalid address: {0}")]
    InvalidAddress(String),

    #[error("an account with address {0} already exists")]
    DuplicateAddress(String),

    #[error("account not found: {0}")]
    AccountNotFound(Uuid),

    #[error("request not found: {0}")]
    RequestNotFound(Uuid),

    #[error("request {id} is already {status}")]
    RequestAlreadyResolved { id: Uuid, status: RequestStatus },

    #[error("storage unavailable: {0}")]
    StorageUnavailable(String),

    #[error("configuration missing: {0}")]
    ConfigurationMissing(String),
}

impl KeyringError {
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::PermissionDenied { .. } => "PermissionDenied",
            Self::MethodNotSupported(_) => "MethodNotSupported",
            Self::InvalidParams { .. } => "InvalidParams",
            Self::InvalidAddress(_) => "InvalidAddress",
            Self::DuplicateAddress(_) => "DuplicateAddress",
            Self::AccountNotFound(_) => "AccountNotFound",
            Self::RequestNotFound(_) => "RequestNotFound",
            Self::RequestAlreadyResolved { .. } => "RequestAlreadyResolved",
            Self::StorageUnavailable(_) => "StorageUnavailable",
            Self::ConfigurationMissing(_) => "ConfigurationMissing",
        }
    }

    /// JSON-RPC error code used on the wire.
    pub const fn code(&self) -> i64 {
        match self {
            // EIP-1193 "unauthorized".
            Self::PermissionDenied { .. } => 4100,
            Self::MethodNotSupported(_) => -32601,
            Self::InvalidParams { .. } | Self::InvalidAddress(_) => -32602,
            Self::StorageUnavailable(_) | Self::ConfigurationMissing(_) => -32603,
            Self::DuplicateAddress(_)
            | Self::AccountNotFound(_)
            | Self::RequestNotFound(_)
            | Self::RequestAlreadyResolved { .. } => -32000,
        }
    }

    /// Deployment defects abort request handling instead of being answered.
    pub const fn is_fatal(&self) -> bool {
        matches!(self, Self::ConfigurationMissing(_))
    }

    fn data(&self) -> Value {
        match self {
            Self::PermissionDenied { origin, method } => {
                json!({ "origin": origin, "method": method })
            }
            Self::MethodNotSupported(method) => json!({ "method": method }),
            Self::InvalidParams { method, .. } => json!({ "method": method }),
            Self::InvalidAddress(address) | Self::DuplicateAddress(address) => {
                json!({ "address": address })
            }
            Self::AccountNotFound(id) | Self::RequestNotFound(id) => json!({ "id": id }),
            Self::RequestAlreadyResolved { id, status } => {
                json!({ "id": id, "status": status })
            }
            Self::StorageUnavailable(_) | Self::ConfigurationMissing(_) => Value::Null,
        }
    }
}

impl From<KeyringError> for ErrorReply {
    fn from(e: KeyringError) -> Self {
        Self {
            kind: e.kind(),
            message: e.to_string(),
            data: e.data(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn permission_denied_reply_carries_origin_and_method() {
        let reply = ErrorReply::from(KeyringError::PermissionDenied {
            origin: "https://evil.example".into(),
            method: "keyring_listAccounts".into(),
        });
        assert_eq!(reply.kind, "PermissionDenied");
        assert_eq!(
            reply.data,
            json!({ "origin": "https://evil.example", "method": "keyring_listAccounts" })
        );
        assert!(
            reply.message.contains("https://evil.example"),
            "message should name the origin: {}",
            reply.message
        );
    }

    #[test]
    fn only_configuration_missing_is_fatal() {
        assert!(KeyringError::ConfigurationMissing("dapp origin".into()).is_fatal());
        assert!(!KeyringError::StorageUnavailable("timeout".into()).is_fatal());
        assert!(!KeyringError::MethodNotSupported("x".into()).is_fatal());
    }

    #[test]
    fn storage_reply_omits_data() -> eyre::Result<()> {
        let reply = ErrorReply::from(KeyringError::StorageUnavailable("disk full".into()));
        let v = serde_json::to_value(&reply)?;
        assert!(v.get("data").is_none(), "null data must be skipped: {v}");
        assert_eq!(
            v.get("kind").and_then(Value::as_str),
            Some("StorageUnavailable")
        );
        Ok(())
    }
}
