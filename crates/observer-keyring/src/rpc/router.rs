use crate::{
    bootstrap::KeyringContext,
    errors::KeyringError,
    permissions::{CallPath, PermissionGate},
    rpc::methods::{CustomMethod, KeyringCall},
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RpcRequest {
    pub method: String,
    #[serde(default)]
    pub params: Value,
}

impl RpcRequest {
    pub fn new(method: impl Into<String>, params: Value) -> Self {
        Self {
            method: method.into(),
            params,
        }
    }
}

/// Both request entry points. Permission is always checked before anything
/// else, so a denied call never touches the keyring or its storage.
#[derive(Debug)]
pub struct Router {
    gate: PermissionGate,
    context: KeyringContext,
}

impl Router {
    pub const fn new(gate: PermissionGate, context: KeyringContext) -> Self {
        Self { gate, context }
    }

    #[cfg(test)]
    pub const fn context(&self) -> &KeyringContext {
        &self.context
    }

    pub fn into_context(self) -> KeyringContext {
        self.context
    }

    /// Keyring protocol calls, forwarded to the keyring.
    pub async fn handle_keyring_request(
        &self,
        origin: &str,
        request: RpcRequest,
    ) -> Result<Value, KeyringError> {
        debug!(origin, method = %request.method, params = %request.params, "keyring request");
        self.authorize(CallPath::Keyring, origin, &request.method)?;
        let call = KeyringCall::parse(&request.method, request.params)?;
        let keyring = self.context.keyring().await?;
        call.dispatch(&keyring).await
    }

    /// Custom calls. Permission is checked against the keyring methods plus
    /// the custom set; dispatch only knows [`CustomMethod`].
    #[expect(
        clippy::unused_async,
        reason = "same shape as the keyring path; custom methods will await the keyring"
    )]
    pub async fn handle_rpc_request(
        &self,
        origin: &str,
        request: RpcRequest,
    ) -> Result<Value, KeyringError> {
        debug!(origin, method = %request.method, params = %request.params, "rpc request");
        self.authorize(CallPath::Rpc, origin, &request.method)?;
        match CustomMethod::parse(&request.method)? {}
    }

    fn authorize(&self, path: CallPath, origin: &str, method: &str) -> Result<(), KeyringError> {
        if self.gate.is_allowed(path, origin, method)? {
            return Ok(());
        }
        warn!(origin, method, path = path.as_str(), "permission denied");
        Err(KeyringError::PermissionDenied {
            origin: origin.to_owned(),
            method: method.to_owned(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::RequestPolicy,
        keyring::KeyringSettings,
        permissions::HOST_ORIGIN,
        state_store::{MemoryStateStore, StateStore},
    };
    use serde_json::json;
    use std::{sync::Arc, time::Duration};

    const APP: &str = "https://keyring.example.org";

    fn router_over(store: &Arc<MemoryStateStore>) -> Router {
        let store = Arc::clone(store) as Arc<dyn StateStore>;
        let ctx = KeyringContext::new(
            store,
            KeyringSettings {
                request_policy: RequestPolicy::AutoReject,
                storage_timeout: Duration::from_secs(5),
            },
        );
        Router::new(PermissionGate::new(Ok(APP.into())), ctx)
    }

    fn create(address: &str) -> RpcRequest {
        RpcRequest::new(
            "keyring_createAccount",
            json!({ "options": { "address": address } }),
        )
    }

    #[tokio::test]
    async fn host_creates_then_lists_an_account() -> eyre::Result<()> {
        let store = Arc::new(MemoryStateStore::new());
        let router = router_over(&store);
        let address = "0xABCD111111111111111111111111111111111111";

        let created = router
            .handle_keyring_request(HOST_ORIGIN, create(address))
            .await?;
        assert_eq!(created["address"], json!(address));
        assert_eq!(created["type"], json!("eip155:eoa"));

        let listed = router
            .handle_keyring_request(
                HOST_ORIGIN,
                RpcRequest::new("keyring_listAccounts", Value::Null),
            )
            .await?;
        assert_eq!(listed, json!([created]));
        assert_eq!(store.save_count(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn invalid_address_leaves_state_unchanged() -> eyre::Result<()> {
        let store = Arc::new(MemoryStateStore::new());
        let router = router_over(&store);
        let err = router
            .handle_keyring_request(HOST_ORIGIN, create("not-an-address"))
            .await;
        assert!(matches!(err, Err(KeyringError::InvalidAddress(_))), "{err:?}");

        let listed = router
            .handle_keyring_request(
                HOST_ORIGIN,
                RpcRequest::new("keyring_listAccounts", Value::Null),
            )
            .await?;
        assert_eq!(listed, json!([]));
        assert_eq!(store.save_count(), 0);
        Ok(())
    }

    #[tokio::test]
    async fn denied_call_never_initializes_the_keyring() {
        let store = Arc::new(MemoryStateStore::new());
        let router = router_over(&store);
        let err = router
            .handle_keyring_request(
                "https://evil.example",
                RpcRequest::new("keyring_listAccounts", Value::Null),
            )
            .await;
        assert_eq!(
            err,
            Err(KeyringError::PermissionDenied {
                origin: "https://evil.example".into(),
                method: "keyring_listAccounts".into(),
            })
        );
        assert!(!router.context().is_initialized(), "denied calls must not bootstrap");
        assert_eq!(store.load_count(), 0);
    }

    #[tokio::test]
    async fn app_cannot_submit_requests() {
        let store = Arc::new(MemoryStateStore::new());
        let router = router_over(&store);
        let err = router
            .handle_keyring_request(
                APP,
                RpcRequest::new(
                    "keyring_submitRequest",
                    json!({ "account": uuid::Uuid::new_v4() }),
                ),
            )
            .await;
        assert!(matches!(err, Err(KeyringError::PermissionDenied { .. })), "{err:?}");
    }

    #[tokio::test]
    async fn permitted_but_unimplemented_keyring_method_is_not_supported() {
        let store = Arc::new(MemoryStateStore::new());
        let router = router_over(&store);
        let err = router
            .handle_keyring_request(
                HOST_ORIGIN,
                RpcRequest::new("keyring_exportAccount", json!({ "id": uuid::Uuid::new_v4() })),
            )
            .await;
        assert_eq!(
            err,
            Err(KeyringError::MethodNotSupported("keyring_exportAccount".into()))
        );
        assert_eq!(store.load_count(), 0);
    }

    #[tokio::test]
    async fn rpc_path_answers_permitted_calls_with_not_supported() {
        let store = Arc::new(MemoryStateStore::new());
        let router = router_over(&store);
        let err = router
            .handle_rpc_request(APP, RpcRequest::new("keyring_listAccounts", Value::Null))
            .await;
        assert_eq!(
            err,
            Err(KeyringError::MethodNotSupported("keyring_listAccounts".into()))
        );

        let err = router
            .handle_rpc_request(APP, RpcRequest::new("snap_dialog", Value::Null))
            .await;
        assert!(matches!(err, Err(KeyringError::PermissionDenied { .. })), "{err:?}");
        assert!(!router.context().is_initialized(), "rpc path never needs the keyring");
    }

    #[tokio::test]
    async fn missing_app_origin_fails_non_host_calls_only() -> eyre::Result<()> {
        let store: Arc<dyn StateStore> = Arc::new(MemoryStateStore::new());
        let ctx = KeyringContext::new(
            store,
            KeyringSettings {
                request_policy: RequestPolicy::AutoReject,
                storage_timeout: Duration::from_secs(5),
            },
        );
        let router = Router::new(
            PermissionGate::new(Err(KeyringError::ConfigurationMissing("unset".into()))),
            ctx,
        );
        let err = router
            .handle_keyring_request(APP, RpcRequest::new("keyring_listAccounts", Value::Null))
            .await;
        assert!(matches!(err, Err(KeyringError::ConfigurationMissing(_))), "{err:?}");

        let listed = router
            .handle_keyring_request(
                HOST_ORIGIN,
                RpcRequest::new("keyring_listAccounts", Value::Null),
            )
            .await?;
        assert_eq!(listed, json!([]));
        Ok(())
    }

    #[tokio::test]
    async fn host_submits_and_app_reads_the_rejection() -> eyre::Result<()> {
        let store = Arc::new(MemoryStateStore::new());
        let router = router_over(&store);
        let account = router
            .handle_keyring_request(
                HOST_ORIGIN,
                create("0x2222222222222222222222222222222222222222"),
            )
            .await?;
        let req = router
            .handle_keyring_request(
                HOST_ORIGIN,
                RpcRequest::new(
                    "keyring_submitRequest",
                    json!({
                        "account": account["id"],
                        "scope": "eip155:1",
                        "request": { "method": "personal_sign", "params": ["0x68656c6c6f"] }
                    }),
                ),
            )
            .await?;
        assert_eq!(req["status"], json!("rejected"));

        let fetched = router
            .handle_keyring_request(
                APP,
                RpcRequest::new("keyring_getRequest", json!({ "id": req["id"] })),
            )
            .await?;
        assert_eq!(fetched, req);
        Ok(())
    }
}
