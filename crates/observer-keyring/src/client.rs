use crate::{
    keyring::{Account, Request},
    permissions::HOST_ORIGIN,
    rpc::router::{Router, RpcRequest},
};
use eyre::Context as _;
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use uuid::Uuid;

/// Typed keyring calls made on behalf of the host wallet.
#[derive(Debug, Clone, Copy)]
pub struct KeyringClient<'a> {
    router: &'a Router,
}

impl<'a> KeyringClient<'a> {
    pub const fn new(router: &'a Router) -> Self {
        Self { router }
    }

    async fn call<T: DeserializeOwned>(&self, method: &str, params: Value) -> eyre::Result<T> {
        let result = self
            .router
            .handle_keyring_request(HOST_ORIGIN, RpcRequest::new(method, params))
            .await?;
        serde_json::from_value(result).with_context(|| format!("decode {method} result"))
    }

    pub async fn list_accounts(&self) -> eyre::Result<Vec<Account>> {
        self.call("keyring_listAccounts", Value::Null).await
    }

    pub async fn create_account(&self, address: &str) -> eyre::Result<Account> {
        self.call(
            "keyring_createAccount",
            json!({ "options": { "address": address } }),
        )
        .await
    }

    pub async fn delete_account(&self, id: Uuid) -> eyre::Result<()> {
        self.call("keyring_deleteAccount", json!({ "id": id })).await
    }

    pub async fn list_requests(&self) -> eyre::Result<Vec<Request>> {
        self.call("keyring_listRequests", Value::Null).await
    }

    pub async fn approve_request(&self, id: Uuid) -> eyre::Result<Request> {
        self.call("keyring_approveRequest", json!({ "id": id })).await
    }

    pub async fn reject_request(&self, id: Uuid) -> eyre::Result<Request> {
        self.call("keyring_rejectRequest", json!({ "id": id })).await
    }
}
