mod types;

pub use types::{
    validate_address, Account, AccountPatch, KeyringState, Request, RequestPayload,
    RequestStatus,
};

use crate::{config::RequestPolicy, errors::KeyringError, state_store::StateStore};
use serde_json::{Map, Value};
use std::{
    future::Future,
    sync::Arc,
    time::{Duration, Instant},
};
use tokio::sync::Mutex;
use tracing::{info, warn};
use uuid::Uuid;

const NO_KEY_REASON: &str = "observational account holds no signing key";
const ACCOUNT_DELETED_REASON: &str = "account deleted";

pub fn utc_now_iso() -> String {
    chrono::Utc::now().to_rfc3339()
}

#[derive(Debug, Clone, Copy)]
pub struct KeyringSettings {
    pub request_policy: RequestPolicy,
    pub storage_timeout: Duration,
}

/// Owns the live accounts and requests and mirrors them to the state store.
///
/// All access goes through one mutex. Mutations run as a transaction: the
/// state is cloned, changed, saved, and only then swapped in, so a failed
/// precondition or a failed save leaves memory and storage untouched.
pub struct Keyring {
    state: Mutex<KeyringState>,
    store: Arc<dyn StateStore>,
    settings: KeyringSettings,
}

impl std::fmt::Debug for Keyring {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Keyring")
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

async fn bounded<T>(
    limit: Duration,
    what: &'static str,
    fut: impl Future<Output = eyre::Result<T>> + Send,
) -> Result<T, KeyringError> {
    match tokio::time::timeout(limit, fut).await {
        Ok(Ok(v)) => Ok(v),
        Ok(Err(e)) => {
            warn!(error = %e, op = what, "state store failed");
            Err(KeyringError::StorageUnavailable(format!("{what}: {e:#}")))
        }
        Err(_) => {
            warn!(op = what, timeout_ms = limit.as_millis(), "state store timed out");
            Err(KeyringError::StorageUnavailable(format!(
                "{what} timed out after {}ms",
                limit.as_millis()
            )))
        }
    }
}

impl Keyring {
    /// Read the persisted state and build the keyring around it.
    pub async fn load(
        store: Arc<dyn StateStore>,
        settings: KeyringSettings,
    ) -> Result<Self, KeyringError> {
        let doc = bounded(settings.storage_timeout, "load keyring state", store.load()).await?;
        let state = KeyringState::from_document(doc).map_err(|e| {
            KeyringError::StorageUnavailable(format!("decode keyring state: {e:#}"))
        })?;
        info!(
            accounts = state.accounts.len(),
            requests = state.requests.len(),
            "keyring state loaded"
        );
        Ok(Self {
            state: Mutex::new(state),
            store,
            settings,
        })
    }

    async fn read<T>(
        &self,
        f: impl FnOnce(&KeyringState) -> Result<T, KeyringError> + Send,
    ) -> Result<T, KeyringError> {
        let guard = self.state.lock().await;
        f(&guard)
    }

    async fn transact<T>(
        &self,
        f: impl FnOnce(&mut KeyringState) -> Result<T, KeyringError> + Send,
    ) -> Result<T, KeyringError> {
        let mut live = self.state.lock().await;
        let mut next = live.clone();
        let out = f(&mut next)?;
        let doc = next.to_document().map_err(|e| {
            KeyringError::StorageUnavailable(format!("encode keyring state: {e:#}"))
        })?;
        // Saves are never abandoned once started: memory follows storage.
        let started = Instant::now();
        if let Err(e) = self.store.save(&doc).await {
            warn!(error = %e, op = "save keyring state", "state store failed");
            return Err(KeyringError::StorageUnavailable(format!(
                "save keyring state: {e:#}"
            )));
        }
        let elapsed = started.elapsed();
        if elapsed > self.settings.storage_timeout {
            warn!(
                elapsed_ms = elapsed.as_millis(),
                timeout_ms = self.settings.storage_timeout.as_millis(),
                "slow keyring state save"
            );
        }
        *live = next;
        Ok(out)
    }

    #[cfg(test)]
    pub async fn snapshot(&self) -> KeyringState {
        self.state.lock().await.clone()
    }

    pub async fn list_accounts(&self) -> Vec<Account> {
        self.state.lock().await.accounts.values().cloned().collect()
    }

    pub async fn get_account(&self, id: Uuid) -> Result<Account, KeyringError> {
        self.read(|s| {
            s.accounts
                .get(&id)
                .cloned()
                .ok_or(KeyringError::AccountNotFound(id))
        })
        .await
    }

    pub async fn create_account(
        &self,
        address: &str,
        options: Map<String, Value>,
    ) -> Result<Account, KeyringError> {
        validate_address(address)?;
        let account = self
            .transact(|s| {
                if let Some(existing) = s.account_by_address(address) {
                    return Err(KeyringError::DuplicateAddress(existing.address.clone()));
                }
                let account = Account::new_eoa(s.fresh_account_id(), address.to_owned(), options);
                s.accounts.insert(account.id, account.clone());
                Ok(account)
            })
            .await?;
        info!(account = %account.id, address = %account.address, "account created");
        Ok(account)
    }

    pub async fn filter_account_chains(
        &self,
        id: Uuid,
        chains: &[String],
    ) -> Result<Vec<String>, KeyringError> {
        self.read(|s| {
            if !s.accounts.contains_key(&id) {
                return Err(KeyringError::AccountNotFound(id));
            }
            Ok(types::eip155_chains(chains))
        })
        .await
    }

    pub async fn update_account(&self, patch: AccountPatch) -> Result<Account, KeyringError> {
        let account = self
            .transact(|s| {
                let account = s
                    .accounts
                    .get_mut(&patch.id)
                    .ok_or(KeyringError::AccountNotFound(patch.id))?;
                if let Some(address) = patch.address.as_deref() {
                    if !account.has_address(address) {
                        return Err(KeyringError::InvalidParams {
                            method: "keyring_updateAccount".into(),
                            reason: "account address cannot be changed".into(),
                        });
                    }
                }
                if let Some(mut options) = patch.options {
                    options.remove("address");
                    account.options = options;
                }
                Ok(account.clone())
            })
            .await?;
        info!(account = %account.id, "account updated");
        Ok(account)
    }

    /// Remove an account. Its pending requests are rejected; resolved ones are kept as history.
    pub async fn delete_account(&self, id: Uuid) -> Result<(), KeyringError> {
        let now = utc_now_iso();
        let orphaned = self
            .transact(|s| {
                if s.accounts.remove(&id).is_none() {
                    return Err(KeyringError::AccountNotFound(id));
                }
                s.retired_account_ids.insert(id);
                let mut orphaned = 0_usize;
                for req in s
                    .requests
                    .values_mut()
                    .filter(|r| r.account == id && r.status == RequestStatus::Pending)
                {
                    req.resolve(RequestStatus::Rejected, Some(ACCOUNT_DELETED_REASON), &now)?;
                    orphaned += 1;
                }
                Ok(orphaned)
            })
            .await?;
        info!(account = %id, rejected_requests = orphaned, "account deleted");
        Ok(())
    }

    pub async fn list_requests(&self) -> Vec<Request> {
        self.state.lock().await.requests.values().cloned().collect()
    }

    pub async fn get_request(&self, id: Uuid) -> Result<Request, KeyringError> {
        self.read(|s| {
            s.requests
                .get(&id)
                .cloned()
                .ok_or(KeyringError::RequestNotFound(id))
        })
        .await
    }

    /// Queue a request against an account, then apply the request policy.
    pub async fn submit_request(
        &self,
        account: Uuid,
        scope: String,
        payload: RequestPayload,
    ) -> Result<Request, KeyringError> {
        let now = utc_now_iso();
        let policy = self.settings.request_policy;
        let req = self
            .transact(|s| {
                if !s.accounts.contains_key(&account) {
                    return Err(KeyringError::AccountNotFound(account));
                }
                let mut req = Request {
                    id: s.fresh_request_id(),
                    account,
                    scope,
                    request: payload,
                    status: RequestStatus::Pending,
                    created_at: now.clone(),
                    resolved_at: None,
                    reason: None,
                };
                if policy == RequestPolicy::AutoReject {
                    req.resolve(RequestStatus::Rejected, Some(NO_KEY_REASON), &now)?;
                }
                s.requests.insert(req.id, req.clone());
                Ok(req)
            })
            .await?;
        info!(
            request = %req.id,
            account = %req.account,
            method = %req.request.method,
            status = %req.status,
            "request submitted"
        );
        Ok(req)
    }

    pub async fn approve_request(&self, id: Uuid) -> Result<Request, KeyringError> {
        self.resolve_request(id, RequestStatus::Approved).await
    }

    pub async fn reject_request(&self, id: Uuid) -> Result<Request, KeyringError> {
        self.resolve_request(id, RequestStatus::Rejected).await
    }

    async fn resolve_request(
        &self,
        id: Uuid,
        status: RequestStatus,
    ) -> Result<Request, KeyringError> {
        let now = utc_now_iso();
        let req = self
            .transact(|s| {
                let req = s
                    .requests
                    .get_mut(&id)
                    .ok_or(KeyringError::RequestNotFound(id))?;
                req.resolve(status, None, &now)?;
                Ok(req.clone())
            })
            .await?;
        info!(request = %id, status = %status, "request resolved");
        Ok(req)
    }
}
