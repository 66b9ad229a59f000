use crate::{
    errors::KeyringError,
    keyring::{AccountPatch, Keyring, RequestPayload},
};
use serde::{de::DeserializeOwned, Deserialize};
use serde_json::{json, Map, Value};
use uuid::Uuid;

/// Keyring protocol methods this keyring implements.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyringMethod {
    ListAccounts,
    GetAccount,
    CreateAccount,
    FilterAccountChains,
    UpdateAccount,
    DeleteAccount,
    ListRequests,
    GetRequest,
    SubmitRequest,
    ApproveRequest,
    RejectRequest,
}

impl KeyringMethod {
    pub const ALL: [Self; 11] = [
        Self::ListAccounts,
        Self::GetAccount,
        Self::CreateAccount,
        Self::FilterAccountChains,
        Self::UpdateAccount,
        Self::DeleteAccount,
        Self::ListRequests,
        Self::GetRequest,
        Self::SubmitRequest,
        Self::ApproveRequest,
        Self::RejectRequest,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ListAccounts => "keyring_listAccounts",
            Self::GetAccount => "keyring_getAccount",
            Self::CreateAccount => "keyring_createAccount",
            Self::FilterAccountChains => "keyring_filterAccountChains",
            Self::UpdateAccount => "keyring_updateAccount",
            Self::DeleteAccount => "keyring_deleteAccount",
            Self::ListRequests => "keyring_listRequests",
            Self::GetRequest => "keyring_getRequest",
            Self::SubmitRequest => "keyring_submitRequest",
            Self::ApproveRequest => "keyring_approveRequest",
            Self::RejectRequest => "keyring_rejectRequest",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|m| m.as_str() == name)
    }
}

/// Host-specific methods outside the keyring protocol. None are defined yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CustomMethod {}

impl CustomMethod {
    pub const ALL: [Self; 0] = [];

    pub const fn as_str(self) -> &'static str {
        match self {}
    }

    pub fn parse(name: &str) -> Result<Self, KeyringError> {
        Self::ALL
            .into_iter()
            .find(|m| m.as_str() == name)
            .ok_or_else(|| KeyringError::MethodNotSupported(name.to_owned()))
    }
}

#[derive(Debug, Deserialize)]
struct IdParams {
    id: Uuid,
}

#[derive(Debug, Deserialize)]
struct CreateAccountParams {
    #[serde(default)]
    options: Map<String, Value>,
}

#[derive(Debug, Deserialize)]
struct FilterAccountChainsParams {
    id: Uuid,
    chains: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct UpdateAccountParams {
    account: AccountPatch,
}

#[derive(Debug, Deserialize)]
struct SubmitRequestParams {
    account: Uuid,
    #[serde(default)]
    scope: String,
    request: RequestPayload,
}

fn params_of<T: DeserializeOwned>(method: KeyringMethod, params: Value) -> Result<T, KeyringError> {
    serde_json::from_value(params).map_err(|e| KeyringError::InvalidParams {
        method: method.as_str().to_owned(),
        reason: e.to_string(),
    })
}

/// A fully parsed keyring protocol call.
#[derive(Debug, Clone, PartialEq)]
pub enum KeyringCall {
    ListAccounts,
    GetAccount { id: Uuid },
    CreateAccount {
        address: String,
        options: Map<String, Value>,
    },
    FilterAccountChains { id: Uuid, chains: Vec<String> },
    UpdateAccount(AccountPatch),
    DeleteAccount { id: Uuid },
    ListRequests,
    GetRequest { id: Uuid },
    SubmitRequest {
        account: Uuid,
        scope: String,
        request: RequestPayload,
    },
    ApproveRequest { id: Uuid },
    RejectRequest { id: Uuid },
}

impl KeyringCall {
    /// Resolve a method name and its params. Names outside [`KeyringMethod`] are
    /// `MethodNotSupported`; params that do not fit the method are `InvalidParams`,
    /// except a missing or non-string `options.address`, which is `InvalidAddress`.
    pub fn parse(method: &str, params: Value) -> Result<Self, KeyringError> {
        let m = KeyringMethod::from_name(method)
            .ok_or_else(|| KeyringError::MethodNotSupported(method.to_owned()))?;
        let call = match m {
            KeyringMethod::ListAccounts => Self::ListAccounts,
            KeyringMethod::ListRequests => Self::ListRequests,
            KeyringMethod::GetAccount => Self::GetAccount {
                id: params_of::<IdParams>(m, params)?.id,
            },
            KeyringMethod::CreateAccount => {
                let mut p: CreateAccountParams = params_of(m, params)?;
                let address = match p.options.remove("address") {
                    Some(Value::String(address)) => address,
                    Some(other) => return Err(KeyringError::InvalidAddress(other.to_string())),
                    None => return Err(KeyringError::InvalidAddress(String::new())),
                };
                Self::CreateAccount {
                    address,
                    options: p.options,
                }
            }
            KeyringMethod::FilterAccountChains => {
                let p: FilterAccountChainsParams = params_of(m, params)?;
                Self::FilterAccountChains {
                    id: p.id,
                    chains: p.chains,
                }
            }
            KeyringMethod::UpdateAccount => {
                Self::UpdateAccount(params_of::<UpdateAccountParams>(m, params)?.account)
            }
            KeyringMethod::DeleteAccount => Self::DeleteAccount {
                id: params_of::<IdParams>(m, params)?.id,
            },
            KeyringMethod::GetRequest => Self::GetRequest {
                id: params_of::<IdParams>(m, params)?.id,
            },
            KeyringMethod::SubmitRequest => {
                let p: SubmitRequestParams = params_of(m, params)?;
                Self::SubmitRequest {
                    account: p.account,
                    scope: p.scope,
                    request: p.request,
                }
            }
            KeyringMethod::ApproveRequest => Self::ApproveRequest {
                id: params_of::<IdParams>(m, params)?.id,
            },
            KeyringMethod::RejectRequest => Self::RejectRequest {
                id: params_of::<IdParams>(m, params)?.id,
            },
        };
        Ok(call)
    }

    pub async fn dispatch(self, keyring: &Keyring) -> Result<Value, KeyringError> {
        let out = match self {
            Self::ListAccounts => json!(keyring.list_accounts().await),
            Self::GetAccount { id } => json!(keyring.get_account(id).await?),
            Self::CreateAccount { address, options } => {
                json!(keyring.create_account(&address, options).await?)
            }
            Self::FilterAccountChains { id, chains } => {
                json!(keyring.filter_account_chains(id, &chains).await?)
            }
            Self::UpdateAccount(patch) => json!(keyring.update_account(patch).await?),
            Self::DeleteAccount { id } => {
                keyring.delete_account(id).await?;
                Value::Null
            }
            Self::ListRequests => json!(keyring.list_requests().await),
            Self::GetRequest { id } => json!(keyring.get_request(id).await?),
            Self::SubmitRequest {
                account,
                scope,
                request,
            } => json!(keyring.submit_request(account, scope, request).await?),
            Self::ApproveRequest { id } => json!(keyring.approve_request(id).await?),
            Self::RejectRequest { id } => json!(keyring.reject_request(id).await?),
        };
        Ok(out)
    }
}
