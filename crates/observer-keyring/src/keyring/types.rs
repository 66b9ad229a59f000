use crate::errors::KeyringError;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::{
    collections::{BTreeMap, BTreeSet},
    fmt,
};
use uuid::Uuid;

pub const STATE_VERSION: u32 = 1;

/// Account type advertised for every observed account.
pub const EOA_ACCOUNT_TYPE: &str = "eip155:eoa";

/// Signing methods an EOA account advertises to the host. The keyring cannot
/// fulfil any of them; they only ever arrive as requests.
pub const EOA_METHODS: [&str; 6] = [
    "personal_sign",
    "eth_sign",
    "eth_signTransaction",
    "eth_signTypedData_v1",
    "eth_signTypedData_v3",
    "eth_signTypedData_v4",
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub id: Uuid,
    pub address: String,
    #[serde(rename = "type")]
    pub account_type: String,
    #[serde(default)]
    pub options: Map<String, Value>,
    #[serde(default)]
    pub methods: Vec<String>,
}

impl Account {
    pub fn new_eoa(id: Uuid, address: String, options: Map<String, Value>) -> Self {
        Self {
            id,
            address,
            account_type: EOA_ACCOUNT_TYPE.to_owned(),
            options,
            methods: EOA_METHODS.iter().map(|&m| m.to_owned()).collect(),
        }
    }

    pub fn has_address(&self, address: &str) -> bool {
        self.address.eq_ignore_ascii_case(address)
    }
}

/// Metadata changes for an existing account. The address is fixed at creation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountPatch {
    pub id: Uuid,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<Map<String, Value>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestStatus {
    Pending,
    Approved,
    Rejected,
}

impl RequestStatus {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
        }
    }

    pub const fn is_terminal(self) -> bool {
        !matches!(self, Self::Pending)
    }
}

impl fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The operation a request asks the account to perform. Opaque to the keyring.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestPayload {
    pub method: String,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub params: Value,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Request {
    pub id: Uuid,
    pub account: Uuid,
    #[serde(default)]
    pub scope: String,
    pub request: RequestPayload,
    pub status: RequestStatus,
    pub created_at: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolved_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl Request {
    /// Move a pending request to a terminal status.
    pub fn resolve(
        &mut self,
        status: RequestStatus,
        reason: Option<&str>,
        now: &str,
    ) -> Result<(), KeyringError> {
        if self.status.is_terminal() {
            return Err(KeyringError::RequestAlreadyResolved {
                id: self.id,
                status: self.status,
            });
        }
        self.status = status;
        self.resolved_at = Some(now.to_owned());
        self.reason = reason.map(str::to_owned);
        Ok(())
    }
}

/// The durable aggregate mirrored to the state store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyringState {
    #[serde(default = "default_version")]
    pub version: u32,
    #[serde(default)]
    pub accounts: BTreeMap<Uuid, Account>,
    #[serde(default)]
    pub requests: BTreeMap<Uuid, Request>,
    /// Ids of deleted accounts; never handed out again.
    #[serde(default)]
    pub retired_account_ids: BTreeSet<Uuid>,
}

const fn default_version() -> u32 {
    STATE_VERSION
}

impl Default for KeyringState {
    fn default() -> Self {
        Self {
            version: STATE_VERSION,
            accounts: BTreeMap::new(),
            requests: BTreeMap::new(),
            retired_account_ids: BTreeSet::new(),
        }
    }
}

impl KeyringState {
    /// Decode a stored document. Missing, `null` or `{}` documents yield an empty state.
    pub fn from_document(doc: Option<Value>) -> eyre::Result<Self> {
        match doc {
            None | Some(Value::Null) => Ok(Self::default()),
            Some(v) => Ok(serde_json::from_value(v)?),
        }
    }

    pub fn to_document(&self) -> eyre::Result<Value> {
        Ok(serde_json::to_value(self)?)
    }

    pub fn account_by_address(&self, address: &str) -> Option<&Account> {
        self.accounts.values().find(|a| a.has_address(address))
    }

    /// Allocate an account id that has never been used in this keyring.
    pub fn fresh_account_id(&self) -> Uuid {
        loop {
            let id = Uuid::new_v4();
            if !self.accounts.contains_key(&id) && !self.retired_account_ids.contains(&id) {
                return id;
            }
        }
    }

    pub fn fresh_request_id(&self) -> Uuid {
        loop {
            let id = Uuid::new_v4();
            if !self.requests.contains_key(&id) {
                return id;
            }
        }
    }
}

/// Check an EVM address: `0x` followed by exactly 40 hex digits (either case).
pub fn validate_address(address: &str) -> Result<(), KeyringError> {
    let digits = address
        .strip_prefix("0x")
        .ok_or_else(|| KeyringError::InvalidAddress(address.to_owned()))?;
    if digits.len() != 40 || hex::decode(digits).is_err() {
        return Err(KeyringError::InvalidAddress(address.to_owned()));
    }
    Ok(())
}

/// Keep only CAIP-2 chain ids in the `eip155` namespace with a numeric reference.
pub fn eip155_chains(chains: &[String]) -> Vec<String> {
    chains
        .iter()
        .filter(|c| {
            c.strip_prefix("eip155:").is_some_and(|reference| {
                !reference.is_empty() && reference.bytes().all(|b| b.is_ascii_digit())
            })
        })
        .cloned()
        .collect()
}
