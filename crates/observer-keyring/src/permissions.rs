//! Origin/method authorization for both request entry points.

use crate::{config::KeyringConfig, errors::KeyringError};

/// Origin string the hosting wallet uses for its own calls.
pub const HOST_ORIGIN: &str = "metamask";

/// Who is calling, derived from the request origin.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Caller {
    Host,
    App,
    Unrecognized,
}

/// Which entry point a request arrived on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallPath {
    Keyring,
    Rpc,
}

/// Method names a caller class may use.
#[derive(Debug, Clone, Copy)]
pub struct PermissionTable {
    host: &'static [&'static str],
    app: &'static [&'static str],
}

impl PermissionTable {
    pub fn allows(&self, caller: Caller, method: &str) -> bool {
        let names = match caller {
            Caller::Host => self.host,
            Caller::App => self.app,
            Caller::Unrecognized => return false,
        };
        names.contains(&method)
    }
}

/// The keyring protocol surface. `keyring_exportAccount` is grantable to the
/// host but this keyring holds no keys, so it always ends in `MethodNotSupported`.
pub const KEYRING_PERMISSIONS: PermissionTable = PermissionTable {
    host: &[
        "keyring_listAccounts",
        "keyring_getAccount",
        "keyring_createAccount",
        "keyring_filterAccountChains",
        "keyring_updateAccount",
        "keyring_deleteAccount",
        "keyring_exportAccount",
        "keyring_listRequests",
        "keyring_getRequest",
        "keyring_submitRequest",
        "keyring_approveRequest",
        "keyring_rejectRequest",
    ],
    app: &[
        "keyring_listAccounts",
        "keyring_getAccount",
        "keyring_createAccount",
        "keyring_filterAccountChains",
        "keyring_updateAccount",
        "keyring_deleteAccount",
        "keyring_listRequests",
        "keyring_getRequest",
        "keyring_approveRequest",
        "keyring_rejectRequest",
    ],
};

/// Reserved for host-specific methods on the rpc path. Empty for now.
pub const CUSTOM_PERMISSIONS: PermissionTable = PermissionTable {
    host: &[],
    app: &[],
};

const KEYRING_PATH: &[PermissionTable] = &[KEYRING_PERMISSIONS];
const RPC_PATH: &[PermissionTable] = &[KEYRING_PERMISSIONS, CUSTOM_PERMISSIONS];

impl CallPath {
    pub const fn tables(self) -> &'static [PermissionTable] {
        match self {
            Self::Keyring => KEYRING_PATH,
            Self::Rpc => RPC_PATH,
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Keyring => "keyring",
            Self::Rpc => "rpc",
        }
    }
}

#[derive(Debug, Clone)]
pub struct PermissionGate {
    app_origin: Result<String, KeyringError>,
}

impl PermissionGate {
    /// `app_origin` is the normalized origin of the trusted application, or the
    /// configuration error explaining why there is none.
    pub const fn new(app_origin: Result<String, KeyringError>) -> Self {
        Self { app_origin }
    }

    pub fn from_config(cfg: &KeyringConfig) -> Self {
        Self::new(cfg.app_origin())
    }

    /// The host is recognized without consulting configuration; any other
    /// origin needs the configured application origin to be classified.
    pub fn classify(&self, origin: &str) -> Result<Caller, KeyringError> {
        if origin == HOST_ORIGIN {
            return Ok(Caller::Host);
        }
        match &self.app_origin {
            Ok(app) if app == origin => Ok(Caller::App),
            Ok(_) => Ok(Caller::Unrecognized),
            Err(e) => Err(e.clone()),
        }
    }

    pub fn is_allowed(
        &self,
        path: CallPath,
        origin: &str,
        method: &str,
    ) -> Result<bool, KeyringError> {
        let caller = self.classify(origin)?;
        Ok(path.tables().iter().any(|t| t.allows(caller, method)))
    }
}
