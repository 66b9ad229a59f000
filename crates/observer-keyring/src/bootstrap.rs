use crate::{
    errors::KeyringError,
    keyring::{Keyring, KeyringSettings},
    state_store::StateStore,
};
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::{debug, info};

/// Lazily builds the one keyring instance of this process.
///
/// Concurrent first callers share a single load. A failed load is not cached,
/// so the next caller retries it.
pub struct KeyringContext {
    store: Arc<dyn StateStore>,
    settings: KeyringSettings,
    keyring: OnceCell<Arc<Keyring>>,
}

impl std::fmt::Debug for KeyringContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyringContext")
            .field("settings", &self.settings)
            .field("initialized", &self.is_initialized())
            .finish_non_exhaustive()
    }
}

impl KeyringContext {
    pub fn new(store: Arc<dyn StateStore>, settings: KeyringSettings) -> Self {
        Self {
            store,
            settings,
            keyring: OnceCell::new(),
        }
    }

    pub async fn keyring(&self) -> Result<Arc<Keyring>, KeyringError> {
        let keyring = self
            .keyring
            .get_or_try_init(|| async {
                debug!("initializing keyring");
                Keyring::load(Arc::clone(&self.store), self.settings)
                    .await
                    .map(Arc::new)
            })
            .await?;
        Ok(Arc::clone(keyring))
    }

    pub fn is_initialized(&self) -> bool {
        self.keyring.initialized()
    }

    /// Release the instance. State is already persisted, so nothing is flushed;
    /// a later `keyring()` call loads it again.
    pub fn shutdown(&mut self) {
        if self.keyring.take().is_some() {
            info!("keyring released");
        }
    }
}
