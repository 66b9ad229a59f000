//! Durable get/set of the single opaque keyring state document.

use async_trait::async_trait;
use eyre::Context as _;
use serde_json::Value;
use std::{
    path::PathBuf,
    sync::atomic::{AtomicBool, AtomicUsize, Ordering},
    time::Duration,
};
use tokio::sync::Mutex;

#[async_trait]
pub trait StateStore: Send + Sync {
    /// Load the stored document, `None` if nothing was ever saved.
    async fn load(&self) -> eyre::Result<Option<Value>>;

    /// Replace the stored document.
    async fn save(&self, doc: &Value) -> eyre::Result<()>;
}

/// JSON file on disk, replaced atomically on every save.
#[derive(Debug, Clone)]
pub struct FileStateStore {
    path: PathBuf,
}

impl FileStateStore {
    pub const fn new(path: PathBuf) -> Self {
        Self { path }
    }
}

#[async_trait]
impl StateStore for FileStateStore {
    async fn load(&self) -> eyre::Result<Option<Value>> {
        let path = self.path.clone();
        let raw = tokio::task::spawn_blocking(move || crate::fsutil::read_optional_string(&path))
            .await
            .context("join state read")??;
        let Some(raw) = raw else {
            return Ok(None);
        };
        if raw.trim().is_empty() {
            return Ok(None);
        }
        let doc = serde_json::from_str(&raw)
            .with_context(|| format!("parse {}", self.path.display()))?;
        Ok(Some(doc))
    }

    async fn save(&self, doc: &Value) -> eyre::Result<()> {
        let path = self.path.clone();
        let bytes = serde_json::to_vec_pretty(doc).context("serialize keyring state")?;
        tokio::task::spawn_blocking(move || crate::fsutil::write_atomic_private(&path, &bytes))
            .await
            .context("join state write")?
    }
}

/// Process-local document. Nothing survives a restart.
#[derive(Debug, Default)]
pub struct MemoryStateStore {
    doc: Mutex<Option<Value>>,
    load_delay: Duration,
    fail_saves: AtomicBool,
    loads: AtomicUsize,
    saves: AtomicUsize,
}

impl MemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    #[cfg(test)]
    pub fn with_document(doc: Value) -> Self {
        Self {
            doc: Mutex::new(Some(doc)),
            ..Self::default()
        }
    }

    /// Stall every load by `delay`.
    #[cfg(test)]
    #[must_use]
    pub fn with_load_delay(mut self, delay: Duration) -> Self {
        self.load_delay = delay;
        self
    }

    /// Make subsequent saves fail until switched back.
    #[cfg(test)]
    pub fn set_fail_saves(&self, fail: bool) {
        self.fail_saves.store(fail, Ordering::SeqCst);
    }

    #[cfg(test)]
    pub fn load_count(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }

    #[cfg(test)]
    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }

    #[cfg(test)]
    pub async fn document(&self) -> Option<Value> {
        self.doc.lock().await.clone()
    }
}

#[async_trait]
impl StateStore for MemoryStateStore {
    async fn load(&self) -> eyre::Result<Option<Value>> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        if !self.load_delay.is_zero() {
            tokio::time::sleep(self.load_delay).await;
        }
        Ok(self.doc.lock().await.clone())
    }

    async fn save(&self, doc: &Value) -> eyre::Result<()> {
        if self.fail_saves.load(Ordering::SeqCst) {
            eyre::bail!("memory store is refusing writes");
        }
        *self.doc.lock().await = Some(doc.clone());
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
