use crate::{
    config::{BuildMode, KeyringConfig, RequestPolicy},
    paths::KeyringPaths,
};
use eyre::Context as _;
use std::path::PathBuf;
use tracing::warn;

#[derive(Debug, Clone)]
pub struct ConfigStore {
    path: PathBuf,
}

fn parse_build_mode_env(s: &str) -> Option<BuildMode> {
    match s.trim().to_lowercase().as_str() {
        "production" | "prod" | "release" => Some(BuildMode::Production),
        "development" | "dev" | "debug" => Some(BuildMode::Development),
        _ => None,
    }
}

fn parse_request_policy_env(s: &str) -> Option<RequestPolicy> {
    match s.trim().to_lowercase().as_str() {
        "auto-reject" | "auto_reject" | "reject" => Some(RequestPolicy::AutoReject),
        "manual" => Some(RequestPolicy::Manual),
        _ => None,
    }
}

/// Apply `OBSERVER_KEYRING_*` environment overrides. Env wins over the file.
fn apply_env_overrides(cfg: &mut KeyringConfig) {
    /// Helper: if an env var is set and non-empty, apply `setter` with the trimmed value.
    fn apply_env(var: &str, setter: impl FnOnce(&str)) {
        if let Ok(u) = std::env::var(var) {
            let t = u.trim();
            if !t.is_empty() {
                setter(t);
            }
        }
    }

    apply_env("OBSERVER_KEYRING_DAPP_ORIGIN_PRODUCTION", |v| {
        cfg.dapp_origin_production = Some(v.to_owned());
    });
    apply_env("OBSERVER_KEYRING_DAPP_ORIGIN_DEVELOPMENT", |v| {
        cfg.dapp_origin_development = Some(v.to_owned());
    });
    apply_env("OBSERVER_KEYRING_BUILD_MODE", |v| {
        match parse_build_mode_env(v) {
            Some(m) => cfg.build_mode = Some(m),
            None => warn!(value = v, "ignoring unknown OBSERVER_KEYRING_BUILD_MODE"),
        }
    });
    apply_env("OBSERVER_KEYRING_REQUEST_POLICY", |v| {
        match parse_request_policy_env(v) {
            Some(p) => cfg.request_policy = p,
            None => warn!(value = v, "ignoring unknown OBSERVER_KEYRING_REQUEST_POLICY"),
        }
    });
    apply_env("OBSERVER_KEYRING_STORAGE_TIMEOUT_MS", |v| {
        match v.parse::<u64>() {
            Ok(n) if n > 0 => cfg.storage_timeout_ms = n,
            Ok(_) | Err(_) => {
                warn!(value = v, "ignoring invalid OBSERVER_KEYRING_STORAGE_TIMEOUT_MS");
            }
        }
    });
}

impl ConfigStore {
    pub fn new(paths: &KeyringPaths) -> Self {
        Self {
            path: paths.config_dir.join("config.toml"),
        }
    }

    /// Load `config.toml`, writing the defaults on first run. Env overrides are
    /// applied after loading and never written back.
    pub fn load_or_init_default(&self) -> eyre::Result<KeyringConfig> {
        let mut cfg = match crate::fsutil::read_optional_string(&self.path)? {
            Some(s) => toml::from_str(&s).context("parse config.toml")?,
            None => {
                let cfg = KeyringConfig::default();
                self.save(&cfg)?;
                cfg
            }
        };
        apply_env_overrides(&mut cfg);
        Ok(cfg)
    }

    pub fn save(&self, cfg: &KeyringConfig) -> eyre::Result<()> {
        let s = toml::to_string_pretty(cfg).context("serialize config.toml")?;
        crate::fsutil::write_atomic_private(&self.path, s.as_bytes())
            .context("write config.toml")?;
        Ok(())
    }
}
