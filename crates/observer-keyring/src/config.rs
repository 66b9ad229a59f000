use crate::{errors::KeyringError, keyring::KeyringSettings};
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const DEFAULT_STORAGE_TIMEOUT_MS: u64 = 5_000;

/// Selects which configured application origin is trusted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BuildMode {
    Production,
    Development,
}

impl BuildMode {
    /// Release builds default to production, debug builds to development.
    pub const fn of_this_build() -> Self {
        if cfg!(debug_assertions) {
            Self::Development
        } else {
            Self::Production
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Production => "production",
            Self::Development => "development",
        }
    }
}

/// What happens to a request right after it is submitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum RequestPolicy {
    /// Reject immediately: observed accounts have no key to sign with.
    #[default]
    AutoReject,
    /// Leave pending until approved or rejected through the keyring API.
    Manual,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct KeyringConfig {
    /// Unset follows the build profile (see [`BuildMode::of_this_build`]).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub build_mode: Option<BuildMode>,
    /// Companion dapp URL trusted in production mode.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dapp_origin_production: Option<String>,
    /// Companion dapp URL trusted in development mode.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dapp_origin_development: Option<String>,
    pub request_policy: RequestPolicy,
    /// Upper bound for a single state store read or write.
    pub storage_timeout_ms: u64,
}

impl Default for KeyringConfig {
    fn default() -> Self {
        Self {
            build_mode: None,
            dapp_origin_production: None,
            dapp_origin_development: None,
            request_policy: RequestPolicy::default(),
            storage_timeout_ms: DEFAULT_STORAGE_TIMEOUT_MS,
        }
    }
}

/// Reduce a URL to its web origin (`scheme://host[:port]`).
fn web_origin(raw: &str) -> Option<String> {
    let url = reqwest::Url::parse(raw.trim()).ok()?;
    let origin = url.origin();
    origin.is_tuple().then(|| origin.ascii_serialization())
}

impl KeyringConfig {
    pub fn effective_build_mode(&self) -> BuildMode {
        self.build_mode.unwrap_or_else(BuildMode::of_this_build)
    }

    /// The application origin trusted in the active build mode.
    ///
    /// Absence is a deployment defect and reported as `ConfigurationMissing`.
    pub fn app_origin(&self) -> Result<String, KeyringError> {
        let mode = self.effective_build_mode();
        let (raw, key) = match mode {
            BuildMode::Production => (&self.dapp_origin_production, "dapp_origin_production"),
            BuildMode::Development => (&self.dapp_origin_development, "dapp_origin_development"),
        };
        let raw = raw
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| {
                KeyringError::ConfigurationMissing(format!(
                    "{key} is not set ({} mode)",
                    mode.as_str()
                ))
            })?;
        web_origin(raw).ok_or_else(|| {
            KeyringError::ConfigurationMissing(format!("{key} is not a web origin: {raw}"))
        })
    }

    pub fn keyring_settings(&self) -> KeyringSettings {
        KeyringSettings {
            request_policy: self.request_policy,
            storage_timeout: Duration::from_millis(self.storage_timeout_ms.max(1)),
        }
    }
}
