use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::errors::ConfigError;

/// Overrides the config file location.
pub const CONFIG_PATH_ENV: &str = "BUILDBOARD_CONFIG";

const DEFAULT_CONFIG_PATH: &str = ".buildboard/config.json";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BoardConfig {
    pub backends: Vec<BackendConfig>,
    /// Maximum in-flight provider queries per fan-out level. The remote APIs
    /// throttle aggressively, so this stays small.
    pub concurrency: usize,
    /// Per-request HTTP timeout ceiling, in seconds.
    pub timeout_secs: u64,
}

impl Default for BoardConfig {
    fn default() -> Self {
        Self {
            backends: Vec::new(),
            concurrency: 1,
            timeout_secs: 180,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    Hosted,
    Onprem,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    /// Short tag naming this backend; prefixes every summary id, so it must
    /// be unique across the configured backends.
    pub name: String,
    pub kind: BackendKind,
    pub base_url: String,
    pub username: String,
    /// Inline credential; prefer the `BUILDBOARD_PASSWORD_<NAME>` env var.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    /// Project collections to enumerate (on-premises only). Empty means the
    /// provider's default collection.
    pub collections: Vec<String>,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            name: String::new(),
            kind: BackendKind::Hosted,
            base_url: String::new(),
            username: String::new(),
            password: None,
            collections: Vec::new(),
        }
    }
}

impl BackendConfig {
    /// Env var consulted when no inline password is configured.
    pub fn password_env_var(&self) -> String {
        format!(
            "BUILDBOARD_PASSWORD_{}",
            self.name.to_uppercase().replace('-', "_")
        )
    }

    pub fn credential(&self) -> Option<String> {
        self.password
            .clone()
            .or_else(|| std::env::var(self.password_env_var()).ok())
    }
}

impl BoardConfig {
    /// Load from `.buildboard/config.json` (or `BUILDBOARD_CONFIG`). A missing
    /// file yields the defaults so `--config` stays optional.
    pub fn load() -> Result<Self, ConfigError> {
        let path = std::env::var(CONFIG_PATH_ENV)
            .unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
        Self::load_from(Path::new(&path))
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        serde_json::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })
    }
}
