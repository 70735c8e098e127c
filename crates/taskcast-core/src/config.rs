//! Application configuration management.
//!
//! This module handles loading and saving the client configuration: which
//! backend to talk to, the request timeout, where the token is persisted and
//! the last username used to sign in.
//!
//! Configuration is stored at `~/.config/taskcast/config.json`. Environment
//! variables override the file:
//!
//! - `TASKCAST_API_URL`: backend base URL
//! - `TASKCAST_TIMEOUT_SECS`: request timeout in seconds
//! - `TASKCAST_TOKEN_BACKEND`: `file`, `keyring` or `memory`

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::auth::{FileTokenStore, KeyringTokenStore, MemoryTokenStore, TokenStore};

/// Application name used for config/cache directory paths
pub const APP_NAME: &str = "taskcast";

/// Config file name
const CONFIG_FILE: &str = "config.json";

/// Backend address when nothing is configured (the backend's default port).
pub const DEFAULT_API_BASE_URL: &str = "http://localhost:8000";

/// HTTP request timeout in seconds.
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

pub const ENV_API_URL: &str = "TASKCAST_API_URL";
pub const ENV_TIMEOUT_SECS: &str = "TASKCAST_TIMEOUT_SECS";
pub const ENV_TOKEN_BACKEND: &str = "TASKCAST_TOKEN_BACKEND";

/// Where the bearer token is persisted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenBackend {
    /// A `token` file in the cache directory.
    #[default]
    File,
    /// The OS keychain.
    Keyring,
    /// Nothing persisted; every run starts signed out.
    Memory,
}

impl FromStr for TokenBackend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "file" => Ok(TokenBackend::File),
            "keyring" => Ok(TokenBackend::Keyring),
            "memory" => Ok(TokenBackend::Memory),
            other => Err(anyhow::anyhow!("Unknown token backend: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub api_base_url: String,
    pub request_timeout_secs: u64,
    pub token_backend: TokenBackend,
    pub last_username: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            token_backend: TokenBackend::default(),
            last_username: None,
        }
    }
}

impl Config {
    /// Load the config file (defaults when absent) and apply environment
    /// overrides.
    pub fn load() -> Result<Self> {
        let mut config = Self::load_from(&Self::config_path()?)?;
        config.apply_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            let contents = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file {}", path.display()))?;
            serde_json::from_str(&contents)
                .with_context(|| format!("Failed to parse config file {}", path.display()))
        } else {
            Ok(Self::default())
        }
    }

    /// Record the last username in the config file. Only the file is
    /// rewritten; environment overrides are not persisted.
    pub fn remember_username(username: &str) -> Result<()> {
        let path = Self::config_path()?;
        let mut stored = Self::load_from(&path)?;
        stored.last_username = Some(username.to_string());
        stored.save_to(&path)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    /// Apply overrides from `lookup` (the process environment in
    /// [`Config::load`]). Unparseable values are ignored with a warning.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(url) = lookup(ENV_API_URL).filter(|u| !u.trim().is_empty()) {
            self.api_base_url = url.trim().to_string();
        }

        if let Some(raw) = lookup(ENV_TIMEOUT_SECS) {
            match raw.trim().parse::<u64>() {
                Ok(secs) if secs > 0 => self.request_timeout_secs = secs,
                _ => warn!(value = %raw, "Ignoring invalid {}", ENV_TIMEOUT_SECS),
            }
        }

        if let Some(raw) = lookup(ENV_TOKEN_BACKEND) {
            match raw.parse() {
                Ok(backend) => self.token_backend = backend,
                Err(e) => warn!(error = %e, "Ignoring invalid {}", ENV_TOKEN_BACKEND),
            }
        }
    }

    fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }

    pub fn cache_dir(&self) -> Result<PathBuf> {
        let cache_dir = dirs::cache_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find cache directory"))?;
        Ok(cache_dir.join(APP_NAME))
    }

    /// Build the token store selected by `token_backend`.
    pub fn token_store(&self) -> Result<Arc<dyn TokenStore>> {
        let store: Arc<dyn TokenStore> = match self.token_backend {
            TokenBackend::File => Arc::new(FileTokenStore::new(self.cache_dir()?)),
            TokenBackend::Keyring => Arc::new(KeyringTokenStore::new()?),
            TokenBackend::Memory => Arc::new(MemoryTokenStore::new()),
        };
        Ok(store)
    }
}
