//! Configuration management.
//!
//! Holds where the remote authority lives, which credential backend to use
//! and how long the startup loader is held on screen.
//!
//! Configuration is stored at `~/.config/sessionkeeper/config.json`.
//! `SESSIONKEEPER_*` environment variables override the file.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::auth::{CredentialStore, FileStore, KeyringStore, MemoryStore};

/// Application name used for config/cache directory paths and the keychain service
pub const APP_NAME: &str = "sessionkeeper";

/// Config file name
const CONFIG_FILE: &str = "config.json";

/// Minimum time the startup loader stays visible.
/// 3 seconds keeps the loading screen from flickering on fast starts.
pub const DEFAULT_MIN_LOADING_MS: u64 = 3000;

/// HTTP request timeout in seconds.
/// 30s allows for slow API responses while failing fast enough for good UX.
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

/// Cap on the advisory remote logout call so sign-out never hangs.
const DEFAULT_REMOTE_LOGOUT_TIMEOUT_MS: u64 = 5000;

const DEFAULT_API_BASE_URL: &str = "http://localhost:3000";
const DEFAULT_LOGIN_PATH: &str = "/api/auth/login";
const DEFAULT_LOGOUT_PATH: &str = "/api/auth/logout";
const DEFAULT_VERIFY_PATH: &str = "/api/auth/verify";

const ENV_API_URL: &str = "SESSIONKEEPER_API_URL";
const ENV_MIN_LOADING_MS: &str = "SESSIONKEEPER_MIN_LOADING_MS";
const ENV_BACKEND: &str = "SESSIONKEEPER_BACKEND";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum CredentialBackend {
    Keyring,
    #[default]
    File,
    Memory,
}

impl CredentialBackend {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "keyring" | "keychain" => Some(CredentialBackend::Keyring),
            "file" => Some(CredentialBackend::File),
            "memory" => Some(CredentialBackend::Memory),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub api_base_url: String,
    pub login_path: String,
    pub logout_path: String,
    pub verify_path: String,
    pub min_loading_ms: u64,
    pub request_timeout_secs: u64,
    pub remote_logout_timeout_ms: u64,
    pub credential_backend: CredentialBackend,
    /// Also tell the authority when a stored token turns out stale at startup
    pub remote_logout_on_stale_token: bool,
    pub last_email: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            login_path: DEFAULT_LOGIN_PATH.to_string(),
            logout_path: DEFAULT_LOGOUT_PATH.to_string(),
            verify_path: DEFAULT_VERIFY_PATH.to_string(),
            min_loading_ms: DEFAULT_MIN_LOADING_MS,
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            remote_logout_timeout_ms: DEFAULT_REMOTE_LOGOUT_TIMEOUT_MS,
            credential_backend: CredentialBackend::default(),
            remote_logout_on_stale_token: false,
            last_email: None,
        }
    }
}

impl Config {
    /// Load the config file (defaults if absent) and apply environment overrides.
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;
        let mut config = if path.exists() {
            let contents = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read config file {}", path.display()))?;
            serde_json::from_str(&contents).context("Failed to parse config file")?
        } else {
            Self::default()
        };
        config.apply_env();
        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        let path = Self::config_path()?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    fn apply_env(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Apply overrides from a key lookup (the process environment in practice).
    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(url) = lookup(ENV_API_URL).filter(|u| !u.trim().is_empty()) {
            self.api_base_url = url.trim().to_string();
        }
        if let Some(raw) = lookup(ENV_MIN_LOADING_MS) {
            match raw.trim().parse() {
                Ok(ms) => self.min_loading_ms = ms,
                Err(_) => warn!(value = %raw, "Ignoring invalid {}", ENV_MIN_LOADING_MS),
            }
        }
        if let Some(raw) = lookup(ENV_BACKEND) {
            match CredentialBackend::parse(&raw) {
                Some(backend) => self.credential_backend = backend,
                None => warn!(value = %raw, "Ignoring unknown {}", ENV_BACKEND),
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

    pub fn min_loading(&self) -> Duration {
        Duration::from_millis(self.min_loading_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn remote_logout_timeout(&self) -> Duration {
        Duration::from_millis(self.remote_logout_timeout_ms)
    }

    /// Origin of the remote authority, used to scope stored credentials.
    pub fn origin(&self) -> &str {
        self.api_base_url.trim_end_matches('/')
    }

    /// Build the configured credential backend.
    pub fn credential_store(&self) -> Result<Arc<dyn CredentialStore>> {
        let store: Arc<dyn CredentialStore> = match self.credential_backend {
            CredentialBackend::Keyring => Arc::new(KeyringStore::new(self.origin())),
            CredentialBackend::File => Arc::new(FileStore::new(&self.cache_dir()?, self.origin())),
            CredentialBackend::Memory => Arc::new(MemoryStore::new()),
        };
        Ok(store)
    }
}
