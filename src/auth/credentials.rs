use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use keyring::Entry;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::APP_NAME;

/// Credential file name inside the origin's cache directory
const CREDENTIAL_FILE: &str = "credential.json";

/// Persistent storage for the single bearer credential of one origin.
///
/// `get` never fails for a missing entry; it returns `None`. Expiry is not
/// checked here.
pub trait CredentialStore: Send + Sync {
    /// Overwrite the stored credential
    fn put(&self, token: &str) -> Result<()>;

    /// Read the stored credential, if any
    fn get(&self) -> Option<String>;

    /// Remove the stored credential. Clearing an empty store succeeds.
    fn clear(&self) -> Result<()>;
}

// ============================================================================
// OS keychain
// ============================================================================

/// Stores the credential in the OS keychain, one entry per origin.
pub struct KeyringStore {
    origin: String,
}

impl KeyringStore {
    pub fn new(origin: impl Into<String>) -> Self {
        Self {
            origin: origin.into(),
        }
    }

    fn entry(&self) -> Result<Entry> {
        Entry::new(APP_NAME, &self.origin).context("Failed to create keyring entry")
    }
}

impl CredentialStore for KeyringStore {
    fn put(&self, token: &str) -> Result<()> {
        self.entry()?
            .set_password(token)
            .context("Failed to store token in keychain")?;
        Ok(())
    }

    fn get(&self) -> Option<String> {
        let entry = match self.entry() {
            Ok(entry) => entry,
            Err(e) => {
                warn!(error = %e, "Keychain unavailable");
                return None;
            }
        };
        match entry.get_password() {
            Ok(token) => Some(token),
            Err(keyring::Error::NoEntry) => None,
            Err(e) => {
                warn!(error = %e, "Failed to read token from keychain");
                None
            }
        }
    }

    fn clear(&self) -> Result<()> {
        match self.entry()?.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(e).context("Failed to delete token from keychain"),
        }
    }
}

// ============================================================================
// File on disk
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredCredential {
    token: String,
    stored_at: DateTime<Utc>,
}

/// Stores the credential as JSON under `<cache_dir>/<origin-slug>/`.
pub struct FileStore {
    path: PathBuf,
}

impl FileStore {
    pub fn new(cache_dir: &Path, origin: &str) -> Self {
        Self {
            path: cache_dir.join(origin_slug(origin)).join(CREDENTIAL_FILE),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl CredentialStore for FileStore {
    fn put(&self, token: &str) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).context("Failed to create credential directory")?;
        }
        let stored = StoredCredential {
            token: token.to_string(),
            stored_at: Utc::now(),
        };
        let contents = serde_json::to_string_pretty(&stored)?;
        std::fs::write(&self.path, contents).context("Failed to write credential file")?;
        debug!(path = ?self.path, "Credential saved");
        Ok(())
    }

    fn get(&self) -> Option<String> {
        if !self.path.exists() {
            return None;
        }
        let contents = match std::fs::read_to_string(&self.path) {
            Ok(c) => c,
            Err(e) => {
                warn!(error = %e, "Failed to read credential file");
                return None;
            }
        };
        match serde_json::from_str::<StoredCredential>(&contents) {
            Ok(stored) => Some(stored.token),
            Err(e) => {
                warn!(error = %e, "Failed to parse credential file");
                None
            }
        }
    }

    fn clear(&self) -> Result<()> {
        if self.path.exists() {
            std::fs::remove_file(&self.path).context("Failed to remove credential file")?;
        }
        Ok(())
    }
}

/// Turn an origin such as `https://api.example.com:8443` into a directory name.
fn origin_slug(origin: &str) -> String {
    let trimmed = origin
        .trim_start_matches("https://")
        .trim_start_matches("http://")
        .trim_end_matches('/');
    let slug: String = trimmed
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '.' || c == '-' { c } else { '_' })
        .collect();
    if slug.is_empty() {
        "default".to_string()
    } else {
        slug
    }
}

// ============================================================================
// In memory
// ============================================================================

/// Process-local store; nothing survives a restart.
#[derive(Default)]
pub struct MemoryStore {
    token: Mutex<Option<String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_token(token: impl Into<String>) -> Self {
        Self {
            token: Mutex::new(Some(token.into())),
        }
    }
}

impl CredentialStore for MemoryStore {
    fn put(&self, token: &str) -> Result<()> {
        *self.token.lock().unwrap_or_else(PoisonError::into_inner) = Some(token.to_string());
        Ok(())
    }

    fn get(&self) -> Option<String> {
        self.token
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn clear(&self) -> Result<()> {
        *self.token.lock().unwrap_or_else(PoisonError::into_inner) = None;
        Ok(())
    }
}
