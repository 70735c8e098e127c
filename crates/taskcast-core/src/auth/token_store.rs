//! Durable storage for the single bearer token.
//!
//! Exactly one opaque string is persisted, under a fixed key. No expiry
//! metadata is kept client-side: an expired token is only discovered when a
//! request carrying it is rejected.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Mutex;

use keyring::Entry;
use thiserror::Error;
use tracing::debug;

/// Key the token is stored under (file name, or keyring account name).
pub const TOKEN_KEY: &str = "token";

/// Keyring service name.
const SERVICE_NAME: &str = "taskcast";

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Token file error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Keychain error: {0}")]
    Keyring(#[from] keyring::Error),
}

/// Key-value storage for the bearer token.
///
/// Implementations must be cheap and synchronous: the gateway reads the token
/// once per outgoing request.
pub trait TokenStore: Send + Sync {
    /// Read the stored token. A missing entry is `Ok(None)`, not an error.
    fn load(&self) -> Result<Option<String>, StoreError>;

    /// Replace the stored token.
    fn save(&self, token: &str) -> Result<(), StoreError>;

    /// Remove the stored token. Clearing an empty store succeeds.
    fn clear(&self) -> Result<(), StoreError>;
}

/// Restrict a newly created token file to its owner.
#[cfg(unix)]
fn owner_only(options: &mut OpenOptions) -> &mut OpenOptions {
    use std::os::unix::fs::OpenOptionsExt;
    options.mode(0o600)
}

#[cfg(not(unix))]
fn owner_only(options: &mut OpenOptions) -> &mut OpenOptions {
    options
}

/// Token kept in a plain file named `token` inside the given directory.
pub struct FileTokenStore {
    dir: PathBuf,
}

impl FileTokenStore {
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    fn token_path(&self) -> PathBuf {
        self.dir.join(TOKEN_KEY)
    }
}

impl TokenStore for FileTokenStore {
    fn load(&self) -> Result<Option<String>, StoreError> {
        let path = self.token_path();
        if !path.exists() {
            return Ok(None);
        }
        let contents = std::fs::read_to_string(&path)?;
        let token = contents.trim();
        if token.is_empty() {
            Ok(None)
        } else {
            Ok(Some(token.to_string()))
        }
    }

    fn save(&self, token: &str) -> Result<(), StoreError> {
        std::fs::create_dir_all(&self.dir)?;
        let path = self.token_path();
        let mut file = owner_only(OpenOptions::new().write(true).create(true).truncate(true))
            .open(&path)?;
        file.write_all(token.as_bytes())?;
        debug!(path = ?path, "Token written");
        Ok(())
    }

    fn clear(&self) -> Result<(), StoreError> {
        let path = self.token_path();
        if path.exists() {
            std::fs::remove_file(path)?;
            debug!("Token file removed");
        }
        Ok(())
    }
}

/// Token kept in the OS keychain (Keychain on macOS, Credential Manager on
/// Windows, the kernel keyutils session keyring on Linux).
///
/// One entry is opened up front and reused for every call.
pub struct KeyringTokenStore {
    entry: Entry,
}

impl KeyringTokenStore {
    pub fn new() -> Result<Self, StoreError> {
        let entry = Entry::new(SERVICE_NAME, TOKEN_KEY)?;
        Ok(Self { entry })
    }
}

impl TokenStore for KeyringTokenStore {
    fn load(&self) -> Result<Option<String>, StoreError> {
        match self.entry.get_password() {
            Ok(token) => Ok(Some(token)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn save(&self, token: &str) -> Result<(), StoreError> {
        self.entry.set_password(token)?;
        Ok(())
    }

    fn clear(&self) -> Result<(), StoreError> {
        match self.entry.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Process-local store. Nothing survives a restart.
#[derive(Default)]
pub struct MemoryTokenStore {
    token: Mutex<Option<String>>,
}

impl MemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start with a token already "persisted", as after a previous run.
    pub fn with_token(token: impl Into<String>) -> Self {
        Self {
            token: Mutex::new(Some(token.into())),
        }
    }

    fn slot(&self) -> std::sync::MutexGuard<'_, Option<String>> {
        // A poisoned lock still holds a valid Option<String>
        self.token.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl TokenStore for MemoryTokenStore {
    fn load(&self) -> Result<Option<String>, StoreError> {
        Ok(self.slot().clone())
    }

    fn save(&self, token: &str) -> Result<(), StoreError> {
        *self.slot() = Some(token.to_string());
        Ok(())
    }

    fn clear(&self) -> Result<(), StoreError> {
        *self.slot() = None;
        Ok(())
    }
}
