//! Bearer-token storage.
//!
//! The production store keeps the token in the platform credential store
//! (Secret Service / keyutils on Linux, Keychain on macOS, Credential
//! Manager on Windows). `MemoryTokenStore` backs tests.

use std::sync::Mutex;

use thiserror::Error;

/// Service name under which the token is filed.
pub const DEFAULT_SERVICE: &str = "promptsync";

/// Account name for the remote API token.
pub const DEFAULT_ACCOUNT: &str = "gitlab-token";

#[derive(Debug, Error)]
pub enum TokenStoreError {
    #[error("credential store error: {0}")]
    Keyring(#[from] keyring::Error),
}

/// Secret store holding a single bearer token.
pub trait TokenStore: Send + Sync {
    /// The stored token, or `None` when absent or blank.
    fn load(&self) -> Result<Option<String>, TokenStoreError>;

    fn save(&self, token: &str) -> Result<(), TokenStoreError>;

    /// Removes the token. Clearing an absent token succeeds.
    fn clear(&self) -> Result<(), TokenStoreError>;
}

fn non_blank(token: String) -> Option<String> {
    if token.trim().is_empty() {
        None
    } else {
        Some(token)
    }
}

/// Token kept in the OS keyring.
pub struct KeyringTokenStore {
    service: String,
    account: String,
}

impl KeyringTokenStore {
    pub fn new(service: impl Into<String>, account: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            account: account.into(),
        }
    }

    fn entry(&self) -> Result<keyring::Entry, TokenStoreError> {
        Ok(keyring::Entry::new(&self.service, &self.account)?)
    }
}

impl Default for KeyringTokenStore {
    fn default() -> Self {
        Self::new(DEFAULT_SERVICE, DEFAULT_ACCOUNT)
    }
}

impl TokenStore for KeyringTokenStore {
    fn load(&self) -> Result<Option<String>, TokenStoreError> {
        match self.entry()?.get_password() {
            Ok(token) => Ok(non_blank(token)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn save(&self, token: &str) -> Result<(), TokenStoreError> {
        self.entry()?.set_password(token)?;
        tracing::debug!(service = %self.service, "stored API token");
        Ok(())
    }

    fn clear(&self) -> Result<(), TokenStoreError> {
        match self.entry()?.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Token kept in process memory.
#[derive(Default)]
pub struct MemoryTokenStore {
    token: Mutex<Option<String>>,
}

impl MemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_token(token: impl Into<String>) -> Self {
        Self {
            token: Mutex::new(Some(token.into())),
        }
    }

    fn slot(&self) -> std::sync::MutexGuard<'_, Option<String>> {
        self.token
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

impl TokenStore for MemoryTokenStore {
    fn load(&self) -> Result<Option<String>, TokenStoreError> {
        Ok(self.slot().clone().and_then(non_blank))
    }

    fn save(&self, token: &str) -> Result<(), TokenStoreError> {
        *self.slot() = Some(token.to_string());
        Ok(())
    }

    fn clear(&self) -> Result<(), TokenStoreError> {
        *self.slot() = None;
        Ok(())
    }
}
