//! Secret storage and resolution for the assistant API key.
//!
//! The key is never part of the configuration in clear text by default.
//! Configuration holds a [`SecretRef`] that points at where the key lives:
//! - `"keychain:<account>"`: OS credential store via `keyring`
//! - `"env:<VAR>"`: an environment variable
//! - any other non-empty string: inline plaintext (discouraged, logs a warning)

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Mutex;

/// Keyring service name all rfscope credentials live under.
pub const KEYRING_SERVICE: &str = "rfscope";

/// Errors from credential storage operations.
#[derive(Debug, thiserror::Error)]
pub enum CredentialError {
    #[error("Credential not found for {service}:{account}")]
    NotFound { service: String, account: String },

    #[error("Failed to store credential: {message}")]
    StoreFailed { message: String },

    #[error("Failed to delete credential: {message}")]
    DeleteFailed { message: String },

    #[error("Keyring backend not available: {message}")]
    BackendUnavailable { message: String },
}

/// Storage backend for named secrets.
pub trait CredentialStore: Send + Sync {
    fn store_key(&self, account: &str, secret: &str) -> Result<(), CredentialError>;

    fn get_key(&self, account: &str) -> Result<String, CredentialError>;

    fn delete_key(&self, account: &str) -> Result<(), CredentialError>;

    fn has_key(&self, account: &str) -> bool {
        self.get_key(account).is_ok()
    }
}

/// OS-native credential store (macOS Keychain, Windows Credential Manager,
/// Linux Secret Service).
#[derive(Debug, Clone)]
pub struct KeyringCredentialStore {
    service: String,
}

impl KeyringCredentialStore {
    pub fn new() -> Self {
        Self {
            service: KEYRING_SERVICE.to_string(),
        }
    }

    fn entry(&self, account: &str) -> Result<keyring::Entry, CredentialError> {
        keyring::Entry::new(&self.service, account).map_err(|e| {
            CredentialError::BackendUnavailable {
                message: e.to_string(),
            }
        })
    }
}

impl Default for KeyringCredentialStore {
    fn default() -> Self {
        Self::new()
    }
}

impl CredentialStore for KeyringCredentialStore {
    fn store_key(&self, account: &str, secret: &str) -> Result<(), CredentialError> {
        self.entry(account)?
            .set_password(secret)
            .map_err(|e| CredentialError::StoreFailed {
                message: e.to_string(),
            })
    }

    fn get_key(&self, account: &str) -> Result<String, CredentialError> {
        self.entry(account)?.get_password().map_err(|e| match e {
            keyring::Error::NoEntry => CredentialError::NotFound {
                service: self.service.clone(),
                account: account.to_string(),
            },
            other => CredentialError::StoreFailed {
                message: other.to_string(),
            },
        })
    }

    fn delete_key(&self, account: &str) -> Result<(), CredentialError> {
        self.entry(account)?
            .delete_credential()
            .map_err(|e| CredentialError::DeleteFailed {
                message: e.to_string(),
            })
    }
}

/// Process-local store, used by tests and when no keyring is available.
#[derive(Debug, Default)]
pub struct InMemoryCredentialStore {
    store: Mutex<HashMap<String, String>>,
}

impl InMemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, String>> {
        self.store.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl CredentialStore for InMemoryCredentialStore {
    fn store_key(&self, account: &str, secret: &str) -> Result<(), CredentialError> {
        self.lock().insert(account.to_string(), secret.to_string());
        Ok(())
    }

    fn get_key(&self, account: &str) -> Result<String, CredentialError> {
        self.lock()
            .get(account)
            .cloned()
            .ok_or_else(|| CredentialError::NotFound {
                service: KEYRING_SERVICE.to_string(),
                account: account.to_string(),
            })
    }

    fn delete_key(&self, account: &str) -> Result<(), CredentialError> {
        self.lock().remove(account);
        Ok(())
    }
}

/// A pointer to a secret, resolved at runtime.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SecretRef(String);

impl SecretRef {
    pub fn keychain(account: &str) -> Self {
        Self(format!("keychain:{account}"))
    }

    pub fn env(var_name: &str) -> Self {
        Self(format!("env:{var_name}"))
    }

    pub fn inline(value: &str) -> Self {
        Self(value.to_string())
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether the reference holds the secret itself rather than pointing at it.
    pub fn is_inline(&self) -> bool {
        !self.0.is_empty() && !self.0.starts_with("keychain:") && !self.0.starts_with("env:")
    }

    /// Resolve the reference against `store` and the process environment.
    pub fn resolve(&self, store: &dyn CredentialStore) -> Result<String, SecretResolveError> {
        if self.0.is_empty() {
            return Err(SecretResolveError::Empty);
        }

        if let Some(account) = self.0.strip_prefix("keychain:") {
            store
                .get_key(account)
                .map_err(|source| SecretResolveError::Keychain {
                    account: account.to_string(),
                    source,
                })
        } else if let Some(var) = self.0.strip_prefix("env:") {
            match std::env::var(var) {
                Ok(value) if !value.is_empty() => Ok(value),
                _ => Err(SecretResolveError::EnvVarMissing {
                    var: var.to_string(),
                }),
            }
        } else {
            tracing::warn!(
                "Inline plaintext API key in configuration. Prefer `rfscope auth set` or an env: reference"
            );
            Ok(self.0.clone())
        }
    }
}

impl From<&str> for SecretRef {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Errors from secret resolution.
#[derive(Debug, thiserror::Error)]
pub enum SecretResolveError {
    #[error("Secret reference is empty")]
    Empty,

    #[error("Keychain lookup failed for '{account}': {source}")]
    Keychain {
        account: String,
        source: CredentialError,
    },

    #[error("Environment variable '{var}' not set")]
    EnvVarMissing { var: String },
}
