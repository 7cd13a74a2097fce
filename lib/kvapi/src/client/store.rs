//! Pluggable persistence for tokens and PKCE round-trip values.
//!
//! The SDK treats persisted state as an external key-value collaborator: a
//! serialized token under [`TOKEN_KEY`], plus two write-once-read-once slots
//! used across the authorization redirect ([`CODE_VERIFIER_KEY`],
//! [`STATE_KEY`]). Embedders back this with whatever their platform offers
//! (browser local storage, a keychain, a file); [`MemoryStore`] is the
//! process-local default.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

/// Store key for the serialized current token.
pub const TOKEN_KEY: &str = "kvapi.token";
/// Store key for the PKCE code verifier, held across the redirect round trip.
pub const CODE_VERIFIER_KEY: &str = "kvapi.code_verifier";
/// Store key for the generated anti-CSRF state, held across the redirect round trip.
pub const STATE_KEY: &str = "kvapi.state";

/// Failure raised by a [`TokenStore`] implementation.
#[derive(Debug, derive_more::Error, derive_more::Display)]
#[display("token store failure: {message}")]
pub struct StoreError {
    /// Description of the store failure.
    pub message: String,
}

impl StoreError {
    /// Creates a store error from any displayable cause.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// External key-value persistence used by the client and the code flows.
pub trait TokenStore: Send + Sync {
    /// Reads the value stored under `key`, if any.
    fn load(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Writes `value` under `key`, replacing any previous value.
    fn save(&self, key: &str, value: &str) -> Result<(), StoreError>;

    /// Removes the value stored under `key`.
    fn clear(&self, key: &str) -> Result<(), StoreError>;

    /// Reads and removes the value stored under `key`.
    ///
    /// Used for the PKCE verifier and state slots, which must not survive
    /// past the redirect round trip they belong to.
    fn take(&self, key: &str) -> Result<Option<String>, StoreError> {
        let value = self.load(key)?;
        if value.is_some() {
            self.clear(key)?;
        }
        Ok(value)
    }
}

/// In-memory [`TokenStore`] used when the embedder supplies nothing.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RwLock<HashMap<String, String>>,
}

impl TokenStore for MemoryStore {
    fn load(&self, key: &str) -> Result<Option<String>, StoreError> {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        Ok(entries.get(key).cloned())
    }

    fn save(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        entries.insert(key.to_owned(), value.to_owned());
        Ok(())
    }

    fn clear(&self, key: &str) -> Result<(), StoreError> {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        entries.remove(key);
        Ok(())
    }
}
