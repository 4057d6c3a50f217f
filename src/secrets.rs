//! Opaque credential storage.
//!
//! The monitor only needs get/set on named secrets. Platform keychains plug in
//! behind [`SecretStore`]; the in-memory store backs tests and headless runs.

use std::collections::HashMap;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::RwLock;

/// Name under which the remote API key is stored.
pub const API_KEY_SECRET: &str = "api_key";

#[derive(Debug, Error)]
pub enum SecretStoreError {
    #[error("secret backend unavailable: {0}")]
    Unavailable(String),
    #[error("invalid secret name: {0}")]
    InvalidName(String),
}

#[async_trait]
pub trait SecretStore: Send + Sync {
    async fn get(&self, name: &str) -> Result<Option<String>, SecretStoreError>;

    async fn set(&self, name: &str, value: &str) -> Result<(), SecretStoreError>;
}

#[derive(Default)]
pub struct InMemorySecretStore {
    entries: RwLock<HashMap<String, String>>,
}

impl InMemorySecretStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_secret(name: &str, value: &str) -> Self {
        let mut entries = HashMap::new();
        entries.insert(name.to_string(), value.to_string());
        Self {
            entries: RwLock::new(entries),
        }
    }
}

#[async_trait]
impl SecretStore for InMemorySecretStore {
    async fn get(&self, name: &str) -> Result<Option<String>, SecretStoreError> {
        Ok(self.entries.read().await.get(name).cloned())
    }

    async fn set(&self, name: &str, value: &str) -> Result<(), SecretStoreError> {
        if name.trim().is_empty() {
            return Err(SecretStoreError::InvalidName(name.to_string()));
        }
        self.entries
            .write()
            .await
            .insert(name.to_string(), value.to_string());
        Ok(())
    }
}
