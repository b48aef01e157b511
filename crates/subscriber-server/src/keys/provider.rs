//! Store-backed Key Provider
//!
//! Keysets are persisted through a [`KeysetStore`] and cached in memory.
//! Only [`KeyProvider::ensure_keyset`] generates keys; every other operation
//! fails with `KeyNotFound` when no keyset was ever stored for the key ID.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use subscriber_core::{KeyProvider, Keyset, PublicKeys, Result, SubscriptionError};
use tracing::info;

use crate::storage::KeysetStore;

/// Key provider over a durable keyset store
#[derive(Debug)]
pub struct StoredKeyProvider {
    store: Arc<dyn KeysetStore>,
    cache: RwLock<HashMap<String, Keyset>>,
}

fn poisoned<T>(_: T) -> SubscriptionError {
    SubscriptionError::Crypto("keyset lock poisoned".into())
}

impl StoredKeyProvider {
    pub fn new(store: Arc<dyn KeysetStore>) -> Self {
        Self {
            store,
            cache: RwLock::new(HashMap::new()),
        }
    }

    fn cached(&self, key_id: &str) -> Result<Option<Keyset>> {
        Ok(self.cache.read().map_err(poisoned)?.get(key_id).cloned())
    }

    fn remember(&self, key_id: &str, keyset: Keyset) -> Result<Keyset> {
        self.cache
            .write()
            .map_err(poisoned)?
            .insert(key_id.to_string(), keyset.clone());
        Ok(keyset)
    }

    async fn keyset(&self, key_id: &str) -> Result<Keyset> {
        if let Some(keyset) = self.cached(key_id)? {
            return Ok(keyset);
        }
        match self.store.get_keyset(key_id).await? {
            Some(keyset) => self.remember(key_id, keyset),
            None => Err(SubscriptionError::KeyNotFound(key_id.to_string())),
        }
    }
}

#[async_trait]
impl KeyProvider for StoredKeyProvider {
    async fn ensure_keyset(&self, key_id: &str) -> Result<PublicKeys> {
        match self.keyset(key_id).await {
            Ok(keyset) => return Ok(keyset.public_keys()),
            Err(SubscriptionError::KeyNotFound(_)) => {}
            Err(e) => return Err(e),
        }

        let stored = self.store.insert_keyset(key_id, Keyset::generate()).await?;
        info!(key_id = %key_id, "Generated keyset");
        Ok(self.remember(key_id, stored)?.public_keys())
    }

    async fn public_keys(&self, key_id: &str) -> Result<PublicKeys> {
        Ok(self.keyset(key_id).await?.public_keys())
    }

    async fn sign(&self, key_id: &str, message: &[u8]) -> Result<Vec<u8>> {
        Ok(self.keyset(key_id).await?.sign(message))
    }

    async fn decrypt(&self, key_id: &str, sealed: &str, peer_public_key: &str) -> Result<String> {
        self.keyset(key_id).await?.open(sealed, peer_public_key)
    }
}
