//! Challenge Resolver
//!
//! Answers the encrypted challenge the registry sends with `OnSubscribe`.
//! Resolution is stateless: the same blob always yields the same answer,
//! so concurrent or repeated callbacks can be answered independently.

use std::sync::Arc;
use tracing::{debug, warn};

use crate::crypto::KeyProvider;
use crate::error::{Result, SubscriptionError};

/// Decrypts registry challenges with the subscriber's keys
#[derive(Debug, Clone)]
pub struct ChallengeResolver {
    keys: Arc<dyn KeyProvider>,
    /// Registry's X25519 public key, base64
    registry_public_key: String,
}

impl ChallengeResolver {
    pub fn new(keys: Arc<dyn KeyProvider>, registry_public_key: impl Into<String>) -> Self {
        Self {
            keys,
            registry_public_key: registry_public_key.into(),
        }
    }

    /// Decrypt `encrypted_challenge` for `key_id` and return the plaintext answer
    ///
    /// Every failure is reported as [`SubscriptionError::Decryption`] so the
    /// registry learns the callback was not answered and can retry it.
    pub async fn resolve(&self, encrypted_challenge: &str, key_id: &str) -> Result<String> {
        if encrypted_challenge.trim().is_empty() {
            return Err(SubscriptionError::Validation("challenge cannot be empty".into()));
        }

        let answer = self
            .keys
            .decrypt(key_id, encrypted_challenge, &self.registry_public_key)
            .await
            .map_err(|e| {
                warn!(key_id = %key_id, error = %e, "Failed to resolve registry challenge");
                match e {
                    SubscriptionError::Decryption(msg) => SubscriptionError::Decryption(msg),
                    other => SubscriptionError::Decryption(other.to_string()),
                }
            })?;

        if answer.is_empty() {
            return Err(SubscriptionError::Decryption("challenge decrypted to empty answer".into()));
        }

        debug!(key_id = %key_id, "Resolved registry challenge");
        Ok(answer)
    }
}
