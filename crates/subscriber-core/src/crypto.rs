//! Key material and challenge cryptography
//!
//! The registry encrypts `OnSubscribe` challenges for the subscriber's
//! X25519 encryption key. Both sides derive the same AES-256-GCM key:
//!
//! 1. X25519 ECDH between own secret and the peer's public key
//! 2. HKDF-SHA256, no salt, info [`HKDF_INFO`], 32 output bytes
//! 3. AES-256-GCM, wire blob = base64(nonce[12] || ciphertext || tag)
//!
//! Signing keys are Ed25519 and only leave a [`Keyset`] as signatures.

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Nonce};
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine};
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use hkdf::Hkdf;
use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::fmt::Debug;
use x25519_dalek::{PublicKey as X25519PublicKey, StaticSecret};

use crate::error::{Result, SubscriptionError};

/// HKDF info string shared with the registry
pub const HKDF_INFO: &[u8] = b"beckn-onix-encryption";

/// AES-GCM nonce length prefixed to every ciphertext
pub const NONCE_LEN: usize = 12;

/// Base64-encoded public halves of a keyset, as advertised to the registry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicKeys {
    /// Ed25519 verifying key
    pub signing_public_key: String,
    /// X25519 public key
    pub encr_public_key: String,
}

/// Signing and encryption keys held for one key ID
#[derive(Clone)]
pub struct Keyset {
    signing_key: SigningKey,
    encryption_secret: StaticSecret,
}

impl Debug for Keyset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Keyset")
            .field("public_keys", &self.public_keys())
            .finish_non_exhaustive()
    }
}

impl Keyset {
    /// Generate a new random keyset
    pub fn generate() -> Self {
        Self {
            signing_key: SigningKey::generate(&mut OsRng),
            encryption_secret: StaticSecret::random_from_rng(OsRng),
        }
    }

    /// Rebuild a keyset from raw secret bytes
    pub fn from_bytes(signing: &[u8; 32], encryption: &[u8; 32]) -> Self {
        Self {
            signing_key: SigningKey::from_bytes(signing),
            encryption_secret: StaticSecret::from(*encryption),
        }
    }

    /// Raw secret bytes `(signing, encryption)`, the inverse of [`Keyset::from_bytes`]
    pub fn secret_bytes(&self) -> ([u8; 32], [u8; 32]) {
        (self.signing_key.to_bytes(), self.encryption_secret.to_bytes())
    }

    pub fn public_keys(&self) -> PublicKeys {
        PublicKeys {
            signing_public_key: STANDARD.encode(self.signing_key.verifying_key().to_bytes()),
            encr_public_key: STANDARD.encode(X25519PublicKey::from(&self.encryption_secret).to_bytes()),
        }
    }

    /// Ed25519 signature over `message`
    pub fn sign(&self, message: &[u8]) -> Vec<u8> {
        self.signing_key.sign(message).to_bytes().to_vec()
    }

    /// Encrypt `plaintext` for the holder of `peer_public_key`
    pub fn seal(&self, plaintext: &str, peer_public_key: &str) -> Result<String> {
        let cipher = shared_cipher(&self.encryption_secret, peer_public_key)?;

        let mut nonce_bytes = [0u8; NONCE_LEN];
        OsRng.fill_bytes(&mut nonce_bytes);

        let ciphertext = cipher
            .encrypt(Nonce::from_slice(&nonce_bytes), plaintext.as_bytes())
            .map_err(|e| SubscriptionError::Crypto(format!("encryption failed: {}", e)))?;

        let mut blob = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        blob.extend_from_slice(&nonce_bytes);
        blob.extend_from_slice(&ciphertext);
        Ok(STANDARD.encode(blob))
    }

    /// Decrypt a blob produced by the holder of `peer_public_key`
    pub fn open(&self, sealed: &str, peer_public_key: &str) -> Result<String> {
        let blob = STANDARD
            .decode(sealed.trim())
            .map_err(|e| SubscriptionError::Decryption(format!("invalid base64: {}", e)))?;
        if blob.len() <= NONCE_LEN {
            return Err(SubscriptionError::Decryption("ciphertext too short".into()));
        }

        let cipher = shared_cipher(&self.encryption_secret, peer_public_key)?;
        let (nonce, ciphertext) = blob.split_at(NONCE_LEN);

        let plaintext = cipher
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map_err(|_| SubscriptionError::Decryption("authentication failed".into()))?;

        String::from_utf8(plaintext)
            .map_err(|_| SubscriptionError::Decryption("plaintext is not UTF-8".into()))
    }
}

fn shared_cipher(secret: &StaticSecret, peer_public_key: &str) -> Result<Aes256Gcm> {
    let peer = X25519PublicKey::from(decode_key(peer_public_key)?);
    let shared = secret.diffie_hellman(&peer);

    let mut key = [0u8; 32];
    Hkdf::<Sha256>::new(None, shared.as_bytes())
        .expand(HKDF_INFO, &mut key)
        .map_err(|e| SubscriptionError::Crypto(format!("key derivation failed: {}", e)))?;

    Aes256Gcm::new_from_slice(&key)
        .map_err(|e| SubscriptionError::Crypto(format!("cipher init failed: {}", e)))
}

/// Decode a base64 32-byte public key
pub fn decode_key(encoded: &str) -> Result<[u8; 32]> {
    let bytes = STANDARD
        .decode(encoded.trim())
        .map_err(|e| SubscriptionError::Crypto(format!("invalid key encoding: {}", e)))?;
    bytes.try_into().map_err(|bytes: Vec<u8>| {
        SubscriptionError::Crypto(format!("invalid key length: expected 32, got {}", bytes.len()))
    })
}

/// Verify an Ed25519 signature against a base64 verifying key
pub fn verify_signature(message: &[u8], signature: &[u8], public_key: &str) -> Result<bool> {
    let verifying_key = VerifyingKey::from_bytes(&decode_key(public_key)?)?;
    let signature = match Signature::from_slice(signature) {
        Ok(signature) => signature,
        Err(_) => return Ok(false),
    };
    Ok(verifying_key.verify(message, &signature).is_ok())
}

/// Holder of the subscriber's private keys
///
/// Implementations must be thread-safe; the state machine calls them from
/// concurrent request handlers.
#[async_trait]
pub trait KeyProvider: Send + Sync + Debug {
    /// Return the keyset for `key_id`, creating it if none exists
    async fn ensure_keyset(&self, key_id: &str) -> Result<PublicKeys>;

    /// Public keys for `key_id`
    async fn public_keys(&self, key_id: &str) -> Result<PublicKeys>;

    /// Sign `message` with the Ed25519 key of `key_id`
    async fn sign(&self, key_id: &str, message: &[u8]) -> Result<Vec<u8>>;

    /// Verify a signature made by the holder of `public_key`
    async fn verify(&self, message: &[u8], signature: &[u8], public_key: &str) -> Result<bool> {
        verify_signature(message, signature, public_key)
    }

    /// Decrypt a blob sealed for `key_id` by the holder of `peer_public_key`
    async fn decrypt(&self, key_id: &str, sealed: &str, peer_public_key: &str) -> Result<String>;
}
