//! Request signatures for authenticated registry calls
//!
//! Header layout:
//!
//! ```text
//! Signature keyId="{subscriber_id}|{key_id}|ed25519",algorithm="ed25519",
//!   created="{t}",expires="{t+300}",headers="(created) (expires) digest",
//!   signature="{base64 ed25519}"
//! ```
//!
//! The signed string is `(created): {t}\n(expires): {t+300}\ndigest: SHA-256={b64}`.

use base64::{engine::general_purpose::STANDARD, Engine};
use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use std::collections::HashMap;

use crate::crypto::{verify_signature, KeyProvider};
use crate::error::{Result, SubscriptionError};

/// Lifetime of a request signature
pub const SIGNATURE_VALIDITY_SECS: i64 = 300;

const ALGORITHM: &str = "ed25519";
const SIGNED_HEADERS: &str = "(created) (expires) digest";

/// `SHA-256=` digest of a request body
pub fn body_digest(body: &[u8]) -> String {
    format!("SHA-256={}", STANDARD.encode(Sha256::digest(body)))
}

fn signing_string(created: i64, expires: i64, body: &[u8]) -> String {
    format!(
        "(created): {}\n(expires): {}\ndigest: {}",
        created,
        expires,
        body_digest(body)
    )
}

/// Build the `Authorization` header for `body`, signed through `keys`
pub async fn authorization_header(
    keys: &dyn KeyProvider,
    subscriber_id: &str,
    key_id: &str,
    body: &[u8],
    now: DateTime<Utc>,
) -> Result<String> {
    let created = now.timestamp();
    let expires = created + SIGNATURE_VALIDITY_SECS;
    let signature = keys
        .sign(key_id, signing_string(created, expires, body).as_bytes())
        .await?;

    Ok(format!(
        "Signature keyId=\"{}|{}|{}\",algorithm=\"{}\",created=\"{}\",expires=\"{}\",headers=\"{}\",signature=\"{}\"",
        subscriber_id,
        key_id,
        ALGORITHM,
        ALGORITHM,
        created,
        expires,
        SIGNED_HEADERS,
        STANDARD.encode(signature)
    ))
}

/// Parsed `Authorization` signature header
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureParams {
    pub subscriber_id: String,
    pub key_id: String,
    pub created: i64,
    pub expires: i64,
    pub signature: Vec<u8>,
}

impl SignatureParams {
    /// Parse a header produced by [`authorization_header`]
    pub fn parse(header: &str) -> Result<Self> {
        let invalid = |msg: &str| SubscriptionError::Validation(format!("invalid signature header: {}", msg));

        let params = header
            .strip_prefix("Signature ")
            .ok_or_else(|| invalid("missing Signature scheme"))?;

        let fields: HashMap<&str, &str> = params
            .split(',')
            .filter_map(|part| {
                let (name, value) = part.trim().split_once('=')?;
                Some((name, value.trim_matches('"')))
            })
            .collect();

        let field = |name: &str| fields.get(name).copied().ok_or_else(|| invalid(name));

        let mut key_parts = field("keyId")?.split('|');
        let (subscriber_id, key_id, algorithm) =
            match (key_parts.next(), key_parts.next(), key_parts.next(), key_parts.next()) {
                (Some(s), Some(k), Some(a), None) => (s, k, a),
                _ => return Err(invalid("keyId")),
            };
        if algorithm != ALGORITHM || field("algorithm")? != ALGORITHM {
            return Err(invalid("algorithm"));
        }

        let created = field("created")?.parse().map_err(|_| invalid("created"))?;
        let expires = field("expires")?.parse().map_err(|_| invalid("expires"))?;
        let signature = STANDARD
            .decode(field("signature")?)
            .map_err(|_| invalid("signature"))?;

        Ok(Self {
            subscriber_id: subscriber_id.to_string(),
            key_id: key_id.to_string(),
            created,
            expires,
            signature,
        })
    }

    /// Check the signature over `body` and the validity window at `now`
    pub fn verify(&self, body: &[u8], signing_public_key: &str, now: DateTime<Utc>) -> Result<bool> {
        let now = now.timestamp();
        if now < self.created || now > self.expires {
            return Ok(false);
        }
        verify_signature(
            signing_string(self.created, self.expires, body).as_bytes(),
            &self.signature,
            signing_public_key,
        )
    }
}
