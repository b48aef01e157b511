//! Error types for the subscription handshake

use thiserror::Error;

use crate::status::{Event, SubscriptionStatus};

/// Result type alias using SubscriptionError
pub type Result<T> = std::result::Result<T, SubscriptionError>;

/// Errors that can occur while driving a subscription through the handshake
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SubscriptionError {
    /// Malformed input; never retried
    #[error("Validation error: {0}")]
    Validation(String),

    /// Event not permitted from the record's current status
    #[error("Protocol violation: {event} not permitted from {from}")]
    ProtocolViolation {
        from: SubscriptionStatus,
        event: Event,
    },

    /// Re-registration with a payload that differs from the stored one
    #[error("Conflicting registration for {subscriber_id}/{key_id}")]
    Conflict {
        subscriber_id: String,
        key_id: String,
    },

    /// Unknown (subscriber_id, key_id) pair
    #[error("Subscription not found: {subscriber_id}/{key_id}")]
    NotFound {
        subscriber_id: String,
        key_id: String,
    },

    /// Challenge could not be resolved
    #[error("Challenge decryption failed: {0}")]
    Decryption(String),

    /// Registry unreachable during an outbound call
    #[error("Registry unavailable: {0}")]
    UpstreamUnavailable(String),

    /// Compare-and-swap lost against a concurrent writer
    #[error("Version conflict: expected {expected}, found {actual}")]
    VersionConflict { expected: u64, actual: u64 },

    /// No keyset held for the given key ID
    #[error("Unknown key: {0}")]
    KeyNotFound(String),

    /// Signing or key material failure
    #[error("Cryptographic error: {0}")]
    Crypto(String),

    /// Backing store failure
    #[error("Storage error: {0}")]
    Storage(String),
}

impl SubscriptionError {
    /// Build a `NotFound` for the given pair
    pub fn not_found(subscriber_id: impl Into<String>, key_id: impl Into<String>) -> Self {
        SubscriptionError::NotFound {
            subscriber_id: subscriber_id.into(),
            key_id: key_id.into(),
        }
    }
}

impl From<serde_json::Error> for SubscriptionError {
    fn from(err: serde_json::Error) -> Self {
        SubscriptionError::Validation(err.to_string())
    }
}

impl From<ed25519_dalek::SignatureError> for SubscriptionError {
    fn from(err: ed25519_dalek::SignatureError) -> Self {
        SubscriptionError::Crypto(err.to_string())
    }
}
