//! # Subscriber Core
//!
//! Data model and cryptography for a network participant registering with
//! a central registry.
//!
//! ## Key Concepts
//!
//! - **Subscription**: one registration attempt, keyed by (subscriber_id, key_id)
//! - **Status graph**: the only legal path a subscription's status can take
//! - **Challenge**: an encrypted nonce the registry sends to prove key ownership
//! - **Key Provider**: holder of the Ed25519 signing and X25519 encryption keys
//!
//! ## Handshake
//!
//! 1. Subscriber creates a record in `INITIATED` and calls the registry
//! 2. Registry answers with an `OnSubscribe` challenge; subscriber decrypts it
//! 3. Registry pushes the final status (`SUBSCRIBED` or `INVALID`)

pub mod auth;
pub mod challenge;
pub mod crypto;
pub mod error;
pub mod status;
pub mod types;

pub use auth::{authorization_header, SignatureParams};
pub use challenge::ChallengeResolver;
pub use crypto::{KeyProvider, Keyset, PublicKeys};
pub use error::{Result, SubscriptionError};
pub use status::{apply, Event, Outcome, SubscriptionStatus};
pub use types::{RegistrationPayload, Subscription, SubscriptionSummary};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Get the library version
pub fn version() -> &'static str {
    VERSION
}
