//! Storage abstraction for subscriptions
//!
//! This module provides a trait-based abstraction for subscription storage,
//! enabling both in-memory (default) and persistent (PostgreSQL) backends.
//!
//! Every write is a compare-and-swap on `version`: `put` only succeeds if the
//! stored record still carries the version the caller read, and stores
//! `expected_version + 1`. The store is the only shared mutable state, so
//! concurrent handlers serialize on it rather than on a process-wide lock.
//!
//! Keysets live next to the subscriptions they were advertised for, so a
//! restarted process can still answer challenges for existing records.

pub mod memory;
#[cfg(feature = "postgres")]
pub mod postgres;

pub use memory::MemoryStore;
#[cfg(feature = "postgres")]
pub use postgres::PostgresStore;

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::fmt::Debug;
use subscriber_core::{Keyset, Subscription, SubscriptionError, SubscriptionStatus};

/// Error type for storage operations
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StorageError {
    #[error("Subscription not found: {subscriber_id}/{key_id}")]
    NotFound {
        subscriber_id: String,
        key_id: String,
    },

    #[error("Subscription already exists: {subscriber_id}/{key_id}")]
    AlreadyExists {
        subscriber_id: String,
        key_id: String,
    },

    #[error("Version conflict: expected {expected}, found {actual}")]
    VersionConflict { expected: u64, actual: u64 },

    #[error("Database error: {0}")]
    Database(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Connection error: {0}")]
    Connection(String),
}

impl StorageError {
    pub(crate) fn not_found(subscription: &Subscription) -> Self {
        StorageError::NotFound {
            subscriber_id: subscription.subscriber_id.clone(),
            key_id: subscription.key_id.clone(),
        }
    }
}

impl From<StorageError> for SubscriptionError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::NotFound {
                subscriber_id,
                key_id,
            } => SubscriptionError::NotFound {
                subscriber_id,
                key_id,
            },
            StorageError::AlreadyExists {
                subscriber_id,
                key_id,
            } => SubscriptionError::Conflict {
                subscriber_id,
                key_id,
            },
            StorageError::VersionConflict { expected, actual } => {
                SubscriptionError::VersionConflict { expected, actual }
            }
            other => SubscriptionError::Storage(other.to_string()),
        }
    }
}

/// Storage backend trait for subscriptions
///
/// Implementations must be thread-safe and support concurrent access.
/// Records are never deleted.
#[async_trait]
pub trait SubscriptionStore: Send + Sync + Debug {
    /// Get the record for a (subscriber_id, key_id) pair
    async fn get(&self, subscriber_id: &str, key_id: &str) -> Result<Subscription, StorageError>;

    /// Insert a new record at version 1
    ///
    /// Fails with `AlreadyExists` if the pair is taken; the stored record is
    /// left untouched.
    async fn create(&self, subscription: Subscription) -> Result<Subscription, StorageError>;

    /// Replace a record if its stored version is still `expected_version`
    ///
    /// Returns the record as stored, at `expected_version + 1`.
    async fn put(
        &self,
        subscription: Subscription,
        expected_version: u64,
    ) -> Result<Subscription, StorageError>;

    /// All records of one subscriber, across key IDs
    async fn list_by_subscriber(&self, subscriber_id: &str)
        -> Result<Vec<Subscription>, StorageError>;

    /// All records currently in `status`
    async fn list_by_status(
        &self,
        status: SubscriptionStatus,
    ) -> Result<Vec<Subscription>, StorageError>;

    /// Number of records per status; doubles as a reachability probe
    async fn status_counts(&self) -> Result<BTreeMap<String, usize>, StorageError> {
        let mut counts = BTreeMap::new();
        for status in SubscriptionStatus::ALL {
            let records = self.list_by_status(status).await?;
            counts.insert(status.to_string(), records.len());
        }
        Ok(counts)
    }
}

/// Durable keysets, one per key ID
#[async_trait]
pub trait KeysetStore: Send + Sync + Debug {
    /// Keyset stored for `key_id`, if any
    async fn get_keyset(&self, key_id: &str) -> Result<Option<Keyset>, StorageError>;

    /// Store `keyset` for `key_id` unless one already exists
    ///
    /// Returns the keyset that is stored afterwards; an existing one wins.
    async fn insert_keyset(&self, key_id: &str, keyset: Keyset) -> Result<Keyset, StorageError>;
}
