//! In-memory storage backend
//!
//! Default storage implementation using an in-memory hashmap.
//! Suitable for development and single-instance deployments.
//! Subscriptions and keysets are lost on restart.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use subscriber_core::{Keyset, Subscription, SubscriptionStatus};
use tracing::debug;

use super::{KeysetStore, StorageError, SubscriptionStore};

type Key = (String, String);

/// In-memory subscription store implementation
#[derive(Debug, Default)]
pub struct MemoryStore {
    subscriptions: RwLock<HashMap<Key, Subscription>>,
    keysets: RwLock<HashMap<String, Keyset>>,
}

impl MemoryStore {
    /// Create a new in-memory store
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, HashMap<Key, Subscription>>, StorageError> {
        self.subscriptions
            .read()
            .map_err(|_| StorageError::Database("subscription lock poisoned".into()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, HashMap<Key, Subscription>>, StorageError> {
        self.subscriptions
            .write()
            .map_err(|_| StorageError::Database("subscription lock poisoned".into()))
    }
}

fn key(subscriber_id: &str, key_id: &str) -> Key {
    (subscriber_id.to_string(), key_id.to_string())
}

#[async_trait]
impl SubscriptionStore for MemoryStore {
    async fn get(&self, subscriber_id: &str, key_id: &str) -> Result<Subscription, StorageError> {
        self.read()?
            .get(&key(subscriber_id, key_id))
            .cloned()
            .ok_or_else(|| StorageError::NotFound {
                subscriber_id: subscriber_id.to_string(),
                key_id: key_id.to_string(),
            })
    }

    async fn create(&self, mut subscription: Subscription) -> Result<Subscription, StorageError> {
        let mut subscriptions = self.write()?;
        let key = key(&subscription.subscriber_id, &subscription.key_id);

        if subscriptions.contains_key(&key) {
            return Err(StorageError::AlreadyExists {
                subscriber_id: key.0,
                key_id: key.1,
            });
        }

        subscription.version = 1;
        debug!(
            subscriber_id = %subscription.subscriber_id,
            key_id = %subscription.key_id,
            "Stored new subscription"
        );
        subscriptions.insert(key, subscription.clone());
        Ok(subscription)
    }

    async fn put(
        &self,
        mut subscription: Subscription,
        expected_version: u64,
    ) -> Result<Subscription, StorageError> {
        let mut subscriptions = self.write()?;
        let key = key(&subscription.subscriber_id, &subscription.key_id);

        let stored = subscriptions
            .get_mut(&key)
            .ok_or_else(|| StorageError::not_found(&subscription))?;

        if stored.version != expected_version {
            return Err(StorageError::VersionConflict {
                expected: expected_version,
                actual: stored.version,
            });
        }

        subscription.version = expected_version + 1;
        *stored = subscription.clone();
        Ok(subscription)
    }

    async fn list_by_subscriber(
        &self,
        subscriber_id: &str,
    ) -> Result<Vec<Subscription>, StorageError> {
        let mut records: Vec<_> = self
            .read()?
            .values()
            .filter(|s| s.subscriber_id == subscriber_id)
            .cloned()
            .collect();
        records.sort_by(|a, b| a.key_id.cmp(&b.key_id));
        Ok(records)
    }

    async fn list_by_status(
        &self,
        status: SubscriptionStatus,
    ) -> Result<Vec<Subscription>, StorageError> {
        let mut records: Vec<_> = self
            .read()?
            .values()
            .filter(|s| s.status == status)
            .cloned()
            .collect();
        records.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(records)
    }
}

#[async_trait]
impl KeysetStore for MemoryStore {
    async fn get_keyset(&self, key_id: &str) -> Result<Option<Keyset>, StorageError> {
        let keysets = self
            .keysets
            .read()
            .map_err(|_| StorageError::Database("keyset lock poisoned".into()))?;
        Ok(keysets.get(key_id).cloned())
    }

    async fn insert_keyset(&self, key_id: &str, keyset: Keyset) -> Result<Keyset, StorageError> {
        let mut keysets = self
            .keysets
            .write()
            .map_err(|_| StorageError::Database("keyset lock poisoned".into()))?;
        Ok(keysets.entry(key_id.to_string()).or_insert(keyset).clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use subscriber_core::RegistrationPayload;

    fn subscription(key_id: &str) -> Subscription {
        Subscription::new(
            "acme.org",
            key_id,
            "BPP",
            RegistrationPayload::new("https://acme.org/beckn", "retail"),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_create_and_get() {
        let store = MemoryStore::new();
        let created = store.create(subscription("k1")).await.unwrap();
        assert_eq!(created.version, 1);

        let fetched = store.get("acme.org", "k1").await.unwrap();
        assert_eq!(fetched, created);
    }

    #[tokio::test]
    async fn test_create_twice_fails() {
        let store = MemoryStore::new();
        store.create(subscription("k1")).await.unwrap();

        let err = store.create(subscription("k1")).await.unwrap_err();
        assert!(matches!(err, StorageError::AlreadyExists { .. }));
    }

    #[tokio::test]
    async fn test_get_missing() {
        let store = MemoryStore::new();
        let err = store.get("acme.org", "k1").await.unwrap_err();
        assert!(matches!(err, StorageError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_put_is_compare_and_swap() {
        let store = MemoryStore::new();
        let created = store.create(subscription("k1")).await.unwrap();

        let mut next = created.clone();
        next.set_status(SubscriptionStatus::UnderSubscription);
        let stored = store.put(next.clone(), created.version).await.unwrap();
        assert_eq!(stored.version, 2);

        // Stale writer loses
        let err = store.put(next, created.version).await.unwrap_err();
        assert_eq!(
            err,
            StorageError::VersionConflict {
                expected: 1,
                actual: 2
            }
        );
        assert_eq!(store.get("acme.org", "k1").await.unwrap().version, 2);
    }

    #[tokio::test]
    async fn test_put_missing_record() {
        let store = MemoryStore::new();
        let err = store.put(subscription("k1"), 0).await.unwrap_err();
        assert!(matches!(err, StorageError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_listing() {
        let store = MemoryStore::new();
        store.create(subscription("k2")).await.unwrap();
        let k1 = store.create(subscription("k1")).await.unwrap();

        let mut moved = k1.clone();
        moved.set_status(SubscriptionStatus::UnderSubscription);
        store.put(moved, k1.version).await.unwrap();

        let all = store.list_by_subscriber("acme.org").await.unwrap();
        assert_eq!(all.iter().map(|s| s.key_id.as_str()).collect::<Vec<_>>(), ["k1", "k2"]);
        assert!(store.list_by_subscriber("other.org").await.unwrap().is_empty());

        let initiated = store.list_by_status(SubscriptionStatus::Initiated).await.unwrap();
        assert_eq!(initiated.len(), 1);
        assert_eq!(initiated[0].key_id, "k2");

        let counts = store.status_counts().await.unwrap();
        assert_eq!(counts["INITIATED"], 1);
        assert_eq!(counts["UNDER_SUBSCRIPTION"], 1);
        assert_eq!(counts["SUBSCRIBED"], 0);
    }

    #[tokio::test]
    async fn test_first_keyset_wins() {
        let store = MemoryStore::new();
        assert!(store.get_keyset("k1").await.unwrap().is_none());

        let first = Keyset::generate();
        let stored = store.insert_keyset("k1", first.clone()).await.unwrap();
        assert_eq!(stored.public_keys(), first.public_keys());

        let kept = store.insert_keyset("k1", Keyset::generate()).await.unwrap();
        assert_eq!(kept.public_keys(), first.public_keys());
        assert_eq!(
            store.get_keyset("k1").await.unwrap().unwrap().public_keys(),
            first.public_keys()
        );
    }
}
