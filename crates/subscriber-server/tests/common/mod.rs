//! Shared test fixtures: an in-memory service wired to a mock registry

#![allow(dead_code)]

use axum::{
    body::Body,
    http::{header::CONTENT_TYPE, Method, Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use subscriber_core::{KeyProvider, Keyset, Subscription, SubscriptionStatus};
use subscriber_registry::{MockRegistryClient, RetryPolicy};
use subscriber_server::{
    create_router, AppState, MemoryStore, StoredKeyProvider, SubscriptionService,
};
use tower::ServiceExt;

pub const CALLBACK_PATH: &str = "/callbacks/registry";

pub struct Harness {
    pub app: Router,
    pub service: SubscriptionService,
    pub registry: Arc<MockRegistryClient>,
    pub registry_keys: Keyset,
    pub keys: Arc<StoredKeyProvider>,
    pub store: Arc<MemoryStore>,
}

pub fn fast_retry() -> RetryPolicy {
    RetryPolicy {
        max_attempts: 3,
        initial_delay: Duration::from_millis(1),
        max_delay: Duration::from_millis(5),
        multiplier: 2.0,
        jitter: true,
    }
}

pub fn harness() -> Harness {
    harness_with(MockRegistryClient::new())
}

/// A registry that never answers within a test's lifetime
pub fn stalled_harness() -> Harness {
    harness_with(MockRegistryClient::new().with_delay(Duration::from_secs(60)))
}

pub fn harness_with(registry: MockRegistryClient) -> Harness {
    build(registry, Keyset::generate(), Arc::new(MemoryStore::new()))
}

fn build(registry: MockRegistryClient, registry_keys: Keyset, store: Arc<MemoryStore>) -> Harness {
    let registry = Arc::new(registry);
    let keys = Arc::new(StoredKeyProvider::new(store.clone()));

    let service = SubscriptionService::new(
        store.clone(),
        registry.clone(),
        keys.clone(),
        registry_keys.public_keys().encr_public_key,
        fast_retry(),
    );

    let app = create_router(Arc::new(AppState {
        service: service.clone(),
        callback_paths: vec![CALLBACK_PATH.to_string()],
    }));

    Harness {
        app,
        service,
        registry,
        registry_keys,
        keys,
        store,
    }
}

impl Harness {
    /// A new process over the same store: fresh service, key cache and registry client
    pub fn restart(&self, registry: MockRegistryClient) -> Harness {
        build(registry, self.registry_keys.clone(), self.store.clone())
    }

    /// Send a request and return status plus JSON body (Null when empty)
    pub async fn send(&self, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let (status, _, body) = self.send_raw(method, uri, body.map(|b| b.to_string())).await;
        (status, body)
    }

    pub async fn send_raw(
        &self,
        method: Method,
        uri: &str,
        body: Option<String>,
    ) -> (StatusCode, axum::http::HeaderMap, Value) {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .header(CONTENT_TYPE, "application/json")
            .body(body.map(Body::from).unwrap_or_else(Body::empty))
            .unwrap();

        let response = self.app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        (status, headers, json)
    }

    /// Seal `nonce` for the subscriber's key the way the registry does
    pub async fn challenge(&self, key_id: &str, nonce: &str) -> String {
        let keys = self.keys.public_keys(key_id).await.unwrap();
        self.registry_keys.seal(nonce, &keys.encr_public_key).unwrap()
    }

    pub async fn wait_for_status(
        &self,
        subscriber_id: &str,
        key_id: &str,
        status: SubscriptionStatus,
    ) -> Subscription {
        for _ in 0..200 {
            if let Ok(sub) = self.service.get(subscriber_id, key_id).await {
                if sub.status == status {
                    return sub;
                }
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("{}/{} never reached {}", subscriber_id, key_id, status);
    }

    pub async fn wait_for_calls(&self, count: usize) {
        for _ in 0..200 {
            if self.registry.call_count() >= count {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("registry saw {} calls, expected {}", self.registry.call_count(), count);
    }
}

pub fn subscribe_body(subscriber_id: &str, key_id: &str) -> Value {
    json!({
        "subscriber_id": subscriber_id,
        "key_id": key_id,
        "type": "BPP",
        "url": format!("https://{}/beckn", subscriber_id),
        "domain": "retail",
    })
}
