//! Mock Registry Client
//!
//! For testing purposes - answers from a script and records every call.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use crate::client::RegistryClient;
use crate::error::Result;
use crate::types::{SubscribeAck, SubscribeRequest};

/// HTTP method a recorded call used
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallKind {
    Subscribe,
    UpdateSubscription,
}

/// One call seen by [`MockRegistryClient`]
#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub kind: CallKind,
    pub request: SubscribeRequest,
    pub authorization: Option<String>,
}

/// Mock registry client for testing
///
/// Scripted responses are consumed in order; once the script is empty every
/// call is acknowledged with the request's `message_id`.
#[derive(Debug, Default)]
pub struct MockRegistryClient {
    script: Mutex<VecDeque<Result<SubscribeAck>>>,
    calls: Mutex<Vec<RecordedCall>>,
    delay: Option<Duration>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl MockRegistryClient {
    /// Create a mock that acknowledges every call
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay every response, to let callbacks overtake the acknowledgement
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Queue the response for the next call
    pub fn push_response(&self, response: Result<SubscribeAck>) {
        lock(&self.script).push_back(response);
    }

    /// All calls made so far
    pub fn calls(&self) -> Vec<RecordedCall> {
        lock(&self.calls).clone()
    }

    pub fn call_count(&self) -> usize {
        lock(&self.calls).len()
    }

    async fn respond(
        &self,
        kind: CallKind,
        request: &SubscribeRequest,
        authorization: Option<&str>,
    ) -> Result<SubscribeAck> {
        lock(&self.calls).push(RecordedCall {
            kind,
            request: request.clone(),
            authorization: authorization.map(str::to_string),
        });

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let scripted = lock(&self.script).pop_front();
        scripted.unwrap_or_else(|| {
            Ok(SubscribeAck {
                status: "ACK".into(),
                message_id: request.message_id.clone(),
            })
        })
    }
}

#[async_trait]
impl RegistryClient for MockRegistryClient {
    async fn subscribe(&self, request: &SubscribeRequest) -> Result<SubscribeAck> {
        self.respond(CallKind::Subscribe, request, None).await
    }

    async fn update_subscription(
        &self,
        request: &SubscribeRequest,
        authorization: &str,
    ) -> Result<SubscribeAck> {
        self.respond(CallKind::UpdateSubscription, request, Some(authorization))
            .await
    }

    fn description(&self) -> &str {
        "mock registry client"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RegistryError;

    fn request() -> SubscribeRequest {
        SubscribeRequest {
            subscriber_id: "acme.org".into(),
            key_id: "k1".into(),
            subscriber_type: "BPP".into(),
            url: "https://acme.org/beckn".into(),
            domain: "retail".into(),
            location: None,
            signing_public_key: "sig".into(),
            encr_public_key: "enc".into(),
            valid_from: None,
            valid_until: None,
            message_id: "m-1".into(),
        }
    }

    #[tokio::test]
    async fn test_default_acknowledges() {
        let mock = MockRegistryClient::new();
        let ack = mock.subscribe(&request()).await.unwrap();
        assert_eq!(ack.message_id, "m-1");
        assert_eq!(mock.call_count(), 1);
    }

    #[tokio::test]
    async fn test_script_consumed_in_order() {
        let mock = MockRegistryClient::new();
        mock.push_response(Err(RegistryError::Unavailable("down".into())));

        assert!(mock.subscribe(&request()).await.is_err());
        assert!(mock.update_subscription(&request(), "Signature x").await.is_ok());

        let calls = mock.calls();
        assert_eq!(calls[0].kind, CallKind::Subscribe);
        assert_eq!(calls[1].kind, CallKind::UpdateSubscription);
        assert_eq!(calls[1].authorization.as_deref(), Some("Signature x"));
    }
}
