//! Registry client trait and its reqwest implementation

use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use std::fmt::Debug;
use std::time::Duration;
use tracing::debug;

use crate::error::{RegistryError, Result};
use crate::types::{SubscribeAck, SubscribeRequest};

/// Outbound calls to the registry
///
/// Implementations report transient failures as retryable errors and leave
/// the retry decision to the caller.
#[async_trait]
pub trait RegistryClient: Send + Sync + Debug {
    /// `POST {base}/subscribe`
    async fn subscribe(&self, request: &SubscribeRequest) -> Result<SubscribeAck>;

    /// `PATCH {base}/subscribe`, signed with `authorization`
    async fn update_subscription(
        &self,
        request: &SubscribeRequest,
        authorization: &str,
    ) -> Result<SubscribeAck>;

    /// Get a description of this client (for logging)
    fn description(&self) -> &str {
        "registry client"
    }
}

/// Connection settings for [`HttpRegistryClient`]
#[derive(Debug, Clone)]
pub struct RegistryClientConfig {
    /// Registry base URL, without the `/subscribe` suffix
    pub base_url: String,
    /// Per-request timeout
    pub timeout: Duration,
    pub max_idle_per_host: usize,
    pub idle_timeout: Duration,
}

impl RegistryClientConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            timeout: Duration::from_secs(10),
            max_idle_per_host: 8,
            idle_timeout: Duration::from_secs(90),
        }
    }
}

/// reqwest-backed registry client
#[derive(Debug, Clone)]
pub struct HttpRegistryClient {
    client: reqwest::Client,
    subscribe_url: String,
}

impl HttpRegistryClient {
    pub fn new(config: RegistryClientConfig) -> Result<Self> {
        let base = config.base_url.trim_end_matches('/');
        if base.is_empty() {
            return Err(RegistryError::InvalidRequest("registry base URL is empty".into()));
        }

        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .pool_max_idle_per_host(config.max_idle_per_host)
            .pool_idle_timeout(config.idle_timeout)
            .build()?;

        Ok(Self {
            client,
            subscribe_url: format!("{}/subscribe", base),
        })
    }

    async fn send(&self, request: reqwest::RequestBuilder, message_id: &str) -> Result<SubscribeAck> {
        let response = request.send().await?;
        let status = response.status();
        let body = response.text().await?;

        debug!(message_id = %message_id, status = %status, "Registry responded");

        if !status.is_success() {
            return Err(RegistryError::from_status(status.as_u16(), &body));
        }
        Ok(serde_json::from_str(&body)?)
    }
}

#[async_trait]
impl RegistryClient for HttpRegistryClient {
    async fn subscribe(&self, request: &SubscribeRequest) -> Result<SubscribeAck> {
        let body = request.to_body()?;
        let builder = self
            .client
            .post(&self.subscribe_url)
            .header(CONTENT_TYPE, "application/json")
            .body(body);
        self.send(builder, &request.message_id).await
    }

    async fn update_subscription(
        &self,
        request: &SubscribeRequest,
        authorization: &str,
    ) -> Result<SubscribeAck> {
        let body = request.to_body()?;
        let builder = self
            .client
            .patch(&self.subscribe_url)
            .header(CONTENT_TYPE, "application/json")
            .header(AUTHORIZATION, authorization)
            .body(body);
        self.send(builder, &request.message_id).await
    }

    fn description(&self) -> &str {
        "http registry client"
    }
}
