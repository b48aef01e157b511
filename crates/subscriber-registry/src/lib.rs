//! Registry Client
//!
//! Outbound side of the subscription handshake: the calls a subscriber makes
//! to the registry's `/subscribe` endpoint.
//!
//! ## Architecture
//!
//! - **[`RegistryClient`]**: the seam the state machine depends on
//! - **[`HttpRegistryClient`]**: reqwest implementation with pooled connections
//! - **[`MockRegistryClient`]**: scripted client for tests
//! - **[`RetryPolicy`]**: exponential backoff with jitter around any client call
//!
//! ## Usage
//!
//! ```ignore
//! use subscriber_registry::{HttpRegistryClient, RegistryClient, RegistryClientConfig, RetryPolicy};
//!
//! let client = HttpRegistryClient::new(RegistryClientConfig::new("https://registry.example"))?;
//! let ack = RetryPolicy::default()
//!     .run(|_| client.subscribe(&request))
//!     .await?;
//! ```

pub mod client;
pub mod error;
pub mod mock;
pub mod retry;
pub mod types;

pub use client::{HttpRegistryClient, RegistryClient, RegistryClientConfig};
pub use error::{RegistryError, Result};
pub use mock::{CallKind, MockRegistryClient, RecordedCall};
pub use retry::{RetryError, RetryPolicy};
pub use types::{SubscribeAck, SubscribeRequest};
