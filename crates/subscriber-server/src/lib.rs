//! Subscriber Server
//!
//! The subscriber side of the registry handshake:
//! - Records registration intents and calls the registry in the background
//! - Answers the registry's encrypted `OnSubscribe` challenge
//! - Applies status pushes strictly along the subscription status graph
//!
//! ## API Endpoints
//!
//! - `GET /health` - Liveness check
//! - `GET /ready` - Readiness check with per-status counts
//! - `POST /subscribe` - Create a subscription
//! - `PATCH /subscribe` - Re-register after `INVALID` / `INVALID_SSL`
//! - `POST /updateStatus` - Registry status push
//! - `GET /subscriptions/{subscriber_id}/{key_id}` - Locally held view
//! - `POST /on_subscribe` - Registry challenge callback (plus configured paths,
//!   and any POST path ending in `/on_subscribe`)

pub mod api;
pub mod config;
pub mod core;
pub mod keys;
pub mod storage;

pub use api::create_router;
pub use api::handlers::AppState;
pub use config::{ConfigError, SubscriberConfig};
pub use crate::core::{RegistrationKind, SubscriptionService};
pub use keys::StoredKeyProvider;
pub use storage::{KeysetStore, MemoryStore, StorageError, SubscriptionStore};
#[cfg(feature = "postgres")]
pub use storage::PostgresStore;
