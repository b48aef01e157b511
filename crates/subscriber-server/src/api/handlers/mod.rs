//! API request handlers

pub mod callback;
pub mod status;
pub mod subscribe;

pub use callback::{fallback, on_subscribe, OnSubscribeBody, OnSubscribeResponse};
pub use status::{get_subscription, update_status, StatusUpdateBody};
pub use subscribe::{create_subscription, update_subscription, SubscribeBody};

use crate::core::SubscriptionService;

/// Application state shared across handlers
#[derive(Debug, Clone)]
pub struct AppState {
    /// State machine every handler delegates to
    pub service: SubscriptionService,
    /// Extra exact paths that serve `OnSubscribe`, besides `/on_subscribe`
    pub callback_paths: Vec<String>,
}
