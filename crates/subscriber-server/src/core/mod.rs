//! Core logic for the subscriber

mod machine;

pub use machine::{RegistrationKind, SubscriptionService, MAX_CAS_ROUNDS};
