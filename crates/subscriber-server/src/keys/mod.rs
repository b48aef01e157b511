//! Key management for the subscriber

pub mod provider;

pub use provider::StoredKeyProvider;
