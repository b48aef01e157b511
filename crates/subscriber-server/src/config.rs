//! Server configuration
//!
//! Read once from the environment at startup. Every variable is prefixed
//! `SUBSCRIBER_` except `DATABASE_URL`.

use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;
use subscriber_core::crypto::decode_key;
use subscriber_registry::{RegistryClientConfig, RetryPolicy};
use thiserror::Error;
use tracing::Level;

/// Configuration errors, reported before the server starts
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} is required")]
    Missing(&'static str),

    #[error("{name} is invalid: {reason}")]
    Invalid { name: &'static str, reason: String },
}

/// Server configuration
#[derive(Debug, Clone)]
pub struct SubscriberConfig {
    pub host: IpAddr,
    pub port: u16,
    pub log_level: Level,

    /// Outbound registry connection
    pub registry: RegistryClientConfig,

    /// Registry's X25519 public key, base64; challenges are sealed with it
    pub registry_encr_public_key: String,

    pub retry: RetryPolicy,

    /// Exact paths that serve `OnSubscribe` besides `/on_subscribe`
    pub callback_paths: Vec<String>,

    pub shutdown_timeout: Duration,

    /// PostgreSQL connection string; in-memory store when unset
    pub database_url: Option<String>,
}

impl SubscriberConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load configuration from a map, for tests and embedding
    pub fn from_map(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        Self::from_lookup(|name| vars.get(name).cloned())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let var = |name: &'static str| {
            lookup(name)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let host = parse_or(var("SUBSCRIBER_HOST"), "SUBSCRIBER_HOST", IpAddr::from([0, 0, 0, 0]))?;
        let port = parse_or(var("SUBSCRIBER_PORT"), "SUBSCRIBER_PORT", 8080u16)?;
        let log_level = parse_or(var("SUBSCRIBER_LOG_LEVEL"), "SUBSCRIBER_LOG_LEVEL", Level::INFO)?;

        let registry_url = var("SUBSCRIBER_REGISTRY_URL").ok_or(ConfigError::Missing("SUBSCRIBER_REGISTRY_URL"))?;
        if !(registry_url.starts_with("http://") || registry_url.starts_with("https://")) {
            return Err(ConfigError::Invalid {
                name: "SUBSCRIBER_REGISTRY_URL",
                reason: "must be an http(s) URL".into(),
            });
        }

        let mut registry = RegistryClientConfig::new(registry_url);
        registry.timeout = Duration::from_secs(parse_or(
            var("SUBSCRIBER_REGISTRY_TIMEOUT_SECS"),
            "SUBSCRIBER_REGISTRY_TIMEOUT_SECS",
            10u64,
        )?);
        registry.max_idle_per_host = parse_or(
            var("SUBSCRIBER_REGISTRY_MAX_IDLE_PER_HOST"),
            "SUBSCRIBER_REGISTRY_MAX_IDLE_PER_HOST",
            8usize,
        )?;
        registry.idle_timeout = Duration::from_secs(parse_or(
            var("SUBSCRIBER_REGISTRY_IDLE_TIMEOUT_SECS"),
            "SUBSCRIBER_REGISTRY_IDLE_TIMEOUT_SECS",
            90u64,
        )?);

        let registry_encr_public_key = var("SUBSCRIBER_REGISTRY_ENCR_PUBLIC_KEY")
            .ok_or(ConfigError::Missing("SUBSCRIBER_REGISTRY_ENCR_PUBLIC_KEY"))?;
        decode_key(&registry_encr_public_key).map_err(|e| ConfigError::Invalid {
            name: "SUBSCRIBER_REGISTRY_ENCR_PUBLIC_KEY",
            reason: e.to_string(),
        })?;

        let retry = RetryPolicy {
            max_attempts: parse_or(var("SUBSCRIBER_RETRY_MAX_ATTEMPTS"), "SUBSCRIBER_RETRY_MAX_ATTEMPTS", 5u32)?,
            initial_delay: Duration::from_millis(parse_or(
                var("SUBSCRIBER_RETRY_INITIAL_DELAY_MS"),
                "SUBSCRIBER_RETRY_INITIAL_DELAY_MS",
                500u64,
            )?),
            max_delay: Duration::from_millis(parse_or(
                var("SUBSCRIBER_RETRY_MAX_DELAY_MS"),
                "SUBSCRIBER_RETRY_MAX_DELAY_MS",
                30_000u64,
            )?),
            ..RetryPolicy::default()
        };
        if retry.max_attempts == 0 {
            return Err(ConfigError::Invalid {
                name: "SUBSCRIBER_RETRY_MAX_ATTEMPTS",
                reason: "must be at least 1".into(),
            });
        }

        let callback_paths = match var("SUBSCRIBER_CALLBACK_PATHS") {
            Some(raw) => parse_callback_paths(&raw)?,
            None => Vec::new(),
        };

        let shutdown_timeout = Duration::from_secs(parse_or(
            var("SUBSCRIBER_SHUTDOWN_TIMEOUT_SECS"),
            "SUBSCRIBER_SHUTDOWN_TIMEOUT_SECS",
            10u64,
        )?);

        Ok(Self {
            host,
            port,
            log_level,
            registry,
            registry_encr_public_key,
            retry,
            callback_paths,
            shutdown_timeout,
            database_url: var("DATABASE_URL"),
        })
    }

    pub fn bind_address(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }
}

fn parse_or<T>(value: Option<String>, name: &'static str, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match value {
        Some(raw) => raw.parse().map_err(|e: T::Err| ConfigError::Invalid {
            name,
            reason: format!("{:?}: {}", raw, e),
        }),
        None => Ok(default),
    }
}

/// Routes owned by the API; a callback path may not shadow them
const RESERVED_PATHS: &[&str] = &["/health", "/ready", "/subscribe", "/updateStatus"];

fn parse_callback_paths(raw: &str) -> Result<Vec<String>, ConfigError> {
    raw.split(',')
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(|path| {
            if path.chars().any(|c| c.is_whitespace() || matches!(c, '{' | '}' | '*' | ':')) {
                return Err(ConfigError::Invalid {
                    name: "SUBSCRIBER_CALLBACK_PATHS",
                    reason: format!("{:?} is not a literal path", path),
                });
            }
            let path = if path.starts_with('/') {
                path.to_string()
            } else {
                format!("/{}", path)
            };
            if RESERVED_PATHS.contains(&path.as_str()) {
                return Err(ConfigError::Invalid {
                    name: "SUBSCRIBER_CALLBACK_PATHS",
                    reason: format!("{} is already routed", path),
                });
            }
            Ok(path)
        })
        .collect()
}
