//! Subscription records and registration payloads

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Result, SubscriptionError};
use crate::status::SubscriptionStatus;

/// Maximum length of a subscriber ID or key ID
pub const MAX_ID_LEN: usize = 255;

/// Maximum length of a subscriber type
pub const MAX_TYPE_LEN: usize = 64;

/// Fields the registry's subscribe contract requires beyond the identity pair
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegistrationPayload {
    /// Callback base URL the registry will reach the subscriber on
    pub url: String,

    /// Network domain the subscriber participates in
    pub domain: String,

    /// Free-form location descriptor, passed through to the registry
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<serde_json::Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub valid_from: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub valid_until: Option<DateTime<Utc>>,
}

impl RegistrationPayload {
    /// Create a payload with the required fields only
    pub fn new(url: impl Into<String>, domain: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            domain: domain.into(),
            location: None,
            valid_from: None,
            valid_until: None,
        }
    }

    /// Set the validity window
    pub fn with_validity(mut self, from: DateTime<Utc>, until: DateTime<Utc>) -> Self {
        self.valid_from = Some(from);
        self.valid_until = Some(until);
        self
    }

    /// Check the payload against the registry's subscribe contract
    pub fn validate(&self) -> Result<()> {
        validate_url(&self.url)?;

        if self.domain.trim().is_empty() {
            return Err(SubscriptionError::Validation("domain cannot be empty".into()));
        }

        if let (Some(from), Some(until)) = (self.valid_from, self.valid_until) {
            if from >= until {
                return Err(SubscriptionError::Validation(format!(
                    "valid_from ({}) must precede valid_until ({})",
                    from, until
                )));
            }
        }

        Ok(())
    }
}

fn validate_url(url: &str) -> Result<()> {
    let rest = url
        .strip_prefix("https://")
        .or_else(|| url.strip_prefix("http://"))
        .ok_or_else(|| {
            SubscriptionError::Validation(format!("url must be absolute http(s): {}", url))
        })?;

    let host = rest.split(['/', '?', '#']).next().unwrap_or_default();
    if host.is_empty() || url.chars().any(char::is_whitespace) {
        return Err(SubscriptionError::Validation(format!("url is malformed: {}", url)));
    }
    Ok(())
}

/// Validate a (subscriber_id, key_id) pair
///
/// `|` is reserved: it separates the fields of the signature `keyId`.
pub fn validate_identity(subscriber_id: &str, key_id: &str) -> Result<()> {
    for (name, value) in [("subscriber_id", subscriber_id), ("key_id", key_id)] {
        if value.trim().is_empty() {
            return Err(SubscriptionError::Validation(format!("{} cannot be empty", name)));
        }
        if value.len() > MAX_ID_LEN {
            return Err(SubscriptionError::Validation(format!(
                "{} too long (max {} chars)",
                name, MAX_ID_LEN
            )));
        }
        if value.contains('|') {
            return Err(SubscriptionError::Validation(format!(
                "{} cannot contain '|'",
                name
            )));
        }
    }
    Ok(())
}

/// Validate the role a subscriber registers as
pub fn validate_subscriber_type(subscriber_type: &str) -> Result<()> {
    if subscriber_type.trim().is_empty() {
        return Err(SubscriptionError::Validation("type cannot be empty".into()));
    }
    if subscriber_type.len() > MAX_TYPE_LEN {
        return Err(SubscriptionError::Validation(format!(
            "type too long (max {} chars)",
            MAX_TYPE_LEN
        )));
    }
    Ok(())
}

/// A registration attempt, keyed by (subscriber_id, key_id)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Subscription {
    pub subscriber_id: String,
    pub key_id: String,

    /// Role the subscriber registers as; opaque to this crate
    #[serde(rename = "type")]
    pub subscriber_type: String,

    pub status: SubscriptionStatus,
    pub payload: RegistrationPayload,

    /// Plaintext of the outstanding challenge while `UNDER_SUBSCRIPTION`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub challenge_nonce: Option<String>,

    /// Registry acknowledgement id of the last outbound subscribe call
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub registry_message_id: Option<String>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,

    /// Compare-and-swap token; bumped by the store on every write
    pub version: u64,
}

impl Subscription {
    /// Create a fresh `INITIATED` record after validating all inputs
    pub fn new(
        subscriber_id: impl Into<String>,
        key_id: impl Into<String>,
        subscriber_type: impl Into<String>,
        payload: RegistrationPayload,
    ) -> Result<Self> {
        let subscriber_id = subscriber_id.into();
        let key_id = key_id.into();
        let subscriber_type = subscriber_type.into();

        validate_identity(&subscriber_id, &key_id)?;
        validate_subscriber_type(&subscriber_type)?;
        payload.validate()?;

        let now = Utc::now();
        Ok(Self {
            subscriber_id,
            key_id,
            subscriber_type,
            status: SubscriptionStatus::Initiated,
            payload,
            challenge_nonce: None,
            registry_message_id: None,
            created_at: now,
            updated_at: now,
            version: 0,
        })
    }

    /// Whether a create request carries exactly what is already stored
    pub fn same_registration(&self, subscriber_type: &str, payload: &RegistrationPayload) -> bool {
        self.subscriber_type == subscriber_type && &self.payload == payload
    }

    /// Set the status, keeping `challenge_nonce` consistent with it
    pub fn set_status(&mut self, status: SubscriptionStatus) {
        self.status = status;
        if status != SubscriptionStatus::UnderSubscription {
            self.challenge_nonce = None;
        }
        self.updated_at = Utc::now();
    }

    /// Public view of the record
    pub fn summary(&self) -> SubscriptionSummary {
        SubscriptionSummary {
            subscriber_id: self.subscriber_id.clone(),
            key_id: self.key_id.clone(),
            subscriber_type: self.subscriber_type.clone(),
            status: self.status,
            registry_message_id: self.registry_message_id.clone(),
            created_at: self.created_at,
            updated_at: self.updated_at,
            version: self.version,
        }
    }
}

/// Subscription as returned over HTTP
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubscriptionSummary {
    pub subscriber_id: String,
    pub key_id: String,
    #[serde(rename = "type")]
    pub subscriber_type: String,
    pub status: SubscriptionStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub registry_message_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub version: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payload() -> RegistrationPayload {
        RegistrationPayload::new("https://acme.org/beckn", "retail")
    }

    #[test]
    fn test_new_subscription_is_initiated() {
        let sub = Subscription::new("acme.org", "k1", "BPP", payload()).unwrap();
        assert_eq!(sub.status, SubscriptionStatus::Initiated);
        assert_eq!(sub.version, 0);
        assert!(sub.challenge_nonce.is_none());
    }

    #[test]
    fn test_identity_validation() {
        assert!(Subscription::new("", "k1", "BPP", payload()).is_err());
        assert!(Subscription::new("acme.org", " ", "BPP", payload()).is_err());
        assert!(Subscription::new("acme|org", "k1", "BPP", payload()).is_err());
        assert!(Subscription::new("a".repeat(MAX_ID_LEN + 1), "k1", "BPP", payload()).is_err());
        assert!(Subscription::new("acme.org", "k1", "", payload()).is_err());
        assert!(Subscription::new("acme.org", "k1", "B".repeat(MAX_TYPE_LEN), payload()).is_ok());
        assert!(Subscription::new("acme.org", "k1", "B".repeat(MAX_TYPE_LEN + 1), payload()).is_err());
    }

    #[test]
    fn test_payload_validation() {
        assert!(payload().validate().is_ok());
        assert!(RegistrationPayload::new("ftp://acme.org", "retail").validate().is_err());
        assert!(RegistrationPayload::new("https://", "retail").validate().is_err());
        assert!(RegistrationPayload::new("https://acme .org", "retail").validate().is_err());
        assert!(RegistrationPayload::new("https://acme.org", "").validate().is_err());

        let now = Utc::now();
        let inverted = payload().with_validity(now, now - chrono::Duration::days(1));
        assert!(inverted.validate().is_err());
    }

    #[test]
    fn test_leaving_under_subscription_clears_nonce() {
        let mut sub = Subscription::new("acme.org", "k1", "BPP", payload()).unwrap();
        sub.set_status(SubscriptionStatus::UnderSubscription);
        sub.challenge_nonce = Some("nonce".into());

        sub.set_status(SubscriptionStatus::Subscribed);
        assert!(sub.challenge_nonce.is_none());
    }

    #[test]
    fn test_same_registration() {
        let sub = Subscription::new("acme.org", "k1", "BPP", payload()).unwrap();
        assert!(sub.same_registration("BPP", &payload()));
        assert!(!sub.same_registration("BAP", &payload()));
        assert!(!sub.same_registration("BPP", &RegistrationPayload::new("https://other.org", "retail")));
    }

    #[test]
    fn test_summary_serializes_type_field() {
        let sub = Subscription::new("acme.org", "k1", "BPP", payload()).unwrap();
        let json = serde_json::to_value(sub.summary()).unwrap();
        assert_eq!(json["type"], "BPP");
        assert_eq!(json["status"], "INITIATED");
        assert!(json.get("challenge_nonce").is_none());
    }
}
