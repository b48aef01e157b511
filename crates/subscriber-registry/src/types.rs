//! Wire types for the registry subscribe contract

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use subscriber_core::{PublicKeys, Subscription};

/// Body of `POST /subscribe` and `PATCH /subscribe`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubscribeRequest {
    pub subscriber_id: String,
    pub key_id: String,
    #[serde(rename = "type")]
    pub subscriber_type: String,
    pub url: String,
    pub domain: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<serde_json::Value>,
    pub signing_public_key: String,
    pub encr_public_key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub valid_from: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub valid_until: Option<DateTime<Utc>>,
    /// Correlates every attempt of one registration round
    pub message_id: String,
}

impl SubscribeRequest {
    /// Build the request for a stored subscription and its advertised keys
    pub fn for_subscription(
        subscription: &Subscription,
        keys: PublicKeys,
        message_id: impl Into<String>,
    ) -> Self {
        let payload = &subscription.payload;
        Self {
            subscriber_id: subscription.subscriber_id.clone(),
            key_id: subscription.key_id.clone(),
            subscriber_type: subscription.subscriber_type.clone(),
            url: payload.url.clone(),
            domain: payload.domain.clone(),
            location: payload.location.clone(),
            signing_public_key: keys.signing_public_key,
            encr_public_key: keys.encr_public_key,
            valid_from: payload.valid_from,
            valid_until: payload.valid_until,
            message_id: message_id.into(),
        }
    }

    /// Serialized body; the bytes a request signature is computed over
    pub fn to_body(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec(self)
    }
}

/// Registry acknowledgement of a subscribe call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscribeAck {
    pub status: String,
    pub message_id: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use subscriber_core::{Keyset, RegistrationPayload};

    #[test]
    fn test_request_carries_subscription_fields() {
        let payload = RegistrationPayload::new("https://acme.org/beckn", "retail");
        let sub = Subscription::new("acme.org", "k1", "BPP", payload).unwrap();
        let keys = Keyset::generate().public_keys();

        let request = SubscribeRequest::for_subscription(&sub, keys.clone(), "m-1");
        let json = serde_json::to_value(&request).unwrap();

        assert_eq!(json["type"], "BPP");
        assert_eq!(json["url"], "https://acme.org/beckn");
        assert_eq!(json["encr_public_key"], keys.encr_public_key);
        assert_eq!(json["message_id"], "m-1");
        assert!(json.get("location").is_none());
    }
}
