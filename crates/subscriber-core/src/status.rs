//! Subscription status graph
//!
//! Every change to a subscription's status goes through [`apply`], which
//! holds the complete transition table. Edges not listed here are protocol
//! violations and leave the record untouched.
//!
//! ```text
//! INITIATED           --RegistryAccepted-->   UNDER_SUBSCRIPTION
//! INITIATED           --ChallengeReceived-->  UNDER_SUBSCRIPTION
//! UNDER_SUBSCRIPTION  --ChallengeReceived-->  UNDER_SUBSCRIPTION
//! UNDER_SUBSCRIPTION  --Push(SUBSCRIBED)-->   SUBSCRIBED
//! UNDER_SUBSCRIPTION  --Push(INVALID)-->      INVALID
//! SUBSCRIBED          --Push(UNSUBSCRIBED)--> UNSUBSCRIBED
//! SUBSCRIBED          --Push(INVALID_SSL)-->  INVALID_SSL
//! INVALID_SSL         --ReRegister-->         INITIATED
//! INVALID             --ReRegister-->         INITIATED
//! INITIATED           --RegistryRejected-->   INVALID
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{Result, SubscriptionError};

/// Status of a subscription as seen by the subscriber
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SubscriptionStatus {
    Initiated,
    UnderSubscription,
    Subscribed,
    InvalidSsl,
    Unsubscribed,
    Invalid,
}

impl SubscriptionStatus {
    pub const ALL: [SubscriptionStatus; 6] = [
        SubscriptionStatus::Initiated,
        SubscriptionStatus::UnderSubscription,
        SubscriptionStatus::Subscribed,
        SubscriptionStatus::InvalidSsl,
        SubscriptionStatus::Unsubscribed,
        SubscriptionStatus::Invalid,
    ];

    /// Wire representation
    pub fn as_str(&self) -> &'static str {
        match self {
            SubscriptionStatus::Initiated => "INITIATED",
            SubscriptionStatus::UnderSubscription => "UNDER_SUBSCRIPTION",
            SubscriptionStatus::Subscribed => "SUBSCRIBED",
            SubscriptionStatus::InvalidSsl => "INVALID_SSL",
            SubscriptionStatus::Unsubscribed => "UNSUBSCRIBED",
            SubscriptionStatus::Invalid => "INVALID",
        }
    }

    /// Whether an `OnSubscribe` callback may be answered in this status
    pub fn accepts_challenge(&self) -> bool {
        matches!(
            self,
            SubscriptionStatus::Initiated | SubscriptionStatus::UnderSubscription
        )
    }

    /// Whether a re-registration may start from this status
    pub fn accepts_reregistration(&self) -> bool {
        matches!(self, SubscriptionStatus::InvalidSsl | SubscriptionStatus::Invalid)
    }

    /// Statuses the registry is allowed to push via `StatusUpdate`
    pub fn is_pushable(&self) -> bool {
        matches!(
            self,
            SubscriptionStatus::Subscribed
                | SubscriptionStatus::Invalid
                | SubscriptionStatus::InvalidSsl
                | SubscriptionStatus::Unsubscribed
        )
    }

    /// No edge leaves this status
    pub fn is_terminal(&self) -> bool {
        matches!(self, SubscriptionStatus::Unsubscribed)
    }
}

impl fmt::Display for SubscriptionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SubscriptionStatus {
    type Err = SubscriptionError;

    fn from_str(s: &str) -> Result<Self> {
        SubscriptionStatus::ALL
            .iter()
            .find(|status| status.as_str().eq_ignore_ascii_case(s.trim()))
            .copied()
            .ok_or_else(|| SubscriptionError::Validation(format!("Unknown status: {}", s)))
    }
}

/// Protocol event applied to a subscription
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Event {
    /// Registry acknowledged the outbound subscribe call
    RegistryAccepted,
    /// Registry definitively refused the outbound subscribe call
    RegistryRejected,
    /// Registry delivered an `OnSubscribe` challenge
    ChallengeReceived,
    /// Registry pushed a status via `StatusUpdate`
    Push(SubscriptionStatus),
    /// Operator re-registered after key rotation or cert renewal
    ReRegister,
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Event::RegistryAccepted => f.write_str("registry accept"),
            Event::RegistryRejected => f.write_str("registry reject"),
            Event::ChallengeReceived => f.write_str("on_subscribe challenge"),
            Event::Push(status) => write!(f, "status push {}", status),
            Event::ReRegister => f.write_str("re-registration"),
        }
    }
}

/// Result of applying an event to a status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Commit the record with this status
    Advance(SubscriptionStatus),
    /// Accepted, but nothing to write
    Ignore,
}

/// Apply `event` to a record currently in `from`
pub fn apply(from: SubscriptionStatus, event: Event) -> Result<Outcome> {
    use SubscriptionStatus::*;

    let outcome = match (from, event) {
        (Initiated, Event::RegistryAccepted) => Outcome::Advance(UnderSubscription),
        // The callback can beat the subscribe response, and a worker from an
        // earlier registration round may report late.
        (_, Event::RegistryAccepted) => Outcome::Ignore,

        (Initiated, Event::RegistryRejected) => Outcome::Advance(Invalid),
        (_, Event::RegistryRejected) => Outcome::Ignore,

        (Initiated | UnderSubscription, Event::ChallengeReceived) => {
            Outcome::Advance(UnderSubscription)
        }

        (current, Event::Push(target)) if current == target && target.is_pushable() => {
            Outcome::Ignore
        }
        (UnderSubscription, Event::Push(Subscribed)) => Outcome::Advance(Subscribed),
        (UnderSubscription, Event::Push(Invalid)) => Outcome::Advance(Invalid),
        (Subscribed, Event::Push(Unsubscribed)) => Outcome::Advance(Unsubscribed),
        (Subscribed, Event::Push(InvalidSsl)) => Outcome::Advance(InvalidSsl),

        (InvalidSsl | Invalid, Event::ReRegister) => Outcome::Advance(Initiated),

        (from, event) => return Err(SubscriptionError::ProtocolViolation { from, event }),
    };

    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use SubscriptionStatus::*;

    #[test]
    fn test_happy_path() {
        assert_eq!(
            apply(Initiated, Event::ChallengeReceived).unwrap(),
            Outcome::Advance(UnderSubscription)
        );
        assert_eq!(
            apply(UnderSubscription, Event::Push(Subscribed)).unwrap(),
            Outcome::Advance(Subscribed)
        );
        assert_eq!(
            apply(Subscribed, Event::Push(Subscribed)).unwrap(),
            Outcome::Ignore
        );
    }

    #[test]
    fn test_push_cannot_skip_challenge() {
        let err = apply(Initiated, Event::Push(Invalid)).unwrap_err();
        assert_eq!(
            err,
            SubscriptionError::ProtocolViolation {
                from: Initiated,
                event: Event::Push(Invalid),
            }
        );
        assert!(apply(Initiated, Event::Push(Subscribed)).is_err());
    }

    #[test]
    fn test_unsubscribed_is_terminal() {
        for status in SubscriptionStatus::ALL {
            if status == Unsubscribed {
                continue;
            }
            assert!(apply(Unsubscribed, Event::Push(status)).is_err());
        }
        assert!(apply(Unsubscribed, Event::ReRegister).is_err());
        assert!(apply(Unsubscribed, Event::ChallengeReceived).is_err());
    }

    #[test]
    fn test_reregistration_sources() {
        assert_eq!(apply(InvalidSsl, Event::ReRegister).unwrap(), Outcome::Advance(Initiated));
        assert_eq!(apply(Invalid, Event::ReRegister).unwrap(), Outcome::Advance(Initiated));
        assert!(apply(Subscribed, Event::ReRegister).is_err());
        assert!(apply(Initiated, Event::ReRegister).is_err());
    }

    #[test]
    fn test_non_pushable_statuses_rejected() {
        assert!(apply(Initiated, Event::Push(Initiated)).is_err());
        assert!(apply(UnderSubscription, Event::Push(UnderSubscription)).is_err());
    }

    #[test]
    fn test_late_registry_outcomes_ignored() {
        assert_eq!(apply(Subscribed, Event::RegistryAccepted).unwrap(), Outcome::Ignore);
        assert_eq!(apply(UnderSubscription, Event::RegistryRejected).unwrap(), Outcome::Ignore);
        assert_eq!(apply(Initiated, Event::RegistryRejected).unwrap(), Outcome::Advance(Invalid));
    }

    #[test]
    fn test_status_parsing() {
        assert_eq!("SUBSCRIBED".parse::<SubscriptionStatus>().unwrap(), Subscribed);
        assert_eq!("invalid_ssl".parse::<SubscriptionStatus>().unwrap(), InvalidSsl);
        assert!("SUSPENDED".parse::<SubscriptionStatus>().is_err());
    }

    #[test]
    fn test_status_serde_matches_display() {
        for status in SubscriptionStatus::ALL {
            let json = serde_json::to_string(&status).unwrap();
            assert_eq!(json, format!("\"{}\"", status));
        }
    }
}
