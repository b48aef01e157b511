//! Subscription State Machine
//!
//! Translates protocol events into committed status changes. Every write is
//! read-modify-CAS against the store; a writer that loses the race re-reads
//! and re-validates the event against the fresh record.
//!
//! Outbound registry calls run on spawned tasks. Create and update respond
//! as soon as the intent is stored.

use chrono::Utc;
use std::collections::BTreeMap;
use std::sync::Arc;
use subscriber_core::{
    apply, authorization_header, types::validate_subscriber_type, ChallengeResolver, Event,
    KeyProvider, Outcome, RegistrationPayload, Result, Subscription, SubscriptionError,
    SubscriptionStatus,
};
use subscriber_registry::{
    RegistryClient, RegistryError, RetryError, RetryPolicy, SubscribeAck, SubscribeRequest,
};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::storage::{StorageError, SubscriptionStore};

/// Upper bound on read-modify-CAS rounds for a single event
pub const MAX_CAS_ROUNDS: usize = 16;

/// Which registry call a registration round uses
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistrationKind {
    /// First registration, `POST /subscribe`
    Initial,
    /// Re-registration after `INVALID`/`INVALID_SSL`, signed `PATCH /subscribe`
    Update,
}

impl RegistrationKind {
    /// Kind for a stored `INITIATED` record
    ///
    /// Creation stores version 1 and the registry acknowledgement always
    /// leaves `INITIATED`, so a later `INITIATED` version means re-registration.
    pub fn for_record(subscription: &Subscription) -> Self {
        if subscription.version > 1 {
            RegistrationKind::Update
        } else {
            RegistrationKind::Initial
        }
    }
}

/// Drives subscriptions through the registration handshake
#[derive(Debug, Clone)]
pub struct SubscriptionService {
    store: Arc<dyn SubscriptionStore>,
    registry: Arc<dyn RegistryClient>,
    keys: Arc<dyn KeyProvider>,
    resolver: ChallengeResolver,
    retry: RetryPolicy,
}

impl SubscriptionService {
    pub fn new(
        store: Arc<dyn SubscriptionStore>,
        registry: Arc<dyn RegistryClient>,
        keys: Arc<dyn KeyProvider>,
        registry_encr_public_key: impl Into<String>,
        retry: RetryPolicy,
    ) -> Self {
        let resolver = ChallengeResolver::new(keys.clone(), registry_encr_public_key);
        Self {
            store,
            registry,
            keys,
            resolver,
            retry,
        }
    }

    // =========================================================================
    // Inbound operations
    // =========================================================================

    /// Record a new registration intent and start the outbound handshake
    ///
    /// Re-creating with identical type and payload returns the stored record
    /// without a second registry call; anything else is a conflict.
    pub async fn create(
        &self,
        subscriber_id: &str,
        key_id: &str,
        subscriber_type: &str,
        payload: RegistrationPayload,
    ) -> Result<Subscription> {
        let subscription = Subscription::new(subscriber_id, key_id, subscriber_type, payload)?;
        self.keys.ensure_keyset(key_id).await?;

        match self.store.create(subscription.clone()).await {
            Ok(stored) => {
                info!(subscriber_id = %subscriber_id, key_id = %key_id, "Subscription initiated");
                self.schedule_registration(stored.clone(), RegistrationKind::Initial);
                Ok(stored)
            }
            Err(StorageError::AlreadyExists { .. }) => {
                let existing = self.store.get(subscriber_id, key_id).await?;
                if existing.same_registration(&subscription.subscriber_type, &subscription.payload) {
                    debug!(subscriber_id = %subscriber_id, key_id = %key_id, "Identical re-create");
                    Ok(existing)
                } else {
                    Err(SubscriptionError::Conflict {
                        subscriber_id: subscriber_id.to_string(),
                        key_id: key_id.to_string(),
                    })
                }
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Replace the registration of a rejected subscription and register again
    pub async fn update(
        &self,
        subscriber_id: &str,
        key_id: &str,
        subscriber_type: &str,
        payload: RegistrationPayload,
    ) -> Result<Subscription> {
        validate_subscriber_type(subscriber_type)?;
        payload.validate()?;

        // Re-registration advertises the keys the registry already holds
        self.store.get(subscriber_id, key_id).await?;
        self.keys.public_keys(key_id).await?;

        let stored = self
            .mutate(subscriber_id, key_id, |sub| {
                match apply(sub.status, Event::ReRegister)? {
                    Outcome::Advance(next) => {
                        sub.subscriber_type = subscriber_type.to_string();
                        sub.payload = payload.clone();
                        sub.registry_message_id = None;
                        sub.set_status(next);
                        Ok(true)
                    }
                    Outcome::Ignore => Ok(false),
                }
            })
            .await?;

        info!(subscriber_id = %subscriber_id, key_id = %key_id, "Re-registration initiated");
        self.schedule_registration(stored.clone(), RegistrationKind::Update);
        Ok(stored)
    }

    /// Answer a registry challenge
    ///
    /// With no `key_id`, the record is looked up among the subscriber's
    /// records that can still take a challenge.
    pub async fn on_subscribe(
        &self,
        subscriber_id: &str,
        key_id: Option<&str>,
        encrypted_challenge: &str,
    ) -> Result<String> {
        let current = match key_id {
            Some(key_id) => self.store.get(subscriber_id, key_id).await?,
            None => self.find_challenge_target(subscriber_id).await?,
        };
        let key_id = current.key_id.clone();

        // Reject before decrypting so a violation never costs a key operation
        apply(current.status, Event::ChallengeReceived)?;

        let answer = self.resolver.resolve(encrypted_challenge, &key_id).await?;

        let stored = self
            .mutate(subscriber_id, &key_id, |sub| {
                match apply(sub.status, Event::ChallengeReceived)? {
                    Outcome::Advance(next) => {
                        if sub.status == next && sub.challenge_nonce.as_deref() == Some(answer.as_str()) {
                            return Ok(false);
                        }
                        sub.set_status(next);
                        sub.challenge_nonce = Some(answer.clone());
                        Ok(true)
                    }
                    Outcome::Ignore => Ok(false),
                }
            })
            .await?;

        info!(
            subscriber_id = %subscriber_id,
            key_id = %key_id,
            status = %stored.status,
            "Answered registry challenge"
        );
        Ok(answer)
    }

    /// Apply a status pushed by the registry
    pub async fn status_update(
        &self,
        subscriber_id: &str,
        key_id: &str,
        status: &str,
    ) -> Result<Subscription> {
        let target: SubscriptionStatus = status.parse()?;

        let stored = self
            .mutate(subscriber_id, key_id, |sub| apply_outcome(sub, Event::Push(target)))
            .await?;

        info!(
            subscriber_id = %subscriber_id,
            key_id = %key_id,
            status = %stored.status,
            version = stored.version,
            "Applied status push"
        );
        Ok(stored)
    }

    /// Locally held view of a subscription
    pub async fn get(&self, subscriber_id: &str, key_id: &str) -> Result<Subscription> {
        Ok(self.store.get(subscriber_id, key_id).await?)
    }

    /// Per-status record counts; fails if the store is unreachable
    pub async fn readiness(&self) -> Result<BTreeMap<String, usize>> {
        Ok(self.store.status_counts().await?)
    }

    /// Reschedule outbound registration for every `INITIATED` record
    pub async fn resume_pending(&self) -> Result<usize> {
        let pending = self.store.list_by_status(SubscriptionStatus::Initiated).await?;
        let count = pending.len();

        for subscription in pending {
            let kind = RegistrationKind::for_record(&subscription);
            debug!(
                subscriber_id = %subscription.subscriber_id,
                key_id = %subscription.key_id,
                kind = ?kind,
                "Resuming registration"
            );
            self.schedule_registration(subscription, kind);
        }

        if count > 0 {
            info!(count, "Resumed pending registrations");
        }
        Ok(count)
    }

    // =========================================================================
    // Outbound registration
    // =========================================================================

    /// Run a registration round on a background task
    pub fn schedule_registration(
        &self,
        subscription: Subscription,
        kind: RegistrationKind,
    ) -> JoinHandle<Result<Subscription>> {
        let service = self.clone();
        tokio::spawn(async move {
            let result = service.register(&subscription, kind).await;
            if let Err(e) = &result {
                error!(
                    subscriber_id = %subscription.subscriber_id,
                    key_id = %subscription.key_id,
                    error = %e,
                    "Registration round failed"
                );
            }
            result
        })
    }

    /// Call the registry (with retries) and record the outcome
    ///
    /// The round is identified by the version `subscription` was stored at.
    /// Its outcome is dropped if the record has since started another round.
    pub async fn register(
        &self,
        subscription: &Subscription,
        kind: RegistrationKind,
    ) -> Result<Subscription> {
        let subscriber_id = subscription.subscriber_id.as_str();
        let key_id = subscription.key_id.as_str();
        let round = subscription.version;

        let keys = self.keys.public_keys(key_id).await?;
        let request = SubscribeRequest::for_subscription(subscription, keys, Uuid::new_v4().to_string());

        let request = &request;
        let result = self
            .retry
            .run(move |attempt| async move {
                debug!(
                    subscriber_id = %request.subscriber_id,
                    message_id = %request.message_id,
                    attempt,
                    "Calling registry"
                );
                self.call_registry(request, kind).await
            })
            .await;

        match result {
            Ok(ack) => self.record_accepted(subscriber_id, key_id, round, ack).await,
            Err(RetryError::Definitive(err)) => {
                warn!(subscriber_id = %subscriber_id, key_id = %key_id, error = %err, "Registry rejected subscription");
                self.mutate(subscriber_id, key_id, |sub| {
                    if !in_round(sub, round) {
                        return Ok(false);
                    }
                    apply_outcome(sub, Event::RegistryRejected)
                })
                .await
            }
            Err(RetryError::Exhausted { attempts, last_error }) => {
                Err(SubscriptionError::UpstreamUnavailable(format!(
                    "{} attempts: {}",
                    attempts, last_error
                )))
            }
        }
    }

    async fn call_registry(
        &self,
        request: &SubscribeRequest,
        kind: RegistrationKind,
    ) -> std::result::Result<SubscribeAck, RegistryError> {
        match kind {
            RegistrationKind::Initial => self.registry.subscribe(request).await,
            RegistrationKind::Update => {
                let body = request
                    .to_body()
                    .map_err(|e| RegistryError::InvalidRequest(e.to_string()))?;
                let authorization = authorization_header(
                    self.keys.as_ref(),
                    &request.subscriber_id,
                    &request.key_id,
                    &body,
                    Utc::now(),
                )
                .await
                .map_err(|e| RegistryError::InvalidRequest(e.to_string()))?;
                self.registry.update_subscription(request, &authorization).await
            }
        }
    }

    async fn record_accepted(
        &self,
        subscriber_id: &str,
        key_id: &str,
        round: u64,
        ack: SubscribeAck,
    ) -> Result<Subscription> {
        let stored = self
            .mutate(subscriber_id, key_id, |sub| {
                if !in_round(sub, round) {
                    return Ok(false);
                }
                let advanced = apply_outcome(sub, Event::RegistryAccepted)?;
                if advanced {
                    sub.registry_message_id = Some(ack.message_id.clone());
                }
                Ok(advanced)
            })
            .await?;

        info!(
            subscriber_id = %subscriber_id,
            key_id = %key_id,
            message_id = %ack.message_id,
            status = %stored.status,
            "Registry acknowledged subscription"
        );
        Ok(stored)
    }

    // =========================================================================
    // Helpers
    // =========================================================================

    async fn find_challenge_target(&self, subscriber_id: &str) -> Result<Subscription> {
        let mut candidates: Vec<_> = self
            .store
            .list_by_subscriber(subscriber_id)
            .await?
            .into_iter()
            .filter(|s| s.status.accepts_challenge())
            .collect();

        match candidates.len() {
            0 => Err(SubscriptionError::not_found(subscriber_id, "*")),
            1 => Ok(candidates.remove(0)),
            n => Err(SubscriptionError::Validation(format!(
                "key_id required: {} pending subscriptions for {}",
                n, subscriber_id
            ))),
        }
    }

    /// Read-modify-CAS until `change` commits, declines, or fails
    ///
    /// `change` returns `Ok(false)` to leave the record unwritten.
    async fn mutate<F>(&self, subscriber_id: &str, key_id: &str, mut change: F) -> Result<Subscription>
    where
        F: FnMut(&mut Subscription) -> Result<bool>,
    {
        for round in 1..=MAX_CAS_ROUNDS {
            let current = self.store.get(subscriber_id, key_id).await?;
            let expected = current.version;

            let mut next = current.clone();
            if !change(&mut next)? {
                return Ok(current);
            }

            match self.store.put(next, expected).await {
                Ok(stored) => return Ok(stored),
                Err(StorageError::VersionConflict { actual, .. }) => {
                    debug!(
                        subscriber_id = %subscriber_id,
                        key_id = %key_id,
                        round,
                        expected,
                        actual,
                        "Lost CAS race, retrying"
                    );
                }
                Err(e) => return Err(e.into()),
            }
        }

        Err(SubscriptionError::Storage(format!(
            "{}/{}: no commit after {} CAS rounds",
            subscriber_id, key_id, MAX_CAS_ROUNDS
        )))
    }
}

/// Whether a registry outcome for `round` may still touch `sub`
///
/// An `INITIATED` record keeps its version until the round ends, so a
/// different version means a later round owns the record.
fn in_round(sub: &Subscription, round: u64) -> bool {
    if sub.status == SubscriptionStatus::Initiated && sub.version != round {
        debug!(
            subscriber_id = %sub.subscriber_id,
            key_id = %sub.key_id,
            round,
            current = sub.version,
            "Dropping outcome of superseded registration round"
        );
        return false;
    }
    true
}

fn apply_outcome(sub: &mut Subscription, event: Event) -> Result<bool> {
    match apply(sub.status, event)? {
        Outcome::Advance(next) => {
            sub.set_status(next);
            Ok(true)
        }
        Outcome::Ignore => Ok(false),
    }
}
