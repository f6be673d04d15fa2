//! Pub/sub client façade
//!
//! `PubsubClient` is the handle applications use. It turns typed subscribe
//! calls into [`Topic`]s and hands them to the session, which keeps them
//! alive across reconnects.
//!
//! # Cloning
//!
//! The client is a thin wrapper around an `Arc`ed session. Clones share the
//! connection, the registry and the listeners, so the client can be passed
//! freely between tasks.
//!
//! # Ids Across Reconnects
//!
//! A reconnect replays every subscription under a fresh id. Ids handed out
//! before the reconnect become stale: `unsubscribe` with a stale id returns
//! `Ok(false)`. Use [`PubsubClient::subscriptions`] or
//! [`PubsubClient::subscription_id_by_account`] to find the current id.

use crate::connection_state::{ConnectionState, SessionStatus};
use crate::registry::{Subscription, SubscriptionId};
use crate::session::Session;
use crate::{ClientBuilder, Listener};
use solsub_core::{Commitment, Encoding, LogsFilter, Result, Topic};
use std::sync::OnceLock;
use std::time::Duration;

static SHARED: OnceLock<PubsubClient> = OnceLock::new();

/// Reconnecting Solana pub/sub client
#[derive(Clone)]
pub struct PubsubClient {
    pub(crate) session: Session,
}

impl PubsubClient {
    /// Client for `endpoint` with the default transport and backoff
    ///
    /// Nothing is dialed until the first subscription or `connect`.
    pub fn new(endpoint: impl Into<String>) -> Self {
        ClientBuilder::new(endpoint).build_without_observability()
    }

    /// Process-wide client, created on first use
    ///
    /// The endpoint of the first call wins; later calls return the same
    /// client whatever endpoint they pass.
    pub fn shared(endpoint: &str) -> PubsubClient {
        let client = SHARED.get_or_init(|| {
            tracing::info!(endpoint, "Creating shared pub/sub client");
            PubsubClient::new(endpoint)
        });
        if client.endpoint() != endpoint {
            tracing::warn!(
                requested = endpoint,
                endpoint = client.endpoint(),
                "Shared client already bound to another endpoint"
            );
        }
        client.clone()
    }

    /// Watch an account with `finalized` commitment and `jsonParsed` encoding
    #[tracing::instrument(skip(self, listener), fields(address = %address.as_ref()))]
    pub async fn account_subscribe(
        &self,
        address: impl AsRef<str>,
        listener: Listener,
    ) -> Result<SubscriptionId> {
        self.session
            .subscribe(Topic::account(address.as_ref()), listener)
            .await
    }

    #[tracing::instrument(skip(self, listener), fields(address = %address.as_ref()))]
    pub async fn account_subscribe_with(
        &self,
        address: impl AsRef<str>,
        listener: Listener,
        commitment: Commitment,
        encoding: Encoding,
    ) -> Result<SubscriptionId> {
        let topic = Topic::Account {
            address: address.as_ref().to_string(),
            commitment,
            encoding,
        };
        self.session.subscribe(topic, listener).await
    }

    /// Wait for a transaction signature to reach `finalized`
    ///
    /// The subscription is removed after its notification is delivered.
    #[tracing::instrument(skip(self, listener), fields(signature = %signature.as_ref()))]
    pub async fn signature_subscribe(
        &self,
        signature: impl AsRef<str>,
        listener: Listener,
    ) -> Result<SubscriptionId> {
        self.session
            .subscribe(Topic::signature(signature.as_ref()), listener)
            .await
    }

    #[tracing::instrument(skip(self, listener), fields(signature = %signature.as_ref()))]
    pub async fn signature_subscribe_with(
        &self,
        signature: impl AsRef<str>,
        listener: Listener,
        commitment: Commitment,
    ) -> Result<SubscriptionId> {
        let topic = Topic::signature(signature.as_ref()).with_commitment(commitment);
        self.session.subscribe(topic, listener).await
    }

    /// Logs of transactions mentioning any of `mentions`
    #[tracing::instrument(skip(self, mentions, listener))]
    pub async fn logs_subscribe<I, S>(&self, mentions: I, listener: Listener) -> Result<SubscriptionId>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.session.subscribe(Topic::logs(mentions), listener).await
    }

    #[tracing::instrument(skip(self, mentions, listener))]
    pub async fn logs_subscribe_with<I, S>(
        &self,
        mentions: I,
        listener: Listener,
        commitment: Commitment,
    ) -> Result<SubscriptionId>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let topic = Topic::logs(mentions).with_commitment(commitment);
        self.session.subscribe(topic, listener).await
    }

    /// Logs subscription with an explicit filter (`all`, `allWithVotes`)
    #[tracing::instrument(skip(self, listener))]
    pub async fn logs_subscribe_filter(
        &self,
        filter: LogsFilter,
        listener: Listener,
        commitment: Commitment,
    ) -> Result<SubscriptionId> {
        let topic = Topic::Logs { filter, commitment };
        self.session.subscribe(topic, listener).await
    }

    /// Subscribe to any topic
    #[tracing::instrument(skip(self, listener), fields(topic = %topic))]
    pub async fn subscribe(&self, topic: Topic, listener: Listener) -> Result<SubscriptionId> {
        self.session.subscribe(topic, listener).await
    }

    /// Cancel a subscription, `Ok(false)` if the id is unknown or stale
    #[tracing::instrument(skip(self), fields(subscription_id = %id))]
    pub async fn unsubscribe(&self, id: SubscriptionId) -> Result<bool> {
        self.session.unsubscribe(id).await
    }

    /// Wait up to `timeout` for an established connection
    pub async fn wait_for_connection(&self, timeout: Duration) -> bool {
        self.session.wait_for_connection(timeout).await
    }

    /// Start connecting without subscribing
    #[tracing::instrument(skip(self), fields(endpoint = %self.endpoint()))]
    pub async fn connect(&self) -> Result<()> {
        self.session.connect().await
    }

    /// Close the connection, keeping subscriptions for the next connect
    #[tracing::instrument(skip(self), fields(endpoint = %self.endpoint()))]
    pub async fn disconnect(&self) -> Result<()> {
        self.session.disconnect().await
    }

    /// Close the connection and drop every subscription for good
    #[tracing::instrument(skip(self), fields(endpoint = %self.endpoint()))]
    pub async fn terminate(&self) -> Result<()> {
        self.session.terminate().await
    }

    pub fn state(&self) -> ConnectionState {
        self.session.state()
    }

    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    /// Connection generation, incremented on every established connection
    pub fn generation(&self) -> u64 {
        self.session.generation()
    }

    pub fn status(&self) -> SessionStatus {
        self.session.status()
    }

    /// Receiver that observes state changes
    pub fn watch_status(&self) -> tokio::sync::watch::Receiver<SessionStatus> {
        self.session.watch_status()
    }

    pub fn endpoint(&self) -> &str {
        self.session.endpoint()
    }

    /// Snapshot of every registered subscription in registration order
    pub fn subscriptions(&self) -> Vec<Subscription> {
        self.session.subscriptions()
    }

    /// Current id of a subscription on `address`, if any
    ///
    /// Matches account subscriptions on the address regardless of
    /// commitment or encoding.
    pub fn subscription_id_by_account(&self, address: &str) -> Option<SubscriptionId> {
        self.session
            .registry()
            .find_by_destination_prefix(&format!("/topic/account/{}/", address))
    }
}

impl std::fmt::Debug for PubsubClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PubsubClient")
            .field("endpoint", &self.endpoint())
            .field("status", &self.status())
            .finish()
    }
}
