//! Session state machine
//!
//! The session owns the single logical connection to a pub/sub endpoint and
//! keeps the registry's subscriptions alive on it.
//!
//! # Replay
//!
//! Every time the transport reports `connected`, the session:
//!
//! 1. advances the connection generation
//! 2. snapshots the registry, clears it (every old id becomes invalid) and
//!    closes all delivery lanes
//! 3. re-registers each snapshotted topic and listener under a fresh id
//! 4. sends one subscribe frame per record, in registration order, marking
//!    each Active once its frame went out
//! 5. publishes `Connected` with the new generation
//!
//! A record whose frame could not be sent stays Pending and is picked up by
//! the next replay.
//!
//! # Serialization
//!
//! Subscribe, unsubscribe, replay, disconnect and connection-loss handling
//! run under one async operation lock, so a subscribe issued while a replay
//! is in progress can never produce a duplicate frame. Inbound frames are
//! handled outside the lock; they only touch the registry, which is
//! internally synchronized.
//!
//! # Epochs
//!
//! Each connect attempt gets a new epoch, and its [`TransportEvents`] handle
//! is tagged with it. Disconnect and connection loss advance the epoch as
//! well, so callbacks from a connection the session already gave up on are
//! dropped.

use crate::connection_state::{ConnectionManager, ConnectionState, SessionStatus};
use crate::dispatcher::Dispatcher;
use crate::reconnect::ReconnectionStrategy;
use crate::registry::{Subscription, SubscriptionId, SubscriptionRegistry, SubscriptionStatus};
use crate::transport::{Transport, TransportEvents};
use crate::{ClientMetrics, Listener};
use parking_lot::Mutex as SyncMutex;
use solsub_core::{codec, Error, InboundFrame, Result, Topic, TopicKind};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

/// Handle to a session, cheap to clone
#[derive(Clone)]
pub struct Session {
    inner: Arc<SessionInner>,
}

pub(crate) struct SessionInner {
    endpoint: String,
    transport: Arc<dyn Transport>,
    manager: ConnectionManager,
    registry: SubscriptionRegistry,
    dispatcher: Dispatcher,
    op_lock: Mutex<()>,
    epoch: AtomicU64,
    /// Subscribe request ids unsubscribed before their ack arrived
    orphans: SyncMutex<HashMap<u64, TopicKind>>,
    auto_connect: bool,
    metrics: Option<Arc<ClientMetrics>>,
}

impl Session {
    pub fn new(
        endpoint: impl Into<String>,
        transport: Arc<dyn Transport>,
        strategy: Box<dyn ReconnectionStrategy>,
        auto_connect: bool,
        metrics: Option<Arc<ClientMetrics>>,
    ) -> Self {
        let registry = SubscriptionRegistry::new();
        let dispatcher = Dispatcher::new(registry.clone(), metrics.clone());
        Self {
            inner: Arc::new(SessionInner {
                endpoint: endpoint.into(),
                transport,
                manager: ConnectionManager::new(strategy, metrics.clone()),
                registry,
                dispatcher,
                op_lock: Mutex::new(()),
                epoch: AtomicU64::new(0),
                orphans: SyncMutex::new(HashMap::new()),
                auto_connect,
                metrics,
            }),
        }
    }

    /// Register a subscription and send it if connected
    ///
    /// While not connected the record stays Pending and, with auto-connect
    /// on, a connection is started. The connect itself runs in the
    /// background and is never awaited here.
    pub async fn subscribe(&self, topic: Topic, listener: Listener) -> Result<SubscriptionId> {
        let inner = &self.inner;
        let id = {
            let _op = inner.op_lock.lock().await;
            if inner.manager.is_terminated() {
                return Err(Error::Terminated);
            }

            let id = inner.registry.add(topic.clone(), listener);
            if inner.manager.state() == ConnectionState::Connected {
                if let Err(e) = inner.send_subscribe(id, &topic).await {
                    tracing::warn!(subscription_id = %id, error = %e, "Subscribe frame not sent, left pending");
                }
            }
            id
        };

        tracing::debug!(subscription_id = %id, topic = %topic, "Subscription registered");
        if inner.auto_connect {
            inner.start_connect();
        }
        Ok(id)
    }

    /// Remove a subscription
    ///
    /// Returns `Ok(false)` for unknown or stale ids. An Active subscription
    /// is also cancelled on the node, immediately if its server id is known
    /// and otherwise as soon as the acknowledgement arrives.
    pub async fn unsubscribe(&self, id: SubscriptionId) -> Result<bool> {
        let inner = &self.inner;
        let _op = inner.op_lock.lock().await;
        if inner.manager.is_terminated() {
            return Err(Error::Terminated);
        }

        let Some(current) = inner.registry.get(id) else {
            tracing::debug!(subscription_id = %id, "Unsubscribe for unknown subscription");
            return Ok(false);
        };
        let kind = current.topic.kind();
        let on_node = current.status == SubscriptionStatus::Active
            && inner.manager.state() == ConnectionState::Connected;

        // the orphan must exist before the record is gone, an ack that misses
        // the record then always finds it
        if on_node {
            inner.orphans.lock().insert(id.0, kind);
        }
        let Some(record) = inner.registry.remove(id) else {
            inner.orphans.lock().remove(&id.0);
            return Ok(false);
        };
        inner.dispatcher.close_lane(id);

        if on_node {
            if let Some(server_id) = record.server_id {
                // bound before removal, the ack path left the orphan alone
                inner.orphans.lock().remove(&id.0);
                inner.send_unsubscribe(kind, server_id).await;
            }
        }

        tracing::debug!(subscription_id = %id, topic = %record.topic, "Subscription removed");
        Ok(true)
    }

    /// Start connecting if disconnected
    ///
    /// Returns once the attempt is underway; use `wait_for_connection` to
    /// learn when it succeeded.
    pub async fn connect(&self) -> Result<()> {
        if self.inner.manager.is_terminated() {
            return Err(Error::Terminated);
        }
        self.inner.start_connect();
        Ok(())
    }

    /// Close the connection but keep every subscription
    ///
    /// Records become Pending and are replayed by the next `connect` (or the
    /// next `subscribe` when auto-connect is on).
    pub async fn disconnect(&self) -> Result<()> {
        let inner = &self.inner;
        let epoch = {
            let _op = inner.op_lock.lock().await;
            if inner.manager.is_terminated() {
                return Err(Error::Terminated);
            }
            let epoch = inner.advance_epoch();
            inner.registry.mark_all_pending();
            inner.orphans.lock().clear();
            inner.manager.disconnected();
            epoch
        };
        tracing::info!(endpoint = %inner.endpoint, "Session disconnected");
        inner.transport.disconnect(epoch).await
    }

    /// Shut the session down for good
    ///
    /// Clears the registry and closes every delivery lane. Later operations
    /// fail with `Error::Terminated`. Terminating twice is a no-op.
    pub async fn terminate(&self) -> Result<()> {
        let inner = &self.inner;
        if inner.manager.terminate() == ConnectionState::Terminated {
            return Ok(());
        }
        let epoch = {
            let _op = inner.op_lock.lock().await;
            let epoch = inner.advance_epoch();
            let dropped = inner.registry.clear(inner.registry.generation());
            inner.dispatcher.close_all();
            inner.orphans.lock().clear();
            tracing::info!(endpoint = %inner.endpoint, dropped, "Session terminated");
            epoch
        };
        inner.transport.disconnect(epoch).await
    }

    /// Wait up to `timeout` for a connection
    pub async fn wait_for_connection(&self, timeout: Duration) -> bool {
        self.inner.manager.wait_connected(timeout).await
    }

    pub fn state(&self) -> ConnectionState {
        self.inner.manager.state()
    }

    pub fn generation(&self) -> u64 {
        self.inner.manager.generation()
    }

    pub fn status(&self) -> SessionStatus {
        self.inner.manager.status()
    }

    /// Receiver observing every state change
    pub fn watch_status(&self) -> tokio::sync::watch::Receiver<SessionStatus> {
        self.inner.manager.watch()
    }

    pub fn endpoint(&self) -> &str {
        &self.inner.endpoint
    }

    pub fn registry(&self) -> &SubscriptionRegistry {
        &self.inner.registry
    }

    /// Copy of every registered subscription
    pub fn subscriptions(&self) -> Vec<Subscription> {
        self.inner.registry.records()
    }
}

impl SessionInner {
    pub(crate) fn is_current_epoch(&self, epoch: u64) -> bool {
        self.epoch.load(Ordering::SeqCst) == epoch
    }

    fn advance_epoch(&self) -> u64 {
        self.epoch.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn start_connect(self: &Arc<Self>) {
        if self.manager.begin_connecting() {
            tracing::info!(endpoint = %self.endpoint, "Connecting");
            tokio::spawn(Arc::clone(self).connect_loop(0, true));
        }
    }

    /// One connect attempt
    ///
    /// A failure is only returned while the attempt is still current; once
    /// a disconnect, terminate or newer attempt superseded it, the loop that
    /// owns the newer attempt is in charge.
    async fn dial(self: &Arc<Self>) -> Result<()> {
        let epoch = self.advance_epoch();
        let events = TransportEvents::new(self, epoch);
        if let Err(e) = self.transport.connect(&self.endpoint, events).await {
            if self.is_current_epoch(epoch) {
                return Err(e);
            }
            tracing::debug!(epoch, error = %e, "Superseded connect attempt failed");
            return Ok(());
        }

        // disconnected or terminated while the dial was in flight
        if !self.is_current_epoch(epoch)
            && matches!(
                self.manager.state(),
                ConnectionState::Disconnected | ConnectionState::Terminated
            )
        {
            tracing::debug!(epoch, "Dropping connection opened after disconnect");
            let current = self.epoch.load(Ordering::SeqCst);
            self.transport.disconnect(current).await?;
        }
        Ok(())
    }

    /// Dial until a connect attempt succeeds or the strategy gives up
    ///
    /// With `dial_now` the first attempt is made straight away (the session
    /// must be Connecting); otherwise the session is already Reconnecting
    /// and waits for the strategy's first delay.
    async fn connect_loop(self: Arc<Self>, mut attempt: u32, mut dial_now: bool) {
        loop {
            if dial_now {
                match self.dial().await {
                    Ok(()) => return,
                    Err(e) => {
                        tracing::warn!(endpoint = %self.endpoint, attempt, error = %e, "Connect attempt failed");
                        if let Some(ref m) = self.metrics {
                            m.record_error("connect");
                        }
                        if !self.manager.compare_and_set(
                            |s| *s == ConnectionState::Connecting,
                            ConnectionState::Reconnecting { attempt },
                        ) {
                            return;
                        }
                    }
                }
            }
            dial_now = true;

            let Some(delay) = self.manager.next_reconnect_delay(attempt) else {
                if self.manager.compare_and_set(
                    |s| matches!(s, ConnectionState::Reconnecting { .. }),
                    ConnectionState::Disconnected,
                ) {
                    tracing::error!(endpoint = %self.endpoint, attempt, "Reconnection abandoned");
                }
                return;
            };

            tracing::info!(delay_ms = delay.as_millis() as u64, attempt, "Reconnecting");
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }

            // a disconnect or terminate during the delay wins
            if !self.manager.compare_and_set(
                |s| matches!(s, ConnectionState::Reconnecting { .. }),
                ConnectionState::Connecting,
            ) {
                return;
            }
            if let Some(ref m) = self.metrics {
                m.record_reconnection_attempt();
            }
            attempt = attempt.saturating_add(1);
        }
    }

    pub(crate) async fn on_connected(self: &Arc<Self>, epoch: u64) {
        let _op = self.op_lock.lock().await;
        if !self.is_current_epoch(epoch) || self.manager.state() != ConnectionState::Connecting {
            tracing::debug!(epoch, "Ignoring stale connected event");
            return;
        }

        let generation = self.manager.generation() + 1;
        let snapshot = self.registry.snapshot();
        self.registry.clear(generation);
        self.dispatcher.close_all();
        self.orphans.lock().clear();

        let total = snapshot.len();
        let mut replayed = 0u64;
        for entry in snapshot {
            let topic = entry.topic;
            let id = self.registry.add(topic.clone(), entry.listener);
            match self.send_subscribe(id, &topic).await {
                Ok(()) => replayed += 1,
                Err(e) => {
                    tracing::warn!(subscription_id = %id, topic = %topic, error = %e, "Replay frame not sent, left pending");
                }
            }
        }

        if !self.manager.connected(generation) {
            return;
        }
        if let Some(ref m) = self.metrics {
            m.record_replay(replayed);
            if generation > 1 {
                m.record_reconnection_success();
            }
        }
        tracing::info!(
            endpoint = %self.endpoint,
            generation,
            replayed,
            total,
            "Session connected"
        );
    }

    pub(crate) async fn on_transport_lost(self: &Arc<Self>, epoch: u64, reason: &str) {
        {
            let _op = self.op_lock.lock().await;
            if !self.is_current_epoch(epoch) {
                return;
            }
            self.advance_epoch();
            let demoted = self.registry.mark_all_pending();
            self.orphans.lock().clear();
            if !self.manager.compare_and_set(
                |s| matches!(s, ConnectionState::Connected | ConnectionState::Connecting),
                ConnectionState::Reconnecting { attempt: 0 },
            ) {
                return;
            }
            tracing::warn!(endpoint = %self.endpoint, reason, demoted, "Connection lost");
            if let Some(ref m) = self.metrics {
                m.record_error("transport");
            }
        }
        tokio::spawn(Arc::clone(self).connect_loop(0, false));
    }

    pub(crate) async fn on_frame(self: &Arc<Self>, epoch: u64, text: &str) {
        if !self.is_current_epoch(epoch) {
            return;
        }

        let frame = match codec::decode(text) {
            Ok(frame) => frame,
            Err(e) => {
                tracing::warn!(error = %e, "Dropping malformed frame");
                self.dispatcher.record_drop("malformed");
                return;
            }
        };

        match frame {
            InboundFrame::SubscribeAck {
                request_id,
                server_id,
            } => {
                let id = SubscriptionId(request_id);
                if self.registry.bind_server_id(id, server_id) {
                    tracing::debug!(subscription_id = %id, server_id, "Subscription acknowledged");
                    return;
                }
                let orphan = self.orphans.lock().remove(&request_id);
                match orphan {
                    Some(kind) => self.send_unsubscribe(kind, server_id).await,
                    None => {
                        tracing::debug!(request_id, server_id, "Acknowledgement for unknown request")
                    }
                }
            }
            InboundFrame::UnsubscribeAck {
                request_id,
                unsubscribed,
            } => {
                tracing::debug!(request_id, unsubscribed, "Unsubscribe acknowledged");
            }
            InboundFrame::Rejected { request_id, error } => {
                if let Some(ref m) = self.metrics {
                    m.record_error("rejected");
                }
                let removed = request_id.and_then(|id| self.registry.remove(SubscriptionId(id)));
                match removed {
                    Some(record) => {
                        self.dispatcher.close_lane(record.id);
                        tracing::warn!(
                            subscription_id = %record.id,
                            topic = %record.topic,
                            error = %error,
                            "Subscription rejected by node"
                        );
                    }
                    None => {
                        if let Some(id) = request_id {
                            self.orphans.lock().remove(&id);
                        }
                        tracing::warn!(request_id = ?request_id, error = %error, "Request rejected by node");
                    }
                }
            }
            InboundFrame::Notification {
                server_id, payload, ..
            } => {
                let Some((id, kind)) = self.dispatcher.dispatch(server_id, payload) else {
                    return;
                };
                // the node drops one-shot subscriptions after their notification
                if kind.is_one_shot() && self.registry.remove(id).is_some() {
                    self.dispatcher.close_lane(id);
                    tracing::debug!(subscription_id = %id, kind = %kind, "One-shot subscription completed");
                }
            }
        }
    }

    async fn send_subscribe(&self, id: SubscriptionId, topic: &Topic) -> Result<()> {
        let frame = codec::encode_subscribe(id.0, topic)?;
        self.transport.send(frame).await?;
        self.registry.mark_active(id);
        if let Some(ref m) = self.metrics {
            m.record_subscribe(topic.kind());
        }
        tracing::debug!(subscription_id = %id, method = topic.kind().subscribe_method(), "Subscribe frame sent");
        Ok(())
    }

    async fn send_unsubscribe(&self, kind: TopicKind, server_id: u64) {
        let request_id = self.registry.next_id();
        let sent = match codec::encode_unsubscribe(request_id.0, kind, server_id) {
            Ok(frame) => self.transport.send(frame).await,
            Err(e) => Err(e),
        };
        match sent {
            Ok(()) => {
                tracing::debug!(server_id, method = kind.unsubscribe_method(), "Unsubscribe frame sent")
            }
            Err(e) => {
                tracing::warn!(server_id, method = kind.unsubscribe_method(), error = %e, "Unsubscribe frame not sent")
            }
        }
    }
}
