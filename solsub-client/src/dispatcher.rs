//! Notification dispatch
//!
//! The dispatcher routes a decoded notification to the listener of the
//! subscription it belongs to. Routing goes through the registry's
//! server-id index; notifications for unknown subscriptions (already
//! removed, or from a previous connection) are dropped and counted.
//!
//! # Delivery Lanes
//!
//! Every subscription that receives a notification gets a lane: an
//! unbounded channel drained by its own tokio task. The transport's reader
//! only enqueues, so:
//!
//! - notifications for one subscription reach its listener in the order the
//!   transport delivered them
//! - a slow or stuck listener delays only its own lane
//! - a panicking listener is caught at the lane and the lane keeps going
//!
//! Lanes are closed when their subscription is removed and all at once when
//! the registry is cleared for a new connection generation. Notifications
//! already queued on a closed lane are still delivered.

use crate::registry::{SubscriptionId, SubscriptionRegistry};
use crate::{ClientMetrics, Listener};
use futures::FutureExt;
use parking_lot::Mutex;
use solsub_core::TopicKind;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::sync::mpsc;

type Lane = mpsc::UnboundedSender<serde_json::Value>;

/// Routes notifications to per-subscription delivery lanes
#[derive(Clone)]
pub struct Dispatcher {
    registry: SubscriptionRegistry,
    lanes: Arc<Mutex<HashMap<SubscriptionId, Lane>>>,
    metrics: Option<Arc<ClientMetrics>>,
}

impl Dispatcher {
    pub fn new(registry: SubscriptionRegistry, metrics: Option<Arc<ClientMetrics>>) -> Self {
        Self {
            registry,
            lanes: Arc::new(Mutex::new(HashMap::new())),
            metrics,
        }
    }

    /// Route a notification by server subscription number
    ///
    /// Returns the local id and family of the subscription the payload was
    /// queued for, or `None` when it was dropped.
    pub fn dispatch(
        &self,
        server_id: u64,
        payload: serde_json::Value,
    ) -> Option<(SubscriptionId, TopicKind)> {
        let Some((id, kind, listener)) = self.registry.resolve_server_id(server_id) else {
            tracing::debug!(server_id, "Dropping notification for unknown subscription");
            self.record_drop("unknown_subscription");
            return None;
        };

        let mut lanes = self.lanes.lock();
        if !lanes.contains_key(&id) {
            // the subscription may have been removed since it was resolved
            if !self.registry.contains(id) {
                tracing::debug!(subscription_id = %id, "Dropping notification for removed subscription");
                self.record_drop("removed_subscription");
                return None;
            }
            match spawn_lane(id, listener) {
                Some(lane) => {
                    lanes.insert(id, lane);
                }
                None => {
                    self.record_drop("no_runtime");
                    return None;
                }
            }
        }

        let delivered = lanes
            .get(&id)
            .map(|lane| lane.send(payload).is_ok())
            .unwrap_or(false);
        if !delivered {
            lanes.remove(&id);
            tracing::warn!(subscription_id = %id, "Delivery lane closed unexpectedly");
            self.record_drop("lane_closed");
            return None;
        }
        drop(lanes);

        if let Some(ref m) = self.metrics {
            m.record_notification(kind);
        }
        tracing::trace!(subscription_id = %id, server_id, kind = %kind, "Notification queued");
        Some((id, kind))
    }

    /// Close the lane of a removed subscription
    pub fn close_lane(&self, id: SubscriptionId) {
        self.lanes.lock().remove(&id);
    }

    /// Close every lane
    pub fn close_all(&self) {
        self.lanes.lock().clear();
    }

    /// Number of open lanes
    pub fn lane_count(&self) -> usize {
        self.lanes.lock().len()
    }

    pub(crate) fn record_drop(&self, reason: &str) {
        if let Some(ref m) = self.metrics {
            m.record_dropped(reason);
        }
    }
}

fn spawn_lane(id: SubscriptionId, listener: Listener) -> Option<Lane> {
    let handle = match tokio::runtime::Handle::try_current() {
        Ok(handle) => handle,
        Err(e) => {
            tracing::warn!(subscription_id = %id, error = %e, "No runtime to run listener on");
            return None;
        }
    };

    let (tx, mut rx) = mpsc::unbounded_channel::<serde_json::Value>();
    handle.spawn(async move {
        while let Some(payload) = rx.recv().await {
            let delivery = AssertUnwindSafe(async { listener.call(payload).await });
            if delivery.catch_unwind().await.is_err() {
                tracing::warn!(subscription_id = %id, "Listener panicked, notification discarded");
            }
        }
        tracing::trace!(subscription_id = %id, "Delivery lane closed");
    });
    Some(tx)
}

#[cfg(test)]
mod tests {
    use super::*;
    use solsub_core::Topic;
    use std::time::Duration;
    use tokio::sync::mpsc::unbounded_channel;

    async fn recv(rx: &mut mpsc::UnboundedReceiver<serde_json::Value>) -> serde_json::Value {
        tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("timed out waiting for delivery")
            .expect("channel closed")
    }

    fn forwarding_listener(tx: mpsc::UnboundedSender<serde_json::Value>) -> Listener {
        Listener::from_fn(move |payload| {
            let _ = tx.send(payload);
        })
    }

    #[tokio::test]
    async fn test_dispatch_preserves_order() {
        let registry = SubscriptionRegistry::new();
        let dispatcher = Dispatcher::new(registry.clone(), None);
        let (tx, mut rx) = unbounded_channel();

        let id = registry.add(Topic::account("a"), forwarding_listener(tx));
        registry.bind_server_id(id, 10);

        for n in 0..50 {
            assert_eq!(
                dispatcher.dispatch(10, serde_json::json!(n)),
                Some((id, TopicKind::Account))
            );
        }
        for n in 0..50 {
            assert_eq!(recv(&mut rx).await, serde_json::json!(n));
        }
        assert_eq!(dispatcher.lane_count(), 1);
    }

    #[tokio::test]
    async fn test_unknown_subscription_is_dropped() {
        let registry = SubscriptionRegistry::new();
        let dispatcher = Dispatcher::new(registry.clone(), None);
        assert!(dispatcher.dispatch(99, serde_json::json!({})).is_none());
        assert_eq!(dispatcher.lane_count(), 0);
    }

    #[tokio::test]
    async fn test_slow_listener_does_not_block_others() {
        let registry = SubscriptionRegistry::new();
        let dispatcher = Dispatcher::new(registry.clone(), None);

        let slow = registry.add(
            Topic::account("slow"),
            Listener::new(|_| async {
                tokio::time::sleep(Duration::from_secs(60)).await;
            }),
        );
        registry.bind_server_id(slow, 1);

        let (tx, mut rx) = unbounded_channel();
        let fast = registry.add(Topic::account("fast"), forwarding_listener(tx));
        registry.bind_server_id(fast, 2);

        dispatcher.dispatch(1, serde_json::json!("stuck"));
        dispatcher.dispatch(2, serde_json::json!("through"));
        assert_eq!(recv(&mut rx).await, serde_json::json!("through"));
    }

    #[tokio::test]
    async fn test_panicking_listener_is_contained() {
        let registry = SubscriptionRegistry::new();
        let dispatcher = Dispatcher::new(registry.clone(), None);
        let (tx, mut rx) = unbounded_channel();

        let id = registry.add(
            Topic::logs(["x"]),
            Listener::from_fn(move |payload| {
                if payload == serde_json::json!("boom") {
                    panic!("listener failure");
                }
                let _ = tx.send(payload);
            }),
        );
        registry.bind_server_id(id, 3);

        dispatcher.dispatch(3, serde_json::json!("boom"));
        dispatcher.dispatch(3, serde_json::json!("after"));
        assert_eq!(recv(&mut rx).await, serde_json::json!("after"));
        assert!(registry.contains(id));
    }

    #[tokio::test]
    async fn test_close_lane_after_removal() {
        let registry = SubscriptionRegistry::new();
        let dispatcher = Dispatcher::new(registry.clone(), None);
        let id = registry.add(Topic::account("a"), Listener::from_fn(|_| {}));
        registry.bind_server_id(id, 4);

        dispatcher.dispatch(4, serde_json::json!(1));
        assert_eq!(dispatcher.lane_count(), 1);

        registry.remove(id);
        dispatcher.close_lane(id);
        assert_eq!(dispatcher.lane_count(), 0);
        assert!(dispatcher.dispatch(4, serde_json::json!(2)).is_none());
    }
}
