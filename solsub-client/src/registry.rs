//! Subscription registry
//!
//! The registry is the single source of truth for what the caller wants to
//! observe, independent of whether a connection currently exists. The
//! session replays it after every (re)connection.
//!
//! # Records
//!
//! Each record pairs a [`Topic`] with the caller's [`Listener`] and tracks:
//!
//! - **status**: `Pending` until a subscribe frame went out on the current
//!   connection, `Active` afterwards
//! - **generation**: the connection generation the id belongs to
//! - **server_id**: the subscription number the node acknowledged, used to
//!   route notifications
//!
//! # Thread Safety
//!
//! All operations take a short `parking_lot::RwLock` critical section and
//! never await, so the registry can be used from any thread or task. A
//! snapshot is a copy taken under the read lock: every record in it is
//! either fully added or absent.

use crate::Listener;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use solsub_core::{Topic, TopicKind};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Opaque subscription identifier
///
/// Ids are unique for the lifetime of a session and are never reused. A
/// reconnect assigns every replayed subscription a fresh id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SubscriptionId(pub u64);

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Delivery status of a subscription on the current connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SubscriptionStatus {
    /// Registered but not yet sent on an established connection
    Pending,
    /// A subscribe frame was sent on the current connection
    Active,
}

/// One registered subscription
#[derive(Debug, Clone)]
pub struct Subscription {
    pub id: SubscriptionId,
    pub topic: Topic,
    pub listener: Listener,
    pub status: SubscriptionStatus,
    pub generation: u64,
    pub server_id: Option<u64>,
}

/// Point-in-time copy of a record used for replay
#[derive(Debug, Clone)]
pub struct SubscriptionEntry {
    pub id: SubscriptionId,
    pub topic: Topic,
    pub listener: Listener,
}

#[derive(Default)]
struct RegistryState {
    /// Ordered by id, which is insertion order
    records: BTreeMap<SubscriptionId, Subscription>,
    by_server_id: HashMap<u64, SubscriptionId>,
    generation: u64,
}

/// Thread-safe store of subscriptions
#[derive(Clone)]
pub struct SubscriptionRegistry {
    state: Arc<RwLock<RegistryState>>,
    next_id: Arc<AtomicU64>,
}

impl SubscriptionRegistry {
    /// Create an empty registry at generation 0
    pub fn new() -> Self {
        Self {
            state: Arc::new(RwLock::new(RegistryState::default())),
            next_id: Arc::new(AtomicU64::new(1)),
        }
    }

    /// Allocate a fresh id without creating a record
    ///
    /// Also used for unsubscribe request ids so every outbound request id is
    /// unique.
    pub fn next_id(&self) -> SubscriptionId {
        SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    /// Register a subscription as Pending under the current generation
    pub fn add(&self, topic: Topic, listener: Listener) -> SubscriptionId {
        let id = self.next_id();
        let mut state = self.state.write();
        let generation = state.generation;
        state.records.insert(
            id,
            Subscription {
                id,
                topic,
                listener,
                status: SubscriptionStatus::Pending,
                generation,
                server_id: None,
            },
        );
        id
    }

    /// Remove a subscription, returning the removed record
    ///
    /// Unknown and stale ids return `None`.
    pub fn remove(&self, id: SubscriptionId) -> Option<Subscription> {
        let mut state = self.state.write();
        let record = state.records.remove(&id)?;
        if let Some(server_id) = record.server_id {
            state.by_server_id.remove(&server_id);
        }
        Some(record)
    }

    /// Copy of every (id, topic, listener) in insertion order
    pub fn snapshot(&self) -> Vec<SubscriptionEntry> {
        self.state
            .read()
            .records
            .values()
            .map(|r| SubscriptionEntry {
                id: r.id,
                topic: r.topic.clone(),
                listener: r.listener.clone(),
            })
            .collect()
    }

    /// Copy of every full record in insertion order
    pub fn records(&self) -> Vec<Subscription> {
        self.state.read().records.values().cloned().collect()
    }

    pub fn get(&self, id: SubscriptionId) -> Option<Subscription> {
        self.state.read().records.get(&id).cloned()
    }

    pub fn status(&self, id: SubscriptionId) -> Option<SubscriptionStatus> {
        self.state.read().records.get(&id).map(|r| r.status)
    }

    pub fn contains(&self, id: SubscriptionId) -> bool {
        self.state.read().records.contains_key(&id)
    }

    /// Promote a record to Active, false if it no longer exists
    pub fn mark_active(&self, id: SubscriptionId) -> bool {
        match self.state.write().records.get_mut(&id) {
            Some(record) => {
                record.status = SubscriptionStatus::Active;
                true
            }
            None => false,
        }
    }

    /// Demote every record to Pending after the connection was lost
    ///
    /// Server ids die with the connection, so they are forgotten too.
    /// Returns the number of records that were Active.
    pub fn mark_all_pending(&self) -> usize {
        let mut state = self.state.write();
        state.by_server_id.clear();
        let mut demoted = 0;
        for record in state.records.values_mut() {
            if record.status == SubscriptionStatus::Active {
                demoted += 1;
            }
            record.status = SubscriptionStatus::Pending;
            record.server_id = None;
        }
        demoted
    }

    /// Attach the server-assigned subscription number to a record
    pub fn bind_server_id(&self, id: SubscriptionId, server_id: u64) -> bool {
        let mut state = self.state.write();
        let previous = match state.records.get_mut(&id) {
            Some(record) => record.server_id.replace(server_id),
            None => return false,
        };
        if let Some(previous) = previous {
            state.by_server_id.remove(&previous);
        }
        state.by_server_id.insert(server_id, id);
        true
    }

    /// Route a server subscription number to its record's id and listener
    pub fn resolve_server_id(&self, server_id: u64) -> Option<(SubscriptionId, TopicKind, Listener)> {
        let state = self.state.read();
        let id = state.by_server_id.get(&server_id)?;
        state
            .records
            .get(id)
            .map(|r| (r.id, r.topic.kind(), r.listener.clone()))
    }

    /// First subscription whose topic matches the predicate
    pub fn find_by_topic<P>(&self, predicate: P) -> Option<SubscriptionId>
    where
        P: Fn(&Topic) -> bool,
    {
        self.state
            .read()
            .records
            .values()
            .find(|r| predicate(&r.topic))
            .map(|r| r.id)
    }

    /// First subscription whose topic destination starts with `prefix`
    pub fn find_by_destination_prefix(&self, prefix: &str) -> Option<SubscriptionId> {
        self.find_by_topic(|topic| topic.destination().starts_with(prefix))
    }

    /// Drop every record and move to `generation`
    ///
    /// Returns the number of records dropped.
    pub fn clear(&self, generation: u64) -> usize {
        let mut state = self.state.write();
        let dropped = state.records.len();
        state.records.clear();
        state.by_server_id.clear();
        state.generation = generation;
        dropped
    }

    /// Generation new records are tagged with
    pub fn generation(&self) -> u64 {
        self.state.read().generation
    }

    pub fn len(&self) -> usize {
        self.state.read().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.read().records.is_empty()
    }
}

impl Default for SubscriptionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn noop() -> Listener {
        Listener::from_fn(|_| {})
    }

    #[test]
    fn test_add_and_remove() {
        let registry = SubscriptionRegistry::new();
        let id = registry.add(Topic::account("addr1"), noop());

        assert_eq!(registry.len(), 1);
        assert_eq!(registry.status(id), Some(SubscriptionStatus::Pending));

        let removed = registry.remove(id).unwrap();
        assert_eq!(removed.topic, Topic::account("addr1"));
        assert!(registry.is_empty());

        // second removal and unknown ids are no-ops
        assert!(registry.remove(id).is_none());
        assert!(registry.remove(SubscriptionId(9999)).is_none());
    }

    #[test]
    fn test_snapshot_is_ordered_copy() {
        let registry = SubscriptionRegistry::new();
        let a = registry.add(Topic::account("a"), noop());
        let b = registry.add(Topic::signature("b"), noop());
        let c = registry.add(Topic::logs(["c"]), noop());

        let snapshot = registry.snapshot();
        let ids: Vec<_> = snapshot.iter().map(|e| e.id).collect();
        assert_eq!(ids, vec![a, b, c]);

        // mutations after the snapshot don't show up in it
        registry.remove(b);
        assert_eq!(snapshot.len(), 3);
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_mark_active_and_pending() {
        let registry = SubscriptionRegistry::new();
        let a = registry.add(Topic::account("a"), noop());
        let b = registry.add(Topic::account("b"), noop());

        assert!(registry.mark_active(a));
        assert!(registry.bind_server_id(a, 77));
        assert_eq!(registry.status(a), Some(SubscriptionStatus::Active));
        assert_eq!(registry.status(b), Some(SubscriptionStatus::Pending));
        assert!(!registry.mark_active(SubscriptionId(12345)));

        assert_eq!(registry.mark_all_pending(), 1);
        assert_eq!(registry.status(a), Some(SubscriptionStatus::Pending));
        assert!(registry.resolve_server_id(77).is_none());
        assert!(registry.get(a).unwrap().server_id.is_none());
    }

    #[test]
    fn test_server_id_routing() {
        let registry = SubscriptionRegistry::new();
        let listener = noop();
        let id = registry.add(Topic::logs(["x"]), listener.clone());

        assert!(registry.resolve_server_id(5).is_none());
        assert!(registry.bind_server_id(id, 5));
        let (resolved, kind, routed) = registry.resolve_server_id(5).unwrap();
        assert_eq!(resolved, id);
        assert_eq!(kind, TopicKind::Logs);
        assert!(routed.same_as(&listener));

        // rebinding drops the old index entry
        assert!(registry.bind_server_id(id, 6));
        assert!(registry.resolve_server_id(5).is_none());
        assert!(registry.resolve_server_id(6).is_some());

        registry.remove(id);
        assert!(registry.resolve_server_id(6).is_none());
        assert!(!registry.bind_server_id(id, 7));
    }

    #[test]
    fn test_find_by_destination_prefix() {
        let registry = SubscriptionRegistry::new();
        registry.add(Topic::signature("addr1"), noop());
        let account = registry.add(Topic::account("addr1"), noop());

        assert_eq!(
            registry.find_by_destination_prefix("/topic/account/addr1"),
            Some(account)
        );
        assert_eq!(registry.find_by_destination_prefix("/topic/account/addr2"), None);
        assert_eq!(
            registry.find_by_topic(|t| t.kind() == TopicKind::Account),
            Some(account)
        );
    }

    #[test]
    fn test_clear_advances_generation() {
        let registry = SubscriptionRegistry::new();
        let old = registry.add(Topic::account("a"), noop());
        assert_eq!(registry.get(old).unwrap().generation, 0);

        assert_eq!(registry.clear(1), 1);
        assert!(registry.is_empty());
        assert!(!registry.contains(old));

        let new = registry.add(Topic::account("a"), noop());
        assert_ne!(old, new);
        assert_eq!(registry.get(new).unwrap().generation, 1);
        assert_eq!(registry.generation(), 1);
    }

    #[test]
    fn test_concurrent_adds() {
        let registry = SubscriptionRegistry::new();
        let handles: Vec<_> = (0..8)
            .map(|t| {
                let registry = registry.clone();
                std::thread::spawn(move || {
                    (0..50)
                        .map(|i| registry.add(Topic::account(format!("addr-{}-{}", t, i)), noop()))
                        .collect::<Vec<_>>()
                })
            })
            .collect();

        let mut ids = HashSet::new();
        for handle in handles {
            for id in handle.join().unwrap() {
                assert!(ids.insert(id));
            }
        }
        assert_eq!(ids.len(), 400);
        assert_eq!(registry.len(), 400);
        assert_eq!(registry.snapshot().len(), 400);
    }
}
