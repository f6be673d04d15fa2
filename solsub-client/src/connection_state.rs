//! Connection state management
//!
//! Tracks the lifecycle of the session's single logical connection and owns
//! the reconnection strategy.
//!
//! # Connection States
//!
//! - **Disconnected**: initial state, and where the session rests after an
//!   explicit disconnect or when the strategy gave up
//! - **Connecting**: a transport connect is in flight
//! - **Connected**: the transport is up and the registry has been replayed
//! - **Reconnecting**: the connection was lost (or could not be made) and
//!   the session waits for the strategy's delay
//! - **Terminated**: shut down for good, no further transitions
//!
//! # State Transitions
//!
//! ```text
//! Disconnected → Connecting → Connected
//!       ↑           ↑   ↓         ↓
//!       └──── Reconnecting ←──────┘
//!
//! any → Terminated
//! ```
//!
//! # Connect Signal
//!
//! State and connection generation are published together through one
//! `tokio::sync::watch` value, so a waiter that observes `Connected` also
//! observes the generation that connection belongs to.

use crate::reconnect::ReconnectionStrategy;
use crate::ClientMetrics;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

/// Connection state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Not connected
    Disconnected,
    /// Transport connect in flight
    Connecting,
    /// Connected and subscriptions replayed
    Connected,
    /// Waiting before the next connection attempt
    Reconnecting { attempt: u32 },
    /// Shut down, rejects all further operations
    Terminated,
}

/// State and generation, published atomically
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionStatus {
    pub state: ConnectionState,
    /// Incremented every time a connection is established
    pub generation: u64,
}

/// Owns the session status and the reconnection strategy
pub struct ConnectionManager {
    status: watch::Sender<SessionStatus>,
    strategy: Mutex<Box<dyn ReconnectionStrategy>>,
    metrics: Option<Arc<ClientMetrics>>,
}

impl ConnectionManager {
    pub fn new(strategy: Box<dyn ReconnectionStrategy>, metrics: Option<Arc<ClientMetrics>>) -> Self {
        let (status, _) = watch::channel(SessionStatus {
            state: ConnectionState::Disconnected,
            generation: 0,
        });
        Self {
            status,
            strategy: Mutex::new(strategy),
            metrics,
        }
    }

    pub fn status(&self) -> SessionStatus {
        *self.status.borrow()
    }

    pub fn state(&self) -> ConnectionState {
        self.status.borrow().state
    }

    pub fn generation(&self) -> u64 {
        self.status.borrow().generation
    }

    pub fn is_terminated(&self) -> bool {
        self.state() == ConnectionState::Terminated
    }

    /// Receiver that observes every status change
    pub fn watch(&self) -> watch::Receiver<SessionStatus> {
        self.status.subscribe()
    }

    /// Move to `next` if the current state satisfies `expected`
    ///
    /// Terminated never matches, whatever `expected` says.
    pub fn compare_and_set<F>(&self, expected: F, next: ConnectionState) -> bool
    where
        F: Fn(&ConnectionState) -> bool,
    {
        let changed = self.status.send_if_modified(|status| {
            if status.state == ConnectionState::Terminated || !expected(&status.state) {
                return false;
            }
            status.state = next;
            true
        });
        if changed {
            tracing::debug!(state = ?next, "Connection state changed");
            self.record_state(&next);
        }
        changed
    }

    /// Disconnected → Connecting, false if a connection is already underway
    pub fn begin_connecting(&self) -> bool {
        self.compare_and_set(
            |s| *s == ConnectionState::Disconnected,
            ConnectionState::Connecting,
        )
    }

    /// Publish Connected together with the new generation
    ///
    /// Resets the reconnection strategy. Returns false if the session is no
    /// longer connecting.
    pub fn connected(&self, generation: u64) -> bool {
        let changed = self.status.send_if_modified(|status| {
            if status.state != ConnectionState::Connecting {
                return false;
            }
            *status = SessionStatus {
                state: ConnectionState::Connected,
                generation,
            };
            true
        });
        if changed {
            self.strategy.lock().reset();
            self.record_state(&ConnectionState::Connected);
        }
        changed
    }

    /// Move to Disconnected from any state but Terminated
    pub fn disconnected(&self) -> bool {
        self.compare_and_set(|_| true, ConnectionState::Disconnected)
    }

    /// Move to Terminated, returning the state it replaced
    pub fn terminate(&self) -> ConnectionState {
        let mut previous = ConnectionState::Terminated;
        self.status.send_if_modified(|status| {
            previous = status.state;
            if previous == ConnectionState::Terminated {
                return false;
            }
            status.state = ConnectionState::Terminated;
            true
        });
        if previous != ConnectionState::Terminated {
            self.record_state(&ConnectionState::Terminated);
        }
        previous
    }

    /// Ask the strategy for the delay before attempt `attempt`
    ///
    /// `None` means give up.
    pub fn next_reconnect_delay(&self, attempt: u32) -> Option<Duration> {
        self.strategy.lock().next_delay(attempt)
    }

    /// Wait until a connection is established
    ///
    /// Returns true immediately if already connected, false on timeout or
    /// once the session is terminated.
    pub async fn wait_connected(&self, timeout: Duration) -> bool {
        let mut rx = self.status.subscribe();
        let waited = tokio::time::timeout(
            timeout,
            rx.wait_for(|s| {
                matches!(
                    s.state,
                    ConnectionState::Connected | ConnectionState::Terminated
                )
            }),
        )
        .await;
        match waited {
            Ok(Ok(status)) => status.state == ConnectionState::Connected,
            _ => false,
        }
    }

    fn record_state(&self, state: &ConnectionState) {
        if let Some(ref m) = self.metrics {
            m.update_connection_state(state);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reconnect::{ExponentialBackoff, FixedDelay};

    fn manager() -> ConnectionManager {
        ConnectionManager::new(
            Box::new(ExponentialBackoff::new(
                Duration::from_millis(100),
                Duration::from_secs(10),
            )),
            None,
        )
    }

    #[test]
    fn test_connection_state_transitions() {
        let manager = manager();
        assert_eq!(manager.state(), ConnectionState::Disconnected);

        assert!(manager.begin_connecting());
        assert!(!manager.begin_connecting());
        assert_eq!(manager.state(), ConnectionState::Connecting);

        assert!(manager.connected(1));
        assert_eq!(
            manager.status(),
            SessionStatus {
                state: ConnectionState::Connected,
                generation: 1
            }
        );

        assert!(manager.compare_and_set(
            |s| *s == ConnectionState::Connected,
            ConnectionState::Reconnecting { attempt: 0 }
        ));
        assert_eq!(manager.generation(), 1);

        assert!(manager.disconnected());
        assert_eq!(manager.state(), ConnectionState::Disconnected);
    }

    #[test]
    fn test_connected_requires_connecting() {
        let manager = manager();
        assert!(!manager.connected(1));
        assert_eq!(manager.generation(), 0);
    }

    #[test]
    fn test_terminated_is_sticky() {
        let manager = manager();
        manager.begin_connecting();
        assert_eq!(manager.terminate(), ConnectionState::Connecting);
        assert_eq!(manager.terminate(), ConnectionState::Terminated);

        assert!(!manager.begin_connecting());
        assert!(!manager.disconnected());
        assert!(!manager.connected(1));
        assert!(manager.is_terminated());
    }

    #[test]
    fn test_strategy_delay_and_give_up() {
        let manager = ConnectionManager::new(
            Box::new(FixedDelay::new(Duration::from_millis(5)).with_max_attempts(1)),
            None,
        );
        assert!(manager.next_reconnect_delay(0).is_some());
        assert!(manager.next_reconnect_delay(1).is_none());
    }

    #[tokio::test]
    async fn test_wait_connected_times_out() {
        let manager = manager();
        assert!(!manager.wait_connected(Duration::from_millis(50)).await);
    }

    #[tokio::test]
    async fn test_wait_connected_after_the_fact() {
        let manager = manager();
        manager.begin_connecting();
        manager.connected(1);
        assert!(manager.wait_connected(Duration::from_millis(10)).await);
    }

    #[tokio::test]
    async fn test_wait_connected_wakes_on_connect() {
        let manager = Arc::new(manager());
        let waiter = {
            let manager = Arc::clone(&manager);
            tokio::spawn(async move { manager.wait_connected(Duration::from_secs(5)).await })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        manager.begin_connecting();
        manager.connected(1);
        assert!(waiter.await.unwrap());
    }

    #[tokio::test]
    async fn test_wait_connected_false_when_terminated() {
        let manager = manager();
        manager.terminate();
        assert!(!manager.wait_connected(Duration::from_secs(5)).await);
    }
}
