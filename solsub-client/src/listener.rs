//! Subscription listeners
//!
//! A listener is the capability a caller hands to `subscribe`: it is invoked
//! with every notification payload of that one subscription. Payloads are the
//! notification's `result` member (`{ "context": {...}, "value": {...} }`).
//!
//! Listeners run on the subscription's own delivery lane (see the
//! dispatcher), so a slow listener only delays its own subscription. A
//! panicking listener is contained there as well.
//!
//! # Examples
//!
//! ```rust
//! use solsub_client::Listener;
//!
//! // async closure, like a notification handler
//! let on_account = Listener::new(|payload| async move {
//!     println!("account changed at slot {}", payload["context"]["slot"]);
//! });
//!
//! // plain closure for quick, non-blocking work
//! let on_logs = Listener::from_fn(|payload| {
//!     println!("logs: {}", payload["value"]["logs"]);
//! });
//! # let _ = (on_account, on_logs);
//! ```

use solsub_core::{RpcLogsResponse, RpcResponse};
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

/// Boxed listener function
pub type ListenerFn =
    Arc<dyn Fn(serde_json::Value) -> Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync>;

/// Callback invoked with each notification payload of a subscription
#[derive(Clone)]
pub struct Listener {
    f: ListenerFn,
}

impl Listener {
    /// Wrap an async closure
    pub fn new<F, Fut>(f: F) -> Self
    where
        F: Fn(serde_json::Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        Self {
            f: Arc::new(move |payload| Box::pin(f(payload))),
        }
    }

    /// Wrap a synchronous closure
    pub fn from_fn<F>(f: F) -> Self
    where
        F: Fn(serde_json::Value) + Send + Sync + 'static,
    {
        Self::new(move |payload| {
            f(payload);
            std::future::ready(())
        })
    }

    /// Invoke the listener
    pub fn call(&self, payload: serde_json::Value) -> Pin<Box<dyn Future<Output = ()> + Send>> {
        (self.f)(payload)
    }

    /// Whether both handles wrap the same listener
    pub fn same_as(&self, other: &Listener) -> bool {
        Arc::ptr_eq(&self.f, &other.f)
    }
}

impl fmt::Debug for Listener {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Listener")
            .field("ptr", &Arc::as_ptr(&self.f).cast::<()>())
            .finish()
    }
}

/// Listener that logs every transaction delivered by a logs subscription
///
/// Payloads missing the `signature` or `logs` fields are rejected with a
/// warning rather than logged.
pub fn logs_notification_listener(listening_pubkey: impl Into<String>) -> Listener {
    let pubkey: Arc<str> = listening_pubkey.into().into();
    Listener::from_fn(move |payload| {
        if payload.is_null() {
            tracing::warn!(pubkey = %pubkey, "Received null logs notification");
            return;
        }

        match serde_json::from_value::<RpcResponse<RpcLogsResponse>>(payload) {
            Ok(notification) => {
                let logs = notification.value;
                tracing::info!(
                    pubkey = %pubkey,
                    signature = %logs.signature,
                    slot = notification.context.slot,
                    failed = logs.err.is_some(),
                    "Received logs notification"
                );
                for line in &logs.logs {
                    tracing::info!(signature = %logs.signature, "Log: {}", line);
                }
            }
            Err(e) => {
                tracing::warn!(pubkey = %pubkey, error = %e, "Missing required fields in logs notification");
            }
        }
    })
}
