//! Transport contract
//!
//! The session never touches a socket directly. It drives a [`Transport`]
//! (connect, send, disconnect) and the transport reports back through the
//! [`TransportEvents`] handle it receives on every `connect`.
//!
//! # Callbacks
//!
//! - `connected()` once the connection is usable
//! - `frame(text)` for every inbound text frame, in arrival order
//! - `error(reason)` when the connection failed after being established
//! - `closed()` when the remote side closed the connection
//!
//! Each handle is bound to the connect attempt that produced it. Once the
//! session has moved on (a newer attempt, a disconnect, a terminate) the
//! callbacks of the old handle are ignored, so a transport does not need to
//! guard against late events from a dying connection.
//!
//! A transport that keeps one socket around should still scope it to the
//! attempt that opened it: refuse to install a socket whose handle is no
//! longer current, and only let `disconnect(epoch)` close sockets opened
//! before `epoch`.
//!
//! # Implementing a Transport
//!
//! ```rust
//! use async_trait::async_trait;
//! use solsub_client::{Transport, TransportEvents};
//! use solsub_core::Result;
//!
//! struct Loopback;
//!
//! #[async_trait]
//! impl Transport for Loopback {
//!     async fn connect(&self, _endpoint: &str, events: TransportEvents) -> Result<()> {
//!         tokio::spawn(async move { events.connected().await });
//!         Ok(())
//!     }
//!
//!     async fn send(&self, _frame: String) -> Result<()> {
//!         Ok(())
//!     }
//!
//!     async fn disconnect(&self, _epoch: u64) -> Result<()> {
//!         Ok(())
//!     }
//! }
//! ```

use crate::session::SessionInner;
use async_trait::async_trait;
use solsub_core::Result;
use std::sync::{Arc, Weak};

/// Connect/send/disconnect primitives the session is built on
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Open a connection to `endpoint`
    ///
    /// Returning `Ok` means the attempt is underway or done; the session
    /// only considers itself connected once `events.connected()` fires.
    /// Returning `Err` hands the failure to the reconnection strategy.
    async fn connect(&self, endpoint: &str, events: TransportEvents) -> Result<()>;

    /// Send one text frame on the current connection
    async fn send(&self, frame: String) -> Result<()>;

    /// Close the current connection if it was opened before `epoch`
    ///
    /// A connection opened with events of `epoch` or a later attempt stays
    /// up.
    async fn disconnect(&self, epoch: u64) -> Result<()>;
}

/// Callback handle given to a transport on connect
#[derive(Clone)]
pub struct TransportEvents {
    session: Weak<SessionInner>,
    epoch: u64,
}

impl TransportEvents {
    pub(crate) fn new(session: &Arc<SessionInner>, epoch: u64) -> Self {
        Self {
            session: Arc::downgrade(session),
            epoch,
        }
    }

    /// The connection is established and ready for frames
    pub async fn connected(&self) {
        if let Some(session) = self.live() {
            session.on_connected(self.epoch).await;
        }
    }

    /// An inbound text frame arrived
    pub async fn frame(&self, text: &str) {
        if let Some(session) = self.live() {
            session.on_frame(self.epoch, text).await;
        }
    }

    /// The connection failed
    pub async fn error(&self, reason: impl Into<String>) {
        if let Some(session) = self.live() {
            session.on_transport_lost(self.epoch, &reason.into()).await;
        }
    }

    /// The remote side closed the connection
    pub async fn closed(&self) {
        if let Some(session) = self.live() {
            session
                .on_transport_lost(self.epoch, "connection closed by remote")
                .await;
        }
    }

    /// Connect attempt this handle belongs to
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Whether the session still listens to this handle
    pub fn is_current(&self) -> bool {
        self.live().is_some()
    }

    fn live(&self) -> Option<Arc<SessionInner>> {
        let session = self.session.upgrade()?;
        if session.is_current_epoch(self.epoch) {
            Some(session)
        } else {
            tracing::trace!(epoch = self.epoch, "Ignoring event from a superseded connection");
            None
        }
    }
}

impl std::fmt::Debug for TransportEvents {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransportEvents")
            .field("epoch", &self.epoch)
            .finish()
    }
}
