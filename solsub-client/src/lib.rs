//! Reconnecting Solana pub/sub session manager
//!
//! This crate keeps a set of Solana pub/sub subscriptions alive over a
//! single WebSocket connection, across drops and reconnects.
//!
//! # Core Features
//!
//! - **Typed subscriptions**: `accountSubscribe`, `signatureSubscribe` and
//!   `logsSubscribe` with commitment and encoding options
//! - **Subscription registry**: the set of subscriptions the application
//!   wants, independent of the connection
//! - **Replay on reconnect**: every (re)connection re-sends the registry
//! - **Auto-reconnection**: pluggable strategies, exponential backoff by
//!   default
//! - **Isolated delivery**: each subscription's listener runs on its own
//!   lane, in order, without blocking the socket or other subscriptions
//! - **Pluggable transport**: WebSocket by default, anything implementing
//!   [`Transport`] otherwise
//! - **Observability**: tracing throughout, OpenTelemetry metrics on request
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use solsub_client::{Listener, PubsubClient};
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> solsub_core::Result<()> {
//!     let client = PubsubClient::new("wss://api.mainnet-beta.solana.com");
//!
//!     // dials the endpoint in the background
//!     let id = client
//!         .account_subscribe(
//!             "SysvarC1ock11111111111111111111111111111111",
//!             Listener::new(|payload| async move {
//!                 println!("clock at slot {}", payload["context"]["slot"]);
//!             }),
//!         )
//!         .await?;
//!
//!     if client.wait_for_connection(Duration::from_secs(10)).await {
//!         println!("subscribed as {}", id);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! # Configuration
//!
//! ```rust,no_run
//! use solsub_client::{ClientBuilder, ExponentialBackoff};
//! use std::time::Duration;
//!
//! # fn example() -> solsub_core::Result<()> {
//! let client = ClientBuilder::new("wss://api.devnet.solana.com")
//!     .with_reconnect(Box::new(
//!         ExponentialBackoff::new(Duration::from_millis(500), Duration::from_secs(60))
//!             .with_max_attempts(20)
//!             .with_jitter(),
//!     ))
//!     .auto_connect(false)
//!     .build()?;
//! # let _ = client;
//! # Ok(())
//! # }
//! ```

mod client;
mod client_builder;
mod connection_state;
mod dispatcher;
mod listener;
mod metrics;
mod reconnect;
mod registry;
mod session;
mod transport;
mod websocket;

pub use client::PubsubClient;
pub use client_builder::ClientBuilder;
pub use connection_state::{ConnectionManager, ConnectionState, SessionStatus};
pub use dispatcher::Dispatcher;
pub use listener::{logs_notification_listener, Listener, ListenerFn};
pub use metrics::ClientMetrics;
pub use reconnect::{ExponentialBackoff, FixedDelay, NoReconnect, ReconnectionStrategy};
pub use registry::{
    Subscription, SubscriptionEntry, SubscriptionId, SubscriptionRegistry, SubscriptionStatus,
};
pub use session::Session;
pub use transport::{Transport, TransportEvents};
pub use websocket::WebSocketTransport;
