//! solsub - reconnecting Solana pub/sub subscriptions
//!
//! This is the convenience crate that re-exports the solsub sub-crates.
//!
//! # Architecture
//!
//! - **solsub-core**: topic types, JSON-RPC frame codec, error handling,
//!   observability
//! - **solsub-client**: subscription registry, session state machine,
//!   WebSocket transport and the `PubsubClient` façade
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use solsub::{Listener, PubsubClient};
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = PubsubClient::new("wss://api.devnet.solana.com");
//!
//!     client
//!         .logs_subscribe(
//!             ["Vote111111111111111111111111111111111111111"],
//!             Listener::from_fn(|payload| println!("{}", payload["value"]["signature"])),
//!         )
//!         .await?;
//!
//!     client.wait_for_connection(Duration::from_secs(10)).await;
//!     tokio::signal::ctrl_c().await?;
//!     client.terminate().await?;
//!     Ok(())
//! }
//! ```

pub use solsub_client as client;
pub use solsub_core as core;

// most commonly used types
pub use solsub_client::{ClientBuilder, Listener, PubsubClient, SubscriptionId};
pub use solsub_core::{Commitment, Encoding, Error, LogsFilter, Result, Topic};
