//! Core Solana pub/sub types and codec for solsub
//!
//! This crate provides the stateless half of solsub:
//!
//! - **Types**: topic descriptors (`Topic`, `Commitment`, `Encoding`,
//!   `LogsFilter`) and the JSON-RPC 2.0 envelopes used on the socket
//! - **Codec**: subscribe/unsubscribe frame encoding and inbound frame
//!   classification
//! - **Error handling**: the `Error` type shared by all solsub crates
//! - **Observability**: tracing subscriber and OpenTelemetry bootstrap
//!
//! The session manager that keeps subscriptions alive across reconnects
//! lives in `solsub-client`.
//!
//! # Example
//!
//! ```rust
//! use solsub_core::{codec, Commitment, Topic};
//!
//! let topic = Topic::logs(["Vote111111111111111111111111111111111111111"])
//!     .with_commitment(Commitment::Confirmed);
//! let frame = codec::encode_subscribe(1, &topic).unwrap();
//! assert!(frame.contains("logsSubscribe"));
//! ```

pub mod codec;
pub mod error;
pub mod observability;
pub mod types;

pub use codec::InboundFrame;
pub use error::{Error, Result, RpcErrorData};
pub use observability::{init_observability, shutdown_observability, ObservabilityConfig};
pub use types::{
    Commitment, Encoding, JsonRpcNotification, JsonRpcRequest, JsonRpcResponse, LogsFilter,
    NotificationParams, RpcContext, RpcLogsResponse, RpcResponse, RpcSignatureResult, Topic,
    TopicKind,
};
