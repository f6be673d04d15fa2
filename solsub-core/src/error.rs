//! Error types for solsub
//!
//! Two error shapes live here:
//!
//! - **Error**: application-level errors returned by every fallible solsub
//!   operation (uses thiserror)
//! - **RpcErrorData**: the wire-format error object a Solana pub/sub node
//!   returns when it rejects a request
//!
//! # Recoverability
//!
//! Transport failures (`WebSocket`, `Transport`, `ConnectionClosed`) are
//! treated as transient by the session and drive reconnection; they are only
//! surfaced to callers of the transport itself. `Terminated` is the one
//! condition a caller of `subscribe`/`unsubscribe` can observe: it means the
//! session was shut down explicitly and will not accept new work.
//!
//! # Examples
//!
//! ```rust
//! use solsub_core::{Error, RpcErrorData};
//!
//! let rejected = Error::Rpc(RpcErrorData::new(-32602, "Invalid param: WrongSize"));
//! assert!(rejected.to_string().contains("WrongSize"));
//! ```

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type for solsub operations
pub type Result<T> = std::result::Result<T, Error>;

/// Application-level error type for solsub operations
///
/// # Error Categories
///
/// - **Transport errors**: WebSocket, Transport, ConnectionClosed
/// - **Protocol errors**: InvalidFrame, Rpc
/// - **Processing errors**: Serialization, Internal
/// - **Lifecycle errors**: Terminated
#[derive(Debug, Clone, Error)]
pub enum Error {
    /// Error object returned by the remote node
    #[error("RPC error: {0}")]
    Rpc(#[from] RpcErrorData),

    /// Serialization or deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// WebSocket transport layer error
    ///
    /// Covers handshake failures, protocol violations and frame errors below
    /// the JSON-RPC layer.
    #[error("WebSocket error: {0}")]
    WebSocket(String),

    /// Generic transport failure reported by a `Transport` implementation
    #[error("Transport error: {0}")]
    Transport(String),

    /// Inbound frame that is valid JSON but not a frame we understand
    /// (missing fields, wrong shapes, unknown notification method)
    #[error("Invalid frame: {0}")]
    InvalidFrame(String),

    /// The session was terminated and rejects further operations
    #[error("Session terminated")]
    Terminated,

    /// No connection is currently established
    #[error("Connection closed")]
    ConnectionClosed,

    /// Unexpected internal condition
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

/// JSON-RPC 2.0 error object as returned by a pub/sub node
///
/// Appears in the `error` member of a response, e.g. when a subscribe
/// request carries an address that is not valid base58.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Error)]
#[error("{message} (code {code})")]
pub struct RpcErrorData {
    /// Numeric error code
    ///
    /// Negative codes from -32768 to -32000 are reserved by JSON-RPC.
    pub code: i32,

    /// Human-readable error message
    pub message: String,

    /// Optional additional error information
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl RpcErrorData {
    /// Create a new error object with code and message
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }

    /// Create a new error object carrying additional data
    pub fn with_data(code: i32, message: impl Into<String>, data: serde_json::Value) -> Self {
        Self {
            code,
            message: message.into(),
            data: Some(data),
        }
    }

    /// Invalid params (-32602), the code nodes use for malformed addresses,
    /// signatures and filters
    pub fn invalid_params(msg: impl Into<String>) -> Self {
        Self::new(-32602, msg)
    }
}
