//! Solana pub/sub types
//!
//! This module holds the descriptors a subscription is built from and the
//! JSON-RPC 2.0 envelopes exchanged with a pub/sub node.
//!
//! # Topics
//!
//! A [`Topic`] is the immutable description of one event stream:
//!
//! 1. **Account**: changes to an account's data, at a commitment level, in an
//!    encoding
//! 2. **Signature**: the confirmation of a single transaction signature
//! 3. **Logs**: transaction logs filtered by mentioned addresses (or all)
//!
//! Every topic family maps to a `<family>Subscribe`, `<family>Unsubscribe`
//! and `<family>Notification` method triple; [`TopicKind`] carries that
//! mapping.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Commitment level requested for observed ledger state
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Commitment {
    /// Most recent block seen by the node, may be skipped
    Processed,
    /// Voted on by a supermajority of the cluster
    Confirmed,
    /// Rooted, will not be rolled back
    #[default]
    Finalized,
}

impl Commitment {
    /// Wire name of the commitment level
    pub fn as_str(&self) -> &'static str {
        match self {
            Commitment::Processed => "processed",
            Commitment::Confirmed => "confirmed",
            Commitment::Finalized => "finalized",
        }
    }
}

impl fmt::Display for Commitment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Encoding requested for account data in account notifications
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Encoding {
    #[serde(rename = "base58")]
    Base58,
    #[serde(rename = "base64")]
    Base64,
    #[serde(rename = "base64+zstd")]
    Base64Zstd,
    /// Program-aware parsed JSON, falls back to base64 for unknown programs
    #[default]
    #[serde(rename = "jsonParsed")]
    JsonParsed,
}

impl Encoding {
    /// Wire name of the encoding
    pub fn as_str(&self) -> &'static str {
        match self {
            Encoding::Base58 => "base58",
            Encoding::Base64 => "base64",
            Encoding::Base64Zstd => "base64+zstd",
            Encoding::JsonParsed => "jsonParsed",
        }
    }
}

impl fmt::Display for Encoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which transactions a logs subscription observes
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum LogsFilter {
    /// All transactions except simple vote transactions
    All,
    /// All transactions including simple vote transactions
    AllWithVotes,
    /// Transactions mentioning any of the given addresses
    Mentions(Vec<String>),
}

impl LogsFilter {
    /// First positional parameter of a `logsSubscribe` request
    pub fn to_param(&self) -> serde_json::Value {
        match self {
            LogsFilter::All => serde_json::Value::from("all"),
            LogsFilter::AllWithVotes => serde_json::Value::from("allWithVotes"),
            LogsFilter::Mentions(mentions) => serde_json::json!({ "mentions": mentions }),
        }
    }

    fn destination_segment(&self) -> String {
        match self {
            LogsFilter::All => "all".to_string(),
            LogsFilter::AllWithVotes => "allWithVotes".to_string(),
            LogsFilter::Mentions(mentions) => mentions.join(","),
        }
    }
}

/// Subscription family
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TopicKind {
    Account,
    Signature,
    Logs,
}

impl TopicKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TopicKind::Account => "account",
            TopicKind::Signature => "signature",
            TopicKind::Logs => "logs",
        }
    }

    pub fn subscribe_method(&self) -> &'static str {
        match self {
            TopicKind::Account => "accountSubscribe",
            TopicKind::Signature => "signatureSubscribe",
            TopicKind::Logs => "logsSubscribe",
        }
    }

    pub fn unsubscribe_method(&self) -> &'static str {
        match self {
            TopicKind::Account => "accountUnsubscribe",
            TopicKind::Signature => "signatureUnsubscribe",
            TopicKind::Logs => "logsUnsubscribe",
        }
    }

    pub fn notification_method(&self) -> &'static str {
        match self {
            TopicKind::Account => "accountNotification",
            TopicKind::Signature => "signatureNotification",
            TopicKind::Logs => "logsNotification",
        }
    }

    /// Resolve the family of an inbound notification method
    pub fn from_notification_method(method: &str) -> Option<Self> {
        match method {
            "accountNotification" => Some(TopicKind::Account),
            "signatureNotification" => Some(TopicKind::Signature),
            "logsNotification" => Some(TopicKind::Logs),
            _ => None,
        }
    }

    /// Whether the node cancels the subscription after its first notification
    pub fn is_one_shot(&self) -> bool {
        matches!(self, TopicKind::Signature)
    }
}

impl fmt::Display for TopicKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Immutable description of the stream a subscription observes
///
/// # Examples
///
/// ```rust
/// use solsub_core::{Commitment, Encoding, Topic};
///
/// let topic = Topic::account("11111111111111111111111111111111");
/// assert_eq!(topic.commitment(), Commitment::Finalized);
/// assert_eq!(
///     topic.destination(),
///     "/topic/account/11111111111111111111111111111111/finalized/jsonParsed"
/// );
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Topic {
    Account {
        address: String,
        commitment: Commitment,
        encoding: Encoding,
    },
    Signature {
        signature: String,
        commitment: Commitment,
    },
    Logs {
        filter: LogsFilter,
        commitment: Commitment,
    },
}

impl Topic {
    /// Account topic with `finalized` commitment and `jsonParsed` encoding
    pub fn account(address: impl Into<String>) -> Self {
        Topic::Account {
            address: address.into(),
            commitment: Commitment::default(),
            encoding: Encoding::default(),
        }
    }

    /// Signature topic with `finalized` commitment
    pub fn signature(signature: impl Into<String>) -> Self {
        Topic::Signature {
            signature: signature.into(),
            commitment: Commitment::default(),
        }
    }

    /// Logs topic for the given mentions with `finalized` commitment
    pub fn logs<I, S>(mentions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Topic::Logs {
            filter: LogsFilter::Mentions(mentions.into_iter().map(Into::into).collect()),
            commitment: Commitment::default(),
        }
    }

    /// Replace the commitment level
    pub fn with_commitment(mut self, level: Commitment) -> Self {
        match &mut self {
            Topic::Account { commitment, .. }
            | Topic::Signature { commitment, .. }
            | Topic::Logs { commitment, .. } => *commitment = level,
        }
        self
    }

    pub fn kind(&self) -> TopicKind {
        match self {
            Topic::Account { .. } => TopicKind::Account,
            Topic::Signature { .. } => TopicKind::Signature,
            Topic::Logs { .. } => TopicKind::Logs,
        }
    }

    pub fn commitment(&self) -> Commitment {
        match self {
            Topic::Account { commitment, .. }
            | Topic::Signature { commitment, .. }
            | Topic::Logs { commitment, .. } => *commitment,
        }
    }

    /// Positional `params` array of the subscribe request
    pub fn params(&self) -> serde_json::Value {
        match self {
            Topic::Account {
                address,
                commitment,
                encoding,
            } => serde_json::json!([
                address,
                { "commitment": commitment, "encoding": encoding }
            ]),
            Topic::Signature {
                signature,
                commitment,
            } => serde_json::json!([signature, { "commitment": commitment }]),
            Topic::Logs { filter, commitment } => {
                serde_json::json!([filter.to_param(), { "commitment": commitment }])
            }
        }
    }

    /// Path-like descriptor of the topic
    ///
    /// Used for prefix lookups such as "any subscription on this account".
    pub fn destination(&self) -> String {
        match self {
            Topic::Account {
                address,
                commitment,
                encoding,
            } => format!("/topic/account/{}/{}/{}", address, commitment, encoding),
            Topic::Signature {
                signature,
                commitment,
            } => format!("/topic/signature/{}/{}", signature, commitment),
            Topic::Logs { filter, commitment } => {
                format!("/topic/logs/{}/{}", filter.destination_segment(), commitment)
            }
        }
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.destination())
    }
}

/// Outbound JSON-RPC 2.0 request (subscribe and unsubscribe frames)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcRequest {
    /// Always "2.0"
    pub jsonrpc: String,
    /// Request id, echoed back in the response
    pub id: u64,
    pub method: String,
    /// Positional parameters
    pub params: serde_json::Value,
}

impl JsonRpcRequest {
    pub fn new(id: u64, method: impl Into<String>, params: serde_json::Value) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            method: method.into(),
            params,
        }
    }
}

/// Inbound JSON-RPC 2.0 response to a subscribe or unsubscribe request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    pub jsonrpc: String,
    /// Null when the node could not read the request id
    pub id: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<crate::RpcErrorData>,
}

/// Inbound subscription notification envelope
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcNotification {
    pub jsonrpc: String,
    /// `<family>Notification`
    pub method: String,
    pub params: NotificationParams,
}

/// `params` member of a notification
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationParams {
    /// Server-assigned subscription number
    pub subscription: u64,
    /// Event payload handed to the listener
    pub result: serde_json::Value,
}

/// Slot context attached to every notification result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcContext {
    pub slot: u64,
}

/// `{ context, value }` wrapper used by every notification result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcResponse<T> {
    pub context: RpcContext,
    pub value: T,
}

/// Value of a `logsNotification`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcLogsResponse {
    pub signature: String,
    /// Transaction error, null when the transaction succeeded
    #[serde(default)]
    pub err: Option<serde_json::Value>,
    pub logs: Vec<String>,
}

/// Value of a `signatureNotification`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcSignatureResult {
    #[serde(default)]
    pub err: Option<serde_json::Value>,
}
