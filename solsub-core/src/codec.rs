//! Frame codec for the Solana pub/sub protocol
//!
//! Encodes subscribe/unsubscribe requests and classifies inbound text frames.
//!
//! # Inbound Frames
//!
//! A pub/sub node sends four kinds of frames on a subscription socket:
//!
//! - subscribe acknowledgement: `{"result": 23784, "id": 7}` binding the
//!   request id to a server subscription number
//! - unsubscribe acknowledgement: `{"result": true, "id": 9}`
//! - error response: `{"error": {"code": -32602, ...}, "id": 7}`
//! - notification: `{"method": "accountNotification", "params": {"subscription": 23784, "result": {...}}}`
//!
//! Anything else decodes to `Error::InvalidFrame`; callers drop such frames.
//!
//! # Examples
//!
//! ```rust
//! use solsub_core::{codec, InboundFrame, Topic};
//!
//! let frame = codec::encode_subscribe(7, &Topic::signature("5h6xBEauJ3PK6SWC")).unwrap();
//! assert!(frame.contains("\"method\":\"signatureSubscribe\""));
//!
//! let ack = codec::decode(r#"{"jsonrpc":"2.0","result":23784,"id":7}"#).unwrap();
//! assert_eq!(ack, InboundFrame::SubscribeAck { request_id: 7, server_id: 23784 });
//! ```

use crate::error::{Error, Result, RpcErrorData};
use crate::types::{JsonRpcNotification, JsonRpcRequest, JsonRpcResponse, Topic, TopicKind};
use serde::Serialize;

/// Classified inbound frame
#[derive(Debug, Clone, PartialEq)]
pub enum InboundFrame {
    /// The node accepted a subscribe request
    SubscribeAck { request_id: u64, server_id: u64 },
    /// The node answered an unsubscribe request
    UnsubscribeAck { request_id: u64, unsubscribed: bool },
    /// The node rejected a request
    Rejected {
        request_id: Option<u64>,
        error: RpcErrorData,
    },
    /// An event for a server-side subscription
    Notification {
        kind: TopicKind,
        server_id: u64,
        payload: serde_json::Value,
    },
}

/// Encode any serializable message to a JSON string
pub fn encode<T: Serialize>(msg: &T) -> Result<String> {
    serde_json::to_string(msg).map_err(|e| Error::Serialization(e.to_string()))
}

/// Build the subscribe request for a topic
///
/// `request_id` is echoed back in the acknowledgement, which is how the
/// acknowledgement finds its subscription.
pub fn encode_subscribe(request_id: u64, topic: &Topic) -> Result<String> {
    let request = JsonRpcRequest::new(request_id, topic.kind().subscribe_method(), topic.params());
    encode(&request)
}

/// Build the unsubscribe request for a server subscription number
pub fn encode_unsubscribe(request_id: u64, kind: TopicKind, server_id: u64) -> Result<String> {
    let request = JsonRpcRequest::new(
        request_id,
        kind.unsubscribe_method(),
        serde_json::json!([server_id]),
    );
    encode(&request)
}

/// Decode and classify an inbound text frame
pub fn decode(data: &str) -> Result<InboundFrame> {
    let value: serde_json::Value = serde_json::from_str(data)
        .map_err(|e| Error::InvalidFrame(format!("not JSON: {}", e)))?;

    if value.is_array() {
        return Err(Error::InvalidFrame(
            "batch frames are not part of the pub/sub protocol".to_string(),
        ));
    }

    if let Some(method) = value.get("method").and_then(|m| m.as_str()) {
        let kind = TopicKind::from_notification_method(method)
            .ok_or_else(|| Error::InvalidFrame(format!("unknown notification method: {}", method)))?;
        let notification: JsonRpcNotification = serde_json::from_value(value)
            .map_err(|e| Error::InvalidFrame(format!("malformed {}: {}", kind.notification_method(), e)))?;
        return Ok(InboundFrame::Notification {
            kind,
            server_id: notification.params.subscription,
            payload: notification.params.result,
        });
    }

    let response: JsonRpcResponse = serde_json::from_value(value)
        .map_err(|e| Error::InvalidFrame(format!("malformed response: {}", e)))?;

    if let Some(error) = response.error {
        return Ok(InboundFrame::Rejected {
            request_id: response.id,
            error,
        });
    }

    let request_id = response
        .id
        .ok_or_else(|| Error::InvalidFrame("response without id".to_string()))?;

    match response.result {
        Some(serde_json::Value::Number(n)) => {
            let server_id = n
                .as_u64()
                .ok_or_else(|| Error::InvalidFrame(format!("subscription id out of range: {}", n)))?;
            Ok(InboundFrame::SubscribeAck {
                request_id,
                server_id,
            })
        }
        Some(serde_json::Value::Bool(unsubscribed)) => Ok(InboundFrame::UnsubscribeAck {
            request_id,
            unsubscribed,
        }),
        other => Err(Error::InvalidFrame(format!(
            "unexpected result for request {}: {:?}",
            request_id, other
        ))),
    }
}
