//! Client metrics definitions
//!
//! OpenTelemetry instruments describing session health. They are created
//! when observability is enabled through `ClientBuilder::with_observability`
//! and exported by whatever meter provider `init_observability` installed.
//!
//! # Metrics Collected
//!
//! - **connection_state**: current session state (gauge)
//! - **subscribe_frames**: subscribe frames sent, by family (counter)
//! - **subscriptions_replayed**: subscriptions re-sent after a connect (counter)
//! - **notifications_received**: notifications queued for a listener (counter)
//! - **notifications_dropped**: notifications and frames dropped, by reason (counter)
//! - **errors_total**: errors encountered, by type (counter)
//! - **reconnection_attempts** / **reconnection_success** (counters)

use crate::ConnectionState;
use opentelemetry::{
    global,
    metrics::{Counter, Gauge, Meter},
    KeyValue,
};
use solsub_core::TopicKind;

/// Session metrics
pub struct ClientMetrics {
    /// 0=disconnected, 1=connecting, 2=connected, 3=reconnecting, 4=terminated
    pub connection_state: Gauge<i64>,
    pub subscribe_frames: Counter<u64>,
    pub subscriptions_replayed: Counter<u64>,
    pub notifications_received: Counter<u64>,
    pub notifications_dropped: Counter<u64>,
    pub errors_total: Counter<u64>,
    pub reconnection_attempts: Counter<u64>,
    pub reconnection_success: Counter<u64>,
}

impl ClientMetrics {
    /// Create metrics on the global meter provider
    pub fn new(service_name: impl Into<String>) -> Self {
        let name: &'static str = Box::leak(service_name.into().into_boxed_str());
        let meter = global::meter(name);
        Self::new_with_meter(&meter)
    }

    /// Create metrics on a specific meter
    pub fn new_with_meter(meter: &Meter) -> Self {
        Self {
            connection_state: meter
                .i64_gauge("solsub.client.connection.state")
                .with_description("Session state (0=disconnected, 1=connecting, 2=connected, 3=reconnecting, 4=terminated)")
                .build(),
            subscribe_frames: meter
                .u64_counter("solsub.client.subscribe.frames")
                .with_description("Subscribe frames sent")
                .build(),
            subscriptions_replayed: meter
                .u64_counter("solsub.client.subscriptions.replayed")
                .with_description("Subscriptions re-sent after a connection was established")
                .build(),
            notifications_received: meter
                .u64_counter("solsub.client.notifications.received")
                .with_description("Notifications queued for a listener")
                .build(),
            notifications_dropped: meter
                .u64_counter("solsub.client.notifications.dropped")
                .with_description("Inbound notifications and frames that were dropped")
                .build(),
            errors_total: meter
                .u64_counter("solsub.client.errors.total")
                .with_description("Total number of errors encountered")
                .build(),
            reconnection_attempts: meter
                .u64_counter("solsub.client.reconnection.attempts")
                .with_description("Total number of reconnection attempts")
                .build(),
            reconnection_success: meter
                .u64_counter("solsub.client.reconnection.success")
                .with_description("Total number of successful reconnections")
                .build(),
        }
    }

    pub fn update_connection_state(&self, state: &ConnectionState) {
        let value = match state {
            ConnectionState::Disconnected => 0,
            ConnectionState::Connecting => 1,
            ConnectionState::Connected => 2,
            ConnectionState::Reconnecting { .. } => 3,
            ConnectionState::Terminated => 4,
        };
        self.connection_state.record(value, &[]);
    }

    pub fn record_subscribe(&self, kind: TopicKind) {
        self.subscribe_frames
            .add(1, &[KeyValue::new("kind", kind.as_str())]);
    }

    pub fn record_replay(&self, count: u64) {
        self.subscriptions_replayed.add(count, &[]);
    }

    pub fn record_notification(&self, kind: TopicKind) {
        self.notifications_received
            .add(1, &[KeyValue::new("kind", kind.as_str())]);
    }

    pub fn record_dropped(&self, reason: &str) {
        self.notifications_dropped
            .add(1, &[KeyValue::new("reason", reason.to_string())]);
    }

    pub fn record_error(&self, error_type: &str) {
        self.errors_total
            .add(1, &[KeyValue::new("error_type", error_type.to_string())]);
    }

    pub fn record_reconnection_attempt(&self) {
        self.reconnection_attempts.add(1, &[]);
    }

    pub fn record_reconnection_success(&self) {
        self.reconnection_success.add(1, &[]);
    }
}
