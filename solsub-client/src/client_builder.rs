//! Client builder
//!
//! The `ClientBuilder` configures a [`PubsubClient`] before it is created:
//! - the transport (WebSocket by default, any [`Transport`] for tests or
//!   custom stacks)
//! - the reconnection strategy (exponential backoff by default)
//! - whether the first subscription dials automatically
//! - observability (tracing subscriber, OpenTelemetry, client metrics)
//!
//! Building never dials; the session connects on the first subscription or
//! on an explicit `connect`.
//!
//! # Examples
//!
//! ```rust,no_run
//! use solsub_client::{ClientBuilder, FixedDelay};
//! use std::time::Duration;
//!
//! # fn example() -> solsub_core::Result<()> {
//! let client = ClientBuilder::new("wss://api.mainnet-beta.solana.com")
//!     .with_reconnect(Box::new(FixedDelay::new(Duration::from_secs(2))))
//!     .build()?;
//!
//! let observed = ClientBuilder::new("wss://api.devnet.solana.com")
//!     .with_default_observability()
//!     .service_name("account-watcher")
//!     .build()?;
//! # let _ = (client, observed);
//! # Ok(())
//! # }
//! ```

use crate::reconnect::{ExponentialBackoff, NoReconnect, ReconnectionStrategy};
use crate::session::Session;
use crate::transport::Transport;
use crate::websocket::WebSocketTransport;
use crate::{ClientMetrics, PubsubClient};
use solsub_core::{Error, ObservabilityConfig, Result};
use std::sync::Arc;

/// Builder for configuring and creating a `PubsubClient`
pub struct ClientBuilder {
    endpoint: String,
    transport: Option<Arc<dyn Transport>>,
    reconnect_strategy: Option<Box<dyn ReconnectionStrategy>>,
    enable_reconnect: bool,
    auto_connect: bool,
    observability_config: Option<ObservabilityConfig>,
    service_name: Option<String>,
}

impl ClientBuilder {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            transport: None,
            reconnect_strategy: None,
            enable_reconnect: true,
            auto_connect: true,
            observability_config: None,
            service_name: None,
        }
    }

    /// Use a custom transport instead of the WebSocket one
    pub fn with_transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Reconnect with the given strategy
    pub fn with_reconnect(mut self, strategy: Box<dyn ReconnectionStrategy>) -> Self {
        self.reconnect_strategy = Some(strategy);
        self.enable_reconnect = true;
        self
    }

    /// Reconnect with the default exponential backoff (the default)
    pub fn with_default_reconnect(mut self) -> Self {
        self.reconnect_strategy = Some(Box::new(ExponentialBackoff::default()));
        self.enable_reconnect = true;
        self
    }

    /// Stay disconnected after a connection failure
    pub fn without_reconnect(mut self) -> Self {
        self.enable_reconnect = false;
        self.reconnect_strategy = None;
        self
    }

    /// Whether the first subscription dials automatically (default: true)
    pub fn auto_connect(mut self, enabled: bool) -> Self {
        self.auto_connect = enabled;
        self
    }

    /// Initialize tracing and OpenTelemetry with `config` on build
    pub fn with_observability(mut self, config: ObservabilityConfig) -> Self {
        self.observability_config = Some(config);
        self
    }

    pub fn with_default_observability(mut self) -> Self {
        self.observability_config = Some(ObservabilityConfig::default());
        self
    }

    /// Service name reported by observability (if enabled)
    pub fn service_name(mut self, name: impl Into<String>) -> Self {
        self.service_name = Some(name.into());
        self
    }

    /// Create the client
    ///
    /// Fails only if observability was requested and could not be
    /// initialized.
    pub fn build(mut self) -> Result<PubsubClient> {
        let metrics = match self.observability_config.take() {
            Some(mut config) => {
                if let Some(name) = self.service_name.clone() {
                    config.service_name = name;
                }
                solsub_core::init_observability(config.clone()).map_err(|e| {
                    Error::Internal(format!("Failed to initialize observability: {}", e))
                })?;
                Some(Arc::new(ClientMetrics::new(config.service_name)))
            }
            None => None,
        };
        Ok(self.assemble(metrics))
    }

    pub(crate) fn build_without_observability(self) -> PubsubClient {
        self.assemble(None)
    }

    fn assemble(self, metrics: Option<Arc<ClientMetrics>>) -> PubsubClient {
        let transport = self
            .transport
            .unwrap_or_else(|| Arc::new(WebSocketTransport::new()));
        let strategy: Box<dyn ReconnectionStrategy> = if self.enable_reconnect {
            self.reconnect_strategy
                .unwrap_or_else(|| Box::new(ExponentialBackoff::default()))
        } else {
            Box::new(NoReconnect)
        };

        tracing::debug!(
            endpoint = %self.endpoint,
            reconnect = self.enable_reconnect,
            auto_connect = self.auto_connect,
            "Building pub/sub client"
        );
        PubsubClient {
            session: Session::new(self.endpoint, transport, strategy, self.auto_connect, metrics),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reconnect::FixedDelay;
    use crate::ConnectionState;
    use std::time::Duration;

    #[test]
    fn test_builder_defaults() {
        let builder = ClientBuilder::new("ws://localhost:8900");

        assert_eq!(builder.endpoint, "ws://localhost:8900");
        assert!(builder.enable_reconnect);
        assert!(builder.auto_connect);
        assert!(builder.transport.is_none());
        assert!(builder.reconnect_strategy.is_none());
        assert!(builder.observability_config.is_none());
        assert!(builder.service_name.is_none());
    }

    #[test]
    fn test_builder_with_reconnect() {
        let strategy = Box::new(FixedDelay::new(Duration::from_secs(1)));
        let builder = ClientBuilder::new("ws://localhost:8900").with_reconnect(strategy);
        assert!(builder.enable_reconnect);
        assert!(builder.reconnect_strategy.is_some());
    }

    #[test]
    fn test_builder_without_reconnect() {
        let builder = ClientBuilder::new("ws://localhost:8900")
            .with_default_reconnect()
            .without_reconnect();
        assert!(!builder.enable_reconnect);
        assert!(builder.reconnect_strategy.is_none());
    }

    #[test]
    fn test_builder_observability_config() {
        let config = ObservabilityConfig::new("test-client")
            .with_endpoint("http://localhost:4317")
            .with_log_level("debug");

        let builder = ClientBuilder::new("ws://localhost:8900").with_observability(config);

        let obs_config = builder.observability_config.unwrap();
        assert_eq!(obs_config.service_name, "test-client");
        assert_eq!(obs_config.log_level, "debug");
    }

    #[test]
    fn test_builder_chaining() {
        let builder = ClientBuilder::new("ws://localhost:8900")
            .with_default_reconnect()
            .auto_connect(false)
            .service_name("test-service")
            .with_default_observability();

        assert!(builder.enable_reconnect);
        assert!(!builder.auto_connect);
        assert!(builder.observability_config.is_some());
        assert_eq!(builder.service_name, Some("test-service".to_string()));
    }

    #[test]
    fn test_build_does_not_dial() {
        let client = ClientBuilder::new("ws://localhost:8900").build().unwrap();
        assert_eq!(client.state(), ConnectionState::Disconnected);
        assert_eq!(client.generation(), 0);
        assert!(client.subscriptions().is_empty());
        assert_eq!(client.endpoint(), "ws://localhost:8900");
    }
}
