//! Common test utilities for solsub-client integration tests
//!
//! - `MockTransport`: a scriptable in-memory transport. Tests decide when a
//!   connection is established, inject inbound frames and failures, and
//!   inspect every frame the session sent.
//! - `MockWsServer`: a small pub/sub node on a real WebSocket that
//!   acknowledges subscriptions and pushes notifications on demand.

#![allow(dead_code)]

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use parking_lot::Mutex;
use serde_json::{json, Value};
use solsub_client::{ClientBuilder, FixedDelay, Listener, PubsubClient, Transport, TransportEvents};
use solsub_core::{Error, Result};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::{broadcast, mpsc};
use tokio_tungstenite::accept_async;
use tokio_tungstenite::tungstenite::Message;

pub const ADDRESS_A: &str = "4Nd1mBQtrMJVYVfKf2PJy9NZUZdTAsp7D4xWLs4gDB4T";
pub const ADDRESS_B: &str = "9xQeWvG816bUx9EPjHmaT23yvVM2ZWbrrpZb9PusVFin";
pub const SIGNATURE: &str =
    "5h6xBEauJ3PK6SWCZ1PGjBvj8vDdWG3KpwATGy1ARAXFSDwt8GFXM7W5Ncn16wmqokgpiKRLuS83KUxyZyv2sUYv";

/// Poll `condition` every 10ms for up to two seconds
pub async fn eventually<F>(condition: F) -> bool
where
    F: Fn() -> bool,
{
    for _ in 0..200 {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}

/// Receive one payload or panic after two seconds
pub async fn recv(rx: &mut mpsc::UnboundedReceiver<Value>) -> Value {
    tokio::time::timeout(Duration::from_secs(2), rx.recv())
        .await
        .expect("timed out waiting for a notification")
        .expect("listener channel closed")
}

/// Listener that forwards every payload into a channel
pub fn channel_listener() -> (Listener, mpsc::UnboundedReceiver<Value>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let listener = Listener::from_fn(move |payload| {
        let _ = tx.send(payload);
    });
    (listener, rx)
}

/// Route session logs to the test output, `RUST_LOG` controls the level
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Client over a mock transport that retries after 10ms
pub fn mock_client() -> (PubsubClient, Arc<MockTransport>) {
    init_tracing();
    let transport = MockTransport::new();
    let client = ClientBuilder::new("ws://mock")
        .with_transport(transport.clone())
        .with_reconnect(Box::new(FixedDelay::new(Duration::from_millis(10))))
        .build()
        .unwrap();
    (client, transport)
}

/// Client over a mock transport connected on generation 1
pub async fn connected_client() -> (PubsubClient, Arc<MockTransport>) {
    let (client, transport) = mock_client();
    client.connect().await.unwrap();
    transport.establish().await;
    assert!(client.wait_for_connection(Duration::from_secs(1)).await);
    (client, transport)
}

/// In-memory transport driven by the test
pub struct MockTransport {
    sent: Mutex<Vec<String>>,
    events: Mutex<Option<TransportEvents>>,
    connects: AtomicUsize,
    disconnects: AtomicUsize,
    failing_connects: AtomicUsize,
    failing_sends: AtomicBool,
}

impl MockTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            sent: Mutex::new(Vec::new()),
            events: Mutex::new(None),
            connects: AtomicUsize::new(0),
            disconnects: AtomicUsize::new(0),
            failing_connects: AtomicUsize::new(0),
            failing_sends: AtomicBool::new(false),
        })
    }

    /// Make the next `n` connect calls fail
    pub fn fail_next_connects(&self, n: usize) {
        self.failing_connects.store(n, Ordering::SeqCst);
    }

    pub fn fail_sends(&self, failing: bool) {
        self.failing_sends.store(failing, Ordering::SeqCst);
    }

    pub fn connect_count(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    pub fn disconnect_count(&self) -> usize {
        self.disconnects.load(Ordering::SeqCst)
    }

    /// Events handle of the latest successful connect
    pub fn events(&self) -> Option<TransportEvents> {
        self.events.lock().clone()
    }

    /// Wait for a connect the session still listens to, then report it
    /// established
    pub async fn establish(&self) {
        let found = eventually(|| {
            self.events
                .lock()
                .as_ref()
                .map(|e| e.is_current())
                .unwrap_or(false)
        })
        .await;
        assert!(found, "no connect attempt to establish");
        let events = self.events().unwrap();
        events.connected().await;
    }

    /// Deliver an inbound frame on the latest connection
    pub async fn inject(&self, frame: Value) {
        self.inject_raw(&frame.to_string()).await;
    }

    pub async fn inject_raw(&self, text: &str) {
        let events = self.events().expect("not connected");
        events.frame(text).await;
    }

    /// Acknowledge a subscribe request
    pub async fn ack(&self, request_id: u64, server_id: u64) {
        self.inject(json!({ "jsonrpc": "2.0", "result": server_id, "id": request_id }))
            .await;
    }

    /// Push a notification for a server subscription number
    pub async fn notify(&self, method: &str, server_id: u64, value: Value) {
        self.inject(json!({
            "jsonrpc": "2.0",
            "method": method,
            "params": {
                "subscription": server_id,
                "result": { "context": { "slot": 1 }, "value": value }
            }
        }))
        .await;
    }

    /// Report a transport failure on the latest connection
    pub async fn fail(&self, reason: &str) {
        let events = self.events().expect("not connected");
        events.error(reason).await;
    }

    pub async fn close(&self) {
        let events = self.events().expect("not connected");
        events.closed().await;
    }

    /// Every frame sent so far, parsed
    pub fn sent(&self) -> Vec<Value> {
        self.sent
            .lock()
            .iter()
            .map(|text| serde_json::from_str(text).unwrap())
            .collect()
    }

    /// Sent frames whose method is `method`
    pub fn sent_with_method(&self, method: &str) -> Vec<Value> {
        self.sent()
            .into_iter()
            .filter(|frame| frame["method"] == method)
            .collect()
    }

    /// Every sent subscribe frame, any family
    pub fn subscribe_frames(&self) -> Vec<Value> {
        self.sent()
            .into_iter()
            .filter(|frame| {
                frame["method"]
                    .as_str()
                    .map(|m| m.ends_with("Subscribe") && !m.ends_with("Unsubscribe"))
                    .unwrap_or(false)
            })
            .collect()
    }

    pub fn clear_sent(&self) {
        self.sent.lock().clear();
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn connect(&self, _endpoint: &str, events: TransportEvents) -> Result<()> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        let failing = self
            .failing_connects
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(Error::Transport("connection refused".to_string()));
        }
        *self.events.lock() = Some(events);
        Ok(())
    }

    async fn send(&self, frame: String) -> Result<()> {
        if self.failing_sends.load(Ordering::SeqCst) {
            return Err(Error::ConnectionClosed);
        }
        self.sent.lock().push(frame);
        Ok(())
    }

    async fn disconnect(&self, _epoch: u64) -> Result<()> {
        self.disconnects.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[derive(Debug, Clone)]
enum ServerCommand {
    Send(String),
    Kick,
}

/// Request received by the mock server
#[derive(Debug, Clone)]
pub struct ReceivedRequest {
    pub frame: Value,
    /// Subscription number the server answered a subscribe with
    pub server_id: Option<u64>,
}

/// Minimal pub/sub node over a real WebSocket
///
/// Subscribe requests are acknowledged with increasing subscription
/// numbers starting at 100, unsubscribe requests with `true`.
pub struct MockWsServer {
    addr: SocketAddr,
    shutdown_tx: mpsc::Sender<()>,
    commands: broadcast::Sender<ServerCommand>,
    received: mpsc::UnboundedReceiver<ReceivedRequest>,
    connections: Arc<AtomicUsize>,
}

impl MockWsServer {
    pub async fn start() -> Self {
        Self::start_inner(None).await
    }

    /// Server that holds back the handshake of its first connection
    pub async fn start_with_first_handshake_delay(delay: Duration) -> Self {
        Self::start_inner(Some(delay)).await
    }

    async fn start_inner(first_handshake_delay: Option<Duration>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);
        let (commands, _) = broadcast::channel::<ServerCommand>(64);
        let (received_tx, received) = mpsc::unbounded_channel();
        let connections = Arc::new(AtomicUsize::new(0));
        let next_server_id = Arc::new(AtomicU64::new(100));

        let server_commands = commands.clone();
        let server_connections = Arc::clone(&connections);
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = shutdown_rx.recv() => break,
                    accepted = listener.accept() => {
                        let Ok((stream, _)) = accepted else { continue };
                        let index = server_connections.fetch_add(1, Ordering::SeqCst);
                        let handshake_delay = first_handshake_delay.filter(|_| index == 0);
                        let mut commands = server_commands.subscribe();
                        let received_tx = received_tx.clone();
                        let next_server_id = Arc::clone(&next_server_id);

                        tokio::spawn(async move {
                            if let Some(delay) = handshake_delay {
                                tokio::time::sleep(delay).await;
                            }
                            let Ok(ws_stream) = accept_async(stream).await else { return };
                            let (mut write, mut read) = ws_stream.split();
                            loop {
                                tokio::select! {
                                    message = read.next() => {
                                        let text = match message {
                                            Some(Ok(Message::Text(text))) => text,
                                            Some(Ok(_)) => continue,
                                            _ => break,
                                        };
                                        let frame: Value = serde_json::from_str(&text).unwrap();
                                        let method = frame["method"].as_str().unwrap_or_default().to_string();
                                        let (reply, server_id) = if method.ends_with("Unsubscribe") {
                                            (json!({ "jsonrpc": "2.0", "result": true, "id": frame["id"] }), None)
                                        } else {
                                            let server_id = next_server_id.fetch_add(1, Ordering::SeqCst);
                                            (json!({ "jsonrpc": "2.0", "result": server_id, "id": frame["id"] }), Some(server_id))
                                        };
                                        let _ = received_tx.send(ReceivedRequest { frame, server_id });
                                        if write.send(Message::Text(reply.to_string())).await.is_err() {
                                            break;
                                        }
                                    }
                                    command = commands.recv() => match command {
                                        Ok(ServerCommand::Send(text)) => {
                                            if write.send(Message::Text(text)).await.is_err() {
                                                break;
                                            }
                                        }
                                        Ok(ServerCommand::Kick) => {
                                            let _ = write.send(Message::Close(None)).await;
                                            break;
                                        }
                                        Err(broadcast::error::RecvError::Lagged(_)) => continue,
                                        Err(broadcast::error::RecvError::Closed) => break,
                                    },
                                }
                            }
                        });
                    }
                }
            }
        });

        Self {
            addr,
            shutdown_tx,
            commands,
            received,
            connections,
        }
    }

    pub fn url(&self) -> String {
        format!("ws://{}", self.addr)
    }

    pub fn connection_count(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }

    /// Next request the server received, or None after five seconds
    pub async fn next_request(&mut self) -> Option<ReceivedRequest> {
        tokio::time::timeout(Duration::from_secs(5), self.received.recv())
            .await
            .ok()
            .flatten()
    }

    /// Push a notification to every open connection
    pub fn notify(&self, method: &str, server_id: u64, value: Value) {
        let frame = json!({
            "jsonrpc": "2.0",
            "method": method,
            "params": {
                "subscription": server_id,
                "result": { "context": { "slot": 7 }, "value": value }
            }
        });
        let _ = self.commands.send(ServerCommand::Send(frame.to_string()));
    }

    /// Close every open connection from the server side
    pub fn kick_all(&self) {
        let _ = self.commands.send(ServerCommand::Kick);
    }

    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(()).await;
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
}
