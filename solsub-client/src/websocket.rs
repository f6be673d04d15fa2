//! WebSocket transport over `tokio-tungstenite`
//!
//! `connect` opens the socket, keeps the write half for `send`, and spawns a
//! reader task that feeds every inbound text frame to the session. The
//! reader reports `connected` before the first frame and `closed` or
//! `error` when the socket goes away, then exits. The session's reconnect
//! loop calls `connect` again, which replaces both halves.
//!
//! The installed socket is tagged with the epoch of the attempt that opened
//! it. A dial that finishes after the session moved on is closed instead of
//! installed, and `disconnect(epoch)` leaves a socket from a newer attempt
//! alone.

use crate::transport::{Transport, TransportEvents};
use async_trait::async_trait;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use solsub_core::{Error, Result};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSink = SplitSink<WsStream, Message>;

struct Connection {
    epoch: u64,
    sink: WsSink,
    reader: JoinHandle<()>,
}

impl Connection {
    async fn close(mut self) -> Result<()> {
        self.reader.abort();
        self.sink
            .close()
            .await
            .map_err(|e| Error::WebSocket(e.to_string()))
    }
}

/// Transport backed by a real WebSocket connection
pub struct WebSocketTransport {
    connection: Mutex<Option<Connection>>,
}

impl WebSocketTransport {
    pub fn new() -> Self {
        Self {
            connection: Mutex::new(None),
        }
    }
}

impl Default for WebSocketTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for WebSocketTransport {
    #[tracing::instrument(skip(self, events), fields(endpoint = %endpoint, epoch = events.epoch()))]
    async fn connect(&self, endpoint: &str, events: TransportEvents) -> Result<()> {
        tracing::debug!("Opening WebSocket");
        let (ws_stream, _) = connect_async(endpoint)
            .await
            .map_err(|e| Error::WebSocket(e.to_string()))?;
        let (mut sink, stream) = ws_stream.split();

        let mut connection = self.connection.lock().await;
        // superseded while the handshake was in flight
        if !events.is_current() {
            drop(connection);
            let _ = sink.close().await;
            tracing::debug!("Closing WebSocket opened for a superseded attempt");
            return Ok(());
        }

        if let Some(previous) = connection.take() {
            let _ = previous.close().await;
        }
        // the write half is in place before the reader reports connected
        let epoch = events.epoch();
        let reader = tokio::spawn(read_loop(stream, events));
        *connection = Some(Connection {
            epoch,
            sink,
            reader,
        });

        tracing::info!("WebSocket connected");
        Ok(())
    }

    async fn send(&self, frame: String) -> Result<()> {
        let mut connection = self.connection.lock().await;
        let connection = connection.as_mut().ok_or(Error::ConnectionClosed)?;
        connection
            .sink
            .send(Message::Text(frame))
            .await
            .map_err(|e| Error::WebSocket(e.to_string()))
    }

    async fn disconnect(&self, epoch: u64) -> Result<()> {
        let stale = {
            let mut connection = self.connection.lock().await;
            if connection.as_ref().is_some_and(|c| c.epoch < epoch) {
                connection.take()
            } else {
                None
            }
        };
        if let Some(stale) = stale {
            let closed = stale.epoch;
            stale.close().await?;
            tracing::info!(epoch = closed, "WebSocket closed");
        }
        Ok(())
    }
}

impl Drop for WebSocketTransport {
    fn drop(&mut self) {
        if let Some(connection) = self.connection.get_mut().take() {
            connection.reader.abort();
        }
    }
}

async fn read_loop(mut stream: SplitStream<WsStream>, events: TransportEvents) {
    events.connected().await;

    while let Some(message) = stream.next().await {
        match message {
            Ok(Message::Text(text)) => events.frame(&text).await,
            Ok(Message::Binary(data)) => match String::from_utf8(data) {
                Ok(text) => events.frame(&text).await,
                Err(e) => tracing::warn!(error = %e, "Dropping non UTF-8 binary frame"),
            },
            Ok(Message::Close(frame)) => {
                tracing::info!(close_frame = ?frame, "Connection closed by server");
                events.closed().await;
                return;
            }
            Ok(_) => {}
            Err(e) => {
                tracing::warn!(error = %e, "WebSocket error");
                events.error(e.to_string()).await;
                return;
            }
        }
    }

    tracing::info!("WebSocket stream ended");
    events.closed().await;
}
