//! WebSocket connection lifecycle and outbound delivery.
//!
//! Each connection gets an unbounded outbound queue drained by its own writer
//! task, so handlers can send without awaiting socket I/O and without holding
//! any registry lock while a slow client drains.

use crate::connection::ChannelHandler;
use crate::error::ServiceError;
use crate::messaging::Envelope;
use dashmap::DashMap;
use fleet_registry::ConnectionId;
use futures::{SinkExt, StreamExt};
use serde::Serialize;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_tungstenite::{accept_async, tungstenite::Message};
use tracing::{debug, info, warn};

/// Live connections across both channels, keyed by connection id.
#[derive(Debug, Default)]
pub struct ConnectionManager {
    connections: DashMap<ConnectionId, mpsc::UnboundedSender<Message>>,
}

impl ConnectionManager {
    pub fn new() -> Self {
        Self {
            connections: DashMap::new(),
        }
    }

    /// Allocates an id and outbound queue for a new connection.
    pub fn register(&self) -> (ConnectionId, mpsc::UnboundedReceiver<Message>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        let id = ConnectionId::new();
        self.connections.insert(id, sender);
        (id, receiver)
    }

    pub fn remove(&self, id: ConnectionId) {
        self.connections.remove(&id);
    }

    pub fn is_connected(&self, id: ConnectionId) -> bool {
        self.connections.contains_key(&id)
    }

    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    /// Queues a frame. Returns false if the connection is gone.
    pub fn send(&self, id: ConnectionId, message: Message) -> bool {
        match self.connections.get(&id) {
            Some(sender) => sender.send(message).is_ok(),
            None => false,
        }
    }

    pub fn send_text(&self, id: ConnectionId, text: String) -> bool {
        self.send(id, Message::text(text))
    }

    /// Encodes `{event, data}` and queues it for one connection.
    pub fn send_event<T: Serialize>(
        &self,
        id: ConnectionId,
        event: &str,
        data: &T,
    ) -> Result<bool, ServiceError> {
        let text = Envelope::encode(event, data)?;
        Ok(self.send_text(id, text))
    }

    /// Encodes once and queues for every id. Returns how many were delivered.
    pub fn broadcast_event<T: Serialize>(
        &self,
        ids: &[ConnectionId],
        event: &str,
        data: &T,
    ) -> Result<usize, ServiceError> {
        let text = Envelope::encode(event, data)?;
        Ok(ids
            .iter()
            .filter(|id| self.send_text(**id, text.clone()))
            .count())
    }

    /// Runs one WebSocket connection to completion.
    ///
    /// Text frames go to `handler` in arrival order. The connection is closed
    /// after `idle_timeout` without inbound frames. `on_close` runs exactly once
    /// after the read loop ends, whatever the reason.
    pub async fn serve(
        self: Arc<Self>,
        stream: TcpStream,
        addr: SocketAddr,
        handler: Arc<dyn ChannelHandler>,
        idle_timeout: Duration,
    ) {
        let ws_stream = match accept_async(stream).await {
            Ok(ws) => ws,
            Err(e) => {
                warn!("WebSocket handshake failed for {}: {}", addr, e);
                return;
            }
        };

        let (mut ws_sink, mut ws_receiver) = ws_stream.split();
        let (id, mut outbound) = self.register();
        let channel = handler.name();
        info!(connection = %id, channel, "🔗 Connection established from {}", addr);

        let writer = tokio::spawn(async move {
            while let Some(message) = outbound.recv().await {
                if let Err(e) = ws_sink.send(message).await {
                    debug!("Write failed, stopping writer: {}", e);
                    break;
                }
            }
            let _ = ws_sink.close().await;
        });

        loop {
            let next = match timeout(idle_timeout, ws_receiver.next()).await {
                Ok(next) => next,
                Err(_) => {
                    info!(connection = %id, channel, "⏱️ Idle timeout, closing connection");
                    break;
                }
            };

            match next {
                Some(Ok(Message::Text(text))) => {
                    handler.on_message(id, text.as_str()).await;
                }
                Some(Ok(Message::Ping(data))) => {
                    self.send(id, Message::Pong(data));
                }
                Some(Ok(Message::Pong(_))) => {}
                Some(Ok(Message::Close(_))) | None => {
                    debug!(connection = %id, channel, "Connection requested close");
                    break;
                }
                Some(Ok(_)) => {
                    warn!(connection = %id, channel, "Received unsupported message type");
                }
                Some(Err(e)) => {
                    warn!(connection = %id, channel, "WebSocket error: {}", e);
                    break;
                }
            }
        }

        handler.on_close(id).await;
        self.remove(id);
        // Dropping the last sender lets the writer flush and close the sink.
        let _ = writer.await;
        info!(connection = %id, channel, "👋 Connection from {} closed", addr);
    }
}
