//! # Peer Connection Task
//!
//! Drives one WebSocket peer for its whole lifetime:
//!
//! 1. **Open**: register with the hub, which classifies the peer
//! 2. **Inbound**: hand every text/binary frame to [`RelayHub::route`]
//! 3. **Close**: on close frame, EOF or error, unregister from the hub
//!
//! Outbound traffic flows through the peer's channel into a separate writer
//! task, so a slow socket never blocks routing for anyone else.

use axum::extract::ws::{Message as WsMessage, WebSocket};
use futures::{SinkExt, StreamExt};
use log::{debug, error};
use std::sync::Arc;

use super::hub::{PeerHints, RelayHub};
use crate::common::messages::Payload;

/// Run a peer connection until it closes.
///
/// # Arguments
/// - `socket`: The upgraded WebSocket
/// - `hints`: Handshake headers used for classification
/// - `hub`: The shared relay
pub async fn serve_connection(socket: WebSocket, hints: PeerHints, hub: Arc<RelayHub>) {
    let (id, _role, mut outbound) = hub.connect(&hints).await;
    let (mut sink, mut stream) = socket.split();

    // Writer: drain the peer's channel into the socket
    let writer = tokio::spawn(async move {
        while let Some(payload) = outbound.recv().await {
            let frame = match payload {
                Payload::Text(text) => WsMessage::Text(text),
                Payload::Binary(bytes) => WsMessage::Binary(bytes),
            };
            if let Err(e) = sink.send(frame).await {
                debug!("✉️  Send to {} failed: {}", id, e);
                break;
            }
        }
        let _ = sink.close().await;
    });

    // Reader: route every inbound frame until the peer goes away
    loop {
        match stream.next().await {
            Some(Ok(WsMessage::Text(text))) => {
                debug!("📨 Received from {}: {}", id, text);
                hub.route(&id, Payload::Text(text)).await;
            }
            Some(Ok(WsMessage::Binary(bytes))) => {
                debug!("📨 Received {} binary bytes from {}", bytes.len(), id);
                hub.route(&id, Payload::Binary(bytes)).await;
            }
            Some(Ok(WsMessage::Close(_))) | None => {
                debug!("🔌 Connection {} closed", id);
                break;
            }
            // Ping/pong are answered by the transport
            Some(Ok(_)) => {}
            Some(Err(e)) => {
                error!("❌ WebSocket error on {}: {}", id, e);
                break;
            }
        }
    }

    // Dropping the registry entry closes the channel, which ends the writer
    hub.disconnect(&id).await;
    let _ = writer.await;
}
