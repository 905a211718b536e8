//! Pluggable duplex transport.
//!
//! DESIGN
//! ======
//! A [`Connector`] turns a URL into a [`Link`]: an outbound channel of
//! encoded payloads and an inbound channel of [`LinkEvent`]s. A successful
//! `connect` is the transport's "open"; a failed one is "error then close".
//! Dropping the outbound sender closes the transport, and every link ends
//! its inbound stream with [`LinkEvent::Closed`].
//!
//! [`WsConnector`] is the production implementation over
//! `tokio-tungstenite`; [`MemoryConnector`] hands each connection to the
//! caller as a [`MemoryPeer`] so tests can play the server.

use frames::Payload;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, warn};

use crate::error::LinkError;

/// What the transport reports after it opened.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LinkEvent {
    Message(Payload),
    Error(String),
    Closed,
}

/// An open transport.
#[derive(Debug)]
pub struct Link {
    /// Writes go out in the order they are sent. Drop to close.
    pub outbound: mpsc::UnboundedSender<Payload>,
    pub inbound: mpsc::UnboundedReceiver<LinkEvent>,
}

/// Opens transports. Enables swapping the socket implementation in tests.
#[async_trait::async_trait]
pub trait Connector: Send + Sync {
    /// Open a transport to `url`.
    ///
    /// # Errors
    ///
    /// Returns [`LinkError::Connect`] when the transport cannot be opened.
    async fn connect(&self, url: &str) -> Result<Link, LinkError>;
}

// =============================================================================
// WEBSOCKET
// =============================================================================

/// Websocket transport. Binary frames carry protobuf, text frames carry JSON.
#[derive(Clone, Copy, Debug, Default)]
pub struct WsConnector;

#[async_trait::async_trait]
impl Connector for WsConnector {
    async fn connect(&self, url: &str) -> Result<Link, LinkError> {
        let (stream, _) = connect_async(url)
            .await
            .map_err(|e| LinkError::Connect(e.to_string()))?;
        let (mut ws_write, mut ws_read) = stream.split();

        let (out_tx, mut out_rx) = mpsc::unbounded_channel::<Payload>();
        let (in_tx, in_rx) = mpsc::unbounded_channel::<LinkEvent>();

        // Writer: drains the outbound channel; closes the socket once the
        // session drops its sender.
        tokio::spawn(async move {
            while let Some(payload) = out_rx.recv().await {
                let message = match payload {
                    Payload::Binary(bytes) => Message::Binary(bytes.into()),
                    Payload::Text(text) => Message::Text(text.into()),
                };
                if let Err(e) = ws_write.send(message).await {
                    debug!(error = %e, "ws: write failed");
                    break;
                }
            }
            let _ = ws_write.close().await;
        });

        // Reader: forwards frames until the socket ends, then reports Closed.
        tokio::spawn(async move {
            while let Some(message) = ws_read.next().await {
                let event = match message {
                    Ok(Message::Binary(bytes)) => LinkEvent::Message(Payload::Binary(bytes.to_vec())),
                    Ok(Message::Text(text)) => LinkEvent::Message(Payload::Text(text.as_str().to_owned())),
                    Ok(Message::Close(_)) => break,
                    Ok(_) => continue,
                    Err(e) => {
                        warn!(error = %e, "ws: read failed");
                        let _ = in_tx.send(LinkEvent::Error(e.to_string()));
                        break;
                    }
                };
                if in_tx.send(event).is_err() {
                    break;
                }
            }
            let _ = in_tx.send(LinkEvent::Closed);
        });

        Ok(Link { outbound: out_tx, inbound: in_rx })
    }
}

// =============================================================================
// IN-MEMORY
// =============================================================================

/// The far end of a link opened through [`MemoryConnector`].
#[derive(Debug)]
pub struct MemoryPeer {
    /// URL the client dialed.
    pub url: String,
    /// Payloads written by the client, in order.
    pub received: mpsc::UnboundedReceiver<Payload>,
    /// Feed events to the client. Dropping it closes the link.
    pub events: mpsc::UnboundedSender<LinkEvent>,
}

impl MemoryPeer {
    /// Deliver a payload to the client.
    pub fn send(&self, payload: Payload) -> bool {
        self.events.send(LinkEvent::Message(payload)).is_ok()
    }

    /// Report a transport error followed by a close.
    pub fn fail(self, reason: &str) {
        let _ = self.events.send(LinkEvent::Error(reason.to_owned()));
        let _ = self.events.send(LinkEvent::Closed);
    }
}

/// In-process connector. Each successful `connect` yields a [`MemoryPeer`]
/// on the receiver returned by [`MemoryConnector::pair`].
#[derive(Clone, Debug)]
pub struct MemoryConnector {
    peers: mpsc::UnboundedSender<MemoryPeer>,
}

impl MemoryConnector {
    #[must_use]
    pub fn pair() -> (Self, mpsc::UnboundedReceiver<MemoryPeer>) {
        let (peers, accepted) = mpsc::unbounded_channel();
        (Self { peers }, accepted)
    }
}

#[async_trait::async_trait]
impl Connector for MemoryConnector {
    async fn connect(&self, url: &str) -> Result<Link, LinkError> {
        let (outbound, received) = mpsc::unbounded_channel();
        let (events, inbound) = mpsc::unbounded_channel();
        let peer = MemoryPeer { url: url.to_owned(), received, events };
        self.peers.send(peer).map_err(|_| LinkError::Closed)?;
        Ok(Link { outbound, inbound })
    }
}

#[cfg(test)]
#[path = "transport_test.rs"]
mod tests;
