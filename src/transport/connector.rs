//! Transport seam and the WebSocket implementation.
//!
//! A [`Connector`] opens one [`Link`]: a pair of frame channels. Closing the
//! outbound sender closes the socket; the inbound receiver ends when the
//! remote side goes away.

use std::fmt;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message as WsMessage;

use super::Frame;
use crate::error::RealtimeError;

/// An established bidirectional frame channel.
#[derive(Debug)]
pub struct Link {
    /// Frames to send. Dropping it closes the connection.
    pub outbound: mpsc::Sender<Frame>,
    /// Frames received. Yields `None` once the connection is gone.
    pub inbound: mpsc::Receiver<Frame>,
}

/// Opens transport links to an endpoint.
#[async_trait]
pub trait Connector: Send + Sync + fmt::Debug {
    /// Opens a new link.
    ///
    /// # Errors
    ///
    /// Returns [`RealtimeError::TransportUnavailable`] if the endpoint
    /// cannot be reached.
    async fn connect(&self, endpoint: &str) -> Result<Link, RealtimeError>;
}

/// WebSocket connector backed by `tokio-tungstenite`.
#[derive(Debug, Clone)]
pub struct WsConnector {
    queue_capacity: usize,
}

impl WsConnector {
    /// Creates a connector whose per-link queues hold `queue_capacity`
    /// frames.
    #[must_use]
    pub fn new(queue_capacity: usize) -> Self {
        Self {
            queue_capacity: queue_capacity.max(1),
        }
    }
}

impl Default for WsConnector {
    fn default() -> Self {
        Self::new(256)
    }
}

#[async_trait]
impl Connector for WsConnector {
    async fn connect(&self, endpoint: &str) -> Result<Link, RealtimeError> {
        let (ws_stream, _) = connect_async(endpoint)
            .await
            .map_err(|e| RealtimeError::TransportUnavailable(format!("{endpoint}: {e}")))?;
        let (mut ws_sender, mut ws_receiver) = ws_stream.split();

        let (outbound, mut outbound_rx) = mpsc::channel::<Frame>(self.queue_capacity);
        let (inbound_tx, inbound) = mpsc::channel::<Frame>(self.queue_capacity);

        tokio::spawn(async move {
            while let Some(frame) = outbound_rx.recv().await {
                let text = match frame.encode() {
                    Ok(text) => text,
                    Err(e) => {
                        tracing::warn!(event = %frame.event, error = %e, "dropping unencodable frame");
                        continue;
                    }
                };
                if ws_sender.send(WsMessage::text(text)).await.is_err() {
                    break;
                }
            }
            let _ = ws_sender.close().await;
            tracing::debug!("ws writer finished");
        });

        tokio::spawn(async move {
            while let Some(msg) = ws_receiver.next().await {
                match msg {
                    Ok(WsMessage::Text(text)) => match Frame::decode(text.as_str()) {
                        Ok(frame) => {
                            if inbound_tx.send(frame).await.is_err() {
                                break;
                            }
                        }
                        Err(e) => tracing::debug!(error = %e, "ignoring malformed frame"),
                    },
                    Ok(WsMessage::Close(_)) => break,
                    Ok(_) => {}
                    Err(e) => {
                        tracing::debug!(error = %e, "ws read failed");
                        break;
                    }
                }
            }
            tracing::debug!("ws reader finished");
        });

        Ok(Link { outbound, inbound })
    }
}
