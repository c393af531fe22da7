//! In-process loopback transport.
//!
//! [`memory_transport`] returns a [`MemoryConnector`] for the client side and
//! a [`MemoryListener`] that plays the backend: every successful connect
//! yields one [`MemoryPeer`] on the listener. Dropping a peer looks like
//! the server closing the socket.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tokio::sync::mpsc;

use super::{Connector, Frame, Link};
use crate::error::RealtimeError;

/// Creates a connected connector/listener pair.
#[must_use]
pub fn memory_transport(queue_capacity: usize) -> (MemoryConnector, MemoryListener) {
    let (accept_tx, accept_rx) = mpsc::unbounded_channel();
    let connector = MemoryConnector {
        accept_tx,
        refusing: Arc::new(AtomicBool::new(false)),
        queue_capacity: queue_capacity.max(1),
    };
    (connector, MemoryListener { accept_rx })
}

/// Client side of the loopback transport.
#[derive(Debug, Clone)]
pub struct MemoryConnector {
    accept_tx: mpsc::UnboundedSender<MemoryPeer>,
    refusing: Arc<AtomicBool>,
    queue_capacity: usize,
}

impl MemoryConnector {
    /// Makes subsequent connects fail (or succeed again).
    pub fn set_refusing(&self, refusing: bool) {
        self.refusing.store(refusing, Ordering::SeqCst);
    }
}

#[async_trait]
impl Connector for MemoryConnector {
    async fn connect(&self, endpoint: &str) -> Result<Link, RealtimeError> {
        if self.refusing.load(Ordering::SeqCst) {
            return Err(RealtimeError::TransportUnavailable(format!(
                "{endpoint}: connection refused"
            )));
        }
        let (outbound, from_client) = mpsc::channel(self.queue_capacity);
        let (to_client, inbound) = mpsc::channel(self.queue_capacity);
        let peer = MemoryPeer {
            endpoint: endpoint.to_string(),
            to_client,
            from_client,
        };
        self.accept_tx
            .send(peer)
            .map_err(|_| RealtimeError::TransportUnavailable(format!("{endpoint}: no listener")))?;
        Ok(Link { outbound, inbound })
    }
}

/// Server side of the loopback transport.
#[derive(Debug)]
pub struct MemoryListener {
    accept_rx: mpsc::UnboundedReceiver<MemoryPeer>,
}

impl MemoryListener {
    /// Waits for the next client connection.
    pub async fn accept(&mut self) -> Option<MemoryPeer> {
        self.accept_rx.recv().await
    }
}

/// One accepted loopback connection, seen from the server.
#[derive(Debug)]
pub struct MemoryPeer {
    /// Endpoint the client asked for.
    pub endpoint: String,
    to_client: mpsc::Sender<Frame>,
    from_client: mpsc::Receiver<Frame>,
}

impl MemoryPeer {
    /// Receives the next frame the client emitted.
    pub async fn recv(&mut self) -> Option<Frame> {
        self.from_client.recv().await
    }

    /// Returns a frame the client already emitted, without waiting.
    pub fn try_recv(&mut self) -> Option<Frame> {
        self.from_client.try_recv().ok()
    }

    /// Pushes a frame to the client. Returns `false` if the client is gone.
    pub async fn send(&self, event: &str, data: serde_json::Value) -> bool {
        self.to_client.send(Frame::new(event, data)).await.is_ok()
    }
}
