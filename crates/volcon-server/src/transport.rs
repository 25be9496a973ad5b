use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use volcon_core::ConnectionId;

/// A frame queued for a device connection.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Outbound {
    /// Serialized JSON message.
    Text(String),
    /// No-op keep-alive; the writer turns it into a WebSocket ping.
    KeepAlive,
}

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("connection {0} is closed")]
pub struct TransportClosed(pub ConnectionId);

/// The registry's view of one device connection.
///
/// `send` must not block: it only enqueues. Closing is owned by the
/// connection task, never by the registry.
pub trait DeviceTransport: Send + Sync {
    fn id(&self) -> &ConnectionId;

    fn send(&self, frame: Outbound) -> Result<(), TransportClosed>;

    fn is_open(&self) -> bool;
}

/// Outbound half of an accepted WebSocket, backed by a bounded queue
/// drained by the connection's writer task.
pub struct WsTransport {
    id: ConnectionId,
    tx: mpsc::Sender<Outbound>,
    open: AtomicBool,
    cancel: CancellationToken,
}

impl WsTransport {
    /// Create a transport and the receiver its writer task drains.
    /// Cancelling `cancel` (or calling [`close`](Self::close)) stops the connection.
    pub fn channel(capacity: usize, cancel: CancellationToken) -> (Arc<Self>, mpsc::Receiver<Outbound>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let transport = Arc::new(Self {
            id: ConnectionId::new(),
            tx,
            open: AtomicBool::new(true),
            cancel,
        });
        (transport, rx)
    }

    pub fn close(&self) {
        if self.open.swap(false, Ordering::AcqRel) {
            tracing::debug!(connection_id = %self.id, "transport closed");
        }
        self.cancel.cancel();
    }
}

impl DeviceTransport for WsTransport {
    fn id(&self) -> &ConnectionId {
        &self.id
    }

    fn send(&self, frame: Outbound) -> Result<(), TransportClosed> {
        if !self.is_open() {
            return Err(TransportClosed(self.id.clone()));
        }
        match self.tx.try_send(frame) {
            Ok(()) => Ok(()),
            Err(mpsc::error::TrySendError::Full(_)) => {
                // A device that stops draining its queue is treated as gone.
                tracing::warn!(connection_id = %self.id, "send queue full, closing connection");
                self.close();
                Err(TransportClosed(self.id.clone()))
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                self.close();
                Err(TransportClosed(self.id.clone()))
            }
        }
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire) && !self.tx.is_closed() && !self.cancel.is_cancelled()
    }
}
