//! In-memory transport for unit tests.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use volcon_core::{decode_command, CommandFrame, ConnectionId};

use crate::transport::{DeviceTransport, Outbound, TransportClosed};

pub struct MockTransport {
    id: ConnectionId,
    open: AtomicBool,
    sent: Mutex<Vec<Outbound>>,
}

impl MockTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            id: ConnectionId::new(),
            open: AtomicBool::new(true),
            sent: Mutex::new(Vec::new()),
        })
    }

    pub fn close(&self) {
        self.open.store(false, Ordering::SeqCst);
    }

    /// Commands sent so far, decoded.
    pub fn commands(&self) -> Vec<CommandFrame> {
        self.sent
            .lock()
            .iter()
            .filter_map(|frame| match frame {
                Outbound::Text(text) => decode_command(text).ok(),
                Outbound::KeepAlive => None,
            })
            .collect()
    }

    pub fn keepalives(&self) -> usize {
        self.sent
            .lock()
            .iter()
            .filter(|f| matches!(f, Outbound::KeepAlive))
            .count()
    }
}

impl DeviceTransport for MockTransport {
    fn id(&self) -> &ConnectionId {
        &self.id
    }

    fn send(&self, frame: Outbound) -> Result<(), TransportClosed> {
        if !self.is_open() {
            return Err(TransportClosed(self.id.clone()));
        }
        self.sent.lock().push(frame);
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }
}
