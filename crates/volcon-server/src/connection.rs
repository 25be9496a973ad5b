use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Bytes;
use axum::extract::ws::{Message as WsMessage, WebSocket};
use futures::{SinkExt, StreamExt};
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use volcon_core::{ConnectionId, DeviceId};

use crate::hub::DeviceHub;
use crate::liveness::{self, KeepAliveResult};
use crate::transport::{DeviceTransport, Outbound, WsTransport};

/// One accepted transport connection and the device ids it has registered.
pub struct Connection {
    transport: Arc<dyn DeviceTransport>,
    devices: Mutex<HashSet<DeviceId>>,
}

impl Connection {
    pub fn new(transport: Arc<dyn DeviceTransport>) -> Self {
        Self {
            transport,
            devices: Mutex::new(HashSet::new()),
        }
    }

    pub fn id(&self) -> &ConnectionId {
        self.transport.id()
    }

    pub fn transport(&self) -> &Arc<dyn DeviceTransport> {
        &self.transport
    }

    pub fn bind(&self, device: DeviceId) {
        let _ = self.devices.lock().insert(device);
    }

    pub fn unbind(&self, device: &DeviceId) -> bool {
        self.devices.lock().remove(device)
    }

    /// Bound device ids, sorted.
    pub fn devices(&self) -> Vec<DeviceId> {
        let mut ids: Vec<DeviceId> = self.devices.lock().iter().cloned().collect();
        ids.sort_by(|a, b| a.as_str().cmp(b.as_str()));
        ids
    }

    /// Forget every bound id and return them.
    pub fn take_devices(&self) -> Vec<DeviceId> {
        self.devices.lock().drain().collect()
    }
}

/// Per-connection settings.
#[derive(Clone, Debug)]
pub struct ConnectionConfig {
    pub max_send_queue: usize,
    pub keepalive_interval: Duration,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            max_send_queue: 64,
            keepalive_interval: Duration::from_secs(20),
        }
    }
}

/// Drive one device WebSocket until either side closes or `shutdown` fires.
///
/// Inbound text frames go to the router; outbound frames are drained from
/// the transport's queue. On exit every device still bound to this
/// connection is released.
pub async fn serve_connection(
    socket: WebSocket,
    hub: DeviceHub,
    config: ConnectionConfig,
    shutdown: CancellationToken,
) {
    let cancel = shutdown.child_token();
    let (transport, mut rx) = WsTransport::channel(config.max_send_queue, cancel.clone());
    let connection = Arc::new(Connection::new(transport.clone()));
    let connection_id = connection.id().clone();
    tracing::info!(connection_id = %connection_id, "device connection opened");

    let (mut ws_tx, mut ws_rx) = socket.split();

    let writer_cancel = cancel.clone();
    let writer = tokio::spawn(async move {
        loop {
            tokio::select! {
                frame = rx.recv() => {
                    let message = match frame {
                        Some(Outbound::Text(text)) => WsMessage::Text(text.into()),
                        Some(Outbound::KeepAlive) => WsMessage::Ping(Bytes::new()),
                        None => break,
                    };
                    if ws_tx.send(message).await.is_err() {
                        break;
                    }
                }
                () = writer_cancel.cancelled() => {
                    let _ = ws_tx.send(WsMessage::Close(None)).await;
                    break;
                }
            }
        }
    });

    let reader_hub = hub.clone();
    let reader_connection = Arc::clone(&connection);
    let reader_cancel = cancel.clone();
    let reader = tokio::spawn(async move {
        loop {
            let message = tokio::select! {
                message = ws_rx.next() => message,
                () = reader_cancel.cancelled() => break,
            };
            match message {
                Some(Ok(WsMessage::Text(text))) => {
                    let _ = reader_hub.route(&reader_connection, text.as_str());
                }
                Some(Ok(WsMessage::Close(_))) | None => break,
                Some(Ok(_)) => {} // pings are answered by axum
                Some(Err(e)) => {
                    tracing::debug!(connection_id = %reader_connection.id(), error = %e, "websocket read failed");
                    break;
                }
            }
        }
    });

    let keepalive = tokio::spawn(liveness::run_keepalive(
        hub.clone(),
        Arc::clone(&connection),
        config.keepalive_interval,
        cancel.clone(),
    ));

    tokio::select! {
        _ = writer => {},
        _ = reader => {},
    }

    transport.close();
    if let Ok(KeepAliveResult::Closed) = keepalive.await {
        tracing::debug!(connection_id = %connection_id, "keep-alive observed the close first");
    }
    let released = hub.release_connection(&connection);
    tracing::info!(
        connection_id = %connection_id,
        released = released.len(),
        "device connection closed"
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockTransport;

    #[test]
    fn bind_and_take_devices() {
        let conn = Connection::new(MockTransport::new());
        conn.bind(DeviceId::from_raw("b"));
        conn.bind(DeviceId::from_raw("a"));
        conn.bind(DeviceId::from_raw("a"));

        assert_eq!(conn.devices(), vec![DeviceId::from_raw("a"), DeviceId::from_raw("b")]);
        assert!(conn.unbind(&DeviceId::from_raw("a")));
        assert!(!conn.unbind(&DeviceId::from_raw("a")));
        assert_eq!(conn.take_devices(), vec![DeviceId::from_raw("b")]);
        assert!(conn.devices().is_empty());
    }

    #[test]
    fn connection_id_is_the_transport_id() {
        let transport = MockTransport::new();
        let conn = Connection::new(transport.clone());
        assert_eq!(conn.id(), transport.id());
    }
}
