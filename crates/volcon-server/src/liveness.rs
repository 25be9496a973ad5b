//! Keep-alive probing and stale-entry sweeping.
//!
//! Liveness follows the transport's open state: a keep-alive is a no-op frame,
//! and a connection whose transport reports closed is released at the next
//! tick without waiting for any acknowledgement.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time;
use tokio_util::sync::CancellationToken;

use crate::connection::Connection;
use crate::hub::DeviceHub;
use crate::transport::Outbound;

/// Outcome of the keep-alive loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeepAliveResult {
    /// The transport was found closed and the connection's devices released.
    Closed,
    /// The connection ended first.
    Cancelled,
}

/// Send a keep-alive on `connection` every `interval` until it closes or `cancel` fires.
pub async fn run_keepalive(
    hub: DeviceHub,
    connection: Arc<Connection>,
    interval: Duration,
    cancel: CancellationToken,
) -> KeepAliveResult {
    let mut ticker = time::interval_at(time::Instant::now() + interval, interval);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let transport = connection.transport();
                if !transport.is_open() || transport.send(Outbound::KeepAlive).is_err() {
                    let released = hub.release_connection(&connection);
                    tracing::info!(
                        connection_id = %connection.id(),
                        released = released.len(),
                        "keep-alive found connection closed"
                    );
                    return KeepAliveResult::Closed;
                }
                tracing::trace!(connection_id = %connection.id(), "sent keep-alive");
            }
            () = cancel.cancelled() => {
                return KeepAliveResult::Cancelled;
            }
        }
    }
}

/// Periodically prune registry entries whose transport reports closed.
pub fn start_sweep_task(hub: DeviceHub, interval: Duration, cancel: CancellationToken) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = time::interval_at(time::Instant::now() + interval, interval);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let pruned = hub.prune_stale();
                    if !pruned.is_empty() {
                        tracing::info!(pruned = pruned.len(), "stale device sweep");
                    }
                }
                () = cancel.cancelled() => break,
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockTransport;
    use volcon_core::{Command, DeviceId, DispatchError};
    use volcon_telemetry::MetricsRecorder;

    fn hub() -> DeviceHub {
        DeviceHub::new(Arc::new(MetricsRecorder::new()), None)
    }

    fn connect(hub: &DeviceHub, transport: Arc<MockTransport>, device: &str) -> Arc<Connection> {
        let conn = Arc::new(Connection::new(transport));
        hub.route(&conn, &format!(r#"{{"type":"CONNECT","deviceId":"{device}"}}"#));
        conn
    }

    #[tokio::test(start_paused = true)]
    async fn sends_keepalive_each_interval() {
        let hub = hub();
        let transport = MockTransport::new();
        let conn = connect(&hub, transport.clone(), "D1");
        let cancel = CancellationToken::new();
        let task = tokio::spawn(run_keepalive(hub, conn, Duration::from_secs(20), cancel.clone()));

        time::sleep(Duration::from_secs(61)).await;
        assert_eq!(transport.keepalives(), 3);

        cancel.cancel();
        assert_eq!(task.await.unwrap(), KeepAliveResult::Cancelled);
    }

    #[tokio::test(start_paused = true)]
    async fn closed_transport_is_released_without_sending() {
        let hub = hub();
        let transport = MockTransport::new();
        let conn = connect(&hub, transport.clone(), "D1");
        let reply = hub.dispatch(Command::set_mute(DeviceId::from_raw("D1"), true)).unwrap();
        transport.close();

        let result = run_keepalive(hub.clone(), conn, Duration::from_secs(20), CancellationToken::new()).await;
        assert_eq!(result, KeepAliveResult::Closed);
        assert_eq!(transport.keepalives(), 0);
        assert!(hub.registry().is_empty());
        assert_eq!(
            reply.await,
            Err(DispatchError::DeviceDisconnected(DeviceId::from_raw("D1")))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_stops_before_first_keepalive() {
        let hub = hub();
        let transport = MockTransport::new();
        let conn = connect(&hub, transport.clone(), "D1");
        let cancel = CancellationToken::new();
        cancel.cancel();

        let result = run_keepalive(hub, conn, Duration::from_secs(20), cancel).await;
        assert_eq!(result, KeepAliveResult::Cancelled);
        assert_eq!(transport.keepalives(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn sweep_prunes_closed_entries() {
        let hub = hub();
        let dead = MockTransport::new();
        let _alive = connect(&hub, MockTransport::new(), "A");
        let _dead = connect(&hub, dead.clone(), "B");
        dead.close();

        let cancel = CancellationToken::new();
        let task = start_sweep_task(hub.clone(), Duration::from_secs(60), cancel.clone());
        time::sleep(Duration::from_secs(61)).await;

        assert!(hub.registry().contains(&DeviceId::from_raw("A")));
        assert!(!hub.registry().contains(&DeviceId::from_raw("B")));

        cancel.cancel();
        task.await.unwrap();
    }
}
