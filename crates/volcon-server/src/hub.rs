//! The device-control component graph, assembled once at startup and shared
//! by the HTTP handlers and every device connection.

use std::sync::Arc;
use std::time::Duration;

use tracing::info;
use volcon_core::{Command, ConnectionId, DeviceId, DeviceState, DispatchError};
use volcon_telemetry::MetricsRecorder;

use crate::connection::Connection;
use crate::dispatcher::{Dispatcher, PendingReply};
use crate::pending::PendingTable;
use crate::registry::ConnectionRegistry;
use crate::router::{ReplyRouter, RouteOutcome};

#[derive(Clone)]
pub struct DeviceHub {
    registry: Arc<ConnectionRegistry>,
    pending: Arc<PendingTable>,
    metrics: Arc<MetricsRecorder>,
    dispatcher: Dispatcher,
    router: ReplyRouter,
}

impl DeviceHub {
    pub fn new(metrics: Arc<MetricsRecorder>, request_timeout: Option<Duration>) -> Self {
        let registry = Arc::new(ConnectionRegistry::new());
        let pending = PendingTable::new();
        let dispatcher = Dispatcher::new(
            Arc::clone(&registry),
            Arc::clone(&pending),
            Arc::clone(&metrics),
            request_timeout,
        );
        let router = ReplyRouter::new(Arc::clone(&registry), Arc::clone(&pending), Arc::clone(&metrics));
        Self {
            registry,
            pending,
            metrics,
            dispatcher,
            router,
        }
    }

    pub fn dispatch(&self, command: Command) -> Result<PendingReply, DispatchError> {
        self.dispatcher.dispatch(command)
    }

    pub async fn execute(&self, command: Command) -> Result<DeviceState, DispatchError> {
        self.dispatcher.execute(command).await
    }

    pub fn route(&self, connection: &Connection, raw: &str) -> RouteOutcome {
        self.router.route(connection, raw)
    }

    /// Live device ids. Closed entries seen on the way are pruned and their
    /// pending requests rejected.
    pub fn list_live(&self) -> Vec<DeviceId> {
        let _ = self.prune_stale();
        self.registry.live_ids()
    }

    /// Prune closed handles and reject the requests sent over them.
    pub fn prune_stale(&self) -> Vec<DeviceId> {
        let pruned = self.registry.prune_closed();
        if !pruned.is_empty() {
            record_gauges(&self.metrics, &self.registry, &self.pending);
        }
        pruned
            .into_iter()
            .map(|(device, connection)| {
                let rejected = self.pending.drop_all_for(&device, &connection);
                info!(device_id = %device, connection_id = %connection, rejected, "pruned stale device");
                device
            })
            .collect()
    }

    /// Unregister every device still bound to `connection` and reject the
    /// requests sent over it. Returns the ids that were actually removed.
    pub fn release_connection(&self, connection: &Connection) -> Vec<DeviceId> {
        let mut rejected = 0;
        let released: Vec<DeviceId> = connection
            .take_devices()
            .into_iter()
            .filter(|device| {
                let release = release_device(&self.registry, &self.pending, device, connection.id());
                rejected += release.rejected;
                release.unregistered
            })
            .collect();
        if !released.is_empty() || rejected > 0 {
            info!(
                connection_id = %connection.id(),
                devices = released.len(),
                rejected,
                "released devices of closed connection"
            );
            record_gauges(&self.metrics, &self.registry, &self.pending);
        }
        released
    }

    pub fn registry(&self) -> &ConnectionRegistry {
        &self.registry
    }

    pub fn pending(&self) -> &PendingTable {
        &self.pending
    }

    pub fn metrics(&self) -> &Arc<MetricsRecorder> {
        &self.metrics
    }
}

/// Result of [`release_device`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct Release {
    /// `connection` still owned the id and it was removed from the registry.
    pub unregistered: bool,
    /// Requests sent to the device over `connection` that were rejected.
    pub rejected: usize,
}

/// Remove `device` if `connection` still owns it, and reject whatever was
/// sent to it over `connection`. Requests sent over a newer connection for
/// the same id are untouched, even if it registered in between.
pub(crate) fn release_device(
    registry: &ConnectionRegistry,
    pending: &PendingTable,
    device: &DeviceId,
    connection: &ConnectionId,
) -> Release {
    let unregistered = registry.unregister_connection(device, connection);
    let rejected = pending.drop_all_for(device, connection);
    Release {
        unregistered,
        rejected,
    }
}

pub(crate) fn record_gauges(
    metrics: &MetricsRecorder,
    registry: &ConnectionRegistry,
    pending: &PendingTable,
) {
    metrics.gauge_set("devices.live", &[], registry.live_count() as f64);
    metrics.gauge_set("requests.pending", &[], pending.len() as f64);
}
