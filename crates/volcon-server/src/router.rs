use std::sync::Arc;

use tracing::{debug, info, warn};
use volcon_core::{decode_reply, CorrelationId, DecodeError, DeviceId, DeviceReply, DeviceState, PendingError};
use volcon_telemetry::MetricsRecorder;

use crate::connection::Connection;
use crate::hub::{record_gauges, release_device};
use crate::pending::PendingTable;
use crate::registry::ConnectionRegistry;

/// What happened to one inbound frame.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RouteOutcome {
    /// CONNECT installed this connection as the device's handle.
    Registered { device_id: DeviceId, superseded: bool },
    /// DISCONNECT removed the device and rejected its pending requests.
    Unregistered { device_id: DeviceId, rejected: usize },
    /// DISCONNECT for an id a newer connection owns. This connection forgot
    /// it and rejected what it had sent to the device.
    Unbound { device_id: DeviceId, rejected: usize },
    /// UPDATE fulfilled a pending request.
    Resolved { correlation_id: CorrelationId },
    /// UPDATE that matched nothing (late, duplicate or spoofed).
    Discarded { correlation_id: CorrelationId },
    /// Empty keep-alive frame.
    Ignored,
    /// Malformed or unknown frame.
    Unrecognized,
}

/// Applies device messages to the registry and the pending table.
#[derive(Clone)]
pub struct ReplyRouter {
    registry: Arc<ConnectionRegistry>,
    pending: Arc<PendingTable>,
    metrics: Arc<MetricsRecorder>,
}

impl ReplyRouter {
    pub fn new(
        registry: Arc<ConnectionRegistry>,
        pending: Arc<PendingTable>,
        metrics: Arc<MetricsRecorder>,
    ) -> Self {
        Self {
            registry,
            pending,
            metrics,
        }
    }

    /// Classify and apply one frame received on `connection`. Never fails.
    pub fn route(&self, connection: &Connection, raw: &str) -> RouteOutcome {
        let reply = match decode_reply(raw) {
            Ok(reply) => reply,
            Err(DecodeError::Empty) => return RouteOutcome::Ignored,
            Err(e) => {
                warn!(
                    connection_id = %connection.id(),
                    error = %e,
                    frame_len = raw.len(),
                    "discarding unrecognized frame"
                );
                self.metrics.counter_inc("frames.unrecognized", &[], 1);
                return RouteOutcome::Unrecognized;
            }
        };

        let outcome = match reply {
            DeviceReply::Connect { device_id, .. } => self.on_connect(connection, device_id),
            DeviceReply::Disconnect { device_id, .. } => self.on_disconnect(connection, device_id),
            DeviceReply::StateUpdate {
                device_id,
                message_id,
                volume,
                is_muted,
            } => {
                let state = DeviceState {
                    device_id,
                    volume,
                    is_muted,
                };
                return self.on_state_update(connection, message_id, state);
            }
        };
        record_gauges(&self.metrics, &self.registry, &self.pending);
        outcome
    }

    fn on_connect(&self, connection: &Connection, device_id: DeviceId) -> RouteOutcome {
        let previous = self
            .registry
            .register(device_id.clone(), Arc::clone(connection.transport()));
        connection.bind(device_id.clone());

        let superseded = previous.is_some_and(|old| old.id() != connection.id());
        if superseded {
            info!(
                device_id = %device_id,
                connection_id = %connection.id(),
                "device re-registered, previous connection superseded"
            );
        } else {
            info!(device_id = %device_id, connection_id = %connection.id(), "device connected");
        }
        RouteOutcome::Registered {
            device_id,
            superseded,
        }
    }

    fn on_disconnect(&self, connection: &Connection, device_id: DeviceId) -> RouteOutcome {
        connection.unbind(&device_id);
        let release = release_device(&self.registry, &self.pending, &device_id, connection.id());
        let rejected = release.rejected;
        if release.unregistered {
            info!(device_id = %device_id, rejected, "device disconnected");
            RouteOutcome::Unregistered {
                device_id,
                rejected,
            }
        } else {
            debug!(
                device_id = %device_id,
                connection_id = %connection.id(),
                rejected,
                "disconnect from a connection that no longer owns the device"
            );
            RouteOutcome::Unbound {
                device_id,
                rejected,
            }
        }
    }

    fn on_state_update(
        &self,
        connection: &Connection,
        correlation_id: CorrelationId,
        state: DeviceState,
    ) -> RouteOutcome {
        let from = state.device_id.clone();
        match self.pending.resolve(&correlation_id, &from, connection.id(), state) {
            Ok(resolved) => {
                let elapsed_ms = resolved.elapsed.as_secs_f64() * 1000.0;
                self.metrics
                    .histogram_observe("command.round_trip_ms", &[], elapsed_ms);
                self.metrics
                    .gauge_set("requests.pending", &[], self.pending.len() as f64);
                debug!(
                    device_id = %from,
                    correlation_id = %correlation_id,
                    elapsed_ms,
                    "reply matched"
                );
                RouteOutcome::Resolved { correlation_id }
            }
            Err(e) => {
                let reason = match e {
                    PendingError::UnknownCorrelation(_) => "unknown",
                    PendingError::DeviceMismatch { .. } => "device_mismatch",
                    PendingError::ConnectionMismatch { .. } => "connection_mismatch",
                };
                warn!(
                    device_id = %from,
                    connection_id = %connection.id(),
                    error = %e,
                    "discarding unmatched reply"
                );
                self.metrics
                    .counter_inc("replies.unmatched", &[("reason", reason)], 1);
                RouteOutcome::Discarded { correlation_id }
            }
        }
    }
}
