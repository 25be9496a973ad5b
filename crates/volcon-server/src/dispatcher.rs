use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use tokio::sync::oneshot;
use tracing::{debug, warn};
use volcon_core::{Command, CommandFrame, CorrelationId, DeviceId, DeviceState, DispatchError};
use volcon_telemetry::MetricsRecorder;

use crate::hub::{record_gauges, release_device};
use crate::pending::{PendingTable, ReplyResult};
use crate::registry::ConnectionRegistry;
use crate::transport::Outbound;

/// Sends typed commands to connected devices and hands back a future for the reply.
#[derive(Clone)]
pub struct Dispatcher {
    registry: Arc<ConnectionRegistry>,
    pending: Arc<PendingTable>,
    metrics: Arc<MetricsRecorder>,
    request_timeout: Option<Duration>,
}

impl Dispatcher {
    pub fn new(
        registry: Arc<ConnectionRegistry>,
        pending: Arc<PendingTable>,
        metrics: Arc<MetricsRecorder>,
        request_timeout: Option<Duration>,
    ) -> Self {
        Self {
            registry,
            pending,
            metrics,
            request_timeout,
        }
    }

    /// Transmit `command` and return a future for the device's reply.
    ///
    /// Fails immediately with `DeviceNotFound` (no pending entry is created),
    /// `DuplicateCorrelation`, or `DeviceDisconnected` when the transmit
    /// itself fails. Otherwise exactly one pending entry exists for the
    /// returned correlation id until the reply, a timeout, or a disconnect.
    pub fn dispatch(&self, command: Command) -> Result<PendingReply, DispatchError> {
        let Command {
            device_id,
            correlation_id,
            action,
        } = command;
        let correlation_id = correlation_id.unwrap_or_default();
        let action_name = action.name();

        let frame = CommandFrame {
            device_id: device_id.clone(),
            message_id: correlation_id.clone(),
            action,
        };
        let payload = frame
            .to_json()
            .map_err(|e| self.fail(DispatchError::Encode(e.to_string())))?;

        let (tx, rx) = oneshot::channel();
        let handle = self
            .registry
            .with_live(&device_id, |handle| {
                self.pending
                    .create(
                        correlation_id.clone(),
                        device_id.clone(),
                        handle.id().clone(),
                        tx,
                        self.request_timeout,
                    )
                    .map(|()| Arc::clone(handle))
            })
            .and_then(|created| created)
            .map_err(|e| self.fail(e))?;

        self.metrics
            .counter_inc("commands.dispatched", &[("action", action_name)], 1);

        if let Err(e) = handle.send(Outbound::Text(payload)) {
            warn!(
                device_id = %device_id,
                correlation_id = %correlation_id,
                error = %e,
                "transmit failed, dropping device"
            );
            // Rejects this entry too, even if the connection was already superseded.
            let release = release_device(&self.registry, &self.pending, &device_id, handle.id());
            debug!(
                device_id = %device_id,
                unregistered = release.unregistered,
                rejected = release.rejected,
                "released device after failed transmit"
            );
            record_gauges(&self.metrics, &self.registry, &self.pending);
            return Err(self.fail(DispatchError::DeviceDisconnected(device_id)));
        }

        debug!(
            device_id = %device_id,
            correlation_id = %correlation_id,
            action = action_name,
            "command dispatched"
        );
        record_gauges(&self.metrics, &self.registry, &self.pending);

        Ok(PendingReply {
            correlation_id,
            device_id,
            rx,
            metrics: Arc::clone(&self.metrics),
        })
    }

    /// Dispatch and wait for the terminal result.
    pub async fn execute(&self, command: Command) -> Result<DeviceState, DispatchError> {
        self.dispatch(command)?.await
    }

    fn fail(&self, err: DispatchError) -> DispatchError {
        self.metrics
            .counter_inc("commands.completed", &[("outcome", err.error_kind())], 1);
        err
    }
}

/// Resolves once the device replies, the request times out, or the device disconnects.
pub struct PendingReply {
    correlation_id: CorrelationId,
    device_id: DeviceId,
    rx: oneshot::Receiver<ReplyResult>,
    metrics: Arc<MetricsRecorder>,
}

impl PendingReply {
    pub fn correlation_id(&self) -> &CorrelationId {
        &self.correlation_id
    }

    pub fn device_id(&self) -> &DeviceId {
        &self.device_id
    }
}

impl Future for PendingReply {
    type Output = ReplyResult;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let received = match Pin::new(&mut self.rx).poll(cx) {
            Poll::Ready(received) => received,
            Poll::Pending => return Poll::Pending,
        };
        // A dropped sink means the table went away with the entry still in it.
        let result = received.unwrap_or_else(|_| Err(DispatchError::DeviceDisconnected(self.device_id.clone())));
        let outcome = match &result {
            Ok(_) => "ok",
            Err(e) => e.error_kind(),
        };
        self.metrics
            .counter_inc("commands.completed", &[("outcome", outcome)], 1);
        Poll::Ready(result)
    }
}
