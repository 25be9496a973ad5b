use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tokio::sync::oneshot;
use tokio::task::AbortHandle;
use volcon_core::{ConnectionId, CorrelationId, DeviceId, DeviceState, DispatchError, PendingError};

/// What a caller's response sink eventually receives.
pub type ReplyResult = Result<DeviceState, DispatchError>;

struct PendingRequest {
    device_id: DeviceId,
    /// Connection the command was transmitted on; only it may answer.
    connection_id: ConnectionId,
    sink: oneshot::Sender<ReplyResult>,
    created_at: Instant,
    timeout: Option<AbortHandle>,
}

impl PendingRequest {
    /// Deliver the terminal result. The caller may have stopped listening.
    fn finish(self, result: ReplyResult) {
        if let Some(timer) = self.timeout {
            timer.abort();
        }
        let _ = self.sink.send(result);
    }
}

/// A fulfilled entry, as reported to the router.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Resolved {
    pub device_id: DeviceId,
    pub elapsed: Duration,
}

/// Outstanding commands awaiting a device reply, keyed by correlation id.
///
/// Every entry leaves the table exactly once: on a matching reply, on
/// rejection (timeout, disconnect), or on [`drop_all_for`](Self::drop_all_for).
/// Entries remember the connection they were sent over, so releasing one
/// connection never touches requests already sent over a newer one.
/// Sinks are always completed after the table lock is released.
pub struct PendingTable {
    entries: Mutex<HashMap<CorrelationId, PendingRequest>>,
}

impl PendingTable {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            entries: Mutex::new(HashMap::new()),
        })
    }

    /// Track a new request. With `timeout`, the entry is rejected with
    /// [`DispatchError::Timeout`] if still unresolved after that long.
    ///
    /// A timeout requires a Tokio runtime.
    pub fn create(
        self: &Arc<Self>,
        correlation_id: CorrelationId,
        device_id: DeviceId,
        connection_id: ConnectionId,
        sink: oneshot::Sender<ReplyResult>,
        timeout: Option<Duration>,
    ) -> Result<(), DispatchError> {
        let mut entries = self.entries.lock();
        if entries.contains_key(&correlation_id) {
            return Err(DispatchError::DuplicateCorrelation(correlation_id));
        }
        let timer = timeout.map(|after| self.spawn_timeout(correlation_id.clone(), after));
        let _ = entries.insert(
            correlation_id,
            PendingRequest {
                device_id,
                connection_id,
                sink,
                created_at: Instant::now(),
                timeout: timer,
            },
        );
        Ok(())
    }

    fn spawn_timeout(self: &Arc<Self>, correlation_id: CorrelationId, after: Duration) -> AbortHandle {
        let table: Weak<Self> = Arc::downgrade(self);
        tokio::spawn(async move {
            tokio::time::sleep(after).await;
            let Some(table) = table.upgrade() else {
                return;
            };
            if table.reject(&correlation_id, DispatchError::Timeout(after)).is_ok() {
                tracing::warn!(correlation_id = %correlation_id, timeout_ms = after.as_millis() as u64, "request timed out");
            }
        })
        .abort_handle()
    }

    /// Fulfil the entry for `correlation_id` with a state reported by `from`
    /// over connection `via`.
    ///
    /// A reply from another device, or from the right device on a connection
    /// other than the one the command went out on, is refused and the entry
    /// stays pending.
    pub fn resolve(
        &self,
        correlation_id: &CorrelationId,
        from: &DeviceId,
        via: &ConnectionId,
        state: DeviceState,
    ) -> Result<Resolved, PendingError> {
        let request = {
            let mut entries = self.entries.lock();
            let expected = entries
                .get(correlation_id)
                .ok_or_else(|| PendingError::UnknownCorrelation(correlation_id.clone()))?;
            if &expected.device_id != from {
                return Err(PendingError::DeviceMismatch {
                    correlation_id: correlation_id.clone(),
                    expected: expected.device_id.clone(),
                    actual: from.clone(),
                });
            }
            if &expected.connection_id != via {
                return Err(PendingError::ConnectionMismatch {
                    correlation_id: correlation_id.clone(),
                    expected: expected.connection_id.clone(),
                    actual: via.clone(),
                });
            }
            entries
                .remove(correlation_id)
                .ok_or_else(|| PendingError::UnknownCorrelation(correlation_id.clone()))?
        };

        let resolved = Resolved {
            device_id: request.device_id.clone(),
            elapsed: request.created_at.elapsed(),
        };
        request.finish(Ok(state));
        Ok(resolved)
    }

    /// Remove the entry and complete its sink with `reason`.
    pub fn reject(&self, correlation_id: &CorrelationId, reason: DispatchError) -> Result<(), PendingError> {
        let request = self
            .entries
            .lock()
            .remove(correlation_id)
            .ok_or_else(|| PendingError::UnknownCorrelation(correlation_id.clone()))?;
        request.finish(Err(reason));
        Ok(())
    }

    /// Reject every entry sent to `device` over `connection` with
    /// [`DispatchError::DeviceDisconnected`]. Returns how many were rejected.
    pub fn drop_all_for(&self, device: &DeviceId, connection: &ConnectionId) -> usize {
        let dropped: Vec<PendingRequest> = {
            let mut entries = self.entries.lock();
            let ids: Vec<CorrelationId> = entries
                .iter()
                .filter(|(_, request)| {
                    &request.device_id == device && &request.connection_id == connection
                })
                .map(|(id, _)| id.clone())
                .collect();
            ids.iter().filter_map(|id| entries.remove(id)).collect()
        };

        let count = dropped.len();
        for request in dropped {
            request.finish(Err(DispatchError::DeviceDisconnected(device.clone())));
        }
        count
    }

    pub fn contains(&self, correlation_id: &CorrelationId) -> bool {
        self.entries.lock().contains_key(correlation_id)
    }

    pub fn pending_for(&self, device: &DeviceId) -> usize {
        self.entries
            .lock()
            .values()
            .filter(|request| &request.device_id == device)
            .count()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}
