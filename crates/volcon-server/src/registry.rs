use std::sync::Arc;

use dashmap::DashMap;
use volcon_core::{ConnectionId, DeviceId, DispatchError};

use crate::transport::DeviceTransport;

/// Which device ids currently have a live connection.
///
/// Holds at most one handle per device id. A new registration replaces the
/// previous handle without closing it.
pub struct ConnectionRegistry {
    devices: DashMap<DeviceId, Arc<dyn DeviceTransport>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self {
            devices: DashMap::new(),
        }
    }

    /// Install or replace the handle for `device`. Returns the superseded handle, if any.
    pub fn register(
        &self,
        device: DeviceId,
        handle: Arc<dyn DeviceTransport>,
    ) -> Option<Arc<dyn DeviceTransport>> {
        self.devices.insert(device, handle)
    }

    /// Remove the entry for `device`. Absent ids are a no-op.
    pub fn unregister(&self, device: &DeviceId) -> Option<Arc<dyn DeviceTransport>> {
        self.devices.remove(device).map(|(_, handle)| handle)
    }

    /// Remove the entry for `device` only while it still belongs to `connection`.
    pub fn unregister_connection(&self, device: &DeviceId, connection: &ConnectionId) -> bool {
        self.devices
            .remove_if(device, |_, handle| handle.id() == connection)
            .is_some()
    }

    pub fn lookup(&self, device: &DeviceId) -> Result<Arc<dyn DeviceTransport>, DispatchError> {
        self.devices
            .get(device)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| DispatchError::DeviceNotFound(device.clone()))
    }

    /// Run `f` against the handle for `device` while holding its entry.
    ///
    /// Registration changes for the same id wait until `f` returns, so `f`
    /// must not touch this registry and must not block.
    pub fn with_live<R>(
        &self,
        device: &DeviceId,
        f: impl FnOnce(&Arc<dyn DeviceTransport>) -> R,
    ) -> Result<R, DispatchError> {
        match self.devices.get(device) {
            Some(entry) => Ok(f(entry.value())),
            None => Err(DispatchError::DeviceNotFound(device.clone())),
        }
    }

    /// Remove every entry whose transport reports closed. Returns each
    /// removed id with the connection that held it.
    pub fn prune_closed(&self) -> Vec<(DeviceId, ConnectionId)> {
        let stale: Vec<DeviceId> = self
            .devices
            .iter()
            .filter(|entry| !entry.value().is_open())
            .map(|entry| entry.key().clone())
            .collect();

        stale
            .into_iter()
            .filter_map(|device| {
                self.devices
                    .remove_if(&device, |_, handle| !handle.is_open())
                    .map(|(device, handle)| (device, handle.id().clone()))
            })
            .collect()
    }

    /// Ids whose transport is currently open, sorted.
    pub fn live_ids(&self) -> Vec<DeviceId> {
        let mut ids: Vec<DeviceId> = self
            .devices
            .iter()
            .filter(|entry| entry.value().is_open())
            .map(|entry| entry.key().clone())
            .collect();
        ids.sort_by(|a, b| a.as_str().cmp(b.as_str()));
        ids
    }

    pub fn live_count(&self) -> usize {
        self.devices.iter().filter(|entry| entry.value().is_open()).count()
    }

    pub fn contains(&self, device: &DeviceId) -> bool {
        self.devices.contains_key(device)
    }

    /// Number of entries, including stale ones not yet pruned.
    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}
