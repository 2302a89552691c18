//! Shared registry of live device sessions.
//!
//! The registry is the single arbiter of the one-session-per-IMEI rule and
//! the only cross-session shared state; the HTTP surface reads it on behalf
//! of external clients.

use std::collections::hash_map::Entry;
use std::collections::HashMap;

use tokio::sync::RwLock;

use crate::session::SessionHandle;

/// Map of IMEI to live session handle.
pub struct DeviceRegistry {
    devices: RwLock<HashMap<u64, SessionHandle>>,
}

impl DeviceRegistry {
    pub fn new() -> Self {
        Self {
            devices: RwLock::new(HashMap::new()),
        }
    }

    /// Atomically inserts `handle` unless its IMEI is already present.
    /// Returns whether the insertion happened; the loser of a connection
    /// race must close its transport.
    pub async fn insert_if_absent(&self, handle: SessionHandle) -> bool {
        let mut devices = self.devices.write().await;
        match devices.entry(handle.imei()) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                slot.insert(handle);
                true
            }
        }
    }

    /// Removes the session registered under `imei`, if any.
    pub async fn remove(&self, imei: u64) {
        self.devices.write().await.remove(&imei);
    }

    /// Handle of the live session for `imei`.
    pub async fn lookup(&self, imei: u64) -> Option<SessionHandle> {
        self.devices.read().await.get(&imei).cloned()
    }

    /// Whether a live session holds `imei`.
    pub async fn exists(&self, imei: u64) -> bool {
        self.devices.read().await.contains_key(&imei)
    }

    /// Visits every live session until `f` returns false.
    pub async fn iterate<F>(&self, mut f: F)
    where
        F: FnMut(u64, &SessionHandle) -> bool,
    {
        let devices = self.devices.read().await;
        for (imei, handle) in devices.iter() {
            if !f(*imei, handle) {
                break;
            }
        }
    }

    /// Number of live sessions.
    pub async fn len(&self) -> usize {
        self.devices.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.devices.read().await.is_empty()
    }
}

impl Default for DeviceRegistry {
    fn default() -> Self {
        Self::new()
    }
}
