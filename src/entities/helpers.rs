//! Identity, availability and change tracking shared by every entity.

use super::{EntityState, StateListener};
use crate::device_info::DeviceInfo;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

/// Shared building block for entity adapters.
///
/// Holds the availability flag and a version counter that is bumped whenever
/// the entity's visible state changes. If a listener is registered it is
/// called with the new state right away.
pub struct EntityCore {
    unique_id: String,
    name: String,
    device_info: DeviceInfo,
    available: AtomicBool,
    version: AtomicU32,
    listener: RwLock<Option<StateListener>>,
}

impl EntityCore {
    /// New entities start out available with unknown state.
    pub fn new(unique_id: String, name: String, device_info: DeviceInfo) -> Self {
        Self {
            unique_id,
            name,
            device_info,
            available: AtomicBool::new(true),
            version: AtomicU32::new(0),
            listener: RwLock::new(None),
        }
    }

    pub fn unique_id(&self) -> &str {
        &self.unique_id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn device_info(&self) -> &DeviceInfo {
        &self.device_info
    }

    pub fn available(&self) -> bool {
        self.available.load(Ordering::SeqCst)
    }

    /// Set availability, returning whether it changed.
    pub fn set_available(&self, available: bool) -> bool {
        self.available.swap(available, Ordering::SeqCst) != available
    }

    pub fn version(&self) -> u32 {
        self.version.load(Ordering::SeqCst)
    }

    pub fn set_listener(&self, listener: StateListener) {
        *self.listener.write() = Some(listener);
    }

    /// Bump the version and notify the listener if `changed`.
    pub fn publish(&self, changed: bool, state: impl FnOnce() -> EntityState) {
        if !changed {
            return;
        }
        self.version.fetch_add(1, Ordering::SeqCst);
        let listener = self.listener.read().clone();
        if let Some(listener) = listener {
            listener(&self.unique_id, &state());
        }
    }
}
