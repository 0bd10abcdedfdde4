use std::sync::RwLock;

use tracing::info;

use crate::app::display::topology::DisplayTopology;
use crate::app::display::variant::VariantTag;
use crate::app::error::AppError;
use crate::app::hierarchy::cache::HierarchyCache;
use crate::app::models::{DeviceInfo, Resolution};

/// Snapshot of the session handed to a single operation.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionContext {
    pub device: DeviceInfo,
    pub topology: Option<DisplayTopology>,
}

impl SessionContext {
    pub fn serial(&self) -> &str {
        &self.device.serial
    }

    pub fn variant(&self) -> Option<VariantTag> {
        self.device.variant
    }

    pub fn physical_id(&self, display_id: &str) -> Option<&str> {
        self.topology
            .as_ref()
            .and_then(|topology| topology.physical_id(display_id))
    }

    pub fn resolution(&self, display_id: &str) -> Option<Resolution> {
        self.topology
            .as_ref()
            .and_then(|topology| topology.resolution(display_id))
    }
}

/// Owns the current device, its topology and its hierarchy cache.
#[derive(Default)]
pub struct SessionManager {
    current: RwLock<Option<DeviceInfo>>,
    topology: RwLock<Option<DisplayTopology>>,
    cache: HierarchyCache,
}

impl SessionManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes `device` current. Switching to another serial drops the previous device's state.
    pub fn select(&self, device: DeviceInfo) {
        let switched = match self.current.write() {
            Ok(mut guard) => {
                let switched = guard
                    .as_ref()
                    .map_or(true, |current| current.serial != device.serial);
                *guard = Some(device);
                switched
            }
            Err(_) => return,
        };
        if switched {
            self.reset_derived();
        }
    }

    pub fn clear(&self) {
        if let Ok(mut guard) = self.current.write() {
            if let Some(device) = guard.take() {
                info!(serial = %device.serial, "session cleared");
            }
        }
        self.reset_derived();
    }

    fn reset_derived(&self) {
        if let Ok(mut guard) = self.topology.write() {
            *guard = None;
        }
        self.cache.clear();
    }

    pub fn current(&self) -> Option<DeviceInfo> {
        self.current.read().ok().and_then(|guard| guard.clone())
    }

    /// Replaces the topology wholesale, but only while `serial` is still current.
    pub fn set_topology(&self, serial: &str, topology: Option<DisplayTopology>) {
        let still_current = self
            .current()
            .is_some_and(|device| device.serial == serial);
        if !still_current {
            return;
        }
        if let Ok(mut guard) = self.topology.write() {
            *guard = topology;
        }
    }

    pub fn topology(&self) -> Option<DisplayTopology> {
        self.topology.read().ok().and_then(|guard| guard.clone())
    }

    pub fn cache(&self) -> &HierarchyCache {
        &self.cache
    }

    pub fn context(&self, trace_id: &str) -> Result<SessionContext, AppError> {
        let device = self.current().ok_or_else(|| AppError::no_device(trace_id))?;
        Ok(SessionContext {
            device,
            topology: self.topology(),
        })
    }
}
