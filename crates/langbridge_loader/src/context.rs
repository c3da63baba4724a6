//! Construction context handed to mod code.

use crate::metadata::{BusTarget, ModInfo};
use crate::stage::Dist;
use langbridge_eventbus::EventBus;
use std::sync::Arc;

/// What a mod constructor or subscriber initializer can reach.
///
/// The mod bus is the mod's private bus; listeners registered on it from a
/// constructor land before any automatic subscriber.
#[derive(Debug, Clone)]
pub struct ModLoadingContext {
    mod_info: ModInfo,
    mod_bus: Arc<EventBus>,
    host_bus: Arc<EventBus>,
    dist: Dist,
}

impl ModLoadingContext {
    pub fn new(mod_info: ModInfo, mod_bus: Arc<EventBus>, host_bus: Arc<EventBus>, dist: Dist) -> Self {
        Self {
            mod_info,
            mod_bus,
            host_bus,
            dist,
        }
    }

    pub fn mod_info(&self) -> &ModInfo {
        &self.mod_info
    }

    pub fn mod_id(&self) -> &str {
        &self.mod_info.mod_id
    }

    pub fn mod_bus(&self) -> &Arc<EventBus> {
        &self.mod_bus
    }

    pub fn host_bus(&self) -> &Arc<EventBus> {
        &self.host_bus
    }

    pub fn dist(&self) -> Dist {
        self.dist
    }

    pub fn bus_for(&self, target: BusTarget) -> &Arc<EventBus> {
        match target {
            BusTarget::Mod => &self.mod_bus,
            BusTarget::Host => &self.host_bus,
        }
    }
}
