//! Mod metadata supplied by the host: identity and scan results.

use crate::stage::Dist;
use serde::{Deserialize, Serialize};

/// Identity of a loaded mod.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ModInfo {
    pub mod_id: String,
    #[serde(default)]
    pub display_name: String,
    #[serde(default = "default_version")]
    pub version: String,
}

fn default_version() -> String {
    "0.0.0".to_string()
}

impl ModInfo {
    pub fn new(mod_id: impl Into<String>) -> Self {
        let mod_id = mod_id.into();
        Self {
            display_name: mod_id.clone(),
            mod_id,
            version: default_version(),
        }
    }

    pub fn with_display_name(mut self, display_name: impl Into<String>) -> Self {
        self.display_name = display_name.into();
        self
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }
}

/// Bus an automatic subscriber is registered on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BusTarget {
    /// The owning mod's private bus.
    #[default]
    Mod,
    /// The host-wide bus shared by every mod.
    Host,
}

/// One type declared as an automatic event subscriber.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriberAnnotation {
    pub type_name: String,
    /// Mod the subscriber belongs to; `None` means the mod that declares it.
    #[serde(default)]
    pub mod_id: Option<String>,
    #[serde(default = "Dist::all")]
    pub sides: Vec<Dist>,
    #[serde(default)]
    pub bus: BusTarget,
}

impl SubscriberAnnotation {
    /// Subscriber on the mod bus, active on both sides.
    pub fn new(type_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            mod_id: None,
            sides: Dist::all(),
            bus: BusTarget::Mod,
        }
    }

    pub fn for_mod(mut self, mod_id: impl Into<String>) -> Self {
        self.mod_id = Some(mod_id.into());
        self
    }

    pub fn sides(mut self, sides: impl IntoIterator<Item = Dist>) -> Self {
        self.sides = sides.into_iter().collect();
        self
    }

    pub fn bus(mut self, bus: BusTarget) -> Self {
        self.bus = bus;
        self
    }

    /// Whether this annotation is registered by `mod_id` running on `dist`.
    pub fn applies_to(&self, mod_id: &str, dist: Dist) -> bool {
        let owner_matches = self.mod_id.as_deref().map_or(true, |id| id == mod_id);
        owner_matches && self.sides.contains(&dist)
    }
}

/// Result of scanning a mod's code for declarations the loader acts on.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModScanData {
    #[serde(default)]
    pub subscribers: Vec<SubscriberAnnotation>,
}

impl ModScanData {
    pub fn with_subscriber(mut self, annotation: SubscriberAnnotation) -> Self {
        self.subscribers.push(annotation);
        self
    }
}
