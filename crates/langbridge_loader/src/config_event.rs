//! Configuration change events delivered outside the stage sequence.

use langbridge_eventbus::impl_event;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Which side a configuration file applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfigType {
    Common,
    Client,
    Server,
}

/// A loaded mod configuration file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModConfig {
    pub config_type: ConfigType,
    pub file_name: String,
    #[serde(default)]
    pub values: Value,
}

impl ModConfig {
    pub fn new(config_type: ConfigType, file_name: impl Into<String>, values: Value) -> Self {
        Self {
            config_type,
            file_name: file_name.into(),
            values,
        }
    }

    /// Looks up a dotted path such as `"worldgen.ore_rate"`.
    pub fn get(&self, path: &str) -> Option<&Value> {
        path.split('.')
            .try_fold(&self.values, |value, key| value.get(key))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigEventKind {
    Loading,
    Reloading,
    Unloading,
}

/// Posted to a mod's bus when one of its configuration files changes state.
#[derive(Debug, Clone)]
pub struct ModConfigEvent {
    pub mod_id: String,
    pub kind: ConfigEventKind,
    pub config: ModConfig,
}

impl ModConfigEvent {
    pub fn loading(mod_id: impl Into<String>, config: ModConfig) -> Self {
        Self::new(mod_id, ConfigEventKind::Loading, config)
    }

    pub fn reloading(mod_id: impl Into<String>, config: ModConfig) -> Self {
        Self::new(mod_id, ConfigEventKind::Reloading, config)
    }

    pub fn unloading(mod_id: impl Into<String>, config: ModConfig) -> Self {
        Self::new(mod_id, ConfigEventKind::Unloading, config)
    }

    fn new(mod_id: impl Into<String>, kind: ConfigEventKind, config: ModConfig) -> Self {
        Self {
            mod_id: mod_id.into(),
            kind,
            config,
        }
    }
}

impl_event!(ModConfigEvent);

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_dotted_lookup() {
        let config = ModConfig::new(
            ConfigType::Common,
            "demo-common.toml",
            json!({ "worldgen": { "ore_rate": 4 }, "enabled": true }),
        );
        assert_eq!(config.get("worldgen.ore_rate"), Some(&json!(4)));
        assert_eq!(config.get("enabled"), Some(&json!(true)));
        assert_eq!(config.get("worldgen.missing"), None);
        assert_eq!(config.get("enabled.deeper"), None);
    }

    #[test]
    fn test_event_constructors_set_kind() {
        let config = ModConfig::new(ConfigType::Client, "demo-client.toml", Value::Null);
        assert_eq!(ModConfigEvent::loading("demo", config.clone()).kind, ConfigEventKind::Loading);
        assert_eq!(ModConfigEvent::unloading("demo", config).kind, ConfigEventKind::Unloading);
    }
}
