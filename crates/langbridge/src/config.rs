//! Configuration management for the langbridge host.
//!
//! This module handles loading and validation of the host configuration from
//! TOML files, including the list of mods to run through the loading stages.

use langbridge_loader::{ConfigType, Dist, ModConfig, ModInfo, ModScanData, SubscriberAnnotation};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashSet;
use std::path::PathBuf;
use tracing::info;

/// Host configuration loaded from TOML file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Loader behavior
    pub loader: LoaderSettings,
    /// Logging configuration settings
    pub logging: LoggingSettings,
    /// Mods to load, in load order
    #[serde(default)]
    pub mods: Vec<ModEntry>,
}

/// Loader behavior settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoaderSettings {
    /// Side the host runs as
    #[serde(default = "default_dist")]
    pub dist: Dist,
    /// Dispatch each stage to all mods concurrently
    #[serde(default)]
    pub parallel_dispatch: bool,
    /// Emit a trace span for every listener invocation
    #[serde(default)]
    pub track_phases: bool,
}

fn default_dist() -> Dist {
    Dist::Client
}

/// Logging system configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingSettings {
    /// Log level filter (trace, debug, info, warn, error)
    pub level: String,
    /// Whether to output logs in JSON format
    pub json_format: bool,
}

/// One mod the host loads.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModEntry {
    pub mod_id: String,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default = "default_mod_version")]
    pub version: String,
    /// Name of the mod's implementation type
    pub entry_type: String,
    /// Types registered as automatic event subscribers
    #[serde(default)]
    pub subscribers: Vec<SubscriberAnnotation>,
    /// Common configuration values handed to the mod after loading
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<Value>,
}

fn default_mod_version() -> String {
    "0.0.0".to_string()
}

impl ModEntry {
    pub fn mod_info(&self) -> ModInfo {
        let info = ModInfo::new(self.mod_id.clone()).with_version(self.version.clone());
        match &self.display_name {
            Some(name) => info.with_display_name(name.clone()),
            None => info,
        }
    }

    pub fn scan_data(&self) -> ModScanData {
        ModScanData {
            subscribers: self.subscribers.clone(),
        }
    }

    pub fn common_config(&self) -> Option<ModConfig> {
        self.config.as_ref().map(|values| {
            ModConfig::new(
                ConfigType::Common,
                format!("{}-common.toml", self.mod_id),
                values.clone(),
            )
        })
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            loader: LoaderSettings {
                dist: Dist::Client,
                parallel_dispatch: false,
                track_phases: false,
            },
            logging: LoggingSettings {
                level: "info".to_string(),
                json_format: false,
            },
            mods: vec![ModEntry {
                mod_id: "examplemod".to_string(),
                display_name: Some("Example Mod".to_string()),
                version: "1.0.0".to_string(),
                entry_type: "demo::ExampleMod".to_string(),
                subscribers: vec![
                    SubscriberAnnotation::new("demo::SetupHooks"),
                    SubscriberAnnotation::new("demo::ClientHooks").sides([Dist::Client]),
                ],
                config: Some(json!({ "greeting": "hello", "verbose": false })),
            }],
        }
    }
}

impl AppConfig {
    /// Loads configuration from a TOML file.
    ///
    /// If the file doesn't exist, creates a default configuration file at the specified path
    /// and returns the default configuration.
    pub async fn load_from_file(path: &PathBuf) -> Result<Self, Box<dyn std::error::Error>> {
        if path.exists() {
            let content = tokio::fs::read_to_string(path).await?;
            let config: AppConfig = toml::from_str(&content)?;
            Ok(config)
        } else {
            let default_config = AppConfig::default();
            let toml_content = toml::to_string_pretty(&default_config)?;
            tokio::fs::write(path, toml_content).await?;
            info!("Created default configuration file: {}", path.display());
            Ok(default_config)
        }
    }

    /// Validates the configuration for consistency and correctness.
    pub fn validate(&self) -> Result<(), String> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.as_str()) {
            return Err(format!(
                "Invalid log level: {}. Must be one of: {valid_levels:?}",
                &self.logging.level
            ));
        }

        let mut seen = HashSet::new();
        for entry in &self.mods {
            if entry.mod_id.is_empty() {
                return Err("Mod id cannot be empty".to_string());
            }
            if entry.entry_type.is_empty() {
                return Err(format!("Mod {} has no entry type", entry.mod_id));
            }
            if !seen.insert(entry.mod_id.as_str()) {
                return Err(format!("Duplicate mod id: {}", entry.mod_id));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use langbridge_loader::BusTarget;
    use tempfile::{NamedTempFile, TempDir};
    use tokio::fs;

    #[test]
    fn test_app_config_default() {
        let config = AppConfig::default();

        assert_eq!(config.loader.dist, Dist::Client);
        assert!(!config.loader.parallel_dispatch);
        assert!(!config.loader.track_phases);
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.mods.len(), 1);
        assert_eq!(config.mods[0].entry_type, "demo::ExampleMod");
        assert!(config.validate().is_ok());
    }

    #[tokio::test]
    async fn test_load_from_nonexistent_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("langbridge.toml");

        let config = AppConfig::load_from_file(&path).await.unwrap();
        assert_eq!(config.mods[0].mod_id, "examplemod");
        assert!(path.exists());

        // The written default must parse back.
        let reloaded = AppConfig::load_from_file(&path).await.unwrap();
        assert_eq!(reloaded.mods, config.mods);
    }

    #[tokio::test]
    async fn test_load_from_existing_file() {
        let toml_content = r#"
[loader]
dist = "dedicated_server"
parallel_dispatch = true

[logging]
level = "debug"
json_format = true

[[mods]]
mod_id = "alpha"
entry_type = "alpha::Mod"

[[mods.subscribers]]
type_name = "alpha::ServerHooks"
sides = ["dedicated_server"]
bus = "host"

[[mods]]
mod_id = "beta"
display_name = "Beta"
version = "2.1.0"
entry_type = "beta::Mod"
"#;

        let temp_file = NamedTempFile::new().unwrap();
        fs::write(temp_file.path(), toml_content).await.unwrap();

        let config = AppConfig::load_from_file(&temp_file.path().to_path_buf())
            .await
            .unwrap();

        assert_eq!(config.loader.dist, Dist::DedicatedServer);
        assert!(config.loader.parallel_dispatch);
        assert!(!config.loader.track_phases);
        assert_eq!(config.logging.level, "debug");
        assert!(config.logging.json_format);

        let alpha = &config.mods[0];
        assert_eq!(alpha.version, "0.0.0");
        assert_eq!(alpha.mod_info().display_name, "alpha");
        let hooks = &alpha.scan_data().subscribers[0];
        assert_eq!(hooks.sides, vec![Dist::DedicatedServer]);
        assert_eq!(hooks.bus, BusTarget::Host);

        let beta = config.mods[1].mod_info();
        assert_eq!(beta.display_name, "Beta");
        assert_eq!(beta.version, "2.1.0");
        assert!(config.mods[1].common_config().is_none());
    }

    #[test]
    fn test_inline_mod_config_becomes_common_config() {
        let toml_content = r#"
[loader]

[logging]
level = "info"
json_format = false

[[mods]]
mod_id = "alpha"
entry_type = "alpha::Mod"

[mods.config]
ore_rate = 4
worldgen = { enabled = true }
"#;

        let config: AppConfig = toml::from_str(toml_content).unwrap();
        let common = config.mods[0].common_config().unwrap();
        assert_eq!(common.config_type, ConfigType::Common);
        assert_eq!(common.file_name, "alpha-common.toml");
        assert_eq!(common.get("ore_rate"), Some(&json!(4)));
        assert_eq!(common.get("worldgen.enabled"), Some(&json!(true)));
        assert_eq!(config.loader.dist, Dist::Client);
    }

    #[test]
    fn test_validation_invalid_log_level() {
        let mut config = AppConfig::default();
        config.logging.level = "loud".to_string();

        let result = config.validate();
        assert!(result.unwrap_err().contains("Invalid log level"));
    }

    #[test]
    fn test_validation_duplicate_mod_id() {
        let mut config = AppConfig::default();
        config.mods.push(config.mods[0].clone());

        let result = config.validate();
        assert!(result.unwrap_err().contains("Duplicate mod id: examplemod"));
    }

    #[test]
    fn test_validation_empty_mod_id() {
        let mut config = AppConfig::default();
        config.mods[0].mod_id.clear();

        assert!(config.validate().unwrap_err().contains("cannot be empty"));
    }
}
