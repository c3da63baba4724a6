//! Main application entry point for the langbridge host.
//!
//! Loads the configuration, sets up logging, creates a container for every
//! configured mod and drives all of them through the loading stages.

mod cli;
mod config;
mod demo;
mod host;
mod logging;

use cli::CliArgs;
use config::AppConfig;
use host::ModHost;
use langbridge_eventbus::EventBus;
use langbridge_loader::{LoaderEnvironment, ModClassLoader};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, warn};

/// Main application struct.
pub struct Application {
    config: AppConfig,
    config_path: PathBuf,
    host: ModHost,
}

impl Application {
    pub async fn new(args: CliArgs) -> Result<Self, Box<dyn std::error::Error>> {
        // Load configuration first (before logging setup)
        let mut config = AppConfig::load_from_file(&args.config_path).await?;

        if let Some(dist) = args.dist {
            config.loader.dist = dist;
        }

        if let Some(log_level) = args.log_level {
            config.logging.level = log_level;
        }

        if args.json_logs {
            config.logging.json_format = true;
        }

        if args.parallel {
            config.loader.parallel_dispatch = true;
        }

        if let Err(e) = config.validate() {
            return Err(format!("Configuration validation failed: {}", e).into());
        }

        logging::setup_logging(&config.logging)?;

        let host_bus = Arc::new(
            EventBus::builder()
                .name("host")
                .track_phases(config.loader.track_phases)
                .build(),
        );
        let environment = LoaderEnvironment::new(config.loader.dist)
            .with_host_bus(host_bus)
            .with_track_phases(config.loader.track_phases);

        let class_loader: Arc<dyn ModClassLoader> = Arc::new(demo::registry());
        let mut host = ModHost::new(environment, config.loader.parallel_dispatch);
        for entry in &config.mods {
            host.add_mod(entry, class_loader.clone())
                .map_err(|e| format!("Failed to add mod {}: {}", entry.mod_id, e))?;
        }

        info!(
            "🚀 langbridge v{} | Config: {} | Side: {} | Mods: {}",
            env!("CARGO_PKG_VERSION"),
            args.config_path.display(),
            config.loader.dist,
            host.mod_count()
        );

        Ok(Self {
            config,
            config_path: args.config_path,
            host,
        })
    }

    /// Runs every stage and reports the outcome.
    pub async fn run(mut self) -> Result<(), Box<dyn std::error::Error>> {
        info!(
            "🌟 Loading {} mods ({} dispatch)",
            self.host.mod_count(),
            if self.config.loader.parallel_dispatch {
                "parallel"
            } else {
                "sequential"
            }
        );

        let summary = self.host.run_stages().await;
        let configs = self.host.load_configs();
        info!("⚙️ Delivered {} mod configs", configs);

        // Mod configs edited while the stages ran are delivered as reloads.
        match AppConfig::load_from_file(&self.config_path).await {
            Ok(latest) => {
                let reloaded = self.host.reload_configs(&latest.mods);
                if reloaded > 0 {
                    info!("🔄 Reloaded {} mod configs", reloaded);
                }
            }
            Err(e) => warn!("Could not re-read {}: {}", self.config_path.display(), e),
        }

        for failure in &summary.failures {
            error!(
                "❌ {} [{}] at {}: {:#}",
                failure.mod_id(),
                failure.message_key,
                failure.stage,
                failure.cause
            );
            if let Some(type_name) = &failure.offending_type {
                error!("   offending type: {}", type_name);
            }
        }

        let host_stats = self.host.environment().host_bus.stats();
        info!(
            "📊 Host bus: {} events, {} listener calls, {} failures",
            host_stats.events_posted, host_stats.listeners_invoked, host_stats.listener_failures
        );

        self.host.shutdown();

        if summary.is_success() {
            info!("✅ Loaded {} mods: {}", summary.loaded.len(), summary.loaded.join(", "));
            Ok(())
        } else {
            Err(format!("{} mods failed to load", summary.failures.len()).into())
        }
    }
}

#[tokio::main(flavor = "multi_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = CliArgs::parse();

    match Application::new(args).await {
        Ok(app) => {
            if let Err(e) = app.run().await {
                error!("❌ Application error: {}", e);
                std::process::exit(1);
            }
        }
        Err(e) => {
            eprintln!("❌ Failed to start application: {}", e);
            std::process::exit(1);
        }
    }

    Ok(())
}
