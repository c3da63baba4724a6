//! Logging setup for the langbridge host.

use crate::config::LoggingSettings;
use tracing::info;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Crates whose output follows the configured level. Everything else is held
/// at `warn`.
const HOST_CRATES: [&str; 3] = ["langbridge", "langbridge_loader", "langbridge_eventbus"];

/// Builds the default filter directive for `level`.
fn filter_directive(level: &str) -> String {
    HOST_CRATES
        .iter()
        .fold("warn".to_string(), |directive, krate| format!("{directive},{krate}={level}"))
}

/// Installs the global tracing subscriber.
///
/// `RUST_LOG` wins over the configured level when set.
pub fn setup_logging(config: &LoggingSettings) -> Result<(), Box<dyn std::error::Error>> {
    let directive = filter_directive(&config.level);
    let filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(&directive))?;
    let registry = tracing_subscriber::registry().with(filter);

    // Targets carry the crate and module, which is how listener failures are traced back.
    let layer = fmt::layer().with_target(true).with_thread_names(true);
    if config.json_format {
        registry.with(layer.json().with_current_span(false)).try_init()?;
    } else {
        registry.with(layer.with_ansi(true).compact()).try_init()?;
    }

    info!("🔧 Logging initialized ({})", directive);
    Ok(())
}
