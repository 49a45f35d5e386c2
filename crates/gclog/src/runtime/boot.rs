//! Boot — logging init and config load.

use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::conf::ParserConfig;

/// Initialise the tracing / logging subsystem.
pub fn init_logging() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "gclog=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

/// Load and validate the parser configuration (file or env).
pub fn boot() -> Result<ParserConfig, Box<dyn std::error::Error>> {
    info!("Starting gclog v{}", env!("CARGO_PKG_VERSION"));

    let config = ParserConfig::load()?;
    config.validate().map_err(|e| {
        error!("Invalid configuration: {}", e);
        e
    })?;
    info!(
        "Loaded configuration: sniff_limit={}B, max_line={}B, max_pending={}, noise_patterns={}",
        config.sniff_limit_bytes,
        config.max_line_bytes,
        config.max_pending_events,
        config.noise_patterns.len()
    );

    Ok(config)
}
