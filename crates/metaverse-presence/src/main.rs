//! Presence node entry point
//!
//! Run with:
//! ```bash
//! cargo run -p metaverse-presence --bin presence-node
//! ```
//!
//! Configuration is loaded from environment variables.

use anyhow::Context;
use metaverse_common::{try_init_tracing_with_config, AppConfig, TracingConfig};
use tracing::{error, info};

#[tokio::main]
async fn main() {
    // Configuration picks the log format, so it is loaded before tracing.
    let config = match AppConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load configuration: {e}");
            std::process::exit(1);
        }
    };

    if let Err(e) = try_init_tracing_with_config(TracingConfig::for_settings(&config.app)) {
        eprintln!("Warning: Failed to initialize tracing: {e}");
    }

    if let Err(e) = run(config).await {
        error!(error = %e, "Presence node failed");
        std::process::exit(1);
    }
}

async fn run(config: AppConfig) -> anyhow::Result<()> {
    info!(
        env = ?config.app.env,
        ttl_secs = config.presence.session_ttl().as_secs(),
        reaper_interval_ms = config.presence.reaper_interval().as_millis() as u64,
        "Configuration loaded"
    );

    metaverse_presence::run(config)
        .await
        .context("presence node stopped unexpectedly")
}
