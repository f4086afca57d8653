//! Tool-server discovery daemon

use anyhow::Context;
use discovery_server::{Config, DiscoveryServer, LogFormat, shutdown_signal};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // An explicit path must load; the search path falls back to defaults
    let config = match std::env::args().nth(1) {
        Some(path) => Config::load_from_file(&path)
            .with_context(|| format!("Failed to load configuration from {}", path))?,
        None => match Config::load() {
            Ok(cfg) => cfg,
            Err(e) => {
                // Can't use tracing yet - not initialized
                eprintln!("Configuration error: {}", e);
                eprintln!("Using default configuration");
                Config::default()
            }
        },
    };

    common::logging::init_with(
        config.logging.level.as_deref().unwrap_or("info"),
        config.logging.format == LogFormat::Json,
    );

    tracing::info!(
        listen_addr = %config.http.listen_addr,
        hosts = ?config.discovery.hosts,
        "Tool-server discovery starting"
    );

    let server = DiscoveryServer::new(config).context("Failed to build discovery server")?;
    server
        .run(shutdown_signal())
        .await
        .context("Discovery server failed")?;

    Ok(())
}
