//! Reference relay for the driver tracking channel.

use anyhow::Result;
use tracing_subscriber::EnvFilter;
use tracking_server::config::Config;
use tracking_server::server;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Config::from_env()?;

    tracing::info!(
        "Starting tracking-server on {}:{} (max_clients = {}, stats every {:?})",
        config.bind_addr,
        config.port,
        config.max_clients,
        config.stats_interval
    );

    server::run(config).await
}
