use flutter_releases_proxy::{start_server, Config};
use tokio::signal;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::fmt::init();

    let config = Config::default();

    tracing::info!(
        "Starting releases proxy on {}:{}",
        config.server.bind_address,
        config.server.port
    );
    tracing::info!("Upstream template: {}", config.upstream.manifest_url_template);
    tracing::info!("Cache window: {}s", config.cache.window_secs);
    tracing::info!("Press Ctrl+C to stop the server.");

    let _handle = start_server(config).await?;

    // Wait for shutdown signal
    signal::ctrl_c().await?;
    tracing::info!("Shutting down...");

    Ok(())
}
