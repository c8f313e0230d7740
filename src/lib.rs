pub mod cache;
pub mod config;
pub mod error;
pub mod manifest;
pub mod server;
pub mod upstream;

pub use cache::{Clock, ManifestCache, SystemClock};
pub use config::{Channel, Config, Platform};
pub use error::{ReleaseProxyError, Result};
pub use manifest::{filter_releases, Manifest, Release, VersionSelector};

/// Start the releases-proxy server with the given configuration
pub async fn start_server(config: Config) -> Result<tokio::task::JoinHandle<()>> {
    server::start_server(config).await
}
