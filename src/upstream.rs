use crate::config::UpstreamConfig;
use crate::error::{ReleaseProxyError, Result};
use crate::manifest::Manifest;
use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;

/// Fetch seam for the release manifest. The production implementation is
/// [`UpstreamClient`]; tests substitute fakes to count or fail fetches.
#[async_trait]
pub trait FetchManifest: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<Manifest>;
}

/// HTTP client for upstream manifest requests
pub struct UpstreamClient {
    client: Client,
}

impl UpstreamClient {
    pub fn new(config: &UpstreamConfig) -> Result<Self> {
        let client = Client::builder()
            // Connection pool configuration
            .pool_max_idle_per_host(4)
            .pool_idle_timeout(Duration::from_secs(90))
            // Bounded timeouts so a stuck upstream surfaces as a fetch error
            .timeout(Duration::from_secs(config.timeout_secs))
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .build()
            .map_err(ReleaseProxyError::Http)?;

        Ok(Self { client })
    }
}

#[async_trait]
impl FetchManifest for UpstreamClient {
    async fn fetch(&self, url: &str) -> Result<Manifest> {
        tracing::debug!(url = %url, "Fetching release manifest from upstream");

        let response = self.client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            tracing::warn!(
                url = %url,
                status = %status,
                "Upstream returned non-success status for manifest"
            );
            return Err(ReleaseProxyError::UpstreamStatus {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let body = response.bytes().await?;
        let manifest: Manifest = serde_json::from_slice(&body)?;
        tracing::debug!(
            url = %url,
            releases = manifest.releases.len(),
            channels = manifest.current_release.len(),
            "Manifest decoded"
        );
        Ok(manifest)
    }
}
