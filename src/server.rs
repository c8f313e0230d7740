use crate::cache::ManifestCache;
use crate::config::{Channel, Config, Platform, UpstreamConfig};
use crate::error::{ReleaseProxyError, Result};
use crate::manifest::{filter_releases, Release, VersionSelector};
use crate::upstream::{FetchManifest, UpstreamClient};
use axum::{
    extract::{Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::Serialize;
use std::sync::Arc;
use tracing::error;

#[derive(Clone)]
pub struct AppState {
    pub cache: Arc<ManifestCache>,
    pub fetcher: Arc<dyn FetchManifest>,
    pub upstream: Arc<UpstreamConfig>,
}

impl AppState {
    pub fn new(config: &Config) -> Result<Self> {
        config.validate().map_err(ReleaseProxyError::Config)?;
        let fetcher = Arc::new(UpstreamClient::new(&config.upstream)?);
        Ok(AppState {
            cache: Arc::new(ManifestCache::with_system_clock(config.cache.window_secs)),
            fetcher,
            upstream: Arc::new(config.upstream.clone()),
        })
    }
}

pub fn build_router(app_state: AppState) -> Router {
    Router::new()
        .route("/", get(root_redirect))
        .route("/health", get(health))
        .route("/api/v1/cache/stats", get(cache_stats))
        .route("/:platform", get(platform_redirect))
        .route("/:platform/:channel", get(channel_redirect))
        .route("/:platform/:channel/:version", get(get_releases))
        .with_state(app_state)
}

pub async fn start_server(config: Config) -> Result<tokio::task::JoinHandle<()>> {
    let app_state = AppState::new(&config)?;

    let addr = format!("{}:{}", config.server.bind_address, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| ReleaseProxyError::Config(format!("Failed to bind to {}: {}", addr, e)))?;

    tracing::info!(
        addr = %addr,
        upstream_template = %config.upstream.manifest_url_template,
        cache_window_secs = config.cache.window_secs,
        "Releases proxy listening"
    );

    let app = build_router(app_state);
    let handle = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            error!("HTTP server error after startup: {}", e);
        } else {
            tracing::info!("HTTP server stopped");
        }
    });

    Ok(handle)
}

// The redirects answer 302 Found; axum's named redirect helpers emit
// 303/307/308, so the status and Location header are set by hand.
fn found(location: String) -> Response {
    (StatusCode::FOUND, [(header::LOCATION, location)]).into_response()
}

/// GET / -> 302 /macos/stable/latest
async fn root_redirect() -> Response {
    found("/macos/stable/latest".to_string())
}

/// GET /{platform} -> 302 /{platform}/stable/latest
async fn platform_redirect(Path(platform): Path<Platform>) -> Response {
    found(format!("/{}/stable/latest", platform))
}

/// GET /{platform}/{channel} -> 302 /{platform}/{channel}/latest
async fn channel_redirect(Path((platform, channel)): Path<(Platform, Channel)>) -> Response {
    found(format!("/{}/{}/latest", platform, channel))
}

/// GET /{platform}/{channel}/{version}
///
/// The full pipeline: manifest fetched through the time-bucketed cache,
/// then filtered and normalized for the channel and version selector.
async fn get_releases(
    State(state): State<AppState>,
    Path((platform, channel, version)): Path<(Platform, Channel, String)>,
) -> std::result::Result<Json<Vec<Release>>, ReleaseProxyError> {
    let selector = VersionSelector::from(version.as_str());
    tracing::debug!(
        platform = %platform,
        channel = %channel,
        selector = ?selector,
        "Release listing request"
    );

    let url = state.upstream.manifest_url(platform);
    let manifest = state.cache.get_or_fetch(&url, state.fetcher.as_ref()).await?;
    let releases = filter_releases(&manifest, channel, &selector)?;

    tracing::debug!(
        platform = %platform,
        channel = %channel,
        matched = releases.len(),
        "Release listing response"
    );
    Ok(Json(releases))
}

async fn health() -> impl IntoResponse {
    tracing::debug!("GET /health - Health check request");
    (StatusCode::OK, "ok")
}

#[derive(Serialize)]
struct CacheStats {
    cached_manifests: usize,
    window_secs: u64,
}

/// GET /api/v1/cache/stats
async fn cache_stats(State(state): State<AppState>) -> impl IntoResponse {
    Json(CacheStats {
        cached_manifests: state.cache.len(),
        window_secs: state.cache.window_secs(),
    })
}
