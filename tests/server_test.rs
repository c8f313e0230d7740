//! Integration tests for the HTTP surface
//!
//! Drives the router in-process with a fake upstream fetcher: redirects,
//! selector validation, the full fetch-cache-filter pipeline, and error
//! mapping.

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use flutter_releases_proxy::cache::{Clock, ManifestCache};
use flutter_releases_proxy::config::UpstreamConfig;
use flutter_releases_proxy::error::Result;
use flutter_releases_proxy::manifest::Manifest;
use flutter_releases_proxy::server::{build_router, AppState};
use flutter_releases_proxy::upstream::FetchManifest;
use http_body_util::BodyExt;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use tower::ServiceExt;

struct FixedClock(AtomicU64);

impl Clock for FixedClock {
    fn now_unix(&self) -> u64 {
        self.0.load(Ordering::SeqCst)
    }
}

struct FakeFetcher {
    manifest: serde_json::Value,
    calls: AtomicUsize,
}

#[async_trait]
impl FetchManifest for FakeFetcher {
    async fn fetch(&self, _url: &str) -> Result<Manifest> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(serde_json::from_value(self.manifest.clone())?)
    }
}

fn sample_manifest() -> serde_json::Value {
    serde_json::json!({
        "base_url": "https://cdn.example/flutter/",
        "current_release": { "stable": "abc123", "beta": "bbb456" },
        "releases": [
            {
                "channel": "stable",
                "version": "3.0.0",
                "hash": "olderhash",
                "dart_sdk_version": "2.17.0",
                "dart_sdk_arch": "x64",
                "release_date": "2022-05-11T00:00:00Z",
                "archive": "stable/olderhash/flutter.zip",
                "sha256": "cafe"
            },
            {
                "channel": "stable",
                "version": "3.1.0",
                "hash": "abc123",
                "release_date": "2023-05-01T00:00:00Z",
                "archive": "stable/abc123/flutter.zip",
                "sha256": "deadbeef"
            },
            {
                "channel": "beta",
                "version": "3.2.0-beta",
                "hash": "bbb456",
                "dart_sdk_version": "3.1.0-beta",
                "dart_sdk_arch": "arm64",
                "release_date": "2023-06-01T00:00:00Z",
                "archive": "beta/bbb456/flutter.zip",
                "sha256": "feedface"
            }
        ]
    })
}

fn state_with(manifest: serde_json::Value) -> (AppState, Arc<FakeFetcher>) {
    let fetcher = Arc::new(FakeFetcher {
        manifest,
        calls: AtomicUsize::new(0),
    });
    let state = AppState {
        cache: Arc::new(ManifestCache::new(
            30,
            Arc::new(FixedClock(AtomicU64::new(1_000_000))),
        )),
        fetcher: fetcher.clone(),
        upstream: Arc::new(UpstreamConfig::default()),
    };
    (state, fetcher)
}

async fn get(app: &axum::Router, uri: &str) -> axum::response::Response {
    app.clone()
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap()
}

async fn json_body(response: axum::response::Response) -> serde_json::Value {
    let body = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&body).unwrap()
}

#[tokio::test]
async fn test_root_redirects_to_macos_stable_latest() {
    let (state, _) = state_with(sample_manifest());
    let app = build_router(state);

    let response = get(&app, "/").await;
    assert_eq!(response.status(), StatusCode::FOUND);
    assert_eq!(
        response.headers()[header::LOCATION],
        "/macos/stable/latest"
    );
}

#[tokio::test]
async fn test_platform_redirects_to_stable_latest() {
    let (state, _) = state_with(sample_manifest());
    let app = build_router(state);

    let response = get(&app, "/linux").await;
    assert_eq!(response.status(), StatusCode::FOUND);
    assert_eq!(
        response.headers()[header::LOCATION],
        "/linux/stable/latest"
    );

    let response = get(&app, "/windows/beta").await;
    assert_eq!(response.status(), StatusCode::FOUND);
    assert_eq!(
        response.headers()[header::LOCATION],
        "/windows/beta/latest"
    );
}

#[tokio::test]
async fn test_unknown_platform_or_channel_rejected() {
    let (state, fetcher) = state_with(sample_manifest());
    let app = build_router(state);

    let response = get(&app, "/amiga").await;
    assert!(response.status().is_client_error());

    let response = get(&app, "/linux/nightly").await;
    assert!(response.status().is_client_error());

    let response = get(&app, "/linux/nightly/latest").await;
    assert!(response.status().is_client_error());

    // Rejected selectors never reach the upstream
    assert_eq!(fetcher.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_latest_returns_single_normalized_record() {
    let (state, _) = state_with(sample_manifest());
    let app = build_router(state);

    let response = get(&app, "/linux/stable/latest").await;
    assert_eq!(response.status(), StatusCode::OK);

    let body = json_body(response).await;
    let records = body.as_array().unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0]["scm_hash"], "abc123");
    assert_eq!(records[0]["channel"], "stable");
    assert_eq!(records[0]["flutter_version"], "3.1.0");
    // Optional fields absent upstream surface as "unknown"
    assert_eq!(records[0]["dart_version"], "unknown");
    assert_eq!(records[0]["host_arch"], "unknown");
    assert_eq!(
        records[0]["archive_url"],
        "https://cdn.example/flutter/stable/abc123/flutter.zip"
    );
    assert_eq!(records[0]["archive_sha256"], "deadbeef");
    assert_eq!(records[0]["release_date"], "2023-05-01T00:00:00Z");
}

#[tokio::test]
async fn test_all_returns_channel_in_manifest_order() {
    let (state, _) = state_with(sample_manifest());
    let app = build_router(state);

    let response = get(&app, "/linux/stable/all").await;
    assert_eq!(response.status(), StatusCode::OK);

    let body = json_body(response).await;
    let records = body.as_array().unwrap();
    assert_eq!(records.len(), 2);
    assert_eq!(records[0]["flutter_version"], "3.0.0");
    assert_eq!(records[1]["flutter_version"], "3.1.0");

    let response = get(&app, "/linux/beta/all").await;
    let body = json_body(response).await;
    let records = body.as_array().unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0]["host_arch"], "arm64");
}

#[tokio::test]
async fn test_unknown_version_yields_empty_array() {
    let (state, _) = state_with(sample_manifest());
    let app = build_router(state);

    let response = get(&app, "/linux/stable/zzz-not-found").await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await, serde_json::json!([]));
}

#[tokio::test]
async fn test_same_window_requests_fetch_upstream_once() {
    let (state, fetcher) = state_with(sample_manifest());
    let app = build_router(state);

    let first = json_body(get(&app, "/linux/stable/all").await).await;
    let second = json_body(get(&app, "/linux/stable/all").await).await;
    assert_eq!(first, second);
    assert_eq!(fetcher.calls.load(Ordering::SeqCst), 1);

    // A different platform is a different manifest URL
    get(&app, "/macos/stable/all").await;
    assert_eq!(fetcher.calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_malformed_entry_answers_bad_gateway() {
    let mut manifest = sample_manifest();
    manifest["releases"][1]
        .as_object_mut()
        .unwrap()
        .remove("sha256");
    let (state, _) = state_with(manifest);
    let app = build_router(state);

    let response = get(&app, "/linux/stable/all").await;
    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
}

#[tokio::test]
async fn test_health_and_cache_stats() {
    let (state, _) = state_with(sample_manifest());
    let app = build_router(state);

    let response = get(&app, "/health").await;
    assert_eq!(response.status(), StatusCode::OK);

    let response = get(&app, "/api/v1/cache/stats").await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["cached_manifests"], 0);
    assert_eq!(body["window_secs"], 30);

    // Stats reflect a populated cache
    get(&app, "/linux/stable/all").await;
    let body = json_body(get(&app, "/api/v1/cache/stats").await).await;
    assert_eq!(body["cached_manifests"], 1);
}
