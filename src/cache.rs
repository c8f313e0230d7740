use crate::error::Result;
use crate::manifest::Manifest;
use crate::upstream::FetchManifest;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::{SystemTime, UNIX_EPOCH};

/// Time source for cache bucketing. Injectable so tests can roll the clock
/// forward without sleeping.
pub trait Clock: Send + Sync {
    fn now_unix(&self) -> u64;
}

/// Wall-clock time
#[derive(Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_unix(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs()
    }
}

struct CacheEntry {
    bucket: u64,
    manifest: Arc<Manifest>,
}

/// Time-bucketed manifest cache keyed by upstream URL.
///
/// A cached manifest is reused only while its bucket (unix time divided by
/// the window) matches the current one; on rollover the next request
/// fetches fresh and replaces the entry whole. Concurrent requests racing
/// the first fetch of a window may each fetch, but all write the same key,
/// so the window still converges on a single manifest. Failed fetches are
/// never cached.
pub struct ManifestCache {
    window_secs: u64,
    clock: Arc<dyn Clock>,
    entries: RwLock<HashMap<String, CacheEntry>>,
}

impl ManifestCache {
    pub fn new(window_secs: u64, clock: Arc<dyn Clock>) -> Self {
        // A zero window would alias every instant to bucket 0
        let window_secs = window_secs.max(1);
        ManifestCache {
            window_secs,
            clock,
            entries: RwLock::new(HashMap::new()),
        }
    }

    pub fn with_system_clock(window_secs: u64) -> Self {
        Self::new(window_secs, Arc::new(SystemClock))
    }

    pub fn window_secs(&self) -> u64 {
        self.window_secs
    }

    /// Number of distinct upstream URLs currently cached
    pub fn len(&self) -> usize {
        self.entries.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().unwrap().is_empty()
    }

    fn current_bucket(&self) -> u64 {
        self.clock.now_unix() / self.window_secs
    }

    fn lookup(&self, url: &str, bucket: u64) -> Option<Arc<Manifest>> {
        let entries = self.entries.read().unwrap();
        entries
            .get(url)
            .filter(|entry| entry.bucket == bucket)
            .map(|entry| entry.manifest.clone())
    }

    fn insert(&self, url: &str, bucket: u64, manifest: Arc<Manifest>) {
        let mut entries = self.entries.write().unwrap();
        entries.insert(url.to_string(), CacheEntry { bucket, manifest });
    }

    /// Return the manifest for `url`, fetching through `fetcher` only when
    /// the current time bucket has no entry.
    pub async fn get_or_fetch(
        &self,
        url: &str,
        fetcher: &dyn FetchManifest,
    ) -> Result<Arc<Manifest>> {
        let bucket = self.current_bucket();

        if let Some(manifest) = self.lookup(url, bucket) {
            tracing::debug!(
                url = %url,
                bucket = bucket,
                "Cache HIT: returning cached manifest"
            );
            return Ok(manifest);
        }

        tracing::debug!(
            url = %url,
            bucket = bucket,
            "Cache MISS: fetching manifest from upstream"
        );
        let manifest = Arc::new(fetcher.fetch(url).await?);
        self.insert(url, bucket, manifest.clone());
        tracing::info!(
            url = %url,
            bucket = bucket,
            releases = manifest.releases.len(),
            "Manifest fetched and cached"
        );
        Ok(manifest)
    }
}
