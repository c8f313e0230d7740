use crate::config::Channel;
use crate::error::{ReleaseProxyError, Result};
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use url::Url;

/// Upstream release manifest for one platform, as published at
/// `releases_{platform}.json`. Decoded once per fetch and treated as
/// read-only afterwards.
#[derive(Debug, Clone, Deserialize)]
pub struct Manifest {
    /// Base URL that per-release archive paths are resolved against
    pub base_url: String,
    /// Channel name -> scm hash of that channel's latest release.
    /// Defaulted so manifests without it still serve `all`/exact selectors.
    #[serde(default)]
    pub current_release: HashMap<String, String>,
    /// Raw release entries in upstream order
    #[serde(default)]
    pub releases: Vec<RawRelease>,
}

/// One raw manifest entry. Every field is optional at decode time so a
/// single malformed entry surfaces as an explicit per-entry error instead
/// of failing the whole document decode.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawRelease {
    pub channel: Option<String>,
    pub version: Option<String>,
    pub hash: Option<String>,
    pub dart_sdk_version: Option<String>,
    pub dart_sdk_arch: Option<String>,
    pub release_date: Option<String>,
    pub archive: Option<String>,
    pub sha256: Option<String>,
}

/// Normalized, client-facing release record
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Release {
    pub scm_hash: String,
    pub channel: String,
    pub flutter_version: String,
    pub dart_version: String,
    pub host_arch: String,
    pub release_date: DateTime<Utc>,
    pub archive_url: Url,
    pub archive_sha256: String,
}

/// The version path segment: `all`, `latest`, or an exact version literal
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VersionSelector {
    All,
    Latest,
    Exact(String),
}

impl From<&str> for VersionSelector {
    fn from(s: &str) -> Self {
        match s {
            "all" => VersionSelector::All,
            "latest" => VersionSelector::Latest,
            other => VersionSelector::Exact(other.to_string()),
        }
    }
}

/// Select and normalize the manifest entries for a channel and version
/// selector, preserving upstream order.
///
/// `latest` filters by the scm hash recorded in `current_release` for the
/// channel; an exact selector filters by the entry's version field; `all`
/// applies no version filter. At most one of the two filters is active.
///
/// A required field missing from a scanned entry aborts the whole request
/// (fail-closed): no partial result is ever returned for a feed that does
/// not match the expected schema. An empty result is not an error.
pub fn filter_releases(
    manifest: &Manifest,
    channel: Channel,
    selector: &VersionSelector,
) -> Result<Vec<Release>> {
    let (version_filter, hash_filter): (Option<&str>, Option<&str>) = match selector {
        VersionSelector::All => (None, None),
        VersionSelector::Latest => {
            let hash = manifest
                .current_release
                .get(channel.as_str())
                .ok_or_else(|| {
                    ReleaseProxyError::MalformedEntry(format!(
                        "current_release has no entry for channel `{}`",
                        channel
                    ))
                })?;
            (None, Some(hash.as_str()))
        }
        VersionSelector::Exact(version) => (Some(version.as_str()), None),
    };

    let mut releases = Vec::new();
    for (index, entry) in manifest.releases.iter().enumerate() {
        // The channel field gates the scan, so it is required on every entry
        if require_field(&entry.channel, "channel", index)? != channel.as_str() {
            continue;
        }
        if let Some(wanted) = version_filter {
            if require_field(&entry.version, "version", index)? != wanted {
                continue;
            }
        }
        if let Some(wanted) = hash_filter {
            if require_field(&entry.hash, "hash", index)? != wanted {
                continue;
            }
        }
        releases.push(normalize_entry(manifest, entry, index)?);
    }

    Ok(releases)
}

fn normalize_entry(manifest: &Manifest, entry: &RawRelease, index: usize) -> Result<Release> {
    let channel = require_field(&entry.channel, "channel", index)?;
    let version = require_field(&entry.version, "version", index)?;
    let hash = require_field(&entry.hash, "hash", index)?;
    let raw_date = require_field(&entry.release_date, "release_date", index)?;
    let archive = require_field(&entry.archive, "archive", index)?;
    let sha256 = require_field(&entry.sha256, "sha256", index)?;

    let release_date = parse_release_date(raw_date).ok_or_else(|| {
        ReleaseProxyError::MalformedEntry(format!(
            "release {}: unparseable release_date `{}`",
            index, raw_date
        ))
    })?;

    let archive_url = resolve_archive_url(&manifest.base_url, archive).map_err(|e| {
        ReleaseProxyError::MalformedEntry(format!(
            "release {}: cannot resolve archive `{}` against base_url `{}`: {}",
            index, archive, manifest.base_url, e
        ))
    })?;

    Ok(Release {
        scm_hash: hash.to_string(),
        channel: channel.to_string(),
        flutter_version: version.to_string(),
        dart_version: entry
            .dart_sdk_version
            .clone()
            .unwrap_or_else(|| "unknown".to_string()),
        host_arch: entry
            .dart_sdk_arch
            .clone()
            .unwrap_or_else(|| "unknown".to_string()),
        release_date,
        archive_url,
        archive_sha256: sha256.to_string(),
    })
}

fn require_field<'a>(
    value: &'a Option<String>,
    field: &'static str,
    index: usize,
) -> Result<&'a str> {
    value.as_deref().ok_or_else(|| {
        ReleaseProxyError::MalformedEntry(format!(
            "release {}: missing required field `{}`",
            index, field
        ))
    })
}

/// Parse the free-form upstream timestamp, normalized to UTC.
///
/// The feed has used RFC 3339 for years, but older entries carried RFC 2822
/// and bare date/datetime strings, so all of those are accepted.
pub fn parse_release_date(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = DateTime::parse_from_rfc2822(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f") {
        return Some(naive.and_utc());
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f") {
        return Some(naive.and_utc());
    }
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return Some(date.and_hms_opt(0, 0, 0)?.and_utc());
    }
    None
}

/// Resolve a relative archive path against the manifest base URL.
/// A trailing slash is ensured on the base so the last path segment is
/// kept during relative resolution.
pub fn resolve_archive_url(base_url: &str, archive: &str) -> std::result::Result<Url, url::ParseError> {
    let mut base = base_url.to_string();
    if !base.ends_with('/') {
        base.push('/');
    }
    Url::parse(&base)?.join(archive)
}
