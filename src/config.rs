use serde::{Deserialize, Serialize};

// Constants for hardcoded values
/// Upstream manifest URL template; `{platform}` is replaced with the platform name
pub const DEFAULT_MANIFEST_URL_TEMPLATE: &str =
    "https://storage.googleapis.com/flutter_infra_release/releases/releases_{platform}.json";

/// Cache freshness window in seconds: one upstream fetch per platform per window
pub const DEFAULT_CACHE_WINDOW_SECS: u64 = 30;

/// Upstream request timeout in seconds
pub const DEFAULT_UPSTREAM_TIMEOUT_SECS: u64 = 30;

/// Upstream connect timeout in seconds
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;

/// Host platform of a Flutter SDK release feed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Macos,
    Windows,
    Linux,
}

impl Platform {
    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Macos => "macos",
            Platform::Windows => "windows",
            Platform::Linux => "linux",
        }
    }
}

impl<'de> serde::Deserialize<'de> for Platform {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

impl std::str::FromStr for Platform {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "macos" => Ok(Platform::Macos),
            "windows" => Ok(Platform::Windows),
            "linux" => Ok(Platform::Linux),
            _ => Err(format!(
                "unknown platform `{}`, expected one of `macos`, `windows`, `linux`",
                s
            )),
        }
    }
}

impl std::fmt::Display for Platform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Release channel of the Flutter SDK
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    Beta,
    Dev,
    Stable,
}

impl Channel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Channel::Beta => "beta",
            Channel::Dev => "dev",
            Channel::Stable => "stable",
        }
    }
}

impl<'de> serde::Deserialize<'de> for Channel {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

impl std::str::FromStr for Channel {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "beta" => Ok(Channel::Beta),
            "dev" => Ok(Channel::Dev),
            "stable" => Ok(Channel::Stable),
            _ => Err(format!(
                "unknown channel `{}`, expected one of `beta`, `dev`, `stable`",
                s
            )),
        }
    }
}

impl std::fmt::Display for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub upstream: UpstreamConfig,
    #[serde(default)]
    pub cache: CacheConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_bind_address() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8000
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            bind_address: default_bind_address(),
            port: default_port(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpstreamConfig {
    /// Manifest URL template; must contain the `{platform}` placeholder
    #[serde(default = "default_manifest_url_template")]
    pub manifest_url_template: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
}

fn default_manifest_url_template() -> String {
    DEFAULT_MANIFEST_URL_TEMPLATE.to_string()
}

fn default_timeout_secs() -> u64 {
    DEFAULT_UPSTREAM_TIMEOUT_SECS
}

fn default_connect_timeout_secs() -> u64 {
    DEFAULT_CONNECT_TIMEOUT_SECS
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        UpstreamConfig {
            manifest_url_template: default_manifest_url_template(),
            timeout_secs: default_timeout_secs(),
            connect_timeout_secs: default_connect_timeout_secs(),
        }
    }
}

impl UpstreamConfig {
    /// Resolve the manifest URL for a platform from the configured template
    pub fn manifest_url(&self, platform: Platform) -> String {
        self.manifest_url_template
            .replace("{platform}", platform.as_str())
    }

    pub fn validate(&self) -> Result<(), String> {
        if !self.manifest_url_template.contains("{platform}") {
            return Err(
                "upstream.manifest_url_template must contain the `{platform}` placeholder"
                    .to_string(),
            );
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "default_window_secs")]
    pub window_secs: u64,
}

fn default_window_secs() -> u64 {
    DEFAULT_CACHE_WINDOW_SECS
}

impl Default for CacheConfig {
    fn default() -> Self {
        CacheConfig {
            window_secs: default_window_secs(),
        }
    }
}

impl CacheConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.window_secs == 0 {
            return Err("cache.window_secs must be at least 1".to_string());
        }
        Ok(())
    }
}

impl Config {
    pub fn validate(&self) -> Result<(), String> {
        self.upstream.validate()?;
        self.cache.validate()?;
        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            server: ServerConfig::default(),
            upstream: UpstreamConfig::default(),
            cache: CacheConfig::default(),
        }
    }
}
