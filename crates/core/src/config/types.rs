use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::path::PathBuf;

/// Root configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    /// Directory holding cached images and downloaded torrent files.
    /// Removed on clean shutdown.
    #[serde(alias = "cachedir")]
    pub cache_dir: PathBuf,
    /// Library database location. Not used by the core.
    #[serde(default = "default_database")]
    pub database: PathBuf,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(alias = "ptp")]
    pub tracker: TrackerConfig,
}

/// Server configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: IpAddr,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_host() -> IpAddr {
    IpAddr::from([0, 0, 0, 0])
}

fn default_port() -> u16 {
    8000
}

fn default_database() -> PathBuf {
    PathBuf::from("popcorn.db")
}

/// Private tracker account and search settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TrackerConfig {
    /// Tracker base URL
    #[serde(default = "default_tracker_url")]
    pub url: String,
    pub username: String,
    pub password: String,
    /// Personal passkey, sent with the login handshake
    pub passkey: String,
    /// Request timeout in seconds (default: 30)
    #[serde(default = "default_timeout")]
    pub timeout_secs: u32,
    #[serde(default, alias = "settings")]
    pub preferences: SearchPreferences,
}

fn default_tracker_url() -> String {
    "https://passthepopcorn.me".to_string()
}

fn default_timeout() -> u32 {
    30
}

/// Filters applied when searching and ranking releases.
/// Empty strings mean "no preference".
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, Eq)]
pub struct SearchPreferences {
    #[serde(default, alias = "movie_source")]
    pub source: String,
    #[serde(default, alias = "movie_resolution")]
    pub resolution: String,
}

impl SearchPreferences {
    pub fn new(source: impl Into<String>, resolution: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            resolution: resolution.into(),
        }
    }
}

/// Sanitized config for API responses (secrets redacted)
#[derive(Debug, Clone, Serialize)]
pub struct SanitizedConfig {
    pub cache_dir: PathBuf,
    pub database: PathBuf,
    pub server: ServerConfig,
    pub tracker: SanitizedTrackerConfig,
}

/// Tracker config with password and passkey hidden
#[derive(Debug, Clone, Serialize)]
pub struct SanitizedTrackerConfig {
    pub url: String,
    pub username: String,
    pub password_configured: bool,
    pub passkey_configured: bool,
    pub timeout_secs: u32,
    pub preferences: SearchPreferences,
}

impl From<&Config> for SanitizedConfig {
    fn from(config: &Config) -> Self {
        Self {
            cache_dir: config.cache_dir.clone(),
            database: config.database.clone(),
            server: config.server.clone(),
            tracker: SanitizedTrackerConfig {
                url: config.tracker.url.clone(),
                username: config.tracker.username.clone(),
                password_configured: !config.tracker.password.is_empty(),
                passkey_configured: !config.tracker.passkey.is_empty(),
                timeout_secs: config.tracker.timeout_secs,
                preferences: config.tracker.preferences.clone(),
            },
        }
    }
}
