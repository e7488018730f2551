pub mod cache;
pub mod config;
pub mod lifecycle;
pub mod metrics;
pub mod service;
pub mod testing;
pub mod tracker;

pub use cache::{CacheError, FetchCache, Fetcher, HttpFetcher};
pub use config::{
    load_config, load_config_from_str, validate_config, Config, ConfigError, SanitizedConfig,
    SearchPreferences, ServerConfig, TrackerConfig,
};
pub use lifecycle::{termination_signal, CleanupOutcome, Lifecycle, LifecycleError};
pub use service::{PopcornService, ServiceError};
pub use tracker::{
    AuthError, AuthState, DownloadClient, DownloadError, DownloadTicket, DownloadedTorrent, Movie,
    Release, SearchClient, SearchError, SearchResult, SessionHandle, SessionManager,
};
