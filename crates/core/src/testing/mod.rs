//! Testing utilities and fakes for unit and integration tests.
//!
//! - [`MockFetcher`] stands in for the network behind the image cache.
//! - [`FakeTracker`] is a real HTTP server on localhost implementing the
//!   tracker endpoints, so the session, search and download clients can be
//!   exercised end to end.
//!
//! # Example
//!
//! ```rust,ignore
//! use popcorn_core::testing::{FakeTracker, MockFetcher};
//!
//! let tracker = FakeTracker::start().await;
//! let session = SessionManager::new(&tracker.tracker_config(Default::default()))?;
//! session.login().await?;
//! assert_eq!(tracker.login_count(), 1);
//! ```

mod fake_tracker;
mod mock_fetcher;

pub use fake_tracker::{
    FakeTracker, FAKE_AUTH_KEY, FAKE_PASSKEY, FAKE_PASSWORD, FAKE_USERNAME, UNKNOWN_IMDB_ID,
};
pub use mock_fetcher::{MockFetcher, RecordedFetch};

/// Test fixtures and helper functions.
pub mod fixtures {
    use std::path::Path;

    use crate::config::{Config, SearchPreferences, ServerConfig, TrackerConfig};

    /// Preferences with both filters set.
    pub fn preferences(source: &str, resolution: &str) -> SearchPreferences {
        SearchPreferences::new(source, resolution)
    }

    /// A complete configuration rooted at `cache_dir`.
    pub fn config(cache_dir: &Path, tracker: TrackerConfig) -> Config {
        Config {
            cache_dir: cache_dir.to_path_buf(),
            database: cache_dir.join("popcorn.db"),
            server: ServerConfig::default(),
            tracker,
        }
    }
}
