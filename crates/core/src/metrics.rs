//! Prometheus metrics for core components.
//!
//! This module provides metrics for:
//! - Tracker session (logins, probes)
//! - Tracker searches and torrent downloads
//! - Image fetch cache (hits, joined waiters, network fetches)

use once_cell::sync::Lazy;
use prometheus::{HistogramOpts, HistogramVec, IntCounterVec, Opts};

// =============================================================================
// Tracker
// =============================================================================

/// Login handshakes by result.
pub static TRACKER_LOGINS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("popcorn_tracker_logins_total", "Tracker login attempts"),
        &["result"], // "success", "failure"
    )
    .unwrap()
});

/// Session probes by outcome.
pub static TRACKER_SESSION_CHECKS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "popcorn_tracker_session_checks_total",
            "Tracker session validity probes",
        ),
        &["result"], // "valid", "expired", "error"
    )
    .unwrap()
});

/// Identifier searches by result.
pub static TRACKER_SEARCHES: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("popcorn_tracker_searches_total", "Tracker searches"),
        &["result"], // "found", "empty", "failure"
    )
    .unwrap()
});

/// Tracker request duration.
pub static TRACKER_REQUEST_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "popcorn_tracker_request_duration_seconds",
            "Duration of tracker HTTP requests",
        )
        .buckets(vec![0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0]),
        &["operation"], // "login", "check", "search", "download"
    )
    .unwrap()
});

/// Torrent file downloads by result.
pub static TORRENT_DOWNLOADS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("popcorn_torrent_downloads_total", "Torrent file downloads"),
        &["result"], // "success", "failure"
    )
    .unwrap()
});

// =============================================================================
// Image cache
// =============================================================================

/// Cache lookups by outcome.
pub static CACHE_REQUESTS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("popcorn_cache_requests_total", "Image cache lookups"),
        &["outcome"], // "hit", "joined", "miss"
    )
    .unwrap()
});

/// Network fetches performed to populate the cache.
pub static CACHE_FETCHES: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("popcorn_cache_fetches_total", "Image cache network fetches"),
        &["result"], // "success", "failure"
    )
    .unwrap()
});

/// Fetch-and-persist duration.
pub static CACHE_FETCH_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "popcorn_cache_fetch_duration_seconds",
            "Duration of image fetch and persist",
        )
        .buckets(vec![0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0]),
        &["result"],
    )
    .unwrap()
});

/// Get all core metrics for registration.
pub fn all_metrics() -> Vec<Box<dyn prometheus::core::Collector>> {
    vec![
        Box::new(TRACKER_LOGINS.clone()),
        Box::new(TRACKER_SESSION_CHECKS.clone()),
        Box::new(TRACKER_SEARCHES.clone()),
        Box::new(TRACKER_REQUEST_DURATION.clone()),
        Box::new(TORRENT_DOWNLOADS.clone()),
        Box::new(CACHE_REQUESTS.clone()),
        Box::new(CACHE_FETCHES.clone()),
        Box::new(CACHE_FETCH_DURATION.clone()),
    ]
}
