//! Common test utilities for E2E testing with fakes.
//!
//! This module provides a test fixture that creates an in-process server
//! wired to a fake tracker on localhost and a mock image fetcher, enabling
//! E2E testing without network access.

#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::Arc;

use axum::body::{Body, Bytes};
use axum::http::{header, Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::Value;
use tempfile::TempDir;
use tower::ServiceExt;

use popcorn_core::{
    testing::{FakeTracker, MockFetcher},
    FetchCache, Lifecycle, PopcornService, SearchClient, SearchPreferences, SessionManager,
};
use popcorn_server::{api::create_router, state::AppState};

/// Re-export fixtures for test convenience
pub use popcorn_core::testing::fixtures;

/// Test fixture for E2E testing.
///
/// # Example
///
/// ```rust,ignore
/// #[tokio::test]
/// async fn test_search() {
///     let fixture = TestFixture::new().await;
///     let response = fixture.get("/api/v1/search?imdbID=tt0111161").await;
///     assert_eq!(response.status, 200);
/// }
/// ```
pub struct TestFixture {
    /// The Axum router for testing
    pub router: Router,
    /// Fake tracker - count logins, expire sessions
    pub tracker: FakeTracker,
    /// Mock fetcher - configure image responses
    pub fetcher: Arc<MockFetcher>,
    pub session: Arc<SessionManager>,
    pub lifecycle: Arc<Lifecycle>,
    /// Cache and download directory
    pub cache_dir: PathBuf,
    pub temp_dir: TempDir,
}

/// Response from a test request
#[derive(Debug)]
pub struct TestResponse {
    pub status: StatusCode,
    pub content_type: Option<String>,
    /// Parsed JSON body, `Null` when the body is not JSON
    pub body: Value,
    pub raw: Bytes,
}

impl TestFixture {
    /// Create a fixture with no search preferences, logged in like the binary.
    pub async fn new() -> Self {
        Self::with_preferences(SearchPreferences::default()).await
    }

    pub async fn with_preferences(preferences: SearchPreferences) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let cache_dir = temp_dir.path().join("cache");

        let tracker = FakeTracker::start().await;
        let tracker_config = tracker.tracker_config(preferences.clone());
        let session = Arc::new(
            SessionManager::new(&tracker_config).expect("Failed to create session manager"),
        );
        session.login().await.expect("Initial login failed");

        let fetcher = Arc::new(MockFetcher::new());
        let cache = FetchCache::open(&cache_dir, fetcher.clone())
            .await
            .expect("Failed to open cache");

        let service = PopcornService::new(
            session.clone(),
            SearchClient::new(preferences),
            cache.clone(),
            &cache_dir,
        );
        let lifecycle = Arc::new(Lifecycle::new(cache, &cache_dir));
        let config = fixtures::config(&cache_dir, tracker_config);

        let state = Arc::new(AppState::new(config, service, lifecycle.clone()));
        let router = create_router(state);

        Self {
            router,
            tracker,
            fetcher,
            session,
            lifecycle,
            cache_dir,
            temp_dir,
        }
    }

    /// Send a GET request to the test server.
    pub async fn get(&self, path: &str) -> TestResponse {
        let request = Request::builder()
            .method("GET")
            .uri(path)
            .body(Body::empty())
            .unwrap();

        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("Failed to send request");

        let status = response.status();
        let content_type = response
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let raw = response
            .into_body()
            .collect()
            .await
            .expect("Failed to collect body")
            .to_bytes();

        let body: Value = if raw.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&raw).unwrap_or(Value::Null)
        };

        TestResponse {
            status,
            content_type,
            body,
            raw,
        }
    }
}

/// Percent-encode a value for use in a query string.
pub fn encode(value: &str) -> String {
    urlencoding::encode(value).into_owned()
}

/// Helper to assert a response has expected status.
#[macro_export]
macro_rules! assert_status {
    ($response:expr, $status:expr) => {
        assert_eq!(
            $response.status, $status,
            "Expected status {:?}, got {:?}. Body: {}",
            $status,
            $response.status,
            serde_json::to_string_pretty(&$response.body).unwrap_or_default()
        );
    };
}

/// Helper to assert a JSON error reason.
#[macro_export]
macro_rules! assert_error_reason {
    ($response:expr, $reason:expr) => {
        assert_eq!(
            $response.body["error"], $reason,
            "Expected error {:?}, body: {}",
            $reason,
            serde_json::to_string_pretty(&$response.body).unwrap_or_default()
        );
    };
}
