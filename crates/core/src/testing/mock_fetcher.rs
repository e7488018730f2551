//! Mock fetcher for testing.

use async_trait::async_trait;
use bytes::Bytes;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{watch, RwLock};

use crate::cache::{CacheError, Fetcher};

/// A recorded fetch for test assertions.
#[derive(Debug, Clone)]
pub struct RecordedFetch {
    pub url: String,
    pub timestamp: Instant,
}

/// Mock implementation of the Fetcher trait.
///
/// Provides controllable behavior for testing:
/// - Per-URL bodies, with an optional default for any other URL
/// - Per-URL failures, or a global "network down" switch
/// - A gate that holds fetches for chosen URLs in flight until released
///
/// # Example
///
/// ```rust,ignore
/// use popcorn_core::testing::MockFetcher;
///
/// let fetcher = Arc::new(MockFetcher::new());
/// fetcher.set_response("https://img.example/a.jpg", b"jpeg".to_vec()).await;
/// fetcher.hold("https://img.example/a.jpg").await;
///
/// // ... start concurrent cache lookups ...
///
/// fetcher.release();
/// assert_eq!(fetcher.fetch_count("https://img.example/a.jpg").await, 1);
/// ```
pub struct MockFetcher {
    responses: Arc<RwLock<HashMap<String, Bytes>>>,
    default_response: Arc<RwLock<Option<Bytes>>>,
    failures: Arc<RwLock<HashMap<String, String>>>,
    /// When set, every fetch fails as if the network were unreachable.
    offline: Arc<RwLock<bool>>,
    fetches: Arc<RwLock<Vec<RecordedFetch>>>,
    held: Arc<RwLock<HashSet<String>>>,
    /// `true` while the gate is open.
    gate: watch::Sender<bool>,
    delay: Arc<RwLock<Option<Duration>>>,
}

impl std::fmt::Debug for MockFetcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockFetcher")
            .field("responses", &"<responses>")
            .field("failures", &"<failures>")
            .field("fetches", &"<fetches>")
            .finish()
    }
}

impl Default for MockFetcher {
    fn default() -> Self {
        Self::new()
    }
}

impl MockFetcher {
    pub fn new() -> Self {
        let (gate, _) = watch::channel(true);
        Self {
            responses: Arc::new(RwLock::new(HashMap::new())),
            default_response: Arc::new(RwLock::new(None)),
            failures: Arc::new(RwLock::new(HashMap::new())),
            offline: Arc::new(RwLock::new(false)),
            fetches: Arc::new(RwLock::new(Vec::new())),
            held: Arc::new(RwLock::new(HashSet::new())),
            gate,
            delay: Arc::new(RwLock::new(None)),
        }
    }

    /// Serve `body` for `url`.
    pub async fn set_response(&self, url: &str, body: impl Into<Bytes>) {
        self.responses
            .write()
            .await
            .insert(url.to_string(), body.into());
    }

    /// Serve `body` for any URL without its own response.
    pub async fn set_default_response(&self, body: impl Into<Bytes>) {
        *self.default_response.write().await = Some(body.into());
    }

    /// Make fetches of `url` fail until [`clear_failure`](Self::clear_failure).
    pub async fn fail(&self, url: &str, message: &str) {
        self.failures
            .write()
            .await
            .insert(url.to_string(), message.to_string());
    }

    pub async fn clear_failure(&self, url: &str) {
        self.failures.write().await.remove(url);
    }

    /// Simulate the network going away (or coming back).
    pub async fn set_offline(&self, offline: bool) {
        *self.offline.write().await = offline;
    }

    /// Delay every fetch by `delay`.
    pub async fn set_delay(&self, delay: Duration) {
        *self.delay.write().await = Some(delay);
    }

    /// Hold fetches of `url` in flight until [`release`](Self::release).
    pub async fn hold(&self, url: &str) {
        self.held.write().await.insert(url.to_string());
        self.gate.send_replace(false);
    }

    /// Let every held fetch continue.
    pub fn release(&self) {
        self.gate.send_replace(true);
    }

    /// Number of fetches started for `url`.
    pub async fn fetch_count(&self, url: &str) -> usize {
        self.fetches
            .read()
            .await
            .iter()
            .filter(|f| f.url == url)
            .count()
    }

    pub async fn total_fetches(&self) -> usize {
        self.fetches.read().await.len()
    }

    pub async fn recorded_fetches(&self) -> Vec<RecordedFetch> {
        self.fetches.read().await.clone()
    }

    /// Wait until at least `count` fetches of `url` have started.
    pub async fn wait_for_fetches(&self, url: &str, count: usize) {
        while self.fetch_count(url).await < count {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }
}

#[async_trait]
impl Fetcher for MockFetcher {
    async fn fetch(&self, url: &str) -> Result<Bytes, CacheError> {
        self.fetches.write().await.push(RecordedFetch {
            url: url.to_string(),
            timestamp: Instant::now(),
        });

        if self.held.read().await.contains(url) {
            let mut gate = self.gate.subscribe();
            let _ = gate.wait_for(|open| *open).await;
        }

        let delay = *self.delay.read().await;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        if *self.offline.read().await {
            return Err(CacheError::Fetch {
                url: url.to_string(),
                message: "network unreachable".to_string(),
            });
        }
        if let Some(message) = self.failures.read().await.get(url) {
            return Err(CacheError::Fetch {
                url: url.to_string(),
                message: message.clone(),
            });
        }

        if let Some(body) = self.responses.read().await.get(url) {
            return Ok(body.clone());
        }
        match self.default_response.read().await.as_ref() {
            Some(body) => Ok(body.clone()),
            None => Err(CacheError::Status {
                url: url.to_string(),
                status: 404,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_fetcher_responses_and_failures() {
        let fetcher = MockFetcher::new();
        fetcher.set_response("u1", b"one".to_vec()).await;
        fetcher.fail("u2", "boom").await;

        assert_eq!(&fetcher.fetch("u1").await.unwrap()[..], b"one");
        assert!(matches!(fetcher.fetch("u2").await, Err(CacheError::Fetch { .. })));
        assert!(matches!(
            fetcher.fetch("u3").await,
            Err(CacheError::Status { status: 404, .. })
        ));
        assert_eq!(fetcher.total_fetches().await, 3);
    }

    #[tokio::test]
    async fn test_mock_fetcher_gate_holds_until_release() {
        let fetcher = Arc::new(MockFetcher::new());
        fetcher.set_response("u", b"x".to_vec()).await;
        fetcher.hold("u").await;

        let task = {
            let fetcher = fetcher.clone();
            tokio::spawn(async move { fetcher.fetch("u").await })
        };
        fetcher.wait_for_fetches("u", 1).await;
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!task.is_finished());

        fetcher.release();
        assert_eq!(&task.await.unwrap().unwrap()[..], b"x");
    }
}
