//! Disk-backed, single-flight fetch cache.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use bytes::Bytes;
use futures::future::{BoxFuture, FutureExt, Shared};
use sha2::{Digest, Sha256};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::metrics::{CACHE_FETCHES, CACHE_FETCH_DURATION, CACHE_REQUESTS};

use super::{CacheError, Fetcher};

type SharedFetch = Shared<BoxFuture<'static, Result<Bytes, CacheError>>>;

#[derive(Default)]
struct Inflight {
    fetches: HashMap<String, SharedFetch>,
    closed: bool,
}

struct CacheInner {
    dir: PathBuf,
    fetcher: Arc<dyn Fetcher>,
    inflight: Mutex<Inflight>,
}

enum Lookup {
    Present,
    Pending(SharedFetch),
}

/// URL-keyed cache of fetched bytes, persisted under one directory.
///
/// At most one fetch per key runs at a time. Callers arriving while a fetch
/// is in flight await the same result. A fetch runs on its own task, writes a
/// staging file, renames it into place and only then leaves the in-flight
/// map, so a caller sees either the pending fetch or the finished file.
/// Failed fetches leave nothing on disk and are not remembered.
#[derive(Clone)]
pub struct FetchCache {
    inner: Arc<CacheInner>,
}

impl FetchCache {
    /// Open the cache, creating `dir` if needed.
    pub async fn open(dir: impl Into<PathBuf>, fetcher: Arc<dyn Fetcher>) -> Result<Self, CacheError> {
        let dir = dir.into();
        fs::create_dir_all(&dir)
            .await
            .map_err(|e| CacheError::io(&dir, e))?;

        Ok(Self {
            inner: Arc::new(CacheInner {
                dir,
                fetcher,
                inflight: Mutex::new(Inflight::default()),
            }),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.inner.dir
    }

    /// File a key is stored under.
    pub fn path_for(&self, key: &str) -> PathBuf {
        self.inner.dir.join(cache_file_name(key))
    }

    /// Number of fetches currently in flight.
    pub async fn in_flight(&self) -> usize {
        self.inner.inflight.lock().await.fetches.len()
    }

    pub async fn is_closed(&self) -> bool {
        self.inner.inflight.lock().await.closed
    }

    /// Return the bytes for `key`, fetching them on first use.
    pub async fn get(&self, key: &str) -> Result<Bytes, CacheError> {
        if key.trim().is_empty() {
            return Err(CacheError::InvalidKey(key.to_string()));
        }
        let path = self.path_for(key);

        let lookup = {
            let mut inflight = self.inner.inflight.lock().await;
            if inflight.closed {
                return Err(CacheError::ShuttingDown);
            }

            if let Some(pending) = inflight.fetches.get(key) {
                CACHE_REQUESTS.with_label_values(&["joined"]).inc();
                debug!(key = key, "Joining in-flight fetch");
                Lookup::Pending(pending.clone())
            } else if fs::try_exists(&path)
                .await
                .map_err(|e| CacheError::io(&path, e))?
            {
                CACHE_REQUESTS.with_label_values(&["hit"]).inc();
                Lookup::Present
            } else {
                CACHE_REQUESTS.with_label_values(&["miss"]).inc();
                let pending = self.spawn_fetch(key, path.clone());
                inflight.fetches.insert(key.to_string(), pending.clone());
                Lookup::Pending(pending)
            }
        };

        match lookup {
            Lookup::Present => fs::read(&path)
                .await
                .map(Bytes::from)
                .map_err(|e| CacheError::io(&path, e)),
            Lookup::Pending(pending) => pending.await,
        }
    }

    /// Stop accepting requests and wait for every in-flight fetch to settle.
    pub async fn close(&self) {
        let pending: Vec<SharedFetch> = {
            let mut inflight = self.inner.inflight.lock().await;
            inflight.closed = true;
            inflight.fetches.values().cloned().collect()
        };

        if !pending.is_empty() {
            info!(count = pending.len(), "Waiting for in-flight image fetches");
        }
        futures::future::join_all(pending).await;
    }

    /// Start the fetch task for `key`. The caller holds the in-flight lock
    /// and inserts the returned handle before releasing it.
    ///
    /// The fetch runs on its own task so that a panic inside it still
    /// reaches the supervising task, which clears the in-flight entry
    /// however the fetch ended.
    fn spawn_fetch(&self, key: &str, path: PathBuf) -> SharedFetch {
        let inner = Arc::clone(&self.inner);
        let key = key.to_string();

        let task = tokio::spawn(async move {
            let fetch = {
                let inner = Arc::clone(&inner);
                let key = key.clone();
                tokio::spawn(async move { inner.populate(&key, &path).await })
            };
            let result = match fetch.await {
                Ok(result) => result,
                Err(e) => {
                    warn!(key = %key, error = %e, "Image fetch task aborted");
                    CACHE_FETCHES.with_label_values(&["failure"]).inc();
                    Err(CacheError::Task(e.to_string()))
                }
            };
            inner.inflight.lock().await.fetches.remove(&key);
            result
        });

        async move {
            match task.await {
                Ok(result) => result,
                Err(e) => Err(CacheError::Task(e.to_string())),
            }
        }
        .boxed()
        .shared()
    }
}

impl CacheInner {
    async fn populate(&self, key: &str, path: &Path) -> Result<Bytes, CacheError> {
        let start = Instant::now();
        let result = self.fetch_and_store(key, path).await;
        let label = if result.is_ok() { "success" } else { "failure" };
        CACHE_FETCHES.with_label_values(&[label]).inc();
        CACHE_FETCH_DURATION
            .with_label_values(&[label])
            .observe(start.elapsed().as_secs_f64());

        match &result {
            Ok(body) => debug!(key = key, bytes = body.len(), "Cached image"),
            Err(e) => warn!(key = key, error = %e, "Failed to cache image"),
        }
        result
    }

    async fn fetch_and_store(&self, key: &str, path: &Path) -> Result<Bytes, CacheError> {
        let body = self.fetcher.fetch(key).await?;

        fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| CacheError::io(&self.dir, e))?;

        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        let staging = self
            .dir
            .join(format!(".{}.{}.part", file_name, Uuid::new_v4()));

        let stored = async {
            let mut file = fs::File::create(&staging)
                .await
                .map_err(|e| CacheError::io(&staging, e))?;
            file.write_all(&body)
                .await
                .map_err(|e| CacheError::io(&staging, e))?;
            file.sync_all()
                .await
                .map_err(|e| CacheError::io(&staging, e))?;
            fs::rename(&staging, path)
                .await
                .map_err(|e| CacheError::io(path, e))
        }
        .await;

        if let Err(e) = stored {
            let _ = fs::remove_file(&staging).await;
            return Err(e);
        }
        Ok(body)
    }
}

/// Stable file name for a key: SHA-256 of the key, keeping a short
/// alphanumeric extension from the URL path when there is one.
fn cache_file_name(key: &str) -> String {
    let digest = format!("{:x}", Sha256::digest(key.as_bytes()));
    match url_extension(key) {
        Some(ext) => format!("{}.{}", digest, ext),
        None => digest,
    }
}

fn url_extension(key: &str) -> Option<String> {
    let without_query = key.split(['?', '#']).next()?;
    let after_scheme = without_query
        .split_once("://")
        .map(|(_, rest)| rest)
        .unwrap_or(without_query);
    let (_, path) = after_scheme.split_once('/')?;
    let last = path.rsplit('/').next()?;
    let (_, ext) = last.rsplit_once('.')?;

    if (1..=5).contains(&ext.len()) && ext.chars().all(|c| c.is_ascii_alphanumeric()) {
        Some(ext.to_ascii_lowercase())
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockFetcher;
    use tempfile::TempDir;

    #[test]
    fn test_cache_file_name_is_stable_and_keeps_extension() {
        let a = cache_file_name("https://img.example/covers/123.JPG?size=large");
        let b = cache_file_name("https://img.example/covers/123.JPG?size=large");
        assert_eq!(a, b);
        assert!(a.ends_with(".jpg"));
        assert_eq!(a.len(), 64 + 4);
    }

    #[test]
    fn test_cache_file_name_differs_per_key() {
        assert_ne!(
            cache_file_name("https://img.example/a.png"),
            cache_file_name("https://img.example/b.png")
        );
    }

    #[test]
    fn test_url_extension() {
        assert_eq!(url_extension("https://img.example/x/poster.webp"), Some("webp".to_string()));
        assert_eq!(url_extension("https://img.example"), None);
        assert_eq!(url_extension("https://img.example/"), None);
        assert_eq!(url_extension("https://img.example/poster"), None);
        assert_eq!(url_extension("https://img.example/poster.toolongext"), None);
        assert_eq!(url_extension("https://img.example/p.j%20g"), None);
        assert_eq!(url_extension("https://img.example.com/"), None);
    }

    #[tokio::test]
    async fn test_open_creates_directory() {
        let temp = TempDir::new().unwrap();
        let dir = temp.path().join("nested/cache");
        let cache = FetchCache::open(&dir, Arc::new(MockFetcher::new())).await.unwrap();
        assert!(dir.is_dir());
        assert_eq!(cache.dir(), dir.as_path());
    }

    #[tokio::test]
    async fn test_get_persists_then_hits_disk() {
        let temp = TempDir::new().unwrap();
        let fetcher = Arc::new(MockFetcher::new());
        fetcher.set_response("https://img.example/a.jpg", b"jpeg-bytes".to_vec()).await;
        let cache = FetchCache::open(temp.path(), fetcher.clone()).await.unwrap();

        let first = cache.get("https://img.example/a.jpg").await.unwrap();
        assert_eq!(&first[..], b"jpeg-bytes");
        assert!(cache.path_for("https://img.example/a.jpg").is_file());

        let second = cache.get("https://img.example/a.jpg").await.unwrap();
        assert_eq!(first, second);
        assert_eq!(fetcher.fetch_count("https://img.example/a.jpg").await, 1);
        assert_eq!(cache.in_flight().await, 0);
    }

    #[tokio::test]
    async fn test_blank_key_is_rejected() {
        let temp = TempDir::new().unwrap();
        let fetcher = Arc::new(MockFetcher::new());
        let cache = FetchCache::open(temp.path(), fetcher.clone()).await.unwrap();

        let result = cache.get("   ").await;
        assert!(matches!(result, Err(CacheError::InvalidKey(_))));
        assert_eq!(fetcher.total_fetches().await, 0);
    }
}
