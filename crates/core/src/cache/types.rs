//! Types for the image cache.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;

/// Errors while populating or reading the cache.
///
/// `Clone` so a single failed fetch can be handed to every waiter.
#[derive(Debug, Clone, Error)]
pub enum CacheError {
    #[error("Invalid cache key: {0:?}")]
    InvalidKey(String),

    #[error("Fetch failed for {url}: {message}")]
    Fetch { url: String, message: String },

    #[error("HTTP {status} fetching {url}")]
    Status { url: String, status: u16 },

    #[error("Cache I/O failed for {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: Arc<std::io::Error>,
    },

    #[error("Cache is shutting down")]
    ShuttingDown,

    #[error("Fetch task failed: {0}")]
    Task(String),
}

impl CacheError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source: Arc::new(source),
        }
    }
}

/// Source of cache contents.
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Fetch the full body behind `url`.
    async fn fetch(&self, url: &str) -> Result<Bytes, CacheError>;
}
