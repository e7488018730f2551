//! Shutdown sequencing: stop serving, drain the cache, purge its directory.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use thiserror::Error;
use tokio::fs;
use tokio::signal;
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::cache::FetchCache;

#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("Failed to remove cache directory {path}")]
    Purge {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CleanupOutcome {
    /// This call closed the cache and removed the directory.
    Completed,
    /// An earlier call already ran the cleanup.
    AlreadyDone,
}

/// Resolves on the first SIGINT (Ctrl+C) or, on unix, SIGTERM.
///
/// Once this has been awaited the default handlers are replaced for the rest
/// of the process, so later signals no longer terminate it.
pub async fn termination_signal() -> std::io::Result<()> {
    #[cfg(unix)]
    {
        let mut terminate = signal::unix::signal(signal::unix::SignalKind::terminate())?;
        tokio::select! {
            result = signal::ctrl_c() => result,
            _ = terminate.recv() => Ok(()),
        }
    }

    #[cfg(not(unix))]
    {
        signal::ctrl_c().await
    }
}

/// Owns the shutdown phase.
///
/// `request_shutdown` flips the process into shutdown mode exactly once;
/// `cleanup` then closes the cache (waiting for fetches still writing into the
/// directory) and deletes the directory tree. Both are safe to call again.
pub struct Lifecycle {
    cache: FetchCache,
    cache_dir: PathBuf,
    shutting_down: AtomicBool,
    cleaned: Mutex<bool>,
}

impl Lifecycle {
    pub fn new(cache: FetchCache, cache_dir: impl Into<PathBuf>) -> Self {
        Self {
            cache,
            cache_dir: cache_dir.into(),
            shutting_down: AtomicBool::new(false),
            cleaned: Mutex::new(false),
        }
    }

    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    /// Enter shutdown mode. Returns `true` only for the call that did it.
    pub fn request_shutdown(&self) -> bool {
        let first = !self.shutting_down.swap(true, Ordering::SeqCst);
        if first {
            info!("Shutdown requested");
        } else {
            info!("Shutdown already in progress, ignoring");
        }
        first
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutting_down.load(Ordering::SeqCst)
    }

    /// Close the cache and purge its directory, at most once.
    pub async fn cleanup(&self) -> Result<CleanupOutcome, LifecycleError> {
        let mut cleaned = self.cleaned.lock().await;
        if *cleaned {
            return Ok(CleanupOutcome::AlreadyDone);
        }
        self.shutting_down.store(true, Ordering::SeqCst);

        self.cache.close().await;

        match fs::remove_dir_all(&self.cache_dir).await {
            Ok(()) => {
                info!(path = %self.cache_dir.display(), "Cache directory removed");
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!(path = %self.cache_dir.display(), "Cache directory already absent");
            }
            Err(source) => {
                warn!(
                    path = %self.cache_dir.display(),
                    error = %source,
                    "Failed to remove cache directory"
                );
                return Err(LifecycleError::Purge {
                    path: self.cache_dir.clone(),
                    source,
                });
            }
        }

        *cleaned = true;
        Ok(CleanupOutcome::Completed)
    }
}
