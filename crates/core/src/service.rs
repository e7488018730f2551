//! Request-handling context shared by the HTTP layer.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use bytes::Bytes;
use thiserror::Error;

use crate::cache::{CacheError, FetchCache};
use crate::config::SearchPreferences;
use crate::tracker::{
    AuthError, DownloadClient, DownloadError, DownloadTicket, DownloadedTorrent, SearchClient,
    SearchError, SearchResult, SessionManager,
};

/// Failure of a caller-facing operation.
///
/// The cause has already been logged by the component that detected it.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("No argument passed")]
    NoArgument,

    #[error("Could not login to tracker")]
    LoginFailed(#[source] AuthError),

    #[error("Could not retrieve movie information")]
    RetrievalFailed(#[source] SearchError),

    #[error("Could not download torrent")]
    DownloadFailed(#[source] DownloadError),

    #[error("Could not cache image")]
    CacheFailed(#[source] CacheError),
}

impl ServiceError {
    /// Short machine-readable code.
    pub fn reason(&self) -> &'static str {
        match self {
            ServiceError::NoArgument => "no_argument",
            ServiceError::LoginFailed(_) => "login_failed",
            ServiceError::RetrievalFailed(_) => "retrieval_failed",
            ServiceError::DownloadFailed(_) => "download_failed",
            ServiceError::CacheFailed(_) => "cache_failed",
        }
    }

    /// Whether the failure came from the process shutting down.
    pub fn is_shutting_down(&self) -> bool {
        matches!(self, ServiceError::CacheFailed(CacheError::ShuttingDown))
    }
}

/// Shared references to the session, search client and image cache.
#[derive(Clone)]
pub struct PopcornService {
    session: Arc<SessionManager>,
    search: SearchClient,
    cache: FetchCache,
    download_dir: PathBuf,
}

impl PopcornService {
    pub fn new(
        session: Arc<SessionManager>,
        search: SearchClient,
        cache: FetchCache,
        download_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            session,
            search,
            cache,
            download_dir: download_dir.into(),
        }
    }

    pub fn session(&self) -> &Arc<SessionManager> {
        &self.session
    }

    pub fn cache(&self) -> &FetchCache {
        &self.cache
    }

    pub fn preferences(&self) -> &SearchPreferences {
        self.search.preferences()
    }

    pub fn download_dir(&self) -> &Path {
        &self.download_dir
    }

    /// Search the tracker, logging in first if the session has expired.
    pub async fn search(&self, identifier: Option<&str>) -> Result<SearchResult, ServiceError> {
        let identifier = required(identifier)?;
        let session = self
            .session
            .ensure_logged_in()
            .await
            .map_err(ServiceError::LoginFailed)?;

        self.search
            .get(&session, identifier)
            .await
            .map_err(ServiceError::RetrievalFailed)
    }

    /// Save the torrent for a ticket into the download directory.
    pub async fn download(
        &self,
        id: Option<&str>,
        auth_key: Option<&str>,
        pass_key: Option<&str>,
    ) -> Result<DownloadedTorrent, ServiceError> {
        let ticket = DownloadTicket::new(required(id)?, required(auth_key)?, required(pass_key)?)
            .map_err(ServiceError::DownloadFailed)?;
        let session = self
            .session
            .ensure_logged_in()
            .await
            .map_err(ServiceError::LoginFailed)?;

        DownloadClient::new(session, &self.download_dir, ticket)
            .download()
            .await
            .map_err(ServiceError::DownloadFailed)
    }

    /// Image bytes for `url`, through the cache. Never touches the session.
    pub async fn fetch_image(&self, url: Option<&str>) -> Result<Bytes, ServiceError> {
        let url = required(url)?;
        self.cache.get(url).await.map_err(ServiceError::CacheFailed)
    }
}

fn required(value: Option<&str>) -> Result<&str, ServiceError> {
    match value.map(str::trim) {
        Some(v) if !v.is_empty() => Ok(v),
        _ => Err(ServiceError::NoArgument),
    }
}
