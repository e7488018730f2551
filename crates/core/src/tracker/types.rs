//! Types for tracker session, search and download operations.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

use crate::config::{SearchPreferences, TrackerConfig};

/// Errors from the login handshake or the session probe.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Request timeout")]
    Timeout,

    #[error("Login rejected by tracker: {0}")]
    Rejected(String),

    #[error("Unexpected HTTP status {0}")]
    UnexpectedStatus(u16),

    #[error("Malformed login response: {0}")]
    MalformedResponse(String),

    #[error("Failed to build HTTP client: {0}")]
    Client(String),
}

/// Errors from an identifier search.
#[derive(Debug, Error)]
pub enum SearchError {
    #[error("Invalid identifier: {0:?}")]
    InvalidIdentifier(String),

    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Request timeout")]
    Timeout,

    #[error("Session is not authenticated")]
    NotAuthenticated,

    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Malformed search response: {0}")]
    MalformedResponse(String),
}

/// Errors while fetching and saving a torrent file.
#[derive(Debug, Error)]
pub enum DownloadError {
    #[error("Invalid ticket: {0}")]
    InvalidTicket(String),

    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Request timeout")]
    Timeout,

    #[error("Session is not authenticated")]
    NotAuthenticated,

    #[error("Tracker refused the download (HTTP {0})")]
    Rejected(u16),

    #[error("Response is not a torrent file")]
    InvalidTorrent,

    #[error("Failed to write {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Login credentials. Copied out of the configuration once at start-up.
#[derive(Clone)]
pub struct Credentials {
    pub username: String,
    pub password: String,
    pub passkey: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("passkey", &"<redacted>")
            .finish()
    }
}

impl From<&TrackerConfig> for Credentials {
    fn from(config: &TrackerConfig) -> Self {
        Self {
            username: config.username.clone(),
            password: config.password.clone(),
            passkey: config.passkey.clone(),
        }
    }
}

/// Authentication state of the tracker session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthState {
    LoggedOut,
    LoggedIn,
}

/// Identifiers authorizing a single torrent download.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadTicket {
    pub id: String,
    pub auth_key: String,
    pub pass_key: String,
}

impl DownloadTicket {
    /// Build a ticket, rejecting ids that cannot be used as a file name.
    pub fn new(
        id: impl Into<String>,
        auth_key: impl Into<String>,
        pass_key: impl Into<String>,
    ) -> Result<Self, DownloadError> {
        let ticket = Self {
            id: id.into(),
            auth_key: auth_key.into(),
            pass_key: pass_key.into(),
        };

        if ticket.id.is_empty()
            || !ticket
                .id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            return Err(DownloadError::InvalidTicket(format!(
                "id {:?} must be non-empty and alphanumeric",
                ticket.id
            )));
        }
        if ticket.auth_key.is_empty() || ticket.pass_key.is_empty() {
            return Err(DownloadError::InvalidTicket(
                "authkey and passkey are required".to_string(),
            ));
        }

        Ok(ticket)
    }

    /// File name the torrent is saved under.
    pub fn file_name(&self) -> String {
        format!("{}.torrent", self.id)
    }
}

/// A torrent file saved to disk.
#[derive(Debug, Clone, Serialize)]
pub struct DownloadedTorrent {
    pub id: String,
    pub path: PathBuf,
    pub size_bytes: u64,
}

/// Result of an identifier search.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResult {
    /// Identifier that was searched (IMDb id).
    pub identifier: String,
    /// Filters that were sent with the query.
    pub filters: SearchPreferences,
    pub total_results: u64,
    pub movies: Vec<Movie>,
    /// Per-session key needed to build download tickets.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pass_key: Option<String>,
    pub searched_at: DateTime<Utc>,
}

impl SearchResult {
    pub fn is_empty(&self) -> bool {
        self.movies.is_empty()
    }
}

/// A movie group with its releases.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Movie {
    pub group_id: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub year: Option<String>,
    /// Poster URL, served through the image cache by the front end.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cover: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub imdb_id: Option<String>,
    pub releases: Vec<Release>,
}

/// A single downloadable torrent within a movie group.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Release {
    pub id: String,
    pub release_name: String,
    pub source: String,
    pub resolution: String,
    pub codec: String,
    pub container: String,
    pub quality: String,
    pub size_bytes: u64,
    pub seeders: u32,
    pub leechers: u32,
    pub snatched: u32,
    pub scene: bool,
    pub golden_popcorn: bool,
    pub checked: bool,
    /// Matches both the configured source and resolution.
    pub preferred: bool,
}
