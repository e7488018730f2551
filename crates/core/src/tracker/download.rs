//! Torrent file download.

use std::path::{Path, PathBuf};
use std::time::Instant;

use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::metrics::{TORRENT_DOWNLOADS, TRACKER_REQUEST_DURATION};

use super::{DownloadError, DownloadTicket, DownloadedTorrent, SessionHandle};

/// Fetches one torrent file and saves it as `{dest_dir}/{id}.torrent`.
///
/// The session handle is captured at construction: a later re-login does not
/// affect this instance. Repeating a download with the same ticket replaces
/// the file.
pub struct DownloadClient {
    session: SessionHandle,
    dest_dir: PathBuf,
    ticket: DownloadTicket,
}

impl DownloadClient {
    pub fn new(session: SessionHandle, dest_dir: impl Into<PathBuf>, ticket: DownloadTicket) -> Self {
        Self {
            session,
            dest_dir: dest_dir.into(),
            ticket,
        }
    }

    /// Final location of the torrent file.
    pub fn destination(&self) -> PathBuf {
        self.dest_dir.join(self.ticket.file_name())
    }

    pub async fn download(&self) -> Result<DownloadedTorrent, DownloadError> {
        let start = Instant::now();
        let result = self.fetch_to_disk().await;
        TRACKER_REQUEST_DURATION
            .with_label_values(&["download"])
            .observe(start.elapsed().as_secs_f64());

        match &result {
            Ok(saved) => {
                TORRENT_DOWNLOADS.with_label_values(&["success"]).inc();
                info!(
                    id = %saved.id,
                    path = %saved.path.display(),
                    size_bytes = saved.size_bytes,
                    "Torrent saved"
                );
            }
            Err(e) => {
                TORRENT_DOWNLOADS.with_label_values(&["failure"]).inc();
                warn!(id = %self.ticket.id, error = %e, "Torrent download failed");
            }
        }
        result
    }

    fn download_path(&self) -> String {
        format!(
            "/torrents.php?action=download&id={}&authkey={}&torrent_pass={}",
            urlencoding::encode(&self.ticket.id),
            urlencoding::encode(&self.ticket.auth_key),
            urlencoding::encode(&self.ticket.pass_key)
        )
    }

    async fn fetch_to_disk(&self) -> Result<DownloadedTorrent, DownloadError> {
        let url = self.session.url(&self.download_path());
        debug!(id = %self.ticket.id, "Downloading torrent");

        let mut response = self
            .session
            .client()
            .get(&url)
            .send()
            .await
            .map_err(map_request_error)?;

        let status = response.status();
        if status.is_redirection() {
            return Err(DownloadError::NotAuthenticated);
        }
        if !status.is_success() {
            return Err(DownloadError::Rejected(status.as_u16()));
        }

        // The tracker answers bad keys with an HTML page, so check the first
        // chunk for a bencoded dictionary before touching the disk.
        let first = match response.chunk().await.map_err(map_request_error)? {
            Some(chunk) if chunk.first() == Some(&b'd') => chunk,
            _ => return Err(DownloadError::InvalidTorrent),
        };

        fs::create_dir_all(&self.dest_dir)
            .await
            .map_err(|source| DownloadError::Io {
                path: self.dest_dir.clone(),
                source,
            })?;

        let destination = self.destination();
        let staging = self
            .dest_dir
            .join(format!(".{}.{}.part", self.ticket.file_name(), Uuid::new_v4()));

        match write_staged(&staging, first, &mut response).await {
            Ok(size_bytes) => {
                fs::rename(&staging, &destination)
                    .await
                    .map_err(|source| DownloadError::Io {
                        path: destination.clone(),
                        source,
                    })?;
                Ok(DownloadedTorrent {
                    id: self.ticket.id.clone(),
                    path: destination,
                    size_bytes,
                })
            }
            Err(e) => {
                let _ = fs::remove_file(&staging).await;
                Err(e)
            }
        }
    }
}

/// Stream the response body into `staging`, returning the byte count.
async fn write_staged(
    staging: &Path,
    first: bytes::Bytes,
    response: &mut reqwest::Response,
) -> Result<u64, DownloadError> {
    let io_error = |source: std::io::Error| DownloadError::Io {
        path: staging.to_path_buf(),
        source,
    };

    let mut file = fs::File::create(staging).await.map_err(io_error)?;
    file.write_all(&first).await.map_err(io_error)?;
    let mut size_bytes = first.len() as u64;

    while let Some(chunk) = response.chunk().await.map_err(map_request_error)? {
        file.write_all(&chunk).await.map_err(io_error)?;
        size_bytes += chunk.len() as u64;
    }

    file.flush().await.map_err(io_error)?;
    file.sync_all().await.map_err(io_error)?;
    Ok(size_bytes)
}

fn map_request_error(e: reqwest::Error) -> DownloadError {
    if e.is_timeout() {
        DownloadError::Timeout
    } else {
        DownloadError::ConnectionFailed(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{SearchPreferences, TrackerConfig};
    use crate::tracker::SessionManager;

    async fn handle() -> SessionHandle {
        let manager = SessionManager::new(&TrackerConfig {
            url: "http://tracker.example".to_string(),
            username: "u".to_string(),
            password: "p".to_string(),
            passkey: "k".to_string(),
            timeout_secs: 5,
            preferences: SearchPreferences::default(),
        })
        .unwrap();
        manager.handle().await
    }

    #[tokio::test]
    async fn test_destination_is_named_after_ticket_id() {
        let ticket = DownloadTicket::new("98765", "auth", "pass").unwrap();
        let client = DownloadClient::new(handle().await, "/tmp/popcorn", ticket);
        assert_eq!(
            client.destination(),
            PathBuf::from("/tmp/popcorn/98765.torrent")
        );
    }

    #[tokio::test]
    async fn test_download_path_encodes_keys() {
        let ticket = DownloadTicket::new("1", "a b", "p&q").unwrap();
        let client = DownloadClient::new(handle().await, "/tmp", ticket);
        assert_eq!(
            client.download_path(),
            "/torrents.php?action=download&id=1&authkey=a%20b&torrent_pass=p%26q"
        );
    }
}
