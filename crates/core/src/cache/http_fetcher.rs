//! reqwest-backed fetcher.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::Client;
use tracing::debug;

use super::{CacheError, Fetcher};

/// Plain HTTP fetcher. Carries no cookies and never sees the tracker session.
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn new(timeout: Duration) -> Result<Self, CacheError> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("popcorn/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| CacheError::Fetch {
                url: String::new(),
                message: format!("failed to build HTTP client: {}", e),
            })?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<Bytes, CacheError> {
        let fetch_error = |e: reqwest::Error| CacheError::Fetch {
            url: url.to_string(),
            message: e.to_string(),
        };

        let response = self.client.get(url).send().await.map_err(fetch_error)?;
        let status = response.status();
        if !status.is_success() {
            return Err(CacheError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let body = response.bytes().await.map_err(fetch_error)?;
        debug!(url = url, bytes = body.len(), "Fetched image");
        Ok(body)
    }
}
