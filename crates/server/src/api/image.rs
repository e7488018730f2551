//! Cached image handler.

use std::sync::Arc;

use axum::{
    extract::{rejection::QueryRejection, Query, State},
    http::header,
    response::{IntoResponse, Response},
};
use serde::Deserialize;

use super::ApiError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct ImageParams {
    #[serde(default)]
    pub url: Option<String>,
}

pub async fn get_image(
    State(state): State<Arc<AppState>>,
    params: Result<Query<ImageParams>, QueryRejection>,
) -> Result<Response, ApiError> {
    let Query(params) = params?;
    let bytes = state.service().fetch_image(params.url.as_deref()).await?;
    let content_type = sniff_content_type(&bytes);

    Ok((
        [
            (header::CONTENT_TYPE, content_type),
            (header::CACHE_CONTROL, "public, max-age=86400"),
        ],
        bytes,
    )
        .into_response())
}

/// Guess an image MIME type from its leading bytes.
fn sniff_content_type(bytes: &[u8]) -> &'static str {
    if bytes.starts_with(&[0xFF, 0xD8, 0xFF]) {
        "image/jpeg"
    } else if bytes.starts_with(b"\x89PNG\r\n\x1a\n") {
        "image/png"
    } else if bytes.starts_with(b"GIF87a") || bytes.starts_with(b"GIF89a") {
        "image/gif"
    } else if bytes.len() >= 12 && &bytes[..4] == b"RIFF" && &bytes[8..12] == b"WEBP" {
        "image/webp"
    } else {
        "application/octet-stream"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sniff_content_type() {
        assert_eq!(sniff_content_type(&[0xFF, 0xD8, 0xFF, 0xE0, 0x00]), "image/jpeg");
        assert_eq!(sniff_content_type(b"\x89PNG\r\n\x1a\n...."), "image/png");
        assert_eq!(sniff_content_type(b"GIF89a...."), "image/gif");
        assert_eq!(sniff_content_type(b"RIFF\x00\x00\x00\x00WEBPVP8 "), "image/webp");
        assert_eq!(sniff_content_type(b"RIFF"), "application/octet-stream");
        assert_eq!(sniff_content_type(b""), "application/octet-stream");
        assert_eq!(sniff_content_type(b"<html>"), "application/octet-stream");
    }
}
