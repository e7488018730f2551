//! Tracker search and torrent download handlers.

use std::sync::Arc;

use axum::{
    extract::{rejection::QueryRejection, Query, State},
    Json,
};
use serde::Deserialize;
use popcorn_core::{DownloadedTorrent, SearchResult};

use super::ApiError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct SearchParams {
    #[serde(default, rename = "imdbID", alias = "imdb_id")]
    pub imdb_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct DownloadParams {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub authkey: Option<String>,
    #[serde(default)]
    pub passkey: Option<String>,
}

pub async fn search(
    State(state): State<Arc<AppState>>,
    params: Result<Query<SearchParams>, QueryRejection>,
) -> Result<Json<SearchResult>, ApiError> {
    let Query(params) = params?;
    let result = state.service().search(params.imdb_id.as_deref()).await?;
    Ok(Json(result))
}

pub async fn download(
    State(state): State<Arc<AppState>>,
    params: Result<Query<DownloadParams>, QueryRejection>,
) -> Result<Json<DownloadedTorrent>, ApiError> {
    let Query(params) = params?;
    let saved = state
        .service()
        .download(
            params.id.as_deref(),
            params.authkey.as_deref(),
            params.passkey.as_deref(),
        )
        .await?;
    Ok(Json(saved))
}
