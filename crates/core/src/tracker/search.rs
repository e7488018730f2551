//! Identifier search against the tracker's JSON API.

use std::time::Instant;

use chrono::Utc;
use serde::{Deserialize, Deserializer};
use tracing::{debug, warn};

use crate::config::SearchPreferences;
use crate::metrics::{TRACKER_REQUEST_DURATION, TRACKER_SEARCHES};

use super::{Movie, Release, SearchError, SearchResult, SessionHandle};

/// Runs identifier searches with fixed source/resolution preferences.
///
/// Every call is a live query; nothing is cached here.
#[derive(Debug, Clone)]
pub struct SearchClient {
    preferences: SearchPreferences,
}

impl SearchClient {
    pub fn new(preferences: SearchPreferences) -> Self {
        Self { preferences }
    }

    pub fn preferences(&self) -> &SearchPreferences {
        &self.preferences
    }

    /// Search the tracker for an IMDb identifier.
    ///
    /// The session must already be logged in. No matches is a successful,
    /// empty result.
    pub async fn get(
        &self,
        session: &SessionHandle,
        identifier: &str,
    ) -> Result<SearchResult, SearchError> {
        let result = self.query(session, identifier).await;
        match &result {
            Ok(found) if found.is_empty() => {
                TRACKER_SEARCHES.with_label_values(&["empty"]).inc();
            }
            Ok(_) => TRACKER_SEARCHES.with_label_values(&["found"]).inc(),
            Err(e) => {
                TRACKER_SEARCHES.with_label_values(&["failure"]).inc();
                warn!(identifier = identifier, error = %e, "Tracker search failed");
            }
        }
        result
    }

    async fn query(
        &self,
        session: &SessionHandle,
        identifier: &str,
    ) -> Result<SearchResult, SearchError> {
        let identifier = normalize_identifier(identifier)?;
        let url = session.url(&self.build_search_path(&identifier));
        debug!(identifier = %identifier, "Searching tracker");

        let start = Instant::now();
        let body = fetch_body(session, &url).await;
        TRACKER_REQUEST_DURATION
            .with_label_values(&["search"])
            .observe(start.elapsed().as_secs_f64());
        let body = body?;

        let parsed: TrackerSearchResponse = serde_json::from_str(&body)
            .map_err(|e| SearchError::MalformedResponse(e.to_string()))?;

        let result = self.into_result(identifier, parsed);
        debug!(
            identifier = %result.identifier,
            movies = result.movies.len(),
            "Tracker search complete"
        );
        Ok(result)
    }

    /// Build the search path with the preference filters encoded.
    fn build_search_path(&self, identifier: &str) -> String {
        let mut path = format!(
            "/torrents.php?imdb={}&json=noredirect",
            urlencoding::encode(identifier)
        );
        if !self.preferences.source.is_empty() {
            path.push_str(&format!(
                "&source={}",
                urlencoding::encode(&self.preferences.source)
            ));
        }
        if !self.preferences.resolution.is_empty() {
            path.push_str(&format!(
                "&resolution={}",
                urlencoding::encode(&self.preferences.resolution)
            ));
        }
        path
    }

    fn into_result(&self, identifier: String, response: TrackerSearchResponse) -> SearchResult {
        let movies: Vec<Movie> = response
            .movies
            .into_iter()
            .map(|movie| {
                let mut releases: Vec<Release> = movie
                    .torrents
                    .into_iter()
                    .map(|t| self.into_release(t))
                    .collect();
                rank_releases(&mut releases);

                Movie {
                    group_id: movie.group_id,
                    title: movie.title,
                    year: movie.year.filter(|y| !y.is_empty()),
                    cover: movie.cover.filter(|c| !c.is_empty()),
                    imdb_id: movie.imdb_id.filter(|i| !i.is_empty()),
                    releases,
                }
            })
            .collect();

        SearchResult {
            identifier,
            filters: self.preferences.clone(),
            total_results: response.total_results.max(movies.len() as u64),
            movies,
            auth_key: response.auth_key.filter(|k| !k.is_empty()),
            pass_key: response.pass_key.filter(|k| !k.is_empty()),
            searched_at: Utc::now(),
        }
    }

    fn into_release(&self, t: TrackerTorrent) -> Release {
        let preferred = matches_preference(&self.preferences.source, &t.source)
            && matches_preference(&self.preferences.resolution, &t.resolution);
        Release {
            id: t.id,
            release_name: t.release_name,
            source: t.source,
            resolution: t.resolution,
            codec: t.codec,
            container: t.container,
            quality: t.quality,
            size_bytes: t.size,
            seeders: clamp_u32(t.seeders),
            leechers: clamp_u32(t.leechers),
            snatched: clamp_u32(t.snatched),
            scene: t.scene,
            golden_popcorn: t.golden_popcorn,
            checked: t.checked,
            preferred,
        }
    }
}

/// Trim the identifier and make sure it carries the `tt` prefix.
fn normalize_identifier(identifier: &str) -> Result<String, SearchError> {
    let trimmed = identifier.trim();
    let digits = trimmed
        .strip_prefix("tt")
        .or_else(|| trimmed.strip_prefix("TT"))
        .unwrap_or(trimmed);

    if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
        return Err(SearchError::InvalidIdentifier(identifier.to_string()));
    }
    Ok(format!("tt{}", digits))
}

/// Empty preference matches anything.
fn matches_preference(preference: &str, value: &str) -> bool {
    preference.is_empty() || preference.eq_ignore_ascii_case(value)
}

/// Preferred releases first, then Golden Popcorn, then by seeders.
fn rank_releases(releases: &mut [Release]) {
    releases.sort_by(|a, b| {
        b.preferred
            .cmp(&a.preferred)
            .then(b.golden_popcorn.cmp(&a.golden_popcorn))
            .then(b.seeders.cmp(&a.seeders))
    });
}

fn clamp_u32(value: u64) -> u32 {
    value.min(u32::MAX as u64) as u32
}

// Tracker API response types

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct TrackerSearchResponse {
    #[serde(default, deserialize_with = "lenient_u64")]
    total_results: u64,
    #[serde(default)]
    movies: Vec<TrackerMovie>,
    #[serde(default)]
    auth_key: Option<String>,
    #[serde(default)]
    pass_key: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct TrackerMovie {
    #[serde(deserialize_with = "lenient_string")]
    group_id: String,
    #[serde(default)]
    title: String,
    #[serde(default, deserialize_with = "lenient_opt_string")]
    year: Option<String>,
    #[serde(default)]
    cover: Option<String>,
    #[serde(default, deserialize_with = "lenient_opt_string")]
    imdb_id: Option<String>,
    #[serde(default)]
    torrents: Vec<TrackerTorrent>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct TrackerTorrent {
    #[serde(deserialize_with = "lenient_string")]
    id: String,
    #[serde(default)]
    release_name: String,
    #[serde(default)]
    source: String,
    #[serde(default)]
    resolution: String,
    #[serde(default)]
    codec: String,
    #[serde(default)]
    container: String,
    #[serde(default)]
    quality: String,
    #[serde(default, deserialize_with = "lenient_u64")]
    size: u64,
    #[serde(default, deserialize_with = "lenient_u64")]
    seeders: u64,
    #[serde(default, deserialize_with = "lenient_u64")]
    leechers: u64,
    #[serde(default, deserialize_with = "lenient_u64")]
    snatched: u64,
    #[serde(default)]
    scene: bool,
    #[serde(default)]
    golden_popcorn: bool,
    #[serde(default)]
    checked: bool,
}

/// The tracker sends counters either as numbers or as numeric strings.
fn lenient_u64<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u64, D::Error> {
    match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::Number(n) => Ok(n.as_u64().unwrap_or(0)),
        serde_json::Value::String(s) => Ok(s.trim().parse().unwrap_or(0)),
        _ => Ok(0),
    }
}

fn lenient_string<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::String(s) => Ok(s),
        serde_json::Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "expected string or number, got {}",
            other
        ))),
    }
}

fn lenient_opt_string<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Option<String>, D::Error> {
    match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::String(s) => Ok(Some(s)),
        serde_json::Value::Number(n) => Ok(Some(n.to_string())),
        _ => Ok(None),
    }
}

/// Send the search request and read the body of a successful answer.
async fn fetch_body(session: &SessionHandle, url: &str) -> Result<String, SearchError> {
    let response = session.client().get(url).send().await.map_err(|e| {
        if e.is_timeout() {
            SearchError::Timeout
        } else {
            SearchError::ConnectionFailed(e.to_string())
        }
    })?;

    let status = response.status();
    if status.is_redirection() {
        return Err(SearchError::NotAuthenticated);
    }
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(SearchError::Status {
            status: status.as_u16(),
            body: body.chars().take(200).collect::<String>(),
        });
    }

    response
        .text()
        .await
        .map_err(|e| SearchError::ConnectionFailed(e.to_string()))
}
