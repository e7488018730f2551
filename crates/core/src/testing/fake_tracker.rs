//! In-process fake tracker for integration tests.

use std::collections::{HashMap, HashSet};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use axum::extract::{Path, Query, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Form, Json, Router};
use serde_json::json;
use tokio::task::JoinHandle;

use crate::config::{SearchPreferences, TrackerConfig};

pub const FAKE_USERNAME: &str = "alice";
pub const FAKE_PASSWORD: &str = "hunter2";
pub const FAKE_PASSKEY: &str = "passkey0123456789";
/// Auth key handed out in search results and required for downloads.
pub const FAKE_AUTH_KEY: &str = "authkey0123456789";
/// Identifier for which the tracker has no movies.
pub const UNKNOWN_IMDB_ID: &str = "tt0000000";

const SESSION_COOKIE: &str = "session";

struct FakeState {
    sessions: Mutex<HashSet<String>>,
    next_session: AtomicUsize,
    reject_logins: AtomicBool,
    logins: AtomicUsize,
    probes: AtomicUsize,
    searches: AtomicUsize,
    downloads: AtomicUsize,
    covers: AtomicUsize,
    last_search: Mutex<Option<HashMap<String, String>>>,
}

/// A tracker speaking the login, probe, search and download protocol on a
/// random local port. Counts every request so tests can assert how often the
/// client talked to it. The server stops when the value is dropped.
pub struct FakeTracker {
    addr: SocketAddr,
    state: Arc<FakeState>,
    task: JoinHandle<()>,
}

impl FakeTracker {
    pub async fn start() -> Self {
        let state = Arc::new(FakeState {
            sessions: Mutex::new(HashSet::new()),
            next_session: AtomicUsize::new(1),
            reject_logins: AtomicBool::new(false),
            logins: AtomicUsize::new(0),
            probes: AtomicUsize::new(0),
            searches: AtomicUsize::new(0),
            downloads: AtomicUsize::new(0),
            covers: AtomicUsize::new(0),
            last_search: Mutex::new(None),
        });

        let app = Router::new()
            .route("/ajax.php", post(login))
            .route("/index.php", get(index))
            .route("/torrents.php", get(torrents))
            .route("/covers/{name}", get(cover))
            .with_state(state.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind fake tracker");
        let addr = listener.local_addr().expect("fake tracker address");
        let task = tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });

        Self { addr, state, task }
    }

    /// Base URL, without trailing slash.
    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// URL of a cover image served by this tracker.
    pub fn cover_url(&self, name: &str) -> String {
        format!("{}/covers/{}", self.url(), name)
    }

    /// Tracker settings pointing at this server with valid credentials.
    pub fn tracker_config(&self, preferences: SearchPreferences) -> TrackerConfig {
        TrackerConfig {
            url: self.url(),
            username: FAKE_USERNAME.to_string(),
            password: FAKE_PASSWORD.to_string(),
            passkey: FAKE_PASSKEY.to_string(),
            timeout_secs: 5,
            preferences,
        }
    }

    /// Forget every session, as if they had all expired.
    pub fn expire_sessions(&self) {
        self.state.sessions.lock().unwrap().clear();
    }

    pub fn set_reject_logins(&self, reject: bool) {
        self.state.reject_logins.store(reject, Ordering::SeqCst);
    }

    pub fn login_count(&self) -> usize {
        self.state.logins.load(Ordering::SeqCst)
    }

    pub fn probe_count(&self) -> usize {
        self.state.probes.load(Ordering::SeqCst)
    }

    pub fn search_count(&self) -> usize {
        self.state.searches.load(Ordering::SeqCst)
    }

    pub fn download_count(&self) -> usize {
        self.state.downloads.load(Ordering::SeqCst)
    }

    pub fn cover_count(&self) -> usize {
        self.state.covers.load(Ordering::SeqCst)
    }

    /// Query parameters of the most recent search.
    pub fn last_search(&self) -> Option<HashMap<String, String>> {
        self.state.last_search.lock().unwrap().clone()
    }

    /// Exact bytes served for a torrent id.
    pub fn torrent_bytes(id: &str) -> Vec<u8> {
        let announce = "http://tracker.invalid/announce";
        let name = format!("movie-{}.mkv", id);
        format!(
            "d8:announce{}:{}4:infod6:lengthi1048576e4:name{}:{}ee",
            announce.len(),
            announce,
            name.len(),
            name
        )
        .into_bytes()
    }

    /// Exact bytes served for a cover name.
    pub fn cover_bytes(name: &str) -> Vec<u8> {
        let mut body = vec![0xFF, 0xD8, 0xFF, 0xE0];
        body.extend_from_slice(name.as_bytes());
        body
    }
}

impl Drop for FakeTracker {
    fn drop(&mut self) {
        self.task.abort();
    }
}

impl FakeState {
    fn authenticated(&self, headers: &HeaderMap) -> bool {
        let sessions = self.sessions.lock().unwrap();
        headers
            .get_all(header::COOKIE)
            .iter()
            .filter_map(|value| value.to_str().ok())
            .flat_map(|value| value.split(';'))
            .filter_map(|pair| pair.trim().split_once('='))
            .any(|(name, value)| name == SESSION_COOKIE && sessions.contains(value))
    }
}

fn redirect_to_login() -> Response {
    (StatusCode::SEE_OTHER, [(header::LOCATION, "login.php")]).into_response()
}

async fn login(
    State(state): State<Arc<FakeState>>,
    Query(query): Query<HashMap<String, String>>,
    Form(form): Form<HashMap<String, String>>,
) -> Response {
    state.logins.fetch_add(1, Ordering::SeqCst);

    if query.get("action").map(String::as_str) != Some("login") {
        return StatusCode::BAD_REQUEST.into_response();
    }

    let valid = form.get("username").map(String::as_str) == Some(FAKE_USERNAME)
        && form.get("password").map(String::as_str) == Some(FAKE_PASSWORD)
        && form.get("passkey").map(String::as_str) == Some(FAKE_PASSKEY);
    if !valid || state.reject_logins.load(Ordering::SeqCst) {
        return Json(json!({"Result": "Error", "Message": "Invalid credentials"})).into_response();
    }

    let token = format!("sess-{}", state.next_session.fetch_add(1, Ordering::SeqCst));
    state.sessions.lock().unwrap().insert(token.clone());
    (
        [(
            header::SET_COOKIE,
            format!("{}={}; Path=/; HttpOnly", SESSION_COOKIE, token),
        )],
        Json(json!({"Result": "Ok"})),
    )
        .into_response()
}

async fn index(State(state): State<Arc<FakeState>>, headers: HeaderMap) -> Response {
    state.probes.fetch_add(1, Ordering::SeqCst);
    if state.authenticated(&headers) {
        (StatusCode::OK, "<html><body>Welcome back</body></html>").into_response()
    } else {
        redirect_to_login()
    }
}

async fn torrents(
    State(state): State<Arc<FakeState>>,
    headers: HeaderMap,
    Query(query): Query<HashMap<String, String>>,
) -> Response {
    if query.get("action").map(String::as_str) == Some("download") {
        state.downloads.fetch_add(1, Ordering::SeqCst);
        if !state.authenticated(&headers) {
            return redirect_to_login();
        }
        return download(&query);
    }

    state.searches.fetch_add(1, Ordering::SeqCst);
    if !state.authenticated(&headers) {
        return redirect_to_login();
    }
    *state.last_search.lock().unwrap() = Some(query.clone());
    search(&query)
}

fn download(query: &HashMap<String, String>) -> Response {
    if query.get("torrent_pass").map(String::as_str) != Some(FAKE_PASSKEY) {
        return (StatusCode::FORBIDDEN, "Invalid passkey").into_response();
    }
    if query.get("authkey").map(String::as_str) != Some(FAKE_AUTH_KEY) {
        return (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/html")],
            "<html><body>Invalid authkey</body></html>",
        )
            .into_response();
    }

    let id = query.get("id").cloned().unwrap_or_default();
    (
        [(header::CONTENT_TYPE, "application/x-bittorrent")],
        FakeTracker::torrent_bytes(&id),
    )
        .into_response()
}

fn search(query: &HashMap<String, String>) -> Response {
    let imdb = query.get("imdb").cloned().unwrap_or_default();
    if imdb == UNKNOWN_IMDB_ID {
        return Json(json!({
            "TotalResults": "0",
            "Movies": [],
            "AuthKey": FAKE_AUTH_KEY,
            "PassKey": FAKE_PASSKEY,
        }))
        .into_response();
    }

    let digits = imdb.trim_start_matches("tt");
    Json(json!({
        "TotalResults": "1",
        "Movies": [{
            "GroupId": "4242",
            "Title": "The Shawshank Redemption",
            "Year": "1994",
            "Cover": format!("/covers/{}.jpg", digits),
            "ImdbId": digits,
            "Torrents": [
                {"Id": "101", "ReleaseName": "Shawshank.1994.720p.BluRay", "Source": "Blu-ray",
                 "Resolution": "720p", "Codec": "x264", "Container": "MKV",
                 "Quality": "High Definition", "Size": "5000000000", "Seeders": "120",
                 "Leechers": "3", "Snatched": "2000", "Scene": false, "GoldenPopcorn": false,
                 "Checked": true},
                {"Id": 102, "ReleaseName": "Shawshank.1994.1080p.BluRay", "Source": "Blu-ray",
                 "Resolution": "1080p", "Codec": "x264", "Container": "MKV",
                 "Quality": "High Definition", "Size": 12000000000u64, "Seeders": 60,
                 "Leechers": 1, "Snatched": 900, "Scene": false, "GoldenPopcorn": true,
                 "Checked": true},
                {"Id": "103", "ReleaseName": "Shawshank.1994.1080p.WEB", "Source": "WEB",
                 "Resolution": "1080p", "Codec": "H.264", "Container": "MKV",
                 "Quality": "High Definition", "Size": "6000000000", "Seeders": "15",
                 "Leechers": "0", "Snatched": "150", "Scene": true, "GoldenPopcorn": false,
                 "Checked": false}
            ]
        }],
        "AuthKey": FAKE_AUTH_KEY,
        "PassKey": FAKE_PASSKEY,
    }))
    .into_response()
}

async fn cover(State(state): State<Arc<FakeState>>, Path(name): Path<String>) -> Response {
    state.covers.fetch_add(1, Ordering::SeqCst);
    if name.starts_with("missing") {
        return StatusCode::NOT_FOUND.into_response();
    }
    (
        [(header::CONTENT_TYPE, "image/jpeg")],
        FakeTracker::cover_bytes(&name),
    )
        .into_response()
}
