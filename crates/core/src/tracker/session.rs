//! Tracker login session.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use reqwest::{cookie::Jar, redirect::Policy, Client};
use serde::Deserialize;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::config::TrackerConfig;
use crate::metrics::{TRACKER_LOGINS, TRACKER_REQUEST_DURATION, TRACKER_SESSION_CHECKS};

use super::{AuthError, AuthState, Credentials};

const USER_AGENT: &str = concat!("popcorn/", env!("CARGO_PKG_VERSION"));

/// Snapshot of one login generation's token set.
///
/// Holds the HTTP client that owns the cookie jar filled by a login. A handle
/// keeps working with the cookies it was created with even if the manager
/// logs in again afterwards.
#[derive(Clone)]
pub struct SessionHandle {
    client: Client,
    base_url: Arc<str>,
    generation: u64,
}

impl SessionHandle {
    pub(crate) fn client(&self) -> &Client {
        &self.client
    }

    /// Absolute URL for a tracker endpoint (`path` starts with `/`).
    pub(crate) fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Login generation this handle was taken from.
    pub fn generation(&self) -> u64 {
        self.generation
    }
}

impl std::fmt::Debug for SessionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionHandle")
            .field("base_url", &self.base_url)
            .field("generation", &self.generation)
            .finish()
    }
}

struct Session {
    state: AuthState,
    client: Client,
    /// Bumped on every successful login.
    generation: u64,
}

/// Owns the tracker login state and cookie jar.
///
/// `login` takes the session write lock for the whole handshake, so probes
/// (which hold the read lock) never run against a half-replaced token set.
/// `ensure_logged_in` serializes the check-then-login sequence so concurrent
/// callers that all find the session expired trigger a single login.
pub struct SessionManager {
    credentials: Credentials,
    base_url: Arc<str>,
    timeout: Duration,
    session: RwLock<Session>,
    refresh: Mutex<()>,
    logins: AtomicUsize,
}

impl SessionManager {
    /// Create a logged-out session manager.
    pub fn new(config: &TrackerConfig) -> Result<Self, AuthError> {
        let timeout = Duration::from_secs(config.timeout_secs as u64);
        let client = build_client(timeout)?;

        Ok(Self {
            credentials: Credentials::from(config),
            base_url: Arc::from(config.url.trim_end_matches('/')),
            timeout,
            session: RwLock::new(Session {
                state: AuthState::LoggedOut,
                client,
                generation: 0,
            }),
            refresh: Mutex::new(()),
            logins: AtomicUsize::new(0),
        })
    }

    /// Current authentication state as last observed.
    pub async fn state(&self) -> AuthState {
        self.session.read().await.state
    }

    /// Number of login handshakes attempted since creation.
    pub fn login_count(&self) -> usize {
        self.logins.load(Ordering::Relaxed)
    }

    /// Snapshot of the current token set.
    pub async fn handle(&self) -> SessionHandle {
        let session = self.session.read().await;
        SessionHandle {
            client: session.client.clone(),
            base_url: Arc::clone(&self.base_url),
            generation: session.generation,
        }
    }

    /// Perform the login handshake with a fresh cookie jar.
    ///
    /// On success the new token set replaces the old one and the state becomes
    /// `LoggedIn`. On failure the state is `LoggedOut` and the error is returned.
    pub async fn login(&self) -> Result<(), AuthError> {
        let _serial = self.refresh.lock().await;
        self.login_locked().await
    }

    /// Probe whether the current session is still accepted by the tracker.
    ///
    /// Does not change the session state.
    pub async fn check_login(&self) -> Result<bool, AuthError> {
        let session = self.session.read().await;
        if session.state == AuthState::LoggedOut {
            return Ok(false);
        }

        let url = format!("{}/index.php", self.base_url);
        let start = Instant::now();
        let result = session.client.get(&url).send().await;
        TRACKER_REQUEST_DURATION
            .with_label_values(&["check"])
            .observe(start.elapsed().as_secs_f64());

        let response = result.map_err(|e| {
            TRACKER_SESSION_CHECKS.with_label_values(&["error"]).inc();
            map_request_error(e)
        })?;

        let status = response.status();
        if status.is_success() {
            TRACKER_SESSION_CHECKS.with_label_values(&["valid"]).inc();
            Ok(true)
        } else if status.is_redirection() {
            debug!(status = status.as_u16(), "Tracker session expired");
            TRACKER_SESSION_CHECKS.with_label_values(&["expired"]).inc();
            Ok(false)
        } else {
            TRACKER_SESSION_CHECKS.with_label_values(&["error"]).inc();
            Err(AuthError::UnexpectedStatus(status.as_u16()))
        }
    }

    /// Return a handle to a valid session, logging in at most once.
    ///
    /// A failed probe is treated as an expired session. If another caller
    /// completed a login while this one waited, that login is reused.
    pub async fn ensure_logged_in(&self) -> Result<SessionHandle, AuthError> {
        let seen_generation = self.session.read().await.generation;

        let valid = match self.check_login().await {
            Ok(valid) => valid,
            Err(e) => {
                warn!(error = %e, "Tracker session probe failed, assuming expired");
                false
            }
        };
        if valid {
            return Ok(self.handle().await);
        }

        let _serial = self.refresh.lock().await;
        if self.session.read().await.generation != seen_generation {
            debug!("Session refreshed by a concurrent caller");
            return Ok(self.handle().await);
        }

        self.login_locked().await?;
        Ok(self.handle().await)
    }

    /// Login body; the caller holds `refresh`.
    async fn login_locked(&self) -> Result<(), AuthError> {
        let mut session = self.session.write().await;
        let client = build_client(self.timeout)?;
        self.logins.fetch_add(1, Ordering::Relaxed);

        let start = Instant::now();
        let result = self.handshake(&client).await;
        TRACKER_REQUEST_DURATION
            .with_label_values(&["login"])
            .observe(start.elapsed().as_secs_f64());

        match result {
            Ok(()) => {
                session.client = client;
                session.state = AuthState::LoggedIn;
                session.generation += 1;
                TRACKER_LOGINS.with_label_values(&["success"]).inc();
                info!(
                    username = %self.credentials.username,
                    generation = session.generation,
                    "Logged in to tracker"
                );
                Ok(())
            }
            Err(e) => {
                session.state = AuthState::LoggedOut;
                TRACKER_LOGINS.with_label_values(&["failure"]).inc();
                warn!(username = %self.credentials.username, error = %e, "Tracker login failed");
                Err(e)
            }
        }
    }

    async fn handshake(&self, client: &Client) -> Result<(), AuthError> {
        let url = format!("{}/ajax.php?action=login", self.base_url);
        let params = [
            ("username", self.credentials.username.as_str()),
            ("password", self.credentials.password.as_str()),
            ("passkey", self.credentials.passkey.as_str()),
            ("keeplogged", "1"),
        ];

        let response = client
            .post(&url)
            .form(&params)
            .send()
            .await
            .map_err(map_request_error)?;

        let status = response.status();
        if !status.is_success() {
            return Err(AuthError::UnexpectedStatus(status.as_u16()));
        }

        let body = response
            .text()
            .await
            .map_err(|e| AuthError::ConnectionFailed(e.to_string()))?;
        let login: LoginResponse = serde_json::from_str(&body).map_err(|_| {
            AuthError::MalformedResponse(body.chars().take(100).collect::<String>())
        })?;

        if login.result.eq_ignore_ascii_case("ok") {
            Ok(())
        } else {
            Err(AuthError::Rejected(
                login.message.unwrap_or_else(|| login.result.clone()),
            ))
        }
    }
}

/// Tracker login response.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct LoginResponse {
    result: String,
    #[serde(default)]
    message: Option<String>,
}

/// Build a client with its own cookie jar.
///
/// Redirects are not followed: the tracker answers unauthenticated requests
/// with a redirect to its login page, which callers detect from the status.
fn build_client(timeout: Duration) -> Result<Client, AuthError> {
    Client::builder()
        .timeout(timeout)
        .user_agent(USER_AGENT)
        .cookie_provider(Arc::new(Jar::default()))
        .redirect(Policy::none())
        .build()
        .map_err(|e| AuthError::Client(e.to_string()))
}

fn map_request_error(e: reqwest::Error) -> AuthError {
    if e.is_timeout() {
        AuthError::Timeout
    } else {
        AuthError::ConnectionFailed(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SearchPreferences;

    fn config(url: &str) -> TrackerConfig {
        TrackerConfig {
            url: url.to_string(),
            username: "alice".to_string(),
            password: "hunter2".to_string(),
            passkey: "abc123".to_string(),
            timeout_secs: 5,
            preferences: SearchPreferences::default(),
        }
    }

    #[test]
    fn test_login_response_parsing() {
        let ok: LoginResponse = serde_json::from_str(r#"{"Result":"Ok"}"#).unwrap();
        assert_eq!(ok.result, "Ok");
        assert!(ok.message.is_none());

        let err: LoginResponse =
            serde_json::from_str(r#"{"Result":"Error","Message":"Bad passkey"}"#).unwrap();
        assert_eq!(err.message.as_deref(), Some("Bad passkey"));
    }

    #[tokio::test]
    async fn test_new_manager_starts_logged_out() {
        let manager = SessionManager::new(&config("http://127.0.0.1:1")).unwrap();
        assert_eq!(manager.state().await, AuthState::LoggedOut);
        assert_eq!(manager.login_count(), 0);
        assert_eq!(manager.handle().await.generation(), 0);
    }

    #[tokio::test]
    async fn test_check_login_when_logged_out_skips_network() {
        // Port 1 is never listening; a network probe would fail.
        let manager = SessionManager::new(&config("http://127.0.0.1:1")).unwrap();
        assert!(!manager.check_login().await.unwrap());
    }

    #[test]
    fn test_handle_url_strips_trailing_slash() {
        let manager = SessionManager::new(&config("http://tracker.example/")).unwrap();
        let handle = tokio_test::block_on(manager.handle());
        assert_eq!(handle.url("/index.php"), "http://tracker.example/index.php");
    }

    #[tokio::test]
    async fn test_login_connection_failure_stays_logged_out() {
        let manager = SessionManager::new(&config("http://127.0.0.1:1")).unwrap();
        let result = manager.login().await;
        assert!(matches!(
            result,
            Err(AuthError::ConnectionFailed(_)) | Err(AuthError::Timeout)
        ));
        assert_eq!(manager.state().await, AuthState::LoggedOut);
        assert_eq!(manager.login_count(), 1);
    }
}
