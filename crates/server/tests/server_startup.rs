use std::io::Write;
use std::net::TcpListener;
use std::path::Path;
use std::time::Duration;

use reqwest::Client;
use tempfile::{NamedTempFile, TempDir};
use tokio::time::{sleep, timeout};

use popcorn_core::testing::FakeTracker;

/// Find an available port
fn get_available_port() -> u16 {
    TcpListener::bind("127.0.0.1:0")
        .unwrap()
        .local_addr()
        .unwrap()
        .port()
}

/// Config pointing at a fake tracker
fn tracker_config(port: u16, cache_dir: &Path, tracker_url: &str, password: &str) -> String {
    format!(
        r#"
cache_dir = "{}"

[server]
host = "127.0.0.1"
port = {}

[tracker]
url = "{}"
username = "alice"
password = "{}"
passkey = "{}"
timeout_secs = 5

[tracker.preferences]
source = "Blu-ray"
resolution = "1080p"
"#,
        cache_dir.display(),
        port,
        tracker_url,
        password,
        popcorn_core::testing::FAKE_PASSKEY
    )
}

fn write_config(content: &str) -> NamedTempFile {
    let mut temp_file = NamedTempFile::new().unwrap();
    temp_file.write_all(content.as_bytes()).unwrap();
    temp_file.flush().unwrap();
    temp_file
}

/// Spawn the server and return a handle
async fn spawn_server(config_path: &Path) -> tokio::process::Child {
    tokio::process::Command::new(env!("CARGO_BIN_EXE_popcorn"))
        .env("POPCORN_CONFIG", config_path)
        .env("RUST_LOG", "error") // Quiet logs during tests
        .kill_on_drop(true)
        .spawn()
        .expect("Failed to spawn server")
}

/// Run the binary to completion
async fn run_to_exit(config_path: &Path) -> std::process::Output {
    timeout(
        Duration::from_secs(10),
        tokio::process::Command::new(env!("CARGO_BIN_EXE_popcorn"))
            .env("POPCORN_CONFIG", config_path)
            .env("RUST_LOG", "error")
            .output(),
    )
    .await
    .expect("Command timed out")
    .expect("Failed to execute command")
}

/// Client without connection reuse, so shutdown is not held up by idle sockets
fn client() -> Client {
    Client::builder().pool_max_idle_per_host(0).build().unwrap()
}

/// Wait for server to be ready
async fn wait_for_server(port: u16, max_attempts: u32) -> bool {
    let client = client();
    for _ in 0..max_attempts {
        if client
            .get(format!("http://127.0.0.1:{}/api/v1/health", port))
            .send()
            .await
            .is_ok()
        {
            return true;
        }
        sleep(Duration::from_millis(50)).await;
    }
    false
}

#[tokio::test]
async fn test_health_and_config_endpoints() {
    let tracker = FakeTracker::start().await;
    let temp_dir = TempDir::new().unwrap();
    let cache_dir = temp_dir.path().join("cache");
    let port = get_available_port();
    let config = write_config(&tracker_config(port, &cache_dir, &tracker.url(), "hunter2"));

    let mut server = spawn_server(config.path()).await;
    assert!(
        wait_for_server(port, 100).await,
        "Server did not start in time"
    );
    assert_eq!(tracker.login_count(), 1);
    assert!(cache_dir.is_dir());

    let client = client();
    let json: serde_json::Value = client
        .get(format!("http://127.0.0.1:{}/api/v1/config", port))
        .send()
        .await
        .expect("Failed to send request")
        .json()
        .await
        .expect("Failed to parse JSON");
    assert_eq!(json["server"]["port"], port);
    assert_eq!(json["tracker"]["preferences"]["source"], "Blu-ray");
    assert_eq!(json["tracker"]["password_configured"], true);

    let json: serde_json::Value = client
        .get(format!(
            "http://127.0.0.1:{}/api/v1/search?imdbID=tt0111161",
            port
        ))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(json["movies"][0]["releases"][0]["id"], "102");

    // Cleanup
    server.kill().await.ok();
}

#[cfg(unix)]
#[tokio::test]
async fn test_sigterm_purges_cache_and_exits_cleanly() {
    let tracker = FakeTracker::start().await;
    let temp_dir = TempDir::new().unwrap();
    let cache_dir = temp_dir.path().join("cache");
    let port = get_available_port();
    let config = write_config(&tracker_config(port, &cache_dir, &tracker.url(), "hunter2"));

    let mut server = spawn_server(config.path()).await;
    assert!(
        wait_for_server(port, 100).await,
        "Server did not start in time"
    );

    let response = client()
        .get(format!(
            "http://127.0.0.1:{}/api/v1/download?id=9&authkey={}&passkey={}",
            port,
            popcorn_core::testing::FAKE_AUTH_KEY,
            popcorn_core::testing::FAKE_PASSKEY
        ))
        .send()
        .await
        .unwrap();
    assert!(response.status().is_success());
    assert!(cache_dir.join("9.torrent").exists());

    let pid = server.id().expect("server pid");
    let status = tokio::process::Command::new("kill")
        .arg("-TERM")
        .arg(pid.to_string())
        .status()
        .await
        .expect("Failed to run kill");
    assert!(status.success());

    let exit = timeout(Duration::from_secs(10), server.wait())
        .await
        .expect("Server did not exit after SIGTERM")
        .expect("Failed to wait for server");
    assert!(exit.success());
    assert!(!cache_dir.exists());
}

#[tokio::test]
async fn test_missing_config_file_exits_with_error() {
    let result = run_to_exit(Path::new("/nonexistent/config.toml")).await;
    assert!(!result.status.success());
}

#[tokio::test]
async fn test_missing_tracker_section_exits_with_error() {
    let config = write_config(
        r#"
cache_dir = "/tmp/popcorn-test-cache"

[server]
port = 8080
"#,
    );

    let result = run_to_exit(config.path()).await;
    assert!(!result.status.success());
}

#[tokio::test]
async fn test_rejected_initial_login_exits_with_error() {
    let tracker = FakeTracker::start().await;
    let temp_dir = TempDir::new().unwrap();
    let cache_dir = temp_dir.path().join("cache");
    let config = write_config(&tracker_config(
        get_available_port(),
        &cache_dir,
        &tracker.url(),
        "wrong-password",
    ));

    let result = run_to_exit(config.path()).await;
    assert!(!result.status.success());
    assert_eq!(tracker.login_count(), 1);
    assert!(!cache_dir.exists());
}
