use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use popcorn_core::{
    load_config, termination_signal, validate_config, CleanupOutcome, FetchCache, HttpFetcher,
    Lifecycle, PopcornService, SearchClient, SessionManager,
};
use popcorn_server::{api::create_router, state::AppState};

/// Application version
const VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!("Fatal error: {:#}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("popcorn v{}", VERSION);

    // Determine config path
    let config_path = std::env::var("POPCORN_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("config.toml"));

    // Load configuration
    info!("Loading configuration from {:?}", config_path);
    let config = load_config(&config_path)
        .with_context(|| format!("Failed to load config from {:?}", config_path))?;

    // Validate configuration
    validate_config(&config).context("Configuration validation failed")?;

    info!("Configuration loaded successfully");
    info!("Cache directory: {:?}", config.cache_dir);
    info!("Tracker: {} as {}", config.tracker.url, config.tracker.username);

    // Log in before touching the filesystem; nothing can be served without a session
    let session = Arc::new(
        SessionManager::new(&config.tracker).context("Failed to create tracker session")?,
    );
    session
        .login()
        .await
        .context("Initial tracker login failed")?;

    // Open the image cache
    let timeout = Duration::from_secs(config.tracker.timeout_secs as u64);
    let fetcher = Arc::new(HttpFetcher::new(timeout).context("Failed to create image fetcher")?);
    let cache = FetchCache::open(&config.cache_dir, fetcher)
        .await
        .with_context(|| format!("Failed to open cache directory {:?}", config.cache_dir))?;

    let service = PopcornService::new(
        session,
        SearchClient::new(config.tracker.preferences.clone()),
        cache.clone(),
        &config.cache_dir,
    );
    let lifecycle = Arc::new(Lifecycle::new(cache, &config.cache_dir));

    let addr = SocketAddr::new(config.server.host, config.server.port);
    let state = Arc::new(AppState::new(config, service, lifecycle.clone()));

    // Create router
    let app = create_router(state);

    // Start server
    info!("Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    // In-flight requests are allowed to finish before cleanup runs
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(lifecycle.clone()))
        .await
        .context("Server error")?;

    info!("Server stopped, purging cache...");
    match lifecycle
        .cleanup()
        .await
        .context("Failed to purge cache directory")?
    {
        CleanupOutcome::Completed => info!("Cache purged"),
        CleanupOutcome::AlreadyDone => info!("Cache was already purged"),
    }

    Ok(())
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM), then flip into shutdown mode.
async fn shutdown_signal(lifecycle: Arc<Lifecycle>) {
    if let Err(e) = termination_signal().await {
        error!(error = %e, "Failed to install signal handlers");
        std::future::pending::<()>().await;
    }
    lifecycle.request_shutdown();
}
