use super::{types::Config, ConfigError};

/// Validate configuration
/// Currently validates:
/// - Server port is not 0
/// - Cache directory is set
/// - Tracker credentials are present and the URL is absolute http(s)
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    if config.server.port == 0 {
        return Err(ConfigError::ValidationError(
            "server.port cannot be 0".to_string(),
        ));
    }

    if config.cache_dir.as_os_str().is_empty() {
        return Err(ConfigError::ValidationError(
            "cache_dir cannot be empty".to_string(),
        ));
    }

    let tracker = &config.tracker;
    for (field, value) in [
        ("username", &tracker.username),
        ("password", &tracker.password),
        ("passkey", &tracker.passkey),
    ] {
        if value.trim().is_empty() {
            return Err(ConfigError::ValidationError(format!(
                "tracker.{} cannot be empty",
                field
            )));
        }
    }

    match reqwest::Url::parse(&tracker.url) {
        Ok(url) if matches!(url.scheme(), "http" | "https") => {}
        _ => {
            return Err(ConfigError::ValidationError(format!(
                "tracker.url must be an absolute http(s) URL, got {:?}",
                tracker.url
            )))
        }
    }

    if tracker.timeout_secs == 0 {
        return Err(ConfigError::ValidationError(
            "tracker.timeout_secs cannot be 0".to_string(),
        ));
    }

    Ok(())
}
