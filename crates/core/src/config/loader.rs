use figment::{
    providers::{Env, Format, Json, Toml},
    Figment,
};
use std::path::Path;

use super::{types::Config, ConfigError};

/// Load configuration from file with environment variable overrides.
///
/// `.json` files are read as JSON (the legacy `settings.json` layout),
/// anything else as TOML. `POPCORN_`-prefixed variables override file values,
/// with `__` separating nesting levels (`POPCORN_TRACKER__PASSWORD`).
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    if !path.exists() {
        return Err(ConfigError::FileNotFound(path.display().to_string()));
    }

    let is_json = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));

    let figment = if is_json {
        Figment::new().merge(Json::file(path))
    } else {
        Figment::new().merge(Toml::file(path))
    };

    let config: Config = figment
        .merge(Env::prefixed("POPCORN_").split("__"))
        .extract()
        .map_err(|e| ConfigError::ParseError(e.to_string()))?;

    Ok(config)
}

/// Load configuration from TOML string (useful for testing)
pub fn load_config_from_str(toml_str: &str) -> Result<Config, ConfigError> {
    toml::from_str(toml_str).map_err(|e| ConfigError::ParseError(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::{Builder, NamedTempFile};

    #[test]
    fn test_load_config_from_str_valid() {
        let toml = r#"
cache_dir = "cache"

[server]
port = 9000

[tracker]
username = "u"
password = "p"
passkey = "k"
"#;
        let config = load_config_from_str(toml).unwrap();
        assert_eq!(config.server.port, 9000);
    }

    #[test]
    fn test_load_config_from_str_missing_credentials() {
        let toml = r#"
cache_dir = "cache"

[tracker]
username = "u"
"#;
        let result = load_config_from_str(toml);
        assert!(matches!(result, Err(ConfigError::ParseError(_))));
    }

    #[test]
    fn test_load_config_file_not_found() {
        let result = load_config(Path::new("/nonexistent/config.toml"));
        assert!(matches!(result, Err(ConfigError::FileNotFound(_))));
    }

    #[test]
    fn test_load_config_from_toml_file() {
        let mut temp_file = NamedTempFile::new().unwrap();
        writeln!(
            temp_file,
            r#"
cache_dir = "cache"

[server]
host = "127.0.0.1"
port = 3000

[tracker]
username = "u"
password = "p"
passkey = "k"
"#
        )
        .unwrap();

        let config = load_config(temp_file.path()).unwrap();
        assert_eq!(config.server.port, 3000);
        assert_eq!(config.server.host.to_string(), "127.0.0.1");
    }

    #[test]
    fn test_load_config_from_json_file() {
        let mut temp_file = Builder::new().suffix(".json").tempfile().unwrap();
        write!(
            temp_file,
            r#"{{"cache_dir": "cache", "ptp": {{"username": "u", "password": "p", "passkey": "k",
                "settings": {{"movie_source": "WEB", "movie_resolution": "2160p"}}}}}}"#
        )
        .unwrap();

        let config = load_config(temp_file.path()).unwrap();
        assert_eq!(config.tracker.username, "u");
        assert_eq!(config.tracker.preferences.source, "WEB");
        assert_eq!(config.tracker.preferences.resolution, "2160p");
    }

    #[test]
    fn test_load_config_malformed_file() {
        let mut temp_file = NamedTempFile::new().unwrap();
        writeln!(temp_file, "cache_dir = [not valid").unwrap();

        let result = load_config(temp_file.path());
        assert!(matches!(result, Err(ConfigError::ParseError(_))));
    }
}
