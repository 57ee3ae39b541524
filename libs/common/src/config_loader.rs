//! Configuration loading helpers
//!
//! The file provider is chosen from the file extension (toml, yaml/yml, json).
//! Layered loading merges prefixed environment variables on top of the file,
//! using `__` as the nesting separator (`DNP3_OUTSTATION__PORT=20001`).

use figment::{
    providers::{Env, Format, Json, Toml, Yaml},
    Figment,
};
use serde::Deserialize;
use std::path::Path;
use thiserror::Error;
use tracing::{debug, info};

/// Errors raised while locating or extracting configuration
#[derive(Debug, Error)]
pub enum ConfigLoadError {
    #[error("Config file not found: {0}")]
    FileNotFound(String),

    #[error("Config file must have an extension: {0}")]
    MissingExtension(String),

    #[error("Unsupported config file format: {0}")]
    UnsupportedFormat(String),

    #[error("Failed to load configuration: {0}")]
    Extract(#[from] Box<figment::Error>),
}

fn file_figment(path: &Path) -> Result<Figment, ConfigLoadError> {
    if !path.exists() {
        return Err(ConfigLoadError::FileNotFound(path.display().to_string()));
    }

    let extension = path
        .extension()
        .and_then(|s| s.to_str())
        .ok_or_else(|| ConfigLoadError::MissingExtension(path.display().to_string()))?;

    let figment = match extension {
        "toml" => Figment::new().merge(Toml::file(path)),
        "yaml" | "yml" => Figment::new().merge(Yaml::file(path)),
        "json" => Figment::new().merge(Json::file(path)),
        other => return Err(ConfigLoadError::UnsupportedFormat(other.to_string())),
    };

    debug!("Config provider selected for {} ({})", path.display(), extension);
    Ok(figment)
}

/// Load configuration from a single file
pub fn load_config_from_file<T, P>(path: P) -> Result<T, ConfigLoadError>
where
    T: for<'de> Deserialize<'de>,
    P: AsRef<Path>,
{
    let path = path.as_ref();
    let config = file_figment(path)?.extract().map_err(Box::new)?;
    info!("Loaded configuration from {}", path.display());
    Ok(config)
}

/// Load configuration from a file, then apply environment overrides
///
/// Priority (highest to lowest):
/// 1. Environment variables named `{env_prefix}_{KEY}`
/// 2. The configuration file
pub fn load_layered_config<T, P>(path: P, env_prefix: &str) -> Result<T, ConfigLoadError>
where
    T: for<'de> Deserialize<'de>,
    P: AsRef<Path>,
{
    let path = path.as_ref();
    let prefix = format!("{}_", env_prefix.to_uppercase());
    let config = file_figment(path)?
        .merge(Env::prefixed(&prefix).split("__"))
        .extract()
        .map_err(Box::new)?;
    info!(
        "Loaded configuration from {} with {}* overrides",
        path.display(),
        prefix
    );
    Ok(config)
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;
    use serde::Deserialize;
    use tempfile::TempDir;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Endpoint {
        host: String,
        port: u16,
    }

    #[derive(Debug, Deserialize, PartialEq)]
    struct TestConfig {
        name: String,
        endpoint: Endpoint,
    }

    fn expected() -> TestConfig {
        TestConfig {
            name: "station".to_string(),
            endpoint: Endpoint {
                host: "127.0.0.1".to_string(),
                port: 20000,
            },
        }
    }

    #[test]
    fn test_load_yaml() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(
            &path,
            "name: station\nendpoint:\n  host: 127.0.0.1\n  port: 20000\n",
        )
        .unwrap();

        let config: TestConfig = load_config_from_file(&path).unwrap();
        assert_eq!(config, expected());
    }

    #[test]
    fn test_load_toml() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            "name = \"station\"\n[endpoint]\nhost = \"127.0.0.1\"\nport = 20000\n",
        )
        .unwrap();

        let config: TestConfig = load_config_from_file(&path).unwrap();
        assert_eq!(config, expected());
    }

    #[test]
    fn test_load_json() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(
            &path,
            r#"{"name":"station","endpoint":{"host":"127.0.0.1","port":20000}}"#,
        )
        .unwrap();

        let config: TestConfig = load_config_from_file(&path).unwrap();
        assert_eq!(config, expected());
    }

    #[test]
    fn test_missing_file() {
        let dir = TempDir::new().unwrap();
        let result: Result<TestConfig, _> = load_config_from_file(dir.path().join("nope.yaml"));
        assert!(matches!(result, Err(ConfigLoadError::FileNotFound(_))));
    }

    #[test]
    fn test_unsupported_extension() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.ini");
        std::fs::write(&path, "name=station").unwrap();

        let result: Result<TestConfig, _> = load_config_from_file(&path);
        assert!(matches!(result, Err(ConfigLoadError::UnsupportedFormat(ext)) if ext == "ini"));
    }

    #[test]
    fn test_missing_extension() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config");
        std::fs::write(&path, "name: station").unwrap();

        let result: Result<TestConfig, _> = load_config_from_file(&path);
        assert!(matches!(result, Err(ConfigLoadError::MissingExtension(_))));
    }

    #[test]
    fn test_extract_error_reports_missing_field() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(&path, "name: station\n").unwrap();

        let result: Result<TestConfig, _> = load_config_from_file(&path);
        let err = result.unwrap_err();
        assert!(matches!(err, ConfigLoadError::Extract(_)));
        assert!(err.to_string().contains("endpoint"));
    }

    #[test]
    fn test_layered_env_override() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(
            &path,
            "name: station\nendpoint:\n  host: 127.0.0.1\n  port: 20000\n",
        )
        .unwrap();

        // Unique prefix keeps this test independent of the process environment
        std::env::set_var("CFGLOADERTEST_ENDPOINT__PORT", "20001");
        let config: TestConfig = load_layered_config(&path, "cfgloadertest").unwrap();
        std::env::remove_var("CFGLOADERTEST_ENDPOINT__PORT");

        assert_eq!(config.endpoint.port, 20001);
        assert_eq!(config.endpoint.host, "127.0.0.1");
    }
}
