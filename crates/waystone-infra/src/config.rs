//! Engine configuration loader for Waystone.
//!
//! Reads `config.toml` from the data directory (`~/.waystone/` in production)
//! and deserializes it into [`EngineConfig`]. Falls back to defaults when the
//! file is missing or malformed.

use std::path::{Path, PathBuf};

use waystone_types::config::EngineConfig;

/// Environment variable overriding the data directory.
pub const DATA_DIR_ENV: &str = "WAYSTONE_DATA_DIR";

/// Resolve the data directory: `WAYSTONE_DATA_DIR`, else `~/.waystone`.
pub fn data_dir() -> PathBuf {
    match std::env::var_os(DATA_DIR_ENV) {
        Some(dir) if !dir.is_empty() => PathBuf::from(dir),
        _ => dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".waystone"),
    }
}

/// Load engine configuration from `{data_dir}/config.toml`.
///
/// - If the file does not exist, returns [`EngineConfig::default()`].
/// - If the file exists but fails to parse, logs a warning and returns the default.
/// - If the file exists and parses successfully, returns the parsed config.
pub async fn load_engine_config(data_dir: &Path) -> EngineConfig {
    let config_path = data_dir.join("config.toml");

    let content = match tokio::fs::read_to_string(&config_path).await {
        Ok(content) => content,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!("No config.toml found at {}, using defaults", config_path.display());
            return EngineConfig::default();
        }
        Err(err) => {
            tracing::warn!("Failed to read {}: {err}, using defaults", config_path.display());
            return EngineConfig::default();
        }
    };

    match toml::from_str::<EngineConfig>(&content) {
        Ok(config) => config,
        Err(err) => {
            tracing::warn!(
                "Failed to parse {}: {err}, using defaults",
                config_path.display()
            );
            EngineConfig::default()
        }
    }
}

/// The SQLite URL to use: the configured one, else the data-dir default.
pub fn resolve_database_url(config: &EngineConfig, data_dir: &Path) -> String {
    config.database_url.clone().unwrap_or_else(|| {
        crate::sqlite::pool::database_url_for(&data_dir.join(crate::sqlite::pool::DATABASE_FILE))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn load_engine_config_missing_file_returns_default() {
        let tmp = TempDir::new().unwrap();
        let config = load_engine_config(tmp.path()).await;
        assert_eq!(config, EngineConfig::default());
    }

    #[tokio::test]
    async fn load_engine_config_valid_toml_returns_parsed() {
        let tmp = TempDir::new().unwrap();
        tokio::fs::write(
            tmp.path().join("config.toml"),
            r#"
default_max_retries = 5
backoff_base_ms = 10
max_backoff_ms = 1000
"#,
        )
        .await
        .unwrap();

        let config = load_engine_config(tmp.path()).await;
        assert_eq!(config.default_max_retries, 5);
        assert_eq!(config.backoff_base_ms, 10);
        assert_eq!(config.max_backoff_ms, Some(1000));
        assert_eq!(config.default_step_timeout_secs, 30);
    }

    #[tokio::test]
    async fn load_engine_config_invalid_toml_returns_default() {
        let tmp = TempDir::new().unwrap();
        tokio::fs::write(tmp.path().join("config.toml"), "this is not { valid toml !!!")
            .await
            .unwrap();

        let config = load_engine_config(tmp.path()).await;
        assert_eq!(config, EngineConfig::default());
    }

    #[test]
    fn database_url_prefers_config() {
        let tmp = TempDir::new().unwrap();
        let config = EngineConfig {
            database_url: Some("sqlite::memory:".to_string()),
            ..EngineConfig::default()
        };
        assert_eq!(resolve_database_url(&config, tmp.path()), "sqlite::memory:");

        let url = resolve_database_url(&EngineConfig::default(), tmp.path());
        assert!(url.starts_with("sqlite://"));
        assert!(url.contains("waystone.db"));
    }
}
