//! Process-wide settings resolved before any command runs.

use std::path::PathBuf;

use anyhow::Context;
use waystone_infra::config::{data_dir, load_engine_config, resolve_database_url};
use waystone_infra::sqlite::checkpoint::SqliteCheckpointStore;
use waystone_infra::sqlite::pool::DatabasePool;
use waystone_types::config::EngineConfig;

/// Data directory, engine configuration and storage location.
#[derive(Debug, Clone)]
pub struct AppState {
    pub data_dir: PathBuf,
    pub config: EngineConfig,
    pub database_url: String,
}

impl AppState {
    /// Resolve the data directory and load `config.toml` from it.
    pub async fn init() -> anyhow::Result<Self> {
        let data_dir = data_dir();

        // Ensure data directory exists
        tokio::fs::create_dir_all(&data_dir)
            .await
            .with_context(|| format!("failed to create data directory {}", data_dir.display()))?;

        let config = load_engine_config(&data_dir).await;
        let database_url = resolve_database_url(&config, &data_dir);
        tracing::debug!(data_dir = %data_dir.display(), %database_url, "resolved application state");

        Ok(Self {
            data_dir,
            config,
            database_url,
        })
    }

    /// Open the SQLite checkpoint store, running migrations.
    pub async fn open_sqlite_store(&self) -> anyhow::Result<SqliteCheckpointStore> {
        let pool = DatabasePool::new(&self.database_url)
            .await
            .with_context(|| format!("failed to open checkpoint database {}", self.database_url))?;
        Ok(SqliteCheckpointStore::new(pool))
    }
}
