//! Application state: data directory, config and the SQLite store.
//!
//! The LLM provider is only built by commands that talk to the model, so
//! library and student management work without an API key.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;

use booktutor_core::session::{EngineOptions, SessionSupervisor};
use booktutor_infra::config::{load_global_config, resolve_api_key, resolve_data_dir};
use booktutor_infra::llm::create_provider;
use booktutor_infra::sqlite::{SqliteStore, pool::database_url};
use booktutor_types::config::GlobalConfig;

pub type Engine = SessionSupervisor<SqliteStore>;

pub struct AppState {
    pub data_dir: PathBuf,
    pub config: GlobalConfig,
    pub store: Arc<SqliteStore>,
}

impl AppState {
    /// Create the data directory if needed, load config and open the database.
    pub async fn init() -> anyhow::Result<Self> {
        let data_dir = resolve_data_dir();
        tokio::fs::create_dir_all(&data_dir)
            .await
            .with_context(|| format!("failed to create {}", data_dir.display()))?;

        let config = load_global_config(&data_dir).await;
        let store = SqliteStore::connect(&database_url(&data_dir))
            .await
            .context("failed to open the database")?;

        Ok(Self {
            data_dir,
            config,
            store: Arc::new(store),
        })
    }

    /// Build the tutoring engine with the configured provider.
    pub fn engine(&self) -> anyhow::Result<Engine> {
        let provider_config = &self.config.provider;
        let api_key = resolve_api_key(provider_config);
        let provider = create_provider(provider_config, api_key.as_deref()).with_context(|| {
            format!(
                "cannot reach provider '{}'; set {} or configure base_url in {}",
                provider_config.name,
                provider_config.api_key_env,
                self.data_dir.join("config.toml").display()
            )
        })?;

        Ok(SessionSupervisor::new(
            self.store.clone(),
            provider,
            EngineOptions::from_config(&self.config),
        ))
    }
}
