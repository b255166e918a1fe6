//! Global configuration loader for booktutor.
//!
//! Reads `config.toml` from the data directory (`~/.booktutor/` in production)
//! and deserializes it into [`GlobalConfig`]. Falls back to defaults when the
//! file is missing or malformed.

use std::path::{Path, PathBuf};

use booktutor_types::config::{GlobalConfig, ProviderConfig};

/// Resolve the data directory.
///
/// Priority: `BOOKTUTOR_DATA_DIR`, then `~/.booktutor`, then `./.booktutor`.
pub fn resolve_data_dir() -> PathBuf {
    if let Ok(dir) = std::env::var("BOOKTUTOR_DATA_DIR") {
        return PathBuf::from(dir);
    }

    if let Some(home) = dirs::home_dir() {
        return home.join(".booktutor");
    }

    PathBuf::from(".booktutor")
}

/// Load global configuration from `{data_dir}/config.toml`.
///
/// - Missing file: [`GlobalConfig::default()`].
/// - Unreadable or unparseable file: a warning and the default.
pub async fn load_global_config(data_dir: &Path) -> GlobalConfig {
    let config_path = data_dir.join("config.toml");

    let content = match tokio::fs::read_to_string(&config_path).await {
        Ok(content) => content,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!("No config.toml found at {}, using defaults", config_path.display());
            return GlobalConfig::default();
        }
        Err(err) => {
            tracing::warn!("Failed to read {}: {err}, using defaults", config_path.display());
            return GlobalConfig::default();
        }
    };

    match toml::from_str::<GlobalConfig>(&content) {
        Ok(config) => config,
        Err(err) => {
            tracing::warn!(
                "Failed to parse {}: {err}, using defaults",
                config_path.display()
            );
            GlobalConfig::default()
        }
    }
}

/// Read the provider API key from the environment variable the config names.
///
/// Empty values count as unset.
pub fn resolve_api_key(provider: &ProviderConfig) -> Option<String> {
    std::env::var(&provider.api_key_env)
        .ok()
        .filter(|key| !key.trim().is_empty())
}
