//! Configuration loader for mneme.
//!
//! Reads `config.toml` from the data directory (`~/.mneme/` by default) into
//! [`MnemeConfig`]. A missing or malformed file yields the defaults.

use std::path::{Path, PathBuf};

use mneme_types::config::MnemeConfig;

pub const CONFIG_FILE: &str = "config.toml";

/// Load configuration from `{data_dir}/config.toml`.
///
/// - Missing file: defaults.
/// - Unreadable or unparseable file: logs a warning, defaults.
pub async fn load_config(data_dir: &Path) -> MnemeConfig {
    let config_path = data_dir.join(CONFIG_FILE);

    let content = match tokio::fs::read_to_string(&config_path).await {
        Ok(content) => content,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!("No config.toml found at {}, using defaults", config_path.display());
            return MnemeConfig::default();
        }
        Err(err) => {
            tracing::warn!("Failed to read {}: {err}, using defaults", config_path.display());
            return MnemeConfig::default();
        }
    };

    match toml::from_str::<MnemeConfig>(&content) {
        Ok(config) => config,
        Err(err) => {
            tracing::warn!(
                "Failed to parse {}: {err}, using defaults",
                config_path.display()
            );
            MnemeConfig::default()
        }
    }
}

/// Resolve the data directory.
///
/// Priority:
/// 1. `MNEME_DATA_DIR` environment variable
/// 2. `~/.mneme`
pub fn resolve_data_dir() -> PathBuf {
    if let Ok(dir) = std::env::var("MNEME_DATA_DIR") {
        return PathBuf::from(dir);
    }

    if let Some(home) = dirs::home_dir() {
        return home.join(".mneme");
    }

    PathBuf::from(".mneme")
}

/// Root of the local blob store: the configured path or `{data_dir}/blobs`.
pub fn blob_root(config: &MnemeConfig, data_dir: &Path) -> PathBuf {
    config
        .blob
        .root
        .clone()
        .unwrap_or_else(|| data_dir.join("blobs"))
}

/// Embedding model cache: the configured path or `{data_dir}/models`.
pub fn model_cache_dir(config: &MnemeConfig, data_dir: &Path) -> PathBuf {
    config
        .embedding
        .cache_dir
        .clone()
        .unwrap_or_else(|| data_dir.join("models"))
}
