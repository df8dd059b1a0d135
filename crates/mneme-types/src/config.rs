//! Configuration types for mneme.
//!
//! `MnemeConfig` represents the top-level `config.toml` in the data directory.
//! Every field has a default so an empty or partial file is valid.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MnemeConfig {
    #[serde(default)]
    pub retrieval: RetrievalConfig,

    #[serde(default)]
    pub snapshot: SnapshotConfig,

    #[serde(default)]
    pub embedding: EmbeddingConfig,

    #[serde(default)]
    pub blob: BlobConfig,
}

/// Retrieval defaults applied by the service layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalConfig {
    /// Number of similar memories returned when the caller passes `top_k = 0`.
    #[serde(default = "default_top_k")]
    pub default_top_k: usize,

    /// Number of most recent memories returned alongside similar ones.
    #[serde(default = "default_recency_window")]
    pub recency_window: usize,
}

fn default_top_k() -> usize {
    10
}

fn default_recency_window() -> usize {
    10
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            default_top_k: default_top_k(),
            recency_window: default_recency_window(),
        }
    }
}

/// Snapshot bundle location and consistency policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotConfig {
    #[serde(default = "default_bucket")]
    pub bucket: String,

    /// Path prefix of the bundle inside the bucket.
    #[serde(default = "default_prefix")]
    pub prefix: String,

    /// Block new stores while a snapshot exports or a restore imports.
    ///
    /// When false, a snapshot taken under concurrent writes may hold metadata
    /// newer than some index partitions (or the reverse).
    #[serde(default = "default_true")]
    pub quiesce_writes: bool,

    /// Rehydrate from the bundle before serving.
    #[serde(default = "default_true")]
    pub restore_on_start: bool,

    /// Write a bundle when the process exits cleanly.
    #[serde(default = "default_true")]
    pub snapshot_on_exit: bool,
}

fn default_bucket() -> String {
    "mneme".to_string()
}

fn default_prefix() -> String {
    "snapshots/default".to_string()
}

fn default_true() -> bool {
    true
}

impl Default for SnapshotConfig {
    fn default() -> Self {
        Self {
            bucket: default_bucket(),
            prefix: default_prefix(),
            quiesce_writes: true,
            restore_on_start: true,
            snapshot_on_exit: true,
        }
    }
}

/// Local embedding model selection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    /// Backend: "fastembed" (local ONNX model) or "hashing" (offline, no model download).
    #[serde(default = "default_provider")]
    pub provider: String,

    /// fastembed model name (e.g. "BGESmallENV15").
    #[serde(default = "default_model")]
    pub model: String,

    #[serde(default)]
    pub show_download_progress: bool,

    /// Directory for downloaded model files. Defaults to `{data_dir}/models`.
    #[serde(default)]
    pub cache_dir: Option<PathBuf>,
}

fn default_provider() -> String {
    "fastembed".to_string()
}

fn default_model() -> String {
    "BGESmallENV15".to_string()
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: default_model(),
            show_download_progress: false,
            cache_dir: None,
        }
    }
}

/// Blob storage root for the local filesystem store.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BlobConfig {
    /// Root directory. Defaults to `{data_dir}/blobs`.
    #[serde(default)]
    pub root: Option<PathBuf>,
}
