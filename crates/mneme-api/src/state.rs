//! Application state wiring the stores, the engine and the snapshot coordinator.
//!
//! The engine and coordinator are generic over their ports; AppState pins them
//! to the SQLite, flat-index and local-filesystem implementations and picks
//! the embedder from configuration.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, bail};
use tokio_util::sync::CancellationToken;

use mneme_core::memory::box_embedder::BoxEmbedder;
use mneme_core::memory::engine::SemanticMemoryEngine;
use mneme_core::memory::gate::WriteGate;
use mneme_core::memory::registry::IndexRegistry;
use mneme_core::memory::store::MetadataStore;
use mneme_core::service::memory::MemoryService;
use mneme_core::snapshot::coordinator::SnapshotCoordinator;
use mneme_infra::blob::local::LocalBlobStore;
use mneme_infra::config::{blob_root, load_config, model_cache_dir, resolve_data_dir};
use mneme_infra::embedding::fastembed::FastEmbedder;
use mneme_infra::embedding::hashing::HashingEmbedder;
use mneme_infra::sqlite::conversation::SqliteConversationRepository;
use mneme_infra::sqlite::memory::SqliteMetadataStore;
use mneme_infra::sqlite::pool::{DatabasePool, database_url};
use mneme_infra::vector::flat::FlatIndex;
use mneme_types::config::MnemeConfig;
use mneme_types::snapshot::{LoadOutcome, RestoreMode};

pub type ConcreteEngine = SemanticMemoryEngine<SqliteMetadataStore, BoxEmbedder, FlatIndex>;

pub type ConcreteMemoryService =
    MemoryService<SqliteConversationRepository, SqliteMetadataStore, BoxEmbedder, FlatIndex>;

pub type ConcreteSnapshotCoordinator =
    SnapshotCoordinator<SqliteMetadataStore, FlatIndex, LocalBlobStore>;

pub struct AppState {
    pub memory_service: Arc<ConcreteMemoryService>,
    pub snapshots: Arc<ConcreteSnapshotCoordinator>,
    pub config: MnemeConfig,
    pub data_dir: PathBuf,
    /// Cancelled on Ctrl+C.
    pub cancel: CancellationToken,
}

impl AppState {
    /// Open the database, build the embedder and wire the engine.
    pub async fn init(cancel: CancellationToken) -> anyhow::Result<Self> {
        let data_dir = resolve_data_dir();
        tokio::fs::create_dir_all(&data_dir)
            .await
            .with_context(|| format!("create data directory {}", data_dir.display()))?;

        let config = load_config(&data_dir).await;
        let db_pool = DatabasePool::new(&database_url(&data_dir)).await?;

        let embedder = Arc::new(build_embedder(&config, &data_dir)?);
        let metadata = Arc::new(SqliteMetadataStore::new(db_pool.clone()));
        let conversations = Arc::new(SqliteConversationRepository::new(db_pool.clone()));
        let registry = Arc::new(IndexRegistry::<FlatIndex>::new());
        let gate = Arc::new(WriteGate::new(config.snapshot.quiesce_writes));

        let engine = Arc::new(SemanticMemoryEngine::new(
            metadata.clone(),
            embedder,
            registry.clone(),
            gate.clone(),
        ));

        let snapshots = SnapshotCoordinator::new(
            metadata,
            registry,
            Arc::new(LocalBlobStore::new(blob_root(&config, &data_dir))),
            gate,
            config.snapshot.bucket.clone(),
            config.snapshot.prefix.clone(),
        );

        let memory_service =
            MemoryService::new(conversations, engine, config.retrieval.clone());

        Ok(Self {
            memory_service: Arc::new(memory_service),
            snapshots: Arc::new(snapshots),
            config,
            data_dir,
            cancel,
        })
    }

    pub fn engine(&self) -> &Arc<ConcreteEngine> {
        self.memory_service.engine()
    }

    /// Rehydrate index partitions (and metadata on a fresh database) from the
    /// configured bundle.
    ///
    /// An empty metadata store restores in full; otherwise only the index is
    /// replaced so rows written locally are kept. Unindexed rows found by the
    /// load are queued for `reindex`.
    pub async fn restore(&self) -> anyhow::Result<()> {
        if !self.config.snapshot.restore_on_start {
            tracing::debug!("restore on start disabled");
            return Ok(());
        }

        let rows = self.engine().metadata().count().await?;
        let mode = if rows == 0 {
            RestoreMode::Full
        } else {
            RestoreMode::IndexOnly
        };

        match self.snapshots.load(mode, &self.cancel).await? {
            LoadOutcome::NoSnapshot => {
                tracing::info!(location = %self.snapshots.location(), "no snapshot to restore");
            }
            LoadOutcome::Restored(report) => {
                self.engine().queue_from_report(&report);
                tracing::info!(
                    mode = ?report.mode,
                    partitions = report.manifest.partitions.len(),
                    memories = report.manifest.memory_count,
                    recency_only = report.recency_only.len(),
                    "restored from snapshot"
                );
            }
        }
        Ok(())
    }
}

fn build_embedder(config: &MnemeConfig, data_dir: &std::path::Path) -> anyhow::Result<BoxEmbedder> {
    let embedder = match config.embedding.provider.as_str() {
        "fastembed" => BoxEmbedder::new(FastEmbedder::new(
            &config.embedding.model,
            config.embedding.show_download_progress,
            Some(model_cache_dir(config, data_dir)),
        )?),
        "hashing" => BoxEmbedder::new(HashingEmbedder::default()),
        other => bail!("unknown embedding provider '{other}' (expected 'fastembed' or 'hashing')"),
    };
    Ok(embedder)
}
