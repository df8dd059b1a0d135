//! Snapshot coordinator: export both stores to a blob bundle and restore them.
//!
//! Store order: quiesce, export metadata and every partition, release, upload
//! the data artifacts, then upload `manifest.json` last. A prefix without a
//! manifest is never loaded. Pushes overwrite the prefix in place, so a push
//! interrupted before its manifest leaves the previous manifest next to newer
//! artifacts: partitions it does not list are ignored and their conversations
//! restore recency-only.
//!
//! Load order: download, verify the manifest, decode every listed partition,
//! then swap both stores under the quiesce window and reconcile them.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use chrono::Utc;
use tokio_util::sync::CancellationToken;

use mneme_types::conversation::ConversationId;
use mneme_types::error::SnapshotError;
use mneme_types::snapshot::{
    CONVERSATIONS_FILE, LoadOutcome, LoadReport, MANIFEST_FILE, MEMORIES_FILE, PartitionReport,
    RestoreMode, SNAPSHOT_FORMAT_VERSION, SnapshotManifest, SnapshotSummary, index_file_name,
    parse_index_file_name,
};

use super::blob::{BlobStore, NamedBlob};
use crate::memory::gate::WriteGate;
use crate::memory::index::VectorIndex;
use crate::memory::registry::IndexRegistry;
use crate::memory::store::{MetadataExport, MetadataStore};

pub struct SnapshotCoordinator<M: MetadataStore, I: VectorIndex, B: BlobStore> {
    metadata: Arc<M>,
    registry: Arc<IndexRegistry<I>>,
    blobs: Arc<B>,
    gate: Arc<WriteGate>,
    bucket: String,
    prefix: String,
}

impl<M: MetadataStore, I: VectorIndex, B: BlobStore> SnapshotCoordinator<M, I, B> {
    pub fn new(
        metadata: Arc<M>,
        registry: Arc<IndexRegistry<I>>,
        blobs: Arc<B>,
        gate: Arc<WriteGate>,
        bucket: impl Into<String>,
        prefix: impl Into<String>,
    ) -> Self {
        Self {
            metadata,
            registry,
            blobs,
            gate,
            bucket: bucket.into(),
            prefix: prefix.into().trim_matches('/').to_string(),
        }
    }

    pub fn location(&self) -> String {
        format!("{}/{}", self.bucket, self.prefix)
    }

    /// Export metadata and every partition and upload them as one bundle.
    #[tracing::instrument(
        name = "snapshot_store",
        skip(self, cancel),
        fields(location = %self.location())
    )]
    pub async fn store(
        &self,
        cancel: &CancellationToken,
    ) -> Result<SnapshotSummary, SnapshotError> {
        if cancel.is_cancelled() {
            return Err(SnapshotError::Cancelled);
        }

        let (export, partitions) = {
            let _quiesced = self.gate.quiesce().await;
            let export = self
                .metadata
                .export()
                .await
                .map_err(|e| SnapshotError::Export(format!("metadata: {e}")))?;
            let partitions = self
                .registry
                .export_all()
                .await
                .map_err(|e| SnapshotError::Export(format!("index: {e}")))?;
            (export, partitions)
        };

        if cancel.is_cancelled() {
            return Err(SnapshotError::Cancelled);
        }

        let manifest = SnapshotManifest {
            version: SNAPSHOT_FORMAT_VERSION,
            created_at: Utc::now(),
            conversation_count: export.conversation_count,
            memory_count: export.memory_count,
            partitions: partitions.iter().map(|(id, _)| *id).collect(),
        };

        let mut artifacts = Vec::with_capacity(partitions.len() + 2);
        artifacts.push(NamedBlob::new(CONVERSATIONS_FILE, export.conversations));
        artifacts.push(NamedBlob::new(MEMORIES_FILE, export.memories));
        for (conversation_id, bytes) in partitions {
            artifacts.push(NamedBlob::new(index_file_name(&conversation_id), bytes));
        }
        let mut bytes_written: u64 = artifacts.iter().map(|b| b.bytes.len() as u64).sum();

        self.blobs
            .put(&self.bucket, &self.prefix, &artifacts)
            .await
            .map_err(|e| SnapshotError::Upload(e.to_string()))?;

        let manifest_bytes = serde_json::to_vec_pretty(&manifest)
            .map_err(|e| SnapshotError::Export(format!("manifest: {e}")))?;
        bytes_written += manifest_bytes.len() as u64;
        self.blobs
            .put(
                &self.bucket,
                &self.prefix,
                &[NamedBlob::new(MANIFEST_FILE, manifest_bytes)],
            )
            .await
            .map_err(|e| SnapshotError::Upload(e.to_string()))?;

        tracing::info!(
            partitions = manifest.partitions.len(),
            memories = manifest.memory_count,
            bytes_written,
            "snapshot stored"
        );

        Ok(SnapshotSummary {
            manifest,
            bytes_written,
        })
    }

    /// Download the bundle and rehydrate the stores selected by `mode`.
    ///
    /// Loading the same bundle twice converges on the same state.
    #[tracing::instrument(
        name = "snapshot_load",
        skip(self, cancel),
        fields(location = %self.location())
    )]
    pub async fn load(
        &self,
        mode: RestoreMode,
        cancel: &CancellationToken,
    ) -> Result<LoadOutcome, SnapshotError> {
        if cancel.is_cancelled() {
            return Err(SnapshotError::Cancelled);
        }

        let mut objects = self
            .blobs
            .list_and_get(&self.bucket, &self.prefix)
            .await
            .map_err(|e| SnapshotError::Download(e.to_string()))?;

        if objects.is_empty() {
            tracing::info!("no snapshot found");
            return Ok(LoadOutcome::NoSnapshot);
        }

        let manifest = Self::read_manifest(&objects)?;
        let listed: BTreeSet<ConversationId> = manifest.partitions.iter().copied().collect();

        let mut partitions = Vec::with_capacity(listed.len());
        for (name, bytes) in &objects {
            let Some(conversation_id) = parse_index_file_name(name) else {
                continue;
            };
            if !listed.contains(&conversation_id) {
                tracing::debug!(file = %name, "ignoring index file not listed in manifest");
                continue;
            }
            let index = I::load(bytes)
                .map_err(|e| SnapshotError::Import(format!("{name}: {e}")))?;
            partitions.push((conversation_id, index));
        }
        if partitions.len() < listed.len() {
            tracing::warn!(
                listed = listed.len(),
                found = partitions.len(),
                "bundle is missing index files; affected conversations restore recency-only"
            );
        }

        let export = match mode {
            RestoreMode::Full => Some(MetadataExport {
                conversations: take_artifact(&mut objects, CONVERSATIONS_FILE)?,
                memories: take_artifact(&mut objects, MEMORIES_FILE)?,
                conversation_count: manifest.conversation_count,
                memory_count: manifest.memory_count,
            }),
            RestoreMode::IndexOnly => None,
        };

        if cancel.is_cancelled() {
            return Err(SnapshotError::Cancelled);
        }

        {
            let _quiesced = self.gate.quiesce().await;
            match export {
                Some(export) => {
                    self.metadata
                        .import(&export)
                        .await
                        .map_err(|e| SnapshotError::Import(format!("metadata: {e}")))?;
                    self.registry.replace_all(partitions);
                }
                None => {
                    for (conversation_id, index) in partitions {
                        self.registry.insert_partition(conversation_id, index);
                    }
                }
            }
        }

        let report = self.reconcile(mode, manifest).await?;
        tracing::info!(
            mode = ?report.mode,
            partitions = report.partitions.len(),
            recency_only = report.recency_only.len(),
            "snapshot loaded"
        );
        Ok(LoadOutcome::Restored(report))
    }

    fn read_manifest(
        objects: &BTreeMap<String, Vec<u8>>,
    ) -> Result<SnapshotManifest, SnapshotError> {
        let bytes = objects
            .get(MANIFEST_FILE)
            .ok_or_else(|| SnapshotError::MissingArtifact(MANIFEST_FILE.to_string()))?;
        let manifest: SnapshotManifest = serde_json::from_slice(bytes)
            .map_err(|e| SnapshotError::Import(format!("manifest: {e}")))?;
        if manifest.version != SNAPSHOT_FORMAT_VERSION {
            return Err(SnapshotError::UnsupportedVersion(manifest.version));
        }
        Ok(manifest)
    }

    /// Compare every conversation's stored rows against its partition.
    async fn reconcile(
        &self,
        mode: RestoreMode,
        manifest: SnapshotManifest,
    ) -> Result<LoadReport, SnapshotError> {
        let with_rows = self
            .metadata
            .conversations_with_memories()
            .await
            .map_err(|e| SnapshotError::Import(format!("reconcile: {e}")))?;

        let conversations: BTreeSet<ConversationId> = with_rows
            .into_iter()
            .chain(self.registry.partition_ids())
            .collect();

        let mut partitions = Vec::new();
        let mut recency_only = Vec::new();

        for conversation_id in conversations {
            let stored: BTreeSet<_> = self
                .metadata
                .memory_ids(&conversation_id)
                .await
                .map_err(|e| SnapshotError::Import(format!("reconcile: {e}")))?
                .into_iter()
                .collect();
            let indexed: BTreeSet<_> = self
                .registry
                .ids_of(&conversation_id)
                .await
                .into_iter()
                .collect();

            if !self.registry.contains_partition(&conversation_id) {
                recency_only.push(conversation_id);
            }

            let report = PartitionReport {
                vectors: indexed.len(),
                orphan_vectors: indexed.difference(&stored).copied().collect(),
                unindexed_rows: stored.difference(&indexed).copied().collect(),
            };
            if !report.orphan_vectors.is_empty() {
                tracing::warn!(
                    conversation_id = %conversation_id,
                    count = report.orphan_vectors.len(),
                    "index entries without metadata rows; they are skipped at retrieval"
                );
            }
            if !report.unindexed_rows.is_empty() {
                tracing::warn!(
                    conversation_id = %conversation_id,
                    count = report.unindexed_rows.len(),
                    "metadata rows without index entries; recency-only until re-indexed"
                );
            }
            partitions.push((conversation_id, report));
        }

        Ok(LoadReport {
            mode,
            manifest,
            partitions,
            recency_only,
        })
    }
}

fn take_artifact(
    objects: &mut BTreeMap<String, Vec<u8>>,
    name: &str,
) -> Result<Vec<u8>, SnapshotError> {
    objects
        .remove(name)
        .ok_or_else(|| SnapshotError::MissingArtifact(name.to_string()))
}
