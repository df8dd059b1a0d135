//! Semantic memory engine.
//!
//! Orchestrates the embedder, the metadata store and the index registry.
//! Writes go metadata first, index second: a failed index add leaves a row
//! that is retrievable by recency and is queued for re-indexing, while a
//! failed metadata insert never produces an orphan vector.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use dashmap::DashMap;
use tokio_util::sync::CancellationToken;

use mneme_types::conversation::ConversationId;
use mneme_types::error::{EmbeddingError, IndexError, MemoryError};
use mneme_types::memory::{
    Embedding, InternalId, Memory, NewMemory, RankedMemory, SearchHit, StoredMemory,
};
use mneme_types::snapshot::LoadReport;

use super::embedder::Embedder;
use super::gate::WriteGate;
use super::index::VectorIndex;
use super::registry::IndexRegistry;
use super::store::MetadataStore;

/// Store/retrieve orchestration over one metadata store and one registry.
pub struct SemanticMemoryEngine<M: MetadataStore, E: Embedder, I: VectorIndex> {
    metadata: Arc<M>,
    embedder: Arc<E>,
    registry: Arc<IndexRegistry<I>>,
    gate: Arc<WriteGate>,
    pending: DashMap<ConversationId, BTreeSet<InternalId>>,
}

impl<M: MetadataStore, E: Embedder, I: VectorIndex> SemanticMemoryEngine<M, E, I> {
    pub fn new(
        metadata: Arc<M>,
        embedder: Arc<E>,
        registry: Arc<IndexRegistry<I>>,
        gate: Arc<WriteGate>,
    ) -> Self {
        Self {
            metadata,
            embedder,
            registry,
            gate,
            pending: DashMap::new(),
        }
    }

    pub fn registry(&self) -> &Arc<IndexRegistry<I>> {
        &self.registry
    }

    pub fn metadata(&self) -> &Arc<M> {
        &self.metadata
    }

    pub fn embedder(&self) -> &Arc<E> {
        &self.embedder
    }

    /// Embed `query`, persist the turn, then index it.
    ///
    /// Cancellation is honored up to the metadata insert. Once the row is
    /// written the index add always runs; if it fails the row stays
    /// recency-only and is queued for [`Self::reindex_pending`].
    #[tracing::instrument(
        name = "memory_store",
        skip(self, query, response, cancel),
        fields(conversation_id = %conversation_id)
    )]
    pub async fn store(
        &self,
        conversation_id: ConversationId,
        query: &str,
        response: &str,
        cancel: &CancellationToken,
    ) -> Result<StoredMemory, MemoryError> {
        if query.trim().is_empty() {
            return Err(MemoryError::Validation("query cannot be empty".to_string()));
        }
        if response.trim().is_empty() {
            return Err(MemoryError::Validation(
                "response cannot be empty".to_string(),
            ));
        }

        let embedding = self
            .embed_cancellable(query, cancel, "store: embed query")
            .await?;

        // Reject a mismatched vector before anything is written.
        if let Some(expected) = self.registry.dimension_of(&conversation_id).await {
            if expected != embedding.dimension() {
                return Err(MemoryError::DimensionMismatch {
                    conversation_id,
                    expected,
                    actual: embedding.dimension(),
                });
            }
        }

        if cancel.is_cancelled() {
            return Err(MemoryError::Cancelled);
        }

        let _permit = self.gate.enter().await;

        let new_memory = NewMemory::new(conversation_id, query, response);
        let internal_id = self
            .metadata
            .insert_one(&new_memory)
            .await
            .map_err(|e| {
                MemoryError::storage(format!("store: insert memory for {conversation_id}"), e)
            })?;

        if let Err(e) = self
            .registry
            .add(conversation_id, internal_id, &embedding)
            .await
        {
            tracing::warn!(
                conversation_id = %conversation_id,
                internal_id,
                error = %e,
                "index add failed after metadata insert; memory is recency-only until re-indexed"
            );
            self.mark_unindexed(conversation_id, [internal_id]);
            return Err(MemoryError::index(
                conversation_id,
                format!("store: add vector {internal_id}"),
                e,
            ));
        }

        tracing::debug!(internal_id, "memory stored and indexed");
        Ok(StoredMemory {
            internal_id,
            external_id: new_memory.external_id,
        })
    }

    /// The `top_k` memories most similar to `query`, nearest first.
    ///
    /// Fails with `ConversationNotIndexed` when the conversation has no
    /// partition; an indexed conversation with no close matches still yields
    /// its nearest entries.
    #[tracing::instrument(
        name = "memory_retrieve",
        skip(self, query, cancel),
        fields(conversation_id = %conversation_id)
    )]
    pub async fn retrieve(
        &self,
        conversation_id: ConversationId,
        query: &str,
        top_k: usize,
        cancel: &CancellationToken,
    ) -> Result<Vec<RankedMemory>, MemoryError> {
        if query.trim().is_empty() {
            return Err(MemoryError::Validation("query cannot be empty".to_string()));
        }
        if top_k == 0 {
            return Err(MemoryError::Validation(
                "top_k must be at least 1".to_string(),
            ));
        }

        let embedding = self
            .embed_cancellable(query, cancel, "retrieve: embed query")
            .await?;

        let hits = self
            .registry
            .search(&conversation_id, &embedding, top_k)
            .await
            .map_err(|e| MemoryError::index(conversation_id, "retrieve: search", e))?;

        if hits.is_empty() {
            return Ok(Vec::new());
        }
        if cancel.is_cancelled() {
            return Err(MemoryError::Cancelled);
        }

        let ids: Vec<InternalId> = hits.iter().map(|h| h.id).collect();
        let rows = self
            .metadata
            .fetch_many(&ids)
            .await
            .map_err(|e| {
                MemoryError::storage(format!("retrieve: fetch rows for {conversation_id}"), e)
            })?;

        let ranked = rank_memories(&hits, rows, &conversation_id);
        if ranked.len() < hits.len() {
            tracing::warn!(
                hits = hits.len(),
                hydrated = ranked.len(),
                "dropped search hits with no matching metadata row"
            );
        }
        Ok(ranked)
    }

    /// The last `limit` memories of a conversation, oldest first.
    pub async fn recent(
        &self,
        conversation_id: ConversationId,
        limit: usize,
    ) -> Result<Vec<Memory>, MemoryError> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        self.metadata
            .fetch_by_conversation(&conversation_id, limit)
            .await
            .map_err(|e| MemoryError::storage(format!("recent: fetch {conversation_id}"), e))
    }

    /// Queue rows for re-indexing.
    pub fn mark_unindexed(
        &self,
        conversation_id: ConversationId,
        ids: impl IntoIterator<Item = InternalId>,
    ) {
        let mut entry = self.pending.entry(conversation_id).or_default();
        entry.extend(ids);
    }

    /// Queue every unindexed row found by a snapshot load.
    pub fn queue_from_report(&self, report: &LoadReport) {
        for (conversation_id, partition) in &report.partitions {
            if !partition.unindexed_rows.is_empty() {
                self.mark_unindexed(*conversation_id, partition.unindexed_rows.iter().copied());
            }
        }
    }

    /// Queued ids per conversation, both ascending.
    pub fn pending_reindex(&self) -> Vec<(ConversationId, Vec<InternalId>)> {
        let mut out: Vec<(ConversationId, Vec<InternalId>)> = self
            .pending
            .iter()
            .filter(|e| !e.value().is_empty())
            .map(|e| (*e.key(), e.value().iter().copied().collect()))
            .collect();
        out.sort_by_key(|(id, _)| *id);
        out
    }

    /// Queue every row of `conversation_id` whose id is absent from its partition.
    pub async fn scan_unindexed(
        &self,
        conversation_id: ConversationId,
    ) -> Result<usize, MemoryError> {
        let stored = self
            .metadata
            .memory_ids(&conversation_id)
            .await
            .map_err(|e| MemoryError::storage(format!("scan: list ids of {conversation_id}"), e))?;
        let indexed: BTreeSet<InternalId> =
            self.registry.ids_of(&conversation_id).await.into_iter().collect();
        let missing: Vec<InternalId> = stored
            .into_iter()
            .filter(|id| !indexed.contains(id))
            .collect();
        let count = missing.len();
        if count > 0 {
            self.mark_unindexed(conversation_id, missing);
        }
        Ok(count)
    }

    /// Re-embed and re-add every queued row. Returns how many were indexed.
    ///
    /// Rows that fail again stay queued; rows whose metadata has disappeared
    /// are dropped from the queue.
    #[tracing::instrument(name = "memory_reindex", skip(self, cancel))]
    pub async fn reindex_pending(&self, cancel: &CancellationToken) -> Result<usize, MemoryError> {
        let mut indexed = 0usize;

        for (conversation_id, ids) in self.pending_reindex() {
            if cancel.is_cancelled() {
                return Err(MemoryError::Cancelled);
            }

            let rows = self.metadata.fetch_many(&ids).await.map_err(|e| {
                MemoryError::storage(format!("reindex: fetch rows for {conversation_id}"), e)
            })?;
            let mut by_id: HashMap<InternalId, Memory> =
                rows.into_iter().map(|m| (m.internal_id, m)).collect();

            let vanished: Vec<InternalId> =
                ids.iter().copied().filter(|id| !by_id.contains_key(id)).collect();
            if !vanished.is_empty() {
                tracing::warn!(
                    conversation_id = %conversation_id,
                    count = vanished.len(),
                    "queued rows no longer exist; dropping from re-index queue"
                );
                self.unqueue(&conversation_id, &vanished);
            }

            let batch: Vec<Memory> = ids.iter().filter_map(|id| by_id.remove(id)).collect();
            if batch.is_empty() {
                continue;
            }
            let texts: Vec<String> = batch.iter().map(|m| m.query.clone()).collect();

            let embeddings = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(MemoryError::Cancelled),
                result = self.embedder.embed_many(&texts) => result.map_err(|e| {
                    MemoryError::embedding(format!("reindex: embed {conversation_id}"), e)
                })?,
            };
            if embeddings.len() != batch.len() {
                return Err(MemoryError::embedding(
                    format!("reindex: embed {conversation_id}"),
                    EmbeddingError::EmptyResponse,
                ));
            }

            let _permit = self.gate.enter().await;
            let mut done = Vec::with_capacity(batch.len());
            for (memory, embedding) in batch.iter().zip(&embeddings) {
                match self
                    .registry
                    .add(conversation_id, memory.internal_id, embedding)
                    .await
                {
                    Ok(()) => {
                        indexed += 1;
                        done.push(memory.internal_id);
                    }
                    Err(IndexError::DuplicateId(id)) => done.push(id),
                    Err(e) => {
                        tracing::warn!(
                            conversation_id = %conversation_id,
                            internal_id = memory.internal_id,
                            error = %e,
                            "re-index failed; keeping row queued"
                        );
                    }
                }
            }
            self.unqueue(&conversation_id, &done);
        }

        tracing::info!(indexed, "re-index pass complete");
        Ok(indexed)
    }

    fn unqueue(&self, conversation_id: &ConversationId, ids: &[InternalId]) {
        let now_empty = match self.pending.get_mut(conversation_id) {
            Some(mut entry) => {
                for id in ids {
                    entry.remove(id);
                }
                entry.is_empty()
            }
            None => false,
        };
        if now_empty {
            self.pending.remove_if(conversation_id, |_, set| set.is_empty());
        }
    }

    async fn embed_cancellable(
        &self,
        text: &str,
        cancel: &CancellationToken,
        context: &str,
    ) -> Result<Embedding, MemoryError> {
        let embedding = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(MemoryError::Cancelled),
            result = self.embedder.embed_one(text) => {
                result.map_err(|e| MemoryError::embedding(context, e))?
            }
        };
        if embedding.dimension() == 0 {
            return Err(MemoryError::embedding(context, EmbeddingError::EmptyResponse));
        }
        Ok(embedding)
    }
}

/// Hydrate search hits in rank order.
///
/// `rows` may arrive in any order. Hits with no row, or whose row belongs to a
/// different conversation, are dropped.
pub fn rank_memories(
    hits: &[SearchHit],
    rows: Vec<Memory>,
    conversation_id: &ConversationId,
) -> Vec<RankedMemory> {
    let mut by_id: HashMap<InternalId, Memory> = rows
        .into_iter()
        .filter(|m| m.conversation_id == *conversation_id)
        .map(|m| (m.internal_id, m))
        .collect();

    hits.iter()
        .filter_map(|hit| {
            by_id.remove(&hit.id).map(|memory| RankedMemory {
                memory,
                distance: hit.distance,
            })
        })
        .collect()
}
