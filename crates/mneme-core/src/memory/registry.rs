//! Per-conversation index partitions.
//!
//! Each conversation owns one `VectorIndex`, created lazily on its first add
//! with the dimension of that first vector. Partitions are wrapped in their
//! own `RwLock` so adds to one conversation never serialize searches in
//! another. Never hold a `DashMap` guard across an await: clone the `Arc`
//! out and drop the guard first.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::RwLock;

use mneme_types::conversation::ConversationId;
use mneme_types::error::IndexError;
use mneme_types::memory::{Embedding, InternalId, SearchHit};

use super::index::VectorIndex;

pub struct IndexRegistry<I: VectorIndex> {
    partitions: DashMap<ConversationId, Arc<RwLock<I>>>,
}

impl<I: VectorIndex> IndexRegistry<I> {
    pub fn new() -> Self {
        Self {
            partitions: DashMap::new(),
        }
    }

    fn partition(&self, conversation_id: &ConversationId) -> Option<Arc<RwLock<I>>> {
        self.partitions
            .get(conversation_id)
            .map(|entry| Arc::clone(entry.value()))
    }

    /// Add `embedding` under `id` to the conversation's partition, creating it
    /// on first use.
    pub async fn add(
        &self,
        conversation_id: ConversationId,
        id: InternalId,
        embedding: &Embedding,
    ) -> Result<(), IndexError> {
        if embedding.dimension() == 0 {
            return Err(IndexError::EmptyVector);
        }

        let partition = {
            let entry = self
                .partitions
                .entry(conversation_id)
                .or_try_insert_with(|| {
                    tracing::debug!(
                        conversation_id = %conversation_id,
                        dimension = embedding.dimension(),
                        "creating index partition"
                    );
                    I::with_dimension(embedding.dimension()).map(|i| Arc::new(RwLock::new(i)))
                })?;
            Arc::clone(entry.value())
        };

        let mut index = partition.write().await;
        index.add(id, embedding.as_slice())
    }

    /// Nearest neighbors within one conversation.
    ///
    /// Fails with `IndexError::NotFound` when the conversation was never indexed.
    pub async fn search(
        &self,
        conversation_id: &ConversationId,
        query: &Embedding,
        top_k: usize,
    ) -> Result<Vec<SearchHit>, IndexError> {
        let partition = self
            .partition(conversation_id)
            .ok_or(IndexError::NotFound(*conversation_id))?;
        let index = partition.read().await;
        index.search(query.as_slice(), top_k)
    }

    pub fn contains_partition(&self, conversation_id: &ConversationId) -> bool {
        self.partitions.contains_key(conversation_id)
    }

    /// Conversation ids with a partition, ascending.
    pub fn partition_ids(&self) -> Vec<ConversationId> {
        let mut ids: Vec<ConversationId> = self.partitions.iter().map(|e| *e.key()).collect();
        ids.sort();
        ids
    }

    /// Internal ids present in one partition, ascending. Empty when absent.
    pub async fn ids_of(&self, conversation_id: &ConversationId) -> Vec<InternalId> {
        match self.partition(conversation_id) {
            Some(partition) => partition.read().await.ids(),
            None => Vec::new(),
        }
    }

    pub async fn dimension_of(&self, conversation_id: &ConversationId) -> Option<usize> {
        match self.partition(conversation_id) {
            Some(partition) => Some(partition.read().await.dimension()),
            None => None,
        }
    }

    /// Serialize every partition, ordered by conversation id.
    pub async fn export_all(&self) -> Result<Vec<(ConversationId, Vec<u8>)>, IndexError> {
        let mut out = Vec::new();
        for conversation_id in self.partition_ids() {
            let Some(partition) = self.partition(&conversation_id) else {
                continue;
            };
            let bytes = partition.read().await.export()?;
            out.push((conversation_id, bytes));
        }
        Ok(out)
    }

    /// Install or overwrite a single partition.
    pub fn insert_partition(&self, conversation_id: ConversationId, index: I) {
        self.partitions
            .insert(conversation_id, Arc::new(RwLock::new(index)));
    }

    /// Swap in a complete set of partitions. Conversations absent from
    /// `partitions` lose their in-memory index.
    pub fn replace_all(&self, partitions: Vec<(ConversationId, I)>) {
        self.partitions.clear();
        for (conversation_id, index) in partitions {
            self.insert_partition(conversation_id, index);
        }
    }
}

impl<I: VectorIndex> Default for IndexRegistry<I> {
    fn default() -> Self {
        Self::new()
    }
}
