//! In-memory collaborators shared by the core test modules.

use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};

use mneme_types::conversation::{Conversation, ConversationId};
use mneme_types::error::{BlobStoreError, EmbeddingError, IndexError, RepositoryError};
use mneme_types::memory::{Embedding, InternalId, Memory, NewMemory, SearchHit};

use crate::memory::embedder::Embedder;
use crate::memory::index::VectorIndex;
use crate::memory::store::{ConversationRepository, MetadataExport, MetadataStore};
use crate::snapshot::blob::{BlobStore, NamedBlob};

pub const VOCABULARY: [&str; 8] = [
    "password", "email", "reset", "change", "forgot", "settings", "weather", "rust",
];

/// Bag-of-words embedder over a fixed vocabulary, L2-normalized.
pub struct KeywordEmbedder {
    extra_dims: usize,
    fail: AtomicBool,
}

impl KeywordEmbedder {
    pub fn new() -> Self {
        Self {
            extra_dims: 0,
            fail: AtomicBool::new(false),
        }
    }

    /// Same vocabulary, padded with zero dimensions.
    pub fn padded(extra_dims: usize) -> Self {
        Self {
            extra_dims,
            fail: AtomicBool::new(false),
        }
    }

    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub fn vectorize(&self, text: &str) -> Vec<f32> {
        let mut v = vec![0.0f32; VOCABULARY.len() + self.extra_dims];
        for token in text
            .to_lowercase()
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
        {
            if let Some(pos) = VOCABULARY.iter().position(|w| *w == token) {
                v[pos] += 1.0;
            }
        }
        let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for x in &mut v {
                *x /= norm;
            }
        }
        v
    }
}

impl Embedder for KeywordEmbedder {
    async fn embed_one(&self, text: &str) -> Result<Embedding, EmbeddingError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(EmbeddingError::Provider("simulated outage".to_string()));
        }
        Ok(Embedding::from(self.vectorize(text)))
    }

    async fn embed_many(&self, texts: &[String]) -> Result<Vec<Embedding>, EmbeddingError> {
        let mut out = Vec::with_capacity(texts.len());
        for text in texts {
            out.push(self.embed_one(text).await?);
        }
        Ok(out)
    }

    fn model_name(&self) -> &str {
        "keyword"
    }
}

#[derive(Default)]
pub struct InMemoryMetadataStore {
    rows: Mutex<Vec<Memory>>,
    next_id: AtomicI64,
    fail_inserts: AtomicBool,
}

impl InMemoryMetadataStore {
    pub fn new() -> Self {
        Self {
            rows: Mutex::new(Vec::new()),
            next_id: AtomicI64::new(1),
            fail_inserts: AtomicBool::new(false),
        }
    }

    pub fn set_failing(&self, fail: bool) {
        self.fail_inserts.store(fail, Ordering::SeqCst);
    }

    pub fn row_count(&self) -> usize {
        self.rows.lock().unwrap().len()
    }

    /// Remove a row behind the engine's back to simulate a lost metadata write.
    pub fn remove(&self, id: InternalId) {
        self.rows.lock().unwrap().retain(|m| m.internal_id != id);
    }
}

impl MetadataStore for InMemoryMetadataStore {
    async fn insert_one(&self, memory: &NewMemory) -> Result<InternalId, RepositoryError> {
        if self.fail_inserts.load(Ordering::SeqCst) {
            return Err(RepositoryError::Connection);
        }
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.rows.lock().unwrap().push(Memory {
            internal_id: id,
            external_id: memory.external_id,
            conversation_id: memory.conversation_id,
            query: memory.query.clone(),
            response: memory.response.clone(),
            created_at: memory.created_at,
        });
        // Let other tasks run between the insert and the caller's index add.
        tokio::task::yield_now().await;
        Ok(id)
    }

    async fn fetch_many(&self, ids: &[InternalId]) -> Result<Vec<Memory>, RepositoryError> {
        // Reverse order on purpose: callers must not rely on fetch order.
        let rows = self.rows.lock().unwrap();
        Ok(rows
            .iter()
            .rev()
            .filter(|m| ids.contains(&m.internal_id))
            .cloned()
            .collect())
    }

    async fn fetch_by_conversation(
        &self,
        conversation_id: &ConversationId,
        limit: usize,
    ) -> Result<Vec<Memory>, RepositoryError> {
        let rows = self.rows.lock().unwrap();
        let mut matching: Vec<Memory> = rows
            .iter()
            .filter(|m| m.conversation_id == *conversation_id)
            .cloned()
            .collect();
        matching.sort_by_key(|m| (m.created_at, m.internal_id));
        let skip = matching.len().saturating_sub(limit);
        Ok(matching.into_iter().skip(skip).collect())
    }

    async fn memory_ids(
        &self,
        conversation_id: &ConversationId,
    ) -> Result<Vec<InternalId>, RepositoryError> {
        let rows = self.rows.lock().unwrap();
        Ok(rows
            .iter()
            .filter(|m| m.conversation_id == *conversation_id)
            .map(|m| m.internal_id)
            .collect())
    }

    async fn conversations_with_memories(&self) -> Result<Vec<ConversationId>, RepositoryError> {
        let rows = self.rows.lock().unwrap();
        let mut ids: Vec<ConversationId> = rows.iter().map(|m| m.conversation_id).collect();
        ids.sort();
        ids.dedup();
        Ok(ids)
    }

    async fn count(&self) -> Result<u64, RepositoryError> {
        Ok(self.rows.lock().unwrap().len() as u64)
    }

    async fn export(&self) -> Result<MetadataExport, RepositoryError> {
        let rows = self.rows.lock().unwrap().clone();
        let memories =
            serde_json::to_vec(&rows).map_err(|e| RepositoryError::Query(e.to_string()))?;
        Ok(MetadataExport {
            conversations: b"[]".to_vec(),
            memories,
            conversation_count: 0,
            memory_count: rows.len() as u64,
        })
    }

    async fn import(&self, export: &MetadataExport) -> Result<(), RepositoryError> {
        let rows: Vec<Memory> = serde_json::from_slice(&export.memories)
            .map_err(|e| RepositoryError::Query(e.to_string()))?;
        let max = rows.iter().map(|m| m.internal_id).max().unwrap_or(0);
        self.next_id.fetch_max(max + 1, Ordering::SeqCst);
        *self.rows.lock().unwrap() = rows;
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryConversations {
    conversations: Mutex<HashMap<ConversationId, Conversation>>,
}

impl ConversationRepository for InMemoryConversations {
    async fn create(&self, conversation: &Conversation) -> Result<(), RepositoryError> {
        let mut map = self.conversations.lock().unwrap();
        if map.contains_key(&conversation.id) {
            return Err(RepositoryError::Conflict(conversation.id.to_string()));
        }
        map.insert(conversation.id, conversation.clone());
        Ok(())
    }

    async fn get(&self, id: &ConversationId) -> Result<Option<Conversation>, RepositoryError> {
        Ok(self.conversations.lock().unwrap().get(id).cloned())
    }

    async fn exists(&self, id: &ConversationId) -> Result<bool, RepositoryError> {
        Ok(self.conversations.lock().unwrap().contains_key(id))
    }
}

/// Exact squared-L2 index serialized as JSON.
pub struct TestIndex {
    dimension: usize,
    entries: BTreeMap<InternalId, Vec<f32>>,
}

impl VectorIndex for TestIndex {
    fn with_dimension(dimension: usize) -> Result<Self, IndexError> {
        if dimension == 0 {
            return Err(IndexError::EmptyVector);
        }
        Ok(Self {
            dimension,
            entries: BTreeMap::new(),
        })
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn len(&self) -> usize {
        self.entries.len()
    }

    fn contains(&self, id: InternalId) -> bool {
        self.entries.contains_key(&id)
    }

    fn ids(&self) -> Vec<InternalId> {
        self.entries.keys().copied().collect()
    }

    fn add(&mut self, id: InternalId, vector: &[f32]) -> Result<(), IndexError> {
        if vector.len() != self.dimension {
            return Err(IndexError::DimensionMismatch {
                expected: self.dimension,
                actual: vector.len(),
            });
        }
        if self.entries.contains_key(&id) {
            return Err(IndexError::DuplicateId(id));
        }
        self.entries.insert(id, vector.to_vec());
        Ok(())
    }

    fn search(&self, query: &[f32], top_k: usize) -> Result<Vec<SearchHit>, IndexError> {
        if query.len() != self.dimension {
            return Err(IndexError::DimensionMismatch {
                expected: self.dimension,
                actual: query.len(),
            });
        }
        let mut hits: Vec<SearchHit> = self
            .entries
            .iter()
            .map(|(id, v)| SearchHit {
                id: *id,
                distance: v.iter().zip(query).map(|(a, b)| (a - b) * (a - b)).sum(),
            })
            .collect();
        hits.sort_by(|a, b| a.distance.total_cmp(&b.distance).then(a.id.cmp(&b.id)));
        hits.truncate(top_k);
        Ok(hits)
    }

    fn export(&self) -> Result<Vec<u8>, IndexError> {
        let entries: Vec<(InternalId, Vec<f32>)> =
            self.entries.iter().map(|(k, v)| (*k, v.clone())).collect();
        serde_json::to_vec(&(self.dimension, entries)).map_err(|e| IndexError::Codec(e.to_string()))
    }

    fn load(bytes: &[u8]) -> Result<Self, IndexError> {
        let (dimension, entries): (usize, Vec<(InternalId, Vec<f32>)>) =
            serde_json::from_slice(bytes).map_err(|e| IndexError::Codec(e.to_string()))?;
        Ok(Self {
            dimension,
            entries: entries.into_iter().collect(),
        })
    }
}

/// Index whose adds always fail, to drive the degraded store path.
pub struct RejectingIndex(TestIndex);

impl VectorIndex for RejectingIndex {
    fn with_dimension(dimension: usize) -> Result<Self, IndexError> {
        TestIndex::with_dimension(dimension).map(Self)
    }

    fn dimension(&self) -> usize {
        self.0.dimension()
    }

    fn len(&self) -> usize {
        self.0.len()
    }

    fn contains(&self, id: InternalId) -> bool {
        self.0.contains(id)
    }

    fn ids(&self) -> Vec<InternalId> {
        self.0.ids()
    }

    fn add(&mut self, _id: InternalId, _vector: &[f32]) -> Result<(), IndexError> {
        Err(IndexError::Codec("simulated index failure".to_string()))
    }

    fn search(&self, query: &[f32], top_k: usize) -> Result<Vec<SearchHit>, IndexError> {
        self.0.search(query, top_k)
    }

    fn export(&self) -> Result<Vec<u8>, IndexError> {
        self.0.export()
    }

    fn load(bytes: &[u8]) -> Result<Self, IndexError> {
        TestIndex::load(bytes).map(Self)
    }
}

#[derive(Default)]
pub struct InMemoryBlobStore {
    objects: Mutex<BTreeMap<(String, String), Vec<u8>>>,
    fail_puts: AtomicBool,
}

impl InMemoryBlobStore {
    pub fn set_failing(&self, fail: bool) {
        self.fail_puts.store(fail, Ordering::SeqCst);
    }

    pub fn object_names(&self, bucket: &str) -> Vec<String> {
        self.objects
            .lock()
            .unwrap()
            .keys()
            .filter(|(b, _)| b == bucket)
            .map(|(_, k)| k.clone())
            .collect()
    }

    pub fn remove(&self, bucket: &str, key: &str) {
        self.objects
            .lock()
            .unwrap()
            .remove(&(bucket.to_string(), key.to_string()));
    }
}

impl BlobStore for InMemoryBlobStore {
    async fn put(
        &self,
        bucket: &str,
        path: &str,
        blobs: &[NamedBlob],
    ) -> Result<(), BlobStoreError> {
        if self.fail_puts.load(Ordering::SeqCst) {
            return Err(BlobStoreError::Io("simulated upload failure".to_string()));
        }
        let mut objects = self.objects.lock().unwrap();
        for blob in blobs {
            objects.insert(
                (bucket.to_string(), format!("{path}/{}", blob.name)),
                blob.bytes.clone(),
            );
        }
        Ok(())
    }

    async fn list_and_get(
        &self,
        bucket: &str,
        prefix: &str,
    ) -> Result<BTreeMap<String, Vec<u8>>, BlobStoreError> {
        let lead = format!("{prefix}/");
        let objects = self.objects.lock().unwrap();
        Ok(objects
            .iter()
            .filter(|((b, _), _)| b == bucket)
            .filter_map(|((_, key), bytes)| {
                key.strip_prefix(&lead)
                    .map(|rel| (rel.to_string(), bytes.clone()))
            })
            .collect())
    }
}
