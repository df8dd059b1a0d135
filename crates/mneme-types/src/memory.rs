//! Memory types for mneme.
//!
//! A memory is one query/response turn of a conversation. Memories form an
//! append-only log: they are never updated or deleted once stored.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::conversation::ConversationId;

/// Dense integer id assigned by the metadata store on insert.
///
/// This is the join key between the metadata store and the vector index.
pub type InternalId = i64;

/// A stored query/response turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Memory {
    /// Metadata-store row id, also the id of the memory's vector.
    pub internal_id: InternalId,
    /// Stable public id.
    pub external_id: Uuid,
    pub conversation_id: ConversationId,
    pub query: String,
    pub response: String,
    pub created_at: DateTime<Utc>,
}

/// Fields required to insert a new memory row.
#[derive(Debug, Clone)]
pub struct NewMemory {
    pub conversation_id: ConversationId,
    pub external_id: Uuid,
    pub query: String,
    pub response: String,
    pub created_at: DateTime<Utc>,
}

impl NewMemory {
    /// Build a new memory stamped with a fresh external id and the current time.
    pub fn new(conversation_id: ConversationId, query: &str, response: &str) -> Self {
        Self {
            conversation_id,
            external_id: Uuid::now_v7(),
            query: query.to_string(),
            response: response.to_string(),
            created_at: Utc::now(),
        }
    }
}

/// Ids returned to the caller after a successful store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredMemory {
    pub internal_id: InternalId,
    pub external_id: Uuid,
}

/// A dense embedding vector produced from free text.
///
/// Transient: embeddings only persist inside a vector index partition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Embedding {
    pub vector: Vec<f32>,
}

impl Embedding {
    pub fn new(vector: Vec<f32>) -> Self {
        Self { vector }
    }

    pub fn dimension(&self) -> usize {
        self.vector.len()
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.vector
    }
}

impl From<Vec<f32>> for Embedding {
    fn from(vector: Vec<f32>) -> Self {
        Self { vector }
    }
}

/// One nearest-neighbor result from a vector index partition.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub id: InternalId,
    /// Squared L2 distance from the query (smaller is nearer).
    pub distance: f32,
}

/// A memory hydrated from a search hit, in rank order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RankedMemory {
    pub memory: Memory,
    pub distance: f32,
}

/// Combined result of a retrieval through the service layer.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RecallResult {
    /// The most recent turns, oldest first.
    pub recent: Vec<Memory>,
    /// The most similar turns, nearest first.
    pub similar: Vec<RankedMemory>,
    /// False when the conversation has no index partition yet.
    pub similarity_available: bool,
}
