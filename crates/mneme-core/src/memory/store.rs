//! Relational persistence ports for conversations and memories.
//!
//! The metadata store is the source of truth for memory content, independent
//! of vector search. Implementations live in mneme-infra
//! (e.g., `SqliteMetadataStore`). Uses native async fn in traits (RPITIT).

use mneme_types::conversation::{Conversation, ConversationId};
use mneme_types::error::RepositoryError;
use mneme_types::memory::{InternalId, Memory, NewMemory};

/// Columnar dump of the metadata tables.
///
/// Byte streams are opaque to the core; the infra layer defines the format.
#[derive(Debug, Clone, Default)]
pub struct MetadataExport {
    pub conversations: Vec<u8>,
    pub memories: Vec<u8>,
    pub conversation_count: u64,
    pub memory_count: u64,
}

/// Append-only store of memory rows.
pub trait MetadataStore: Send + Sync {
    /// Insert a memory row and return its generated internal id.
    ///
    /// Fails on constraint violation or connection failure; never drops a write.
    fn insert_one(
        &self,
        memory: &NewMemory,
    ) -> impl std::future::Future<Output = Result<InternalId, RepositoryError>> + Send;

    /// Fetch rows by internal id. Missing ids are omitted, order is unspecified.
    fn fetch_many(
        &self,
        ids: &[InternalId],
    ) -> impl std::future::Future<Output = Result<Vec<Memory>, RepositoryError>> + Send;

    /// The last `limit` memories of a conversation, ordered by `created_at` ascending.
    fn fetch_by_conversation(
        &self,
        conversation_id: &ConversationId,
        limit: usize,
    ) -> impl std::future::Future<Output = Result<Vec<Memory>, RepositoryError>> + Send;

    /// Every internal id stored for a conversation.
    fn memory_ids(
        &self,
        conversation_id: &ConversationId,
    ) -> impl std::future::Future<Output = Result<Vec<InternalId>, RepositoryError>> + Send;

    /// Conversations that have at least one memory row.
    fn conversations_with_memories(
        &self,
    ) -> impl std::future::Future<Output = Result<Vec<ConversationId>, RepositoryError>> + Send;

    /// Total number of memory rows.
    fn count(&self) -> impl std::future::Future<Output = Result<u64, RepositoryError>> + Send;

    /// Dump the conversations and memories tables.
    fn export(
        &self,
    ) -> impl std::future::Future<Output = Result<MetadataExport, RepositoryError>> + Send;

    /// Replace every memory row with a previous export and upsert its
    /// conversations. Local conversations absent from the export are kept.
    ///
    /// Replacing (rather than appending) makes repeated imports of the same
    /// export converge on the same row set.
    fn import(
        &self,
        export: &MetadataExport,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;
}

/// Conversation registration and existence checks.
pub trait ConversationRepository: Send + Sync {
    fn create(
        &self,
        conversation: &Conversation,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    fn get(
        &self,
        id: &ConversationId,
    ) -> impl std::future::Future<Output = Result<Option<Conversation>, RepositoryError>> + Send;

    fn exists(
        &self,
        id: &ConversationId,
    ) -> impl std::future::Future<Output = Result<bool, RepositoryError>> + Send;
}
