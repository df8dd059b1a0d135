//! SQLite metadata store.
//!
//! Implements `MetadataStore` from `mneme-core`. The `memories.id` column is
//! the internal id joined against the vector index. Export and import go
//! through the Arrow IPC codec in [`crate::columnar::codec`].

use mneme_core::memory::store::{MetadataExport, MetadataStore};
use mneme_types::conversation::ConversationId;
use mneme_types::error::RepositoryError;
use mneme_types::memory::{InternalId, Memory, NewMemory};
use sqlx::Row;
use uuid::Uuid;

use super::conversation::conversation_from_row;
use super::pool::DatabasePool;
use crate::columnar::codec;
use crate::timestamp;

/// Upper bound on bound parameters per `IN (...)` query.
const FETCH_CHUNK: usize = 500;

const MEMORY_COLUMNS: &str = "id, external_id, conversation_id, query, response, created_at";

pub struct SqliteMetadataStore {
    pool: DatabasePool,
}

impl SqliteMetadataStore {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

// ---------------------------------------------------------------------------
// Row mapping
// ---------------------------------------------------------------------------

struct MemoryRow {
    id: i64,
    external_id: String,
    conversation_id: String,
    query: String,
    response: String,
    created_at: String,
}

impl MemoryRow {
    fn from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            external_id: row.try_get("external_id")?,
            conversation_id: row.try_get("conversation_id")?,
            query: row.try_get("query")?,
            response: row.try_get("response")?,
            created_at: row.try_get("created_at")?,
        })
    }

    fn into_memory(self) -> Result<Memory, RepositoryError> {
        Ok(Memory {
            internal_id: self.id,
            external_id: Uuid::parse_str(&self.external_id)
                .map_err(|e| RepositoryError::Query(format!("invalid external_id: {e}")))?,
            conversation_id: self
                .conversation_id
                .parse()
                .map_err(|e| RepositoryError::Query(format!("invalid conversation_id: {e}")))?,
            query: self.query,
            response: self.response,
            created_at: timestamp::parse(&self.created_at)
                .map_err(|e| RepositoryError::Query(format!("invalid datetime: {e}")))?,
        })
    }
}

fn rows_to_memories(rows: &[sqlx::sqlite::SqliteRow]) -> Result<Vec<Memory>, RepositoryError> {
    rows.iter()
        .map(|row| {
            MemoryRow::from_row(row)
                .map_err(|e| RepositoryError::Query(e.to_string()))?
                .into_memory()
        })
        .collect()
}

fn map_write_error(e: sqlx::Error) -> RepositoryError {
    if let sqlx::Error::Database(ref db_err) = e {
        if db_err.message().contains("UNIQUE") {
            return RepositoryError::Conflict(db_err.message().to_string());
        }
    }
    RepositoryError::Query(e.to_string())
}

fn placeholders(n: usize) -> String {
    vec!["?"; n].join(", ")
}

// ---------------------------------------------------------------------------
// MetadataStore implementation
// ---------------------------------------------------------------------------

impl MetadataStore for SqliteMetadataStore {
    async fn insert_one(&self, memory: &NewMemory) -> Result<InternalId, RepositoryError> {
        sqlx::query_scalar::<_, i64>(
            "INSERT INTO memories (external_id, conversation_id, query, response, created_at)
             VALUES (?, ?, ?, ?, ?)
             RETURNING id",
        )
        .bind(memory.external_id.to_string())
        .bind(memory.conversation_id.to_string())
        .bind(&memory.query)
        .bind(&memory.response)
        .bind(timestamp::format(&memory.created_at))
        .fetch_one(&self.pool.writer)
        .await
        .map_err(map_write_error)
    }

    async fn fetch_many(&self, ids: &[InternalId]) -> Result<Vec<Memory>, RepositoryError> {
        let mut out = Vec::with_capacity(ids.len());
        for chunk in ids.chunks(FETCH_CHUNK) {
            let sql = format!(
                "SELECT {MEMORY_COLUMNS} FROM memories WHERE id IN ({})",
                placeholders(chunk.len())
            );
            let mut query = sqlx::query(&sql);
            for id in chunk {
                query = query.bind(*id);
            }
            let rows = query
                .fetch_all(&self.pool.reader)
                .await
                .map_err(|e| RepositoryError::Query(e.to_string()))?;
            out.extend(rows_to_memories(&rows)?);
        }
        Ok(out)
    }

    async fn fetch_by_conversation(
        &self,
        conversation_id: &ConversationId,
        limit: usize,
    ) -> Result<Vec<Memory>, RepositoryError> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let sql = format!(
            "SELECT {MEMORY_COLUMNS} FROM (
                 SELECT {MEMORY_COLUMNS} FROM memories
                 WHERE conversation_id = ?
                 ORDER BY created_at DESC, id DESC
                 LIMIT ?
             ) ORDER BY created_at ASC, id ASC"
        );
        let rows = sqlx::query(&sql)
            .bind(conversation_id.to_string())
            .bind(limit)
            .fetch_all(&self.pool.reader)
            .await
            .map_err(|e| RepositoryError::Query(e.to_string()))?;
        rows_to_memories(&rows)
    }

    async fn memory_ids(
        &self,
        conversation_id: &ConversationId,
    ) -> Result<Vec<InternalId>, RepositoryError> {
        sqlx::query_scalar("SELECT id FROM memories WHERE conversation_id = ? ORDER BY id")
            .bind(conversation_id.to_string())
            .fetch_all(&self.pool.reader)
            .await
            .map_err(|e| RepositoryError::Query(e.to_string()))
    }

    async fn conversations_with_memories(&self) -> Result<Vec<ConversationId>, RepositoryError> {
        let ids: Vec<String> = sqlx::query_scalar(
            "SELECT DISTINCT conversation_id FROM memories ORDER BY conversation_id",
        )
        .fetch_all(&self.pool.reader)
        .await
        .map_err(|e| RepositoryError::Query(e.to_string()))?;
        ids.iter()
            .map(|id| {
                id.parse()
                    .map_err(|e| RepositoryError::Query(format!("invalid conversation_id: {e}")))
            })
            .collect()
    }

    async fn count(&self) -> Result<u64, RepositoryError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM memories")
            .fetch_one(&self.pool.reader)
            .await
            .map_err(|e| RepositoryError::Query(e.to_string()))?;
        Ok(count.max(0) as u64)
    }

    async fn export(&self) -> Result<MetadataExport, RepositoryError> {
        // Memories before conversations: every conversation a dumped memory
        // references already exists, and conversations are never deleted.
        let memory_rows = sqlx::query(&format!("SELECT {MEMORY_COLUMNS} FROM memories ORDER BY id"))
            .fetch_all(&self.pool.reader)
            .await
            .map_err(|e| RepositoryError::Query(e.to_string()))?;
        let memories = rows_to_memories(&memory_rows)?;

        let conversation_rows =
            sqlx::query("SELECT id, agent, user, created_at FROM conversations ORDER BY id")
                .fetch_all(&self.pool.reader)
                .await
                .map_err(|e| RepositoryError::Query(e.to_string()))?;
        let conversations = conversation_rows
            .iter()
            .map(conversation_from_row)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(MetadataExport {
            conversations: codec::encode_conversations(&conversations)
                .map_err(|e| RepositoryError::Query(format!("encode conversations: {e}")))?,
            memories: codec::encode_memories(&memories)
                .map_err(|e| RepositoryError::Query(format!("encode memories: {e}")))?,
            conversation_count: conversations.len() as u64,
            memory_count: memories.len() as u64,
        })
    }

    async fn import(&self, export: &MetadataExport) -> Result<(), RepositoryError> {
        let conversations = codec::decode_conversations(&export.conversations)
            .map_err(|e| RepositoryError::Query(format!("decode conversations: {e}")))?;
        let memories = codec::decode_memories(&export.memories)
            .map_err(|e| RepositoryError::Query(format!("decode memories: {e}")))?;

        let mut tx = self
            .pool
            .writer
            .begin()
            .await
            .map_err(|e| RepositoryError::Query(e.to_string()))?;

        sqlx::query("DELETE FROM memories")
            .execute(&mut *tx)
            .await
            .map_err(|e| RepositoryError::Query(e.to_string()))?;

        for conversation in &conversations {
            sqlx::query(
                "INSERT OR REPLACE INTO conversations (id, agent, user, created_at) VALUES (?, ?, ?, ?)",
            )
            .bind(conversation.id.to_string())
            .bind(&conversation.agent)
            .bind(&conversation.user)
            .bind(timestamp::format(&conversation.created_at))
            .execute(&mut *tx)
            .await
            .map_err(map_write_error)?;
        }

        for memory in &memories {
            sqlx::query(
                "INSERT INTO memories (id, external_id, conversation_id, query, response, created_at)
                 VALUES (?, ?, ?, ?, ?, ?)",
            )
            .bind(memory.internal_id)
            .bind(memory.external_id.to_string())
            .bind(memory.conversation_id.to_string())
            .bind(&memory.query)
            .bind(&memory.response)
            .bind(timestamp::format(&memory.created_at))
            .execute(&mut *tx)
            .await
            .map_err(map_write_error)?;
        }

        tx.commit()
            .await
            .map_err(|e| RepositoryError::Query(e.to_string()))?;

        tracing::debug!(
            conversations = conversations.len(),
            memories = memories.len(),
            "metadata imported"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sqlite::conversation::SqliteConversationRepository;
    use chrono::{Duration, Utc};
    use mneme_core::memory::store::ConversationRepository;
    use mneme_types::conversation::Conversation;

    async fn test_pool() -> DatabasePool {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("test.db");
        let url = format!("sqlite://{}?mode=rwc", db_path.display());
        // Leak tempdir so it lives for the test
        std::mem::forget(dir);
        DatabasePool::new(&url).await.unwrap()
    }

    async fn register(pool: &DatabasePool) -> ConversationId {
        let conversation = Conversation {
            id: ConversationId::new(),
            agent: "agent".to_string(),
            user: "user".to_string(),
            created_at: Utc::now(),
        };
        SqliteConversationRepository::new(pool.clone())
            .create(&conversation)
            .await
            .unwrap();
        conversation.id
    }

    #[tokio::test]
    async fn test_insert_assigns_increasing_ids() {
        let pool = test_pool().await;
        let conv = register(&pool).await;
        let store = SqliteMetadataStore::new(pool);

        let a = store.insert_one(&NewMemory::new(conv, "q1", "r1")).await.unwrap();
        let b = store.insert_one(&NewMemory::new(conv, "q2", "r2")).await.unwrap();
        assert!(b > a);
        assert_eq!(store.count().await.unwrap(), 2);
        assert_eq!(store.memory_ids(&conv).await.unwrap(), vec![a, b]);
    }

    #[tokio::test]
    async fn test_insert_for_unknown_conversation_fails() {
        let store = SqliteMetadataStore::new(test_pool().await);
        let err = store
            .insert_one(&NewMemory::new(ConversationId::new(), "q", "r"))
            .await
            .unwrap_err();
        assert!(matches!(err, RepositoryError::Query(_)));
        assert_eq!(store.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_fetch_many_omits_missing_ids() {
        let pool = test_pool().await;
        let conv = register(&pool).await;
        let store = SqliteMetadataStore::new(pool);
        let a = store.insert_one(&NewMemory::new(conv, "q1", "r1")).await.unwrap();
        let b = store.insert_one(&NewMemory::new(conv, "q2", "r2")).await.unwrap();

        let rows = store.fetch_many(&[b, 9_999, a]).await.unwrap();
        let mut ids: Vec<_> = rows.iter().map(|m| m.internal_id).collect();
        ids.sort();
        assert_eq!(ids, vec![a, b]);
        assert!(store.fetch_many(&[]).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_fetch_many_spans_chunks() {
        let pool = test_pool().await;
        let conv = register(&pool).await;
        let store = SqliteMetadataStore::new(pool);
        let mut ids = Vec::new();
        for i in 0..(FETCH_CHUNK + 10) {
            ids.push(
                store
                    .insert_one(&NewMemory::new(conv, &format!("q{i}"), "r"))
                    .await
                    .unwrap(),
            );
        }
        assert_eq!(store.fetch_many(&ids).await.unwrap().len(), ids.len());
    }

    #[tokio::test]
    async fn test_fetch_by_conversation_returns_tail_ascending() {
        let pool = test_pool().await;
        let conv = register(&pool).await;
        let other = register(&pool).await;
        let store = SqliteMetadataStore::new(pool);

        let base = Utc::now();
        for i in 0..5 {
            let mut memory = NewMemory::new(conv, &format!("q{i}"), "r");
            memory.created_at = base + Duration::seconds(i);
            store.insert_one(&memory).await.unwrap();
        }
        store.insert_one(&NewMemory::new(other, "elsewhere", "r")).await.unwrap();

        let recent = store.fetch_by_conversation(&conv, 2).await.unwrap();
        let queries: Vec<&str> = recent.iter().map(|m| m.query.as_str()).collect();
        assert_eq!(queries, vec!["q3", "q4"]);

        let all = store.fetch_by_conversation(&conv, 100).await.unwrap();
        assert_eq!(all.len(), 5);
        assert_eq!(all[0].query, "q0");
    }

    #[tokio::test]
    async fn test_conversations_with_memories() {
        let pool = test_pool().await;
        let conv = register(&pool).await;
        let _empty = register(&pool).await;
        let store = SqliteMetadataStore::new(pool);
        store.insert_one(&NewMemory::new(conv, "q", "r")).await.unwrap();

        assert_eq!(store.conversations_with_memories().await.unwrap(), vec![conv]);
    }

    #[tokio::test]
    async fn test_export_import_replaces_rows() {
        let source_pool = test_pool().await;
        let conv = register(&source_pool).await;
        let source = SqliteMetadataStore::new(source_pool);
        let a = source.insert_one(&NewMemory::new(conv, "q1", "r1")).await.unwrap();
        source.insert_one(&NewMemory::new(conv, "q2", "r2")).await.unwrap();

        let export = source.export().await.unwrap();
        assert_eq!(export.memory_count, 2);
        assert_eq!(export.conversation_count, 1);

        let target_pool = test_pool().await;
        let stale = register(&target_pool).await;
        let target = SqliteMetadataStore::new(target_pool.clone());
        target.insert_one(&NewMemory::new(stale, "stale", "row")).await.unwrap();

        target.import(&export).await.unwrap();
        target.import(&export).await.unwrap();

        assert_eq!(target.count().await.unwrap(), 2);
        let restored = target.fetch_many(&[a]).await.unwrap();
        assert_eq!(restored[0].query, "q1");
        assert_eq!(restored[0].conversation_id, conv);

        let conversations = SqliteConversationRepository::new(target_pool);
        assert!(conversations.exists(&conv).await.unwrap());
        assert!(conversations.exists(&stale).await.unwrap());

        // New inserts continue past the imported ids.
        let next = target.insert_one(&NewMemory::new(conv, "q3", "r3")).await.unwrap();
        assert!(next > a);
        assert!(target.fetch_many(&[next]).await.unwrap().len() == 1);
    }
}
