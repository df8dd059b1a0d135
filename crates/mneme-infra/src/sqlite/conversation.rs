//! SQLite conversation repository.

use mneme_core::memory::store::ConversationRepository;
use mneme_types::conversation::{Conversation, ConversationId};
use mneme_types::error::RepositoryError;
use sqlx::Row;

use super::pool::DatabasePool;
use crate::timestamp;

pub struct SqliteConversationRepository {
    pool: DatabasePool,
}

impl SqliteConversationRepository {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

pub(crate) fn conversation_from_row(
    row: &sqlx::sqlite::SqliteRow,
) -> Result<Conversation, RepositoryError> {
    let id: String = row
        .try_get("id")
        .map_err(|e| RepositoryError::Query(e.to_string()))?;
    let created_at: String = row
        .try_get("created_at")
        .map_err(|e| RepositoryError::Query(e.to_string()))?;

    Ok(Conversation {
        id: id
            .parse()
            .map_err(|e| RepositoryError::Query(format!("invalid conversation id: {e}")))?,
        agent: row
            .try_get("agent")
            .map_err(|e| RepositoryError::Query(e.to_string()))?,
        user: row
            .try_get("user")
            .map_err(|e| RepositoryError::Query(e.to_string()))?,
        created_at: timestamp::parse(&created_at)
            .map_err(|e| RepositoryError::Query(format!("invalid datetime: {e}")))?,
    })
}

impl ConversationRepository for SqliteConversationRepository {
    async fn create(&self, conversation: &Conversation) -> Result<(), RepositoryError> {
        let result = sqlx::query(
            "INSERT INTO conversations (id, agent, user, created_at) VALUES (?, ?, ?, ?)",
        )
        .bind(conversation.id.to_string())
        .bind(&conversation.agent)
        .bind(&conversation.user)
        .bind(timestamp::format(&conversation.created_at))
        .execute(&self.pool.writer)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(sqlx::Error::Database(db_err)) if db_err.message().contains("UNIQUE") => {
                Err(RepositoryError::Conflict(format!(
                    "conversation {} already exists",
                    conversation.id
                )))
            }
            Err(e) => Err(RepositoryError::Query(e.to_string())),
        }
    }

    async fn get(&self, id: &ConversationId) -> Result<Option<Conversation>, RepositoryError> {
        let row = sqlx::query("SELECT id, agent, user, created_at FROM conversations WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool.reader)
            .await
            .map_err(|e| RepositoryError::Query(e.to_string()))?;

        row.as_ref().map(conversation_from_row).transpose()
    }

    async fn exists(&self, id: &ConversationId) -> Result<bool, RepositoryError> {
        let found: Option<i64> = sqlx::query_scalar("SELECT 1 FROM conversations WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool.reader)
            .await
            .map_err(|e| RepositoryError::Query(e.to_string()))?;
        Ok(found.is_some())
    }
}
