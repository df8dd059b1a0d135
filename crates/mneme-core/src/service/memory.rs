//! Memory service: the entry point agent runtimes call.
//!
//! Parses and validates caller input, checks that the conversation is
//! registered, then delegates to [`SemanticMemoryEngine`]. Retrieval combines
//! the recency window with the similarity ranking.

use std::sync::Arc;

use chrono::Utc;
use tokio_util::sync::CancellationToken;

use mneme_types::config::RetrievalConfig;
use mneme_types::conversation::{Conversation, ConversationId, RegisterConversationRequest};
use mneme_types::error::MemoryError;
use mneme_types::memory::{Memory, RecallResult, StoredMemory};

use crate::memory::embedder::Embedder;
use crate::memory::engine::SemanticMemoryEngine;
use crate::memory::index::VectorIndex;
use crate::memory::store::{ConversationRepository, MetadataStore};

pub struct MemoryService<C, M, E, I>
where
    C: ConversationRepository,
    M: MetadataStore,
    E: Embedder,
    I: VectorIndex,
{
    conversations: Arc<C>,
    engine: Arc<SemanticMemoryEngine<M, E, I>>,
    config: RetrievalConfig,
}

impl<C, M, E, I> MemoryService<C, M, E, I>
where
    C: ConversationRepository,
    M: MetadataStore,
    E: Embedder,
    I: VectorIndex,
{
    pub fn new(
        conversations: Arc<C>,
        engine: Arc<SemanticMemoryEngine<M, E, I>>,
        config: RetrievalConfig,
    ) -> Self {
        Self {
            conversations,
            engine,
            config,
        }
    }

    pub fn engine(&self) -> &Arc<SemanticMemoryEngine<M, E, I>> {
        &self.engine
    }

    /// Register a new conversation between an agent and a user.
    pub async fn register_conversation(
        &self,
        request: RegisterConversationRequest,
    ) -> Result<Conversation, MemoryError> {
        let agent = request.agent.trim();
        let user = request.user.trim();
        if agent.is_empty() {
            return Err(MemoryError::Validation("agent cannot be empty".to_string()));
        }
        if user.is_empty() {
            return Err(MemoryError::Validation("user cannot be empty".to_string()));
        }

        let conversation = Conversation {
            id: ConversationId::new(),
            agent: agent.to_string(),
            user: user.to_string(),
            created_at: Utc::now(),
        };
        self.conversations
            .create(&conversation)
            .await
            .map_err(|e| MemoryError::storage("register conversation", e))?;

        tracing::info!(
            conversation_id = %conversation.id,
            agent = %conversation.agent,
            "conversation registered"
        );
        Ok(conversation)
    }

    pub async fn conversation(&self, conversation_id: &str) -> Result<Conversation, MemoryError> {
        let id = parse_conversation_id(conversation_id)?;
        self.conversations
            .get(&id)
            .await
            .map_err(|e| MemoryError::storage(format!("get conversation {id}"), e))?
            .ok_or(MemoryError::ConversationNotFound(id))
    }

    pub async fn store(
        &self,
        conversation_id: &str,
        query: &str,
        response: &str,
        cancel: &CancellationToken,
    ) -> Result<StoredMemory, MemoryError> {
        let id = self.registered(conversation_id).await?;
        self.engine.store(id, query, response, cancel).await
    }

    /// Recent turns plus the `top_k` most similar ones.
    ///
    /// `top_k == 0` uses the configured default. A conversation that has never
    /// been indexed still returns its recent turns, with
    /// `similarity_available` set to false.
    pub async fn retrieve(
        &self,
        conversation_id: &str,
        query: &str,
        top_k: usize,
        cancel: &CancellationToken,
    ) -> Result<RecallResult, MemoryError> {
        let id = self.registered(conversation_id).await?;
        let top_k = if top_k == 0 {
            self.config.default_top_k
        } else {
            top_k
        };

        let recent = self.engine.recent(id, self.config.recency_window).await?;

        match self.engine.retrieve(id, query, top_k, cancel).await {
            Ok(similar) => Ok(RecallResult {
                recent,
                similar,
                similarity_available: true,
            }),
            Err(MemoryError::ConversationNotIndexed(_)) => {
                tracing::debug!(conversation_id = %id, "no index partition; recency only");
                Ok(RecallResult {
                    recent,
                    similar: Vec::new(),
                    similarity_available: false,
                })
            }
            Err(e) => Err(e),
        }
    }

    /// The last `limit` turns, oldest first. `None` uses the configured window.
    pub async fn recent(
        &self,
        conversation_id: &str,
        limit: Option<usize>,
    ) -> Result<Vec<Memory>, MemoryError> {
        let id = self.registered(conversation_id).await?;
        self.engine
            .recent(id, limit.unwrap_or(self.config.recency_window))
            .await
    }

    async fn registered(&self, conversation_id: &str) -> Result<ConversationId, MemoryError> {
        let id = parse_conversation_id(conversation_id)?;
        let exists = self
            .conversations
            .exists(&id)
            .await
            .map_err(|e| MemoryError::storage(format!("check conversation {id}"), e))?;
        if !exists {
            return Err(MemoryError::ConversationNotFound(id));
        }
        Ok(id)
    }
}

fn parse_conversation_id(raw: &str) -> Result<ConversationId, MemoryError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(MemoryError::Validation(
            "conversation id cannot be empty".to_string(),
        ));
    }
    trimmed
        .parse()
        .map_err(|_| MemoryError::Validation(format!("malformed conversation id '{trimmed}'")))
}
