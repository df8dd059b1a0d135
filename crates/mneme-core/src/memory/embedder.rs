//! Embedder trait for text-to-vector conversion.
//!
//! Defines the interface for embedding text into vectors for semantic search.
//! Implementations (e.g., fastembed local models) live in mneme-infra.

use mneme_types::error::EmbeddingError;
use mneme_types::memory::Embedding;

/// Trait for converting text into embedding vectors.
///
/// Uses RPITIT (native async fn in traits, Rust 2024 edition).
/// Retry policy, if any, belongs to the implementation; callers never retry.
pub trait Embedder: Send + Sync {
    /// Embed a single text.
    fn embed_one(
        &self,
        text: &str,
    ) -> impl std::future::Future<Output = Result<Embedding, EmbeddingError>> + Send;

    /// Embed several texts, returning one vector per input in input order.
    fn embed_many(
        &self,
        texts: &[String],
    ) -> impl std::future::Future<Output = Result<Vec<Embedding>, EmbeddingError>> + Send;

    /// The model name used for embeddings (e.g., "BGESmallENV15").
    fn model_name(&self) -> &str;
}
