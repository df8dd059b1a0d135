//! BoxEmbedder -- object-safe dynamic dispatch wrapper for Embedder.
//!
//! 1. Define an object-safe `EmbedderDyn` trait with boxed futures
//! 2. Blanket-impl `EmbedderDyn` for all `T: Embedder`
//! 3. `BoxEmbedder` wraps `Box<dyn EmbedderDyn>` and itself implements `Embedder`,
//!    so the engine can be pinned to one concrete type while the backend is
//!    chosen from configuration at startup.

use std::future::Future;
use std::pin::Pin;

use mneme_types::error::EmbeddingError;
use mneme_types::memory::Embedding;

use super::embedder::Embedder;

type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Object-safe version of [`Embedder`] with boxed futures.
pub trait EmbedderDyn: Send + Sync {
    fn embed_one_boxed<'a>(
        &'a self,
        text: &'a str,
    ) -> BoxFuture<'a, Result<Embedding, EmbeddingError>>;

    fn embed_many_boxed<'a>(
        &'a self,
        texts: &'a [String],
    ) -> BoxFuture<'a, Result<Vec<Embedding>, EmbeddingError>>;

    fn model_name_dyn(&self) -> &str;
}

impl<T: Embedder> EmbedderDyn for T {
    fn embed_one_boxed<'a>(
        &'a self,
        text: &'a str,
    ) -> BoxFuture<'a, Result<Embedding, EmbeddingError>> {
        Box::pin(self.embed_one(text))
    }

    fn embed_many_boxed<'a>(
        &'a self,
        texts: &'a [String],
    ) -> BoxFuture<'a, Result<Vec<Embedding>, EmbeddingError>> {
        Box::pin(self.embed_many(texts))
    }

    fn model_name_dyn(&self) -> &str {
        self.model_name()
    }
}

/// Type-erased embedder for runtime selection.
pub struct BoxEmbedder {
    inner: Box<dyn EmbedderDyn + Send + Sync>,
}

impl BoxEmbedder {
    /// Wrap a concrete `Embedder` in a type-erased box.
    pub fn new<T: Embedder + 'static>(embedder: T) -> Self {
        Self {
            inner: Box::new(embedder),
        }
    }
}

impl Embedder for BoxEmbedder {
    async fn embed_one(&self, text: &str) -> Result<Embedding, EmbeddingError> {
        self.inner.embed_one_boxed(text).await
    }

    async fn embed_many(&self, texts: &[String]) -> Result<Vec<Embedding>, EmbeddingError> {
        self.inner.embed_many_boxed(texts).await
    }

    fn model_name(&self) -> &str {
        self.inner.model_name_dyn()
    }
}
