//! FastEmbed-based local embedding generator.
//!
//! Implements the `Embedder` trait from `mneme-core` with fastembed's ONNX
//! runtime models (BGESmallENV15 by default, 384 dimensions). The model is
//! loaded on first use; inference runs on the blocking pool because fastembed
//! is synchronous.

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use ::fastembed::{EmbeddingModel, InitOptions, TextEmbedding};
use tokio::sync::OnceCell;

use mneme_core::memory::embedder::Embedder;
use mneme_types::error::EmbeddingError;
use mneme_types::memory::Embedding;

/// Resolve a configured model name to a fastembed model and its dimension.
pub fn model_from_name(name: &str) -> Result<(EmbeddingModel, usize), EmbeddingError> {
    let model = match name {
        "BGESmallENV15" | "bge-small-en-v1.5" => (EmbeddingModel::BGESmallENV15, 384),
        "BGEBaseENV15" | "bge-base-en-v1.5" => (EmbeddingModel::BGEBaseENV15, 768),
        "BGELargeENV15" | "bge-large-en-v1.5" => (EmbeddingModel::BGELargeENV15, 1024),
        "AllMiniLML6V2" | "all-MiniLM-L6-v2" => (EmbeddingModel::AllMiniLML6V2, 384),
        "AllMiniLML12V2" | "all-MiniLM-L12-v2" => (EmbeddingModel::AllMiniLML12V2, 384),
        "NomicEmbedTextV15" | "nomic-embed-text-v1.5" => (EmbeddingModel::NomicEmbedTextV15, 768),
        "MultilingualE5Small" | "multilingual-e5-small" => {
            (EmbeddingModel::MultilingualE5Small, 384)
        }
        other => {
            return Err(EmbeddingError::Provider(format!(
                "unknown embedding model '{other}'"
            )));
        }
    };
    Ok(model)
}

pub struct FastEmbedder {
    model: EmbeddingModel,
    model_name: String,
    dimension: usize,
    show_download_progress: bool,
    cache_dir: Option<PathBuf>,
    engine: OnceCell<Arc<Mutex<TextEmbedding>>>,
}

impl FastEmbedder {
    pub fn new(
        model_name: &str,
        show_download_progress: bool,
        cache_dir: Option<PathBuf>,
    ) -> Result<Self, EmbeddingError> {
        let (model, dimension) = model_from_name(model_name)?;
        Ok(Self {
            model,
            model_name: model_name.to_string(),
            dimension,
            show_download_progress,
            cache_dir,
            engine: OnceCell::new(),
        })
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    async fn engine(&self) -> Result<Arc<Mutex<TextEmbedding>>, EmbeddingError> {
        self.engine
            .get_or_try_init(|| async {
                tracing::info!(model = %self.model_name, "loading embedding model");

                let mut options = InitOptions::new(self.model.clone())
                    .with_show_download_progress(self.show_download_progress);
                if let Some(dir) = &self.cache_dir {
                    options = options.with_cache_dir(dir.clone());
                }

                let engine = tokio::task::spawn_blocking(move || TextEmbedding::try_new(options))
                    .await
                    .map_err(|e| EmbeddingError::Provider(format!("model load task failed: {e}")))?
                    .map_err(|e| EmbeddingError::Provider(format!("model load failed: {e}")))?;

                tracing::info!(
                    model = %self.model_name,
                    dimension = self.dimension,
                    "embedding model loaded"
                );
                Ok(Arc::new(Mutex::new(engine)))
            })
            .await
            .cloned()
    }

    async fn run(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        let engine = self.engine().await?;
        tokio::task::spawn_blocking(move || {
            let mut guard = engine.lock().map_err(|_| {
                EmbeddingError::Provider("embedding model lock poisoned".to_string())
            })?;
            guard
                .embed(texts, None)
                .map_err(|e| EmbeddingError::Provider(e.to_string()))
        })
        .await
        .map_err(|e| EmbeddingError::Provider(format!("embedding task failed: {e}")))?
    }

    fn check(&self, vector: Vec<f32>) -> Result<Embedding, EmbeddingError> {
        if vector.len() != self.dimension {
            return Err(EmbeddingError::DimensionMismatch {
                expected: self.dimension,
                actual: vector.len(),
            });
        }
        Ok(Embedding::from(vector))
    }
}

impl Embedder for FastEmbedder {
    #[tracing::instrument(skip(self, text), fields(text_len = text.len()))]
    async fn embed_one(&self, text: &str) -> Result<Embedding, EmbeddingError> {
        if text.trim().is_empty() {
            return Err(EmbeddingError::EmptyInput);
        }
        let vector = self
            .run(vec![text.to_string()])
            .await?
            .into_iter()
            .next()
            .ok_or(EmbeddingError::EmptyResponse)?;
        self.check(vector)
    }

    #[tracing::instrument(skip(self, texts), fields(batch_size = texts.len()))]
    async fn embed_many(&self, texts: &[String]) -> Result<Vec<Embedding>, EmbeddingError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        if texts.iter().any(|t| t.trim().is_empty()) {
            return Err(EmbeddingError::EmptyInput);
        }
        let vectors = self.run(texts.to_vec()).await?;
        if vectors.len() != texts.len() {
            return Err(EmbeddingError::EmptyResponse);
        }
        vectors.into_iter().map(|v| self.check(v)).collect()
    }

    fn model_name(&self) -> &str {
        &self.model_name
    }
}
