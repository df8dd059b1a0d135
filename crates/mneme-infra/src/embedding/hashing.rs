//! Feature-hashing embedder.
//!
//! Maps lowercase word tokens into a fixed number of buckets with FNV-1a and a
//! sign bit, then L2-normalizes. Texts sharing words land close together,
//! which is enough for offline runs and deterministic tests. No model files.

use mneme_core::memory::embedder::Embedder;
use mneme_types::error::EmbeddingError;
use mneme_types::memory::Embedding;

pub const DEFAULT_HASHING_DIMENSION: usize = 256;

const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0100_0000_01b3;

fn fnv1a(token: &str) -> u64 {
    token.bytes().fold(FNV_OFFSET, |hash, byte| {
        (hash ^ u64::from(byte)).wrapping_mul(FNV_PRIME)
    })
}

pub struct HashingEmbedder {
    dimension: usize,
}

impl HashingEmbedder {
    pub fn new(dimension: usize) -> Result<Self, EmbeddingError> {
        if dimension == 0 {
            return Err(EmbeddingError::Provider(
                "hashing dimension must be at least 1".to_string(),
            ));
        }
        Ok(Self { dimension })
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Blank text is rejected. Text with no word tokens (only punctuation)
    /// maps to the zero vector.
    pub fn vectorize(&self, text: &str) -> Result<Embedding, EmbeddingError> {
        if text.trim().is_empty() {
            return Err(EmbeddingError::EmptyInput);
        }

        let mut vector = vec![0.0f32; self.dimension];

        for token in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
        {
            let hash = fnv1a(&token.to_lowercase());
            let bucket = (hash % self.dimension as u64) as usize;
            let sign = if hash >> 63 == 0 { 1.0 } else { -1.0 };
            vector[bucket] += sign;
        }

        let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for x in &mut vector {
                *x /= norm;
            }
        }
        Ok(Embedding::from(vector))
    }
}

impl Default for HashingEmbedder {
    fn default() -> Self {
        Self {
            dimension: DEFAULT_HASHING_DIMENSION,
        }
    }
}

impl Embedder for HashingEmbedder {
    async fn embed_one(&self, text: &str) -> Result<Embedding, EmbeddingError> {
        self.vectorize(text)
    }

    async fn embed_many(&self, texts: &[String]) -> Result<Vec<Embedding>, EmbeddingError> {
        texts.iter().map(|t| self.vectorize(t)).collect()
    }

    fn model_name(&self) -> &str {
        "hashing"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn distance(a: &Embedding, b: &Embedding) -> f32 {
        a.vector
            .iter()
            .zip(&b.vector)
            .map(|(x, y)| (x - y) * (x - y))
            .sum()
    }

    #[test]
    fn test_deterministic_and_normalized() {
        let embedder = HashingEmbedder::default();
        let a = embedder.vectorize("Reset my password").unwrap();
        let b = embedder.vectorize("reset MY password").unwrap();
        assert_eq!(a, b);
        assert_eq!(a.dimension(), DEFAULT_HASHING_DIMENSION);
        let norm: f32 = a.vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_shared_words_are_closer() {
        let embedder = HashingEmbedder::default();
        let query = embedder.vectorize("I forgot my password").unwrap();
        let related = embedder.vectorize("how to reset password").unwrap();
        let unrelated = embedder.vectorize("how to change email").unwrap();
        assert!(distance(&query, &related) < distance(&query, &unrelated));
    }

    #[test]
    fn test_blank_text_is_rejected() {
        let embedder = HashingEmbedder::default();
        assert!(matches!(
            embedder.vectorize("  \t "),
            Err(EmbeddingError::EmptyInput)
        ));
        assert!(HashingEmbedder::new(0).is_err());
    }

    #[test]
    fn test_punctuation_only_text_is_the_zero_vector() {
        let embedder = HashingEmbedder::new(16).unwrap();
        let v = embedder.vectorize("  ?! ").unwrap();
        assert_eq!(v.dimension(), 16);
        assert!(v.vector.iter().all(|x| *x == 0.0));
    }

    #[tokio::test]
    async fn test_embed_many_preserves_order() {
        let embedder = HashingEmbedder::new(32).unwrap();
        let texts = vec!["alpha".to_string(), "beta".to_string()];
        let many = embedder.embed_many(&texts).await.unwrap();
        assert_eq!(many[0], embedder.embed_one("alpha").await.unwrap());
        assert_eq!(many[1], embedder.embed_one("beta").await.unwrap());
    }
}
