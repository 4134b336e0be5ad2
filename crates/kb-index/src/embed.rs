//! Turns chunk text into vectors. The reference implementation is a deterministic local
//! hashing-based provider: dependency-free on a model file, standing in for "a local
//! CPU-capable model" per the Non-goals, while the trait stays provider-agnostic so a real
//! sentence-transformer or managed API binding plugs in without touching the orchestrator.

use async_trait::async_trait;
use kb_core::types::{KbId, WorkspaceId};
use thiserror::Error;

pub const DEFAULT_BATCH_SIZE: usize = 32;

#[derive(Debug, Error)]
pub enum EmbedError {
    #[error("batch of {0} texts exceeds max batch size of {1}")]
    BatchTooLarge(usize, usize),
    #[error("rate limited, retry after backoff")]
    RateLimited,
    #[error("provider error: {0}")]
    Provider(String),
}

impl EmbedError {
    pub fn kind(&self) -> kb_core::ErrorKind {
        match self {
            EmbedError::BatchTooLarge(..) => kb_core::ErrorKind::InvalidArgument,
            EmbedError::RateLimited => kb_core::ErrorKind::Transient,
            EmbedError::Provider(_) => kb_core::ErrorKind::Internal,
        }
    }
}

/// Which KB a batch of embeddings is being produced for. Passed through so a provider that
/// wants per-tenant rate limiting or usage accounting has what it needs without a second call.
#[derive(Debug, Clone, Copy)]
pub struct EmbedContext {
    pub kb_id: KbId,
    pub workspace_id: WorkspaceId,
}

/// A KB's immutable choice of embedding provider, model, and vector shape. Switching any of
/// these for a KB already holding vectors would mix dimensions and metric spaces, so this is
/// fixed at KB creation (see SPEC_FULL.md §3 `KnowledgeBase.embedding_profile`).
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct EmbeddingProfile {
    pub provider_id: String,
    pub model_id: String,
    pub dimension: usize,
    pub normalized: bool,
}

#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, texts: &[String], context: EmbedContext) -> Result<Vec<Vec<f32>>, EmbedError>;

    fn dimension(&self) -> usize;

    fn batch_size(&self) -> usize {
        DEFAULT_BATCH_SIZE
    }

    fn profile(&self) -> EmbeddingProfile;
}

/// Bag-of-n-grams hashed into a fixed-width float vector. Deterministic (same text always
/// produces the same vector) and L2-normalized when the profile asks for it.
pub struct HashingEmbedder {
    dimension: usize,
    normalized: bool,
    ngram: usize,
}

impl HashingEmbedder {
    pub fn new(dimension: usize) -> Self {
        Self { dimension, normalized: true, ngram: 3 }
    }

    pub fn with_normalized(mut self, normalized: bool) -> Self {
        self.normalized = normalized;
        self
    }

    pub fn with_ngram(mut self, ngram: usize) -> Self {
        self.ngram = ngram.max(1);
        self
    }

    fn hash_ngram(ngram: &str) -> u64 {
        // FNV-1a: cheap, dependency-free, stable across runs.
        let mut hash: u64 = 0xcbf29ce484222325;
        for byte in ngram.bytes() {
            hash ^= byte as u64;
            hash = hash.wrapping_mul(0x100000001b3);
        }
        hash
    }

    fn embed_one(&self, text: &str) -> Vec<f32> {
        let normalized_text = text.to_lowercase();
        let chars: Vec<char> = normalized_text.chars().collect();
        let mut vector = vec![0.0f32; self.dimension];

        if chars.is_empty() {
            return vector;
        }

        if chars.len() < self.ngram {
            let gram: String = chars.iter().collect();
            let idx = (Self::hash_ngram(&gram) as usize) % self.dimension;
            vector[idx] += 1.0;
        } else {
            for window in chars.windows(self.ngram) {
                let gram: String = window.iter().collect();
                let h = Self::hash_ngram(&gram);
                let idx = (h as usize) % self.dimension;
                let sign = if (h >> 63) & 1 == 0 { 1.0 } else { -1.0 };
                vector[idx] += sign;
            }
        }

        if self.normalized {
            let norm: f32 = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
            if norm > 0.0 {
                for v in &mut vector {
                    *v /= norm;
                }
            }
        }
        vector
    }
}

#[async_trait]
impl Embedder for HashingEmbedder {
    async fn embed(&self, texts: &[String], _context: EmbedContext) -> Result<Vec<Vec<f32>>, EmbedError> {
        if texts.len() > DEFAULT_BATCH_SIZE * 8 {
            return Err(EmbedError::BatchTooLarge(texts.len(), DEFAULT_BATCH_SIZE * 8));
        }
        Ok(texts.iter().map(|t| self.embed_one(t)).collect())
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn profile(&self) -> EmbeddingProfile {
        EmbeddingProfile {
            provider_id: "local-hashing".to_string(),
            model_id: format!("hashing-ngram{}-d{}", self.ngram, self.dimension),
            dimension: self.dimension,
            normalized: self.normalized,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> EmbedContext {
        EmbedContext { kb_id: KbId::new(), workspace_id: WorkspaceId::new() }
    }

    #[tokio::test]
    async fn test_same_text_produces_same_vector() {
        let embedder = HashingEmbedder::new(64);
        let texts = vec!["hello world".to_string(), "hello world".to_string()];
        let vectors = embedder.embed(&texts, ctx()).await.unwrap();
        assert_eq!(vectors[0], vectors[1]);
    }

    #[tokio::test]
    async fn test_different_text_produces_different_vector() {
        let embedder = HashingEmbedder::new(64);
        let texts = vec!["hello world".to_string(), "goodbye moon".to_string()];
        let vectors = embedder.embed(&texts, ctx()).await.unwrap();
        assert_ne!(vectors[0], vectors[1]);
    }

    #[tokio::test]
    async fn test_vectors_have_configured_dimension() {
        let embedder = HashingEmbedder::new(128);
        let vectors = embedder.embed(&["some text".to_string()], ctx()).await.unwrap();
        assert_eq!(vectors[0].len(), 128);
    }

    #[tokio::test]
    async fn test_normalized_vectors_have_unit_norm() {
        let embedder = HashingEmbedder::new(64).with_normalized(true);
        let vectors = embedder.embed(&["some longer piece of text to embed".to_string()], ctx()).await.unwrap();
        let norm: f32 = vectors[0].iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 0.01);
    }

    #[tokio::test]
    async fn test_empty_text_produces_zero_vector() {
        let embedder = HashingEmbedder::new(32);
        let vectors = embedder.embed(&["".to_string()], ctx()).await.unwrap();
        assert!(vectors[0].iter().all(|&v| v == 0.0));
    }

    #[tokio::test]
    async fn test_batch_too_large_is_rejected() {
        let embedder = HashingEmbedder::new(32);
        let texts: Vec<String> = (0..DEFAULT_BATCH_SIZE * 9).map(|i| i.to_string()).collect();
        let err = embedder.embed(&texts, ctx()).await.unwrap_err();
        assert!(matches!(err, EmbedError::BatchTooLarge(..)));
    }

    #[test]
    fn test_profile_reports_dimension_and_normalized() {
        let embedder = HashingEmbedder::new(256).with_normalized(false);
        let profile = embedder.profile();
        assert_eq!(profile.dimension, 256);
        assert!(!profile.normalized);
    }
}
