//! Embedding provider trait and mock implementation.
//!
//! This module defines the `EmbeddingProvider` trait that abstracts over
//! text-to-vector backends. The stores only ever talk to this trait.
//!
//! # Providers
//!
//! - `MockEmbeddingProvider`: Deterministic hash-seeded vectors for testing
//! - `FastEmbedProvider`: Local embedding via fastembed (requires `fastembed` feature)

use async_trait::async_trait;
use semdex_core::{Error, Result};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

/// Trait for generating text embeddings.
///
/// Providers may need an explicit [`init`](EmbeddingProvider::init) step
/// (model download, weights load). Until it completes, `embed` and
/// `embed_batch` fail with [`Error::NotInitialized`].
///
/// # Thread Safety
///
/// Implementations handle their own internal synchronization so a single
/// provider can be shared behind an `Arc` by many stores.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Prepare the provider for use. Idempotent.
    async fn init(&self) -> Result<()> {
        Ok(())
    }

    /// Whether `init` has completed.
    fn is_initialized(&self) -> bool {
        true
    }

    /// Generate an embedding for a single text.
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Generate embeddings for a batch of texts.
    ///
    /// Default implementation calls `embed` for each text sequentially.
    /// Backends that support native batching should override this.
    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        let mut results = Vec::with_capacity(texts.len());
        for text in texts {
            results.push(self.embed(text).await?);
        }
        Ok(results)
    }

    /// The embedding dimension, if known yet.
    fn dimension(&self) -> Option<usize>;

    /// The provider name for diagnostics.
    fn name(&self) -> &str;
}

/// A mock embedding provider for testing.
///
/// Each text seeds a small PRNG, so the same text always maps to the same
/// unit vector and unrelated texts land far apart. Specific texts can be
/// pinned to hand-picked vectors with [`with_vector`](Self::with_vector).
pub struct MockEmbeddingProvider {
    dimension: usize,
    initialized: AtomicBool,
    pinned: HashMap<String, Vec<f32>>,
    embed_calls: AtomicUsize,
    batch_calls: AtomicUsize,
}

impl MockEmbeddingProvider {
    /// Create a new, ready-to-use mock provider with the given dimension.
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            initialized: AtomicBool::new(true),
            pinned: HashMap::new(),
            embed_calls: AtomicUsize::new(0),
            batch_calls: AtomicUsize::new(0),
        }
    }

    /// Create a mock provider that rejects embedding until `init` is called.
    pub fn uninitialized(dimension: usize) -> Self {
        let provider = Self::new(dimension);
        provider.initialized.store(false, Ordering::SeqCst);
        provider
    }

    /// Pin a text to a fixed vector.
    pub fn with_vector(mut self, text: impl Into<String>, vector: Vec<f32>) -> Self {
        self.pinned.insert(text.into(), vector);
        self
    }

    /// Number of single-text `embed` calls served.
    pub fn embed_calls(&self) -> usize {
        self.embed_calls.load(Ordering::SeqCst)
    }

    /// Number of `embed_batch` calls served.
    pub fn batch_calls(&self) -> usize {
        self.batch_calls.load(Ordering::SeqCst)
    }

    fn ensure_ready(&self) -> Result<()> {
        if self.is_initialized() {
            Ok(())
        } else {
            Err(Error::not_initialized("mock embedding provider"))
        }
    }

    /// Generate a deterministic embedding from text.
    fn deterministic_embedding(&self, text: &str) -> Vec<f32> {
        if let Some(vector) = self.pinned.get(text) {
            return vector.clone();
        }

        // FNV-1a seed, then xorshift64 for the components.
        let mut state = text.bytes().fold(0xcbf2_9ce4_8422_2325u64, |hash, b| {
            (hash ^ u64::from(b)).wrapping_mul(0x0100_0000_01b3)
        });
        if state == 0 {
            state = 0x9e37_79b9_7f4a_7c15;
        }

        let embedding: Vec<f32> = (0..self.dimension)
            .map(|_| {
                state ^= state << 13;
                state ^= state >> 7;
                state ^= state << 17;
                ((state >> 40) as f32 / (1u64 << 24) as f32) * 2.0 - 1.0
            })
            .collect();

        semdex_core::normalize_vector(&embedding)
    }
}

#[async_trait]
impl EmbeddingProvider for MockEmbeddingProvider {
    async fn init(&self) -> Result<()> {
        self.initialized.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::SeqCst)
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.ensure_ready()?;
        self.embed_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.deterministic_embedding(text))
    }

    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        self.ensure_ready()?;
        self.batch_calls.fetch_add(1, Ordering::SeqCst);
        Ok(texts
            .iter()
            .map(|t| self.deterministic_embedding(t))
            .collect())
    }

    fn dimension(&self) -> Option<usize> {
        Some(self.dimension)
    }

    fn name(&self) -> &str {
        "mock"
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use semdex_core::cosine_similarity;

    #[test]
    fn test_mock_provider_creation() {
        let provider = MockEmbeddingProvider::new(384);
        assert_eq!(provider.dimension(), Some(384));
        assert_eq!(provider.name(), "mock");
        assert!(provider.is_initialized());
    }

    #[tokio::test]
    async fn test_mock_embed_single() {
        let provider = MockEmbeddingProvider::new(8);
        let embedding = provider.embed("hello world").await.unwrap();

        assert_eq!(embedding.len(), 8);

        // Verify unit-normalized
        let norm: f32 = embedding.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
        assert_eq!(provider.embed_calls(), 1);
    }

    #[tokio::test]
    async fn test_mock_embed_deterministic() {
        let provider = MockEmbeddingProvider::new(16);
        let e1 = provider.embed("same text").await.unwrap();
        let e2 = provider.embed("same text").await.unwrap();

        assert_eq!(e1, e2);
    }

    #[tokio::test]
    async fn test_mock_embed_different_texts_are_dissimilar() {
        let provider = MockEmbeddingProvider::new(256);
        let e1 = provider.embed("text one").await.unwrap();
        let e2 = provider.embed("text two").await.unwrap();

        assert_ne!(e1, e2);
        assert!(cosine_similarity(&e1, &e2).unwrap() < 0.5);
    }

    #[tokio::test]
    async fn test_mock_pinned_vector() {
        let provider = MockEmbeddingProvider::new(3).with_vector("x", vec![1.0, 0.0, 0.0]);
        assert_eq!(provider.embed("x").await.unwrap(), vec![1.0, 0.0, 0.0]);
        assert_eq!(provider.embed("y").await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_mock_embed_batch() {
        let provider = MockEmbeddingProvider::new(8);
        let texts = vec!["hello", "world", "test"];
        let embeddings = provider.embed_batch(&texts).await.unwrap();

        assert_eq!(embeddings.len(), 3);
        for emb in &embeddings {
            assert_eq!(emb.len(), 8);
        }
        assert_eq!(provider.batch_calls(), 1);
        assert_eq!(provider.embed_calls(), 0);
    }

    #[tokio::test]
    async fn test_mock_embed_batch_empty() {
        let provider = MockEmbeddingProvider::new(4);
        let texts: Vec<&str> = vec![];
        let embeddings = provider.embed_batch(&texts).await.unwrap();

        assert!(embeddings.is_empty());
    }

    #[tokio::test]
    async fn test_mock_uninitialized_rejects_until_init() {
        let provider = MockEmbeddingProvider::uninitialized(4);
        assert!(!provider.is_initialized());

        let err = provider.embed("early").await.unwrap_err();
        assert!(err.is_not_initialized());
        assert!(provider.embed_batch(&["early"]).await.is_err());

        provider.init().await.unwrap();
        assert!(provider.is_initialized());
        assert_eq!(provider.embed("late").await.unwrap().len(), 4);
    }

    #[test]
    fn test_trait_object_safety() {
        // Verify EmbeddingProvider can be used as a trait object
        fn _assert_object_safe(_: &dyn EmbeddingProvider) {}
    }
}
