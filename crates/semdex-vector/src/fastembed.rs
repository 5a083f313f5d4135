//! FastEmbed embedding provider.
//!
//! Wraps the `fastembed` crate to provide local embedding generation
//! via pre-trained models (e.g., BGE-small, AllMiniLM).
//!
//! The model is not loaded at construction. [`EmbeddingProvider::init`]
//! downloads/loads it on a blocking thread; until then every embedding call
//! returns [`Error::NotInitialized`] and `dimension()` is `None`.
//!
//! # Feature Gate
//!
//! This module requires the `fastembed` feature.

use crate::embedding::EmbeddingProvider;
use async_trait::async_trait;
use semdex_core::{Error, Result};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, OnceLock};

/// Map a model name string to a fastembed `EmbeddingModel` enum variant.
fn resolve_model(name: &str) -> Result<fastembed::EmbeddingModel> {
    match name {
        "bge-small-en-v1.5" | "BGESmallENV15" => Ok(fastembed::EmbeddingModel::BGESmallENV15),
        "all-minilm-l6-v2" | "AllMiniLML6V2" => Ok(fastembed::EmbeddingModel::AllMiniLML6V2),
        "bge-base-en-v1.5" | "BGEBaseENV15" => Ok(fastembed::EmbeddingModel::BGEBaseENV15),
        other => Err(Error::config(format!(
            "Unknown embedding model: '{other}'. Supported: bge-small-en-v1.5, all-minilm-l6-v2, bge-base-en-v1.5"
        ))),
    }
}

struct LoadedModel {
    model: Arc<Mutex<fastembed::TextEmbedding>>,
    dimension: usize,
}

/// FastEmbed-based embedding provider with lazy model loading.
pub struct FastEmbedProvider {
    model_name: String,
    model: fastembed::EmbeddingModel,
    cache_dir: Option<PathBuf>,
    loaded: OnceLock<LoadedModel>,
    load_lock: tokio::sync::Mutex<()>,
}

impl FastEmbedProvider {
    /// Create a provider for `model_name`. Nothing is loaded yet.
    ///
    /// # Arguments
    ///
    /// * `model_name` - Model identifier (e.g., "bge-small-en-v1.5")
    /// * `cache_dir` - Optional directory for model file caching
    pub fn new(model_name: &str, cache_dir: Option<PathBuf>) -> Result<Self> {
        Ok(Self {
            model_name: model_name.to_string(),
            model: resolve_model(model_name)?,
            cache_dir,
            loaded: OnceLock::new(),
            load_lock: tokio::sync::Mutex::new(()),
        })
    }

    fn loaded(&self) -> Result<&LoadedModel> {
        self.loaded
            .get()
            .ok_or_else(|| Error::not_initialized(format!("fastembed model '{}'", self.model_name)))
    }
}

#[async_trait]
impl EmbeddingProvider for FastEmbedProvider {
    async fn init(&self) -> Result<()> {
        let _guard = self.load_lock.lock().await;
        if self.loaded.get().is_some() {
            return Ok(());
        }

        log::info!("Loading fastembed model '{}'", self.model_name);
        let mut options = fastembed::InitOptions::new(self.model.clone());
        if let Some(dir) = &self.cache_dir {
            options = options.with_cache_dir(dir.clone());
        }

        let loaded = tokio::task::spawn_blocking(move || {
            let mut text_embedding = fastembed::TextEmbedding::try_new(options)
                .map_err(|e| Error::operation(format!("Failed to initialize fastembed model: {e}")))?;

            let probe = text_embedding
                .embed(vec!["dimension probe"], None)
                .map_err(|e| Error::operation(format!("Failed to probe embedding dimension: {e}")))?;
            let dimension = probe
                .first()
                .map(|v| v.len())
                .ok_or_else(|| Error::operation("Empty probe embedding"))?;

            Ok::<_, Error>(LoadedModel {
                model: Arc::new(Mutex::new(text_embedding)),
                dimension,
            })
        })
        .await
        .map_err(|e| Error::operation(format!("spawn_blocking failed: {e}")))??;

        log::info!(
            "Loaded fastembed model '{}' (dimension {})",
            self.model_name,
            loaded.dimension
        );
        let _ = self.loaded.set(loaded);
        Ok(())
    }

    fn is_initialized(&self) -> bool {
        self.loaded.get().is_some()
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let model = Arc::clone(&self.loaded()?.model);
        let text = text.to_string();

        tokio::task::spawn_blocking(move || {
            let mut model = model
                .lock()
                .map_err(|e| Error::operation(format!("Mutex poisoned: {e}")))?;
            let results = model
                .embed(vec![text], None)
                .map_err(|e| Error::operation(format!("Embedding failed: {e}")))?;
            results
                .into_iter()
                .next()
                .ok_or_else(|| Error::operation("No embedding returned"))
        })
        .await
        .map_err(|e| Error::operation(format!("spawn_blocking failed: {e}")))?
    }

    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        let model = Arc::clone(&self.loaded()?.model);
        let texts: Vec<String> = texts.iter().map(|t| t.to_string()).collect();

        tokio::task::spawn_blocking(move || {
            let mut model = model
                .lock()
                .map_err(|e| Error::operation(format!("Mutex poisoned: {e}")))?;
            model
                .embed(texts, None)
                .map_err(|e| Error::operation(format!("Batch embedding failed: {e}")))
        })
        .await
        .map_err(|e| Error::operation(format!("spawn_blocking failed: {e}")))?
    }

    fn dimension(&self) -> Option<usize> {
        self.loaded.get().map(|m| m.dimension)
    }

    fn name(&self) -> &str {
        &self.model_name
    }
}

impl std::fmt::Debug for FastEmbedProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FastEmbedProvider")
            .field("model", &self.model_name)
            .field("dimension", &self.dimension())
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_model_known() {
        assert!(resolve_model("bge-small-en-v1.5").is_ok());
        assert!(resolve_model("all-minilm-l6-v2").is_ok());
        assert!(resolve_model("bge-base-en-v1.5").is_ok());
        assert!(resolve_model("AllMiniLML6V2").is_ok());
    }

    #[test]
    fn test_resolve_model_unknown() {
        let err = FastEmbedProvider::new("nonexistent-model", None).unwrap_err();
        assert!(err.to_string().contains("Unknown embedding model"));
    }

    #[tokio::test]
    async fn test_embed_before_init_fails() {
        let provider = FastEmbedProvider::new("bge-small-en-v1.5", None).unwrap();
        assert!(!provider.is_initialized());
        assert_eq!(provider.dimension(), None);

        let err = provider.embed("too early").await.unwrap_err();
        assert!(err.is_not_initialized());
    }

    // Integration tests requiring model download are gated with #[ignore]
    #[tokio::test]
    #[ignore = "requires model download (~50MB)"]
    async fn test_fastembed_init_and_embed() {
        let provider = FastEmbedProvider::new("bge-small-en-v1.5", None).unwrap();
        provider.init().await.unwrap();
        assert_eq!(provider.dimension(), Some(384));

        let embedding = provider.embed("Hello world").await.unwrap();
        assert_eq!(embedding.len(), 384);

        let batch = provider.embed_batch(&["Hello", "World"]).await.unwrap();
        assert_eq!(batch.len(), 2);
    }
}
