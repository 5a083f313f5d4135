//! The fully configured document store.
//!
//! [`EnhancedStore`] stacks every policy over a [`SemanticStore`]:
//!
//! ```text
//! PersistentStore      snapshot after mutations, load/save/flush
//!   └─ DedupStore      exact + fuzzy duplicate suppression
//!       └─ TemporalStore     timestamp stamping, recency re-ranking
//!           └─ ChunkingStore     sentence-packed chunks for long texts
//!               └─ SemanticStore     embeddings + VectorIndex
//! ```
//!
//! Dedup sits above chunking so duplicates are detected on whole documents,
//! before any embedding work for their chunks.

use async_trait::async_trait;
use semdex_core::{Result, StoreConfig};
use std::path::Path;
use std::sync::Arc;

use crate::chunking::ChunkingStore;
use crate::dedup::DedupStore;
use crate::embedding::EmbeddingProvider;
use crate::persistence::PersistentStore;
use crate::semantic::SemanticStore;
use crate::store::DocumentStore;
use crate::temporal::TemporalStore;
use crate::types::{
    AddOutcome, Document, DocumentHit, DocumentMetadata, Metadata, SearchOptions, StoredDocument,
};

type Stack<M> =
    PersistentStore<DedupStore<TemporalStore<ChunkingStore<SemanticStore<M>>>>, M>;

/// Document store with chunking, deduplication, recency boost and
/// persistence, each driven by [`StoreConfig`].
#[derive(Debug)]
pub struct EnhancedStore<M: Metadata = DocumentMetadata> {
    stack: Stack<M>,
    config: StoreConfig,
}

impl<M: Metadata> EnhancedStore<M> {
    /// Build the store.
    ///
    /// Fails with [`Error::Config`](semdex_core::Error::Config) when the
    /// config does not validate. No runtime is needed until the first
    /// snapshot is written.
    pub fn new(embedder: Arc<dyn EmbeddingProvider>, config: StoreConfig) -> Result<Self> {
        config.validate()?;

        let semantic = SemanticStore::new(embedder, config.clone());
        let chunking = ChunkingStore::new(semantic, &config);
        let temporal = TemporalStore::new(chunking, &config);
        let dedup = DedupStore::new(temporal, &config);
        let stack = PersistentStore::new(dedup, &config)?;

        log::debug!(
            "EnhancedStore ready (chunking: {}, exact dedup: {}, fuzzy dedup: {}, temporal: {}, auto-save: {})",
            config.auto_chunk,
            config.deduplicate_exact,
            config.similarity_dedup_enabled(),
            config.temporal_boost,
            config.auto_save
        );
        Ok(Self { stack, config })
    }

    /// The configuration this store was built with.
    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// The snapshot file, if one is configured.
    pub fn store_path(&self) -> Option<&Path> {
        self.stack.path()
    }

    /// The shared embedding provider.
    pub fn embedder(&self) -> &Arc<dyn EmbeddingProvider> {
        self.base().embedder()
    }

    /// Id owning the canonical form of `text`, if any.
    pub fn find_exact(&self, text: &str) -> Option<String> {
        self.stack.inner().find_exact(text)
    }

    /// Load the snapshot file, rebuilding the duplicate index.
    ///
    /// Returns how many records were loaded; a missing or malformed file
    /// loads nothing.
    pub async fn load(&self) -> Result<usize> {
        self.stack.load().await
    }

    /// Write a snapshot now and wait for it.
    pub async fn save(&self) -> Result<()> {
        self.stack.save().await
    }

    /// Wait for all queued auto-saves.
    pub async fn flush(&self) -> Result<()> {
        self.stack.flush().await
    }

    fn base(&self) -> &SemanticStore<M> {
        self.stack.inner().inner().inner().inner()
    }
}

#[async_trait]
impl<M: Metadata> DocumentStore<M> for EnhancedStore<M> {
    async fn add_document(&self, document: Document<M>) -> Result<AddOutcome> {
        self.stack.add_document(document).await
    }

    async fn add_documents(&self, documents: Vec<Document<M>>) -> Result<Vec<AddOutcome>> {
        self.stack.add_documents(documents).await
    }

    async fn search(&self, query: &str, options: SearchOptions<M>) -> Result<Vec<DocumentHit<M>>> {
        self.stack.search(query, options).await
    }

    async fn remove(&self, id: &str) -> Result<bool> {
        self.stack.remove(id).await
    }

    async fn clear(&self) -> Result<()> {
        self.stack.clear().await
    }

    fn get(&self, id: &str) -> Option<StoredDocument<M>> {
        self.stack.get(id)
    }

    fn ids(&self) -> Vec<String> {
        self.stack.ids()
    }

    fn len(&self) -> usize {
        self.stack.len()
    }

    fn is_initialized(&self) -> bool {
        self.stack.is_initialized()
    }

    fn export(&self) -> Vec<StoredDocument<M>> {
        self.stack.export()
    }

    fn import(&self, documents: Vec<StoredDocument<M>>) {
        self.stack.import(documents)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::MockEmbeddingProvider;
    use crate::types::SkipReason;
    use semdex_core::Error;
    use tempfile::tempdir;

    fn enhanced(config: StoreConfig) -> Result<EnhancedStore> {
        EnhancedStore::new(Arc::new(MockEmbeddingProvider::new(32)), config)
    }

    fn in_memory() -> StoreConfig {
        StoreConfig::default().with_store_path(None)
    }

    #[tokio::test]
    async fn test_rejects_invalid_config() {
        let err = enhanced(StoreConfig::default().with_chunking(0, 0)).unwrap_err();
        assert!(matches!(err, Error::Config(_)));

        let err = enhanced(in_memory().with_auto_save("x").with_store_path(None)).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_default_config_builds_without_runtime() {
        let store = enhanced(StoreConfig::default()).unwrap();
        assert!(store.store_path().is_some());
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_dedup_runs_before_chunking() {
        let text = "First sentence is here. Second sentence follows it. Third one ends.";
        let store = enhanced(in_memory().with_chunking(8, 2)).unwrap();

        let first = store.add_document(Document::new("a", text)).await.unwrap();
        assert!(first.ids().len() > 1);
        let chunks = store.len();

        let second = store
            .add_document(Document::new("b", text.to_uppercase()))
            .await
            .unwrap();
        assert_eq!(
            second,
            AddOutcome::Skipped(SkipReason::ExactDuplicate {
                existing_id: "a".to_string()
            })
        );
        assert_eq!(store.len(), chunks);
    }

    #[tokio::test]
    async fn test_remove_chunked_parent_releases_text() {
        let text = "First sentence is here. Second sentence follows it. Third one ends.";
        let store = enhanced(in_memory().with_chunking(8, 2)).unwrap();
        store.add_document(Document::new("a", text)).await.unwrap();

        assert!(store.remove("a").await.unwrap());
        assert!(store.is_empty());
        assert_eq!(store.find_exact(text), None);
        assert!(
            store
                .add_document(Document::new("a2", text))
                .await
                .unwrap()
                .is_added()
        );
    }

    #[tokio::test]
    async fn test_temporal_stamps_through_stack() {
        let store = enhanced(in_memory().with_temporal_boost(true)).unwrap();
        store.add_document(Document::new("a", "dated")).await.unwrap();
        assert!(store.get("a").unwrap().metadata.unwrap().timestamp.is_some());
    }

    #[tokio::test]
    async fn test_persist_and_reload_rebuilds_dedup() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("store.json");

        let store = enhanced(StoreConfig::default().with_auto_save(&path)).unwrap();
        assert_eq!(store.store_path(), Some(path.as_path()));
        store.add_document(Document::new("a", "Persisted Text")).await.unwrap();
        store.flush().await.unwrap();

        let reloaded = enhanced(StoreConfig::default().with_auto_save(&path)).unwrap();
        assert_eq!(reloaded.load().await.unwrap(), 1);
        assert_eq!(reloaded.find_exact("persisted text"), Some("a".to_string()));
        assert!(
            reloaded
                .add_document(Document::new("b", "persisted   TEXT"))
                .await
                .unwrap()
                .is_skipped()
        );
    }

    #[tokio::test]
    async fn test_embedder_and_config_accessors() {
        let store = enhanced(in_memory().with_default_limit(3)).unwrap();
        assert_eq!(store.config().default_limit, 3);
        assert_eq!(store.embedder().name(), "mock");
        assert!(store.is_initialized());
        assert!(store.store_path().is_none());
    }

    #[tokio::test]
    async fn test_chunked_text_stays_deduplicated_after_reload() {
        let text = "First sentence is here. Second sentence follows it. Third one ends.";
        let dir = tempdir().unwrap();
        let path = dir.path().join("store.json");
        let config = StoreConfig::default()
            .with_store_path(Some(path))
            .with_chunking(8, 2);

        let store = enhanced(config.clone()).unwrap();
        store.add_document(Document::new("a", text)).await.unwrap();
        assert!(
            store
                .add_document(Document::new("b", text))
                .await
                .unwrap()
                .is_skipped()
        );
        store.save().await.unwrap();
        let stored = store.len();

        let reloaded = enhanced(config).unwrap();
        assert_eq!(reloaded.load().await.unwrap(), stored);
        let outcome = reloaded.add_document(Document::new("b", text)).await.unwrap();
        assert_eq!(
            outcome,
            AddOutcome::Skipped(SkipReason::ExactDuplicate {
                existing_id: "a".to_string()
            })
        );
        assert_eq!(reloaded.len(), stored);
    }

    #[tokio::test]
    async fn test_readding_chunked_id_leaves_no_stale_chunks() {
        let text = "First sentence is here. Second sentence follows it. Third one ends.";
        let store = enhanced(in_memory().with_chunking(8, 2)).unwrap();
        store.add_document(Document::new("doc", text)).await.unwrap();
        assert!(store.len() > 1);

        store
            .add_document(Document::new("doc", "Replacement."))
            .await
            .unwrap();
        assert_eq!(store.ids(), vec!["doc".to_string()]);

        let hits = store
            .search(text, SearchOptions::new().with_min_similarity(-1.0))
            .await
            .unwrap();
        assert!(hits.iter().all(|hit| hit.id == "doc"));
    }
}
