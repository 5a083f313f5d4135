//! The base document layer.
//!
//! [`SemanticStore`] pairs a [`VectorIndex`] with an `id -> text` map and an
//! embedding provider. Both maps live behind one lock so they can never be
//! observed out of step: a document's vector and text are inserted and
//! removed together.
//!
//! Embedding happens before the lock is taken. Two concurrent adds may
//! therefore interleave their embedding calls, but each insertion is atomic.

use async_trait::async_trait;
use semdex_core::{Error, Result, StoreConfig};
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::embedding::EmbeddingProvider;
use crate::index::VectorIndex;
use crate::store::DocumentStore;
use crate::types::{
    AddOutcome, Document, DocumentHit, DocumentMetadata, Metadata, SearchOptions, StoredDocument,
    VectorRecord,
};

struct Inner<M> {
    index: VectorIndex<M>,
    texts: HashMap<String, String>,
}

/// Document store backed by an exact vector index.
pub struct SemanticStore<M = DocumentMetadata> {
    inner: RwLock<Inner<M>>,
    embedder: Arc<dyn EmbeddingProvider>,
}

impl<M: Metadata> SemanticStore<M> {
    /// Create an empty store using `config`'s search defaults.
    pub fn new(embedder: Arc<dyn EmbeddingProvider>, config: StoreConfig) -> Self {
        Self {
            inner: RwLock::new(Inner {
                index: VectorIndex::from_config(&config),
                texts: HashMap::new(),
            }),
            embedder,
        }
    }

    /// The shared embedding provider.
    pub fn embedder(&self) -> &Arc<dyn EmbeddingProvider> {
        &self.embedder
    }

    fn read(&self) -> RwLockReadGuard<'_, Inner<M>> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Inner<M>> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn ensure_initialized(&self) -> Result<()> {
        if self.embedder.is_initialized() {
            Ok(())
        } else {
            Err(Error::not_initialized(format!(
                "embedding provider '{}'",
                self.embedder.name()
            )))
        }
    }

    fn insert(&self, id: String, text: String, vector: Vec<f32>, metadata: Option<M>) {
        let mut inner = self.write();
        inner.index.add(id.clone(), vector, metadata);
        inner.texts.insert(id, text);
    }
}

#[async_trait]
impl<M: Metadata> DocumentStore<M> for SemanticStore<M> {
    async fn add_document(&self, document: Document<M>) -> Result<AddOutcome> {
        self.ensure_initialized()?;
        let vector = self.embedder.embed(&document.text).await?;

        log::debug!("Storing document '{}'", document.id);
        let Document { id, text, metadata } = document;
        self.insert(id.clone(), text, vector, metadata);
        Ok(AddOutcome::added(id))
    }

    async fn add_documents(&self, documents: Vec<Document<M>>) -> Result<Vec<AddOutcome>> {
        if documents.is_empty() {
            return Ok(Vec::new());
        }
        self.ensure_initialized()?;

        let texts: Vec<&str> = documents.iter().map(|d| d.text.as_str()).collect();
        let vectors = self.embedder.embed_batch(&texts).await?;
        if vectors.len() < documents.len() {
            log::debug!(
                "Embedder returned {} vectors for {} documents; skipping the rest",
                vectors.len(),
                documents.len()
            );
        }

        let mut inner = self.write();
        let mut outcomes = Vec::with_capacity(vectors.len());
        for (document, vector) in documents.into_iter().zip(vectors) {
            let Document { id, text, metadata } = document;
            inner.index.add(id.clone(), vector, metadata);
            inner.texts.insert(id.clone(), text);
            outcomes.push(AddOutcome::added(id));
        }

        log::debug!("Stored {} documents. Total: {}", outcomes.len(), inner.index.len());
        Ok(outcomes)
    }

    async fn search(&self, query: &str, options: SearchOptions<M>) -> Result<Vec<DocumentHit<M>>> {
        self.ensure_initialized()?;
        let query_vector = self.embedder.embed(query).await?;

        let inner = self.read();
        let hits = inner.index.search(&query_vector, &options)?;
        Ok(hits
            .into_iter()
            .map(|hit| DocumentHit {
                text: inner.texts.get(&hit.id).cloned().unwrap_or_default(),
                id: hit.id,
                similarity: hit.similarity,
                score: hit.similarity,
                metadata: hit.metadata,
            })
            .collect())
    }

    async fn remove(&self, id: &str) -> Result<bool> {
        let mut inner = self.write();
        inner.texts.remove(id);
        Ok(inner.index.remove(id))
    }

    async fn clear(&self) -> Result<()> {
        let mut inner = self.write();
        inner.index.clear();
        inner.texts.clear();
        Ok(())
    }

    fn get(&self, id: &str) -> Option<StoredDocument<M>> {
        let inner = self.read();
        let record = inner.index.get(id)?;
        Some(StoredDocument {
            text: inner.texts.get(id).cloned().unwrap_or_default(),
            id: record.id,
            vector: record.vector,
            metadata: record.metadata,
        })
    }

    fn ids(&self) -> Vec<String> {
        self.read().index.keys()
    }

    fn len(&self) -> usize {
        self.read().index.len()
    }

    fn is_initialized(&self) -> bool {
        self.embedder.is_initialized()
    }

    fn export(&self) -> Vec<StoredDocument<M>> {
        let inner = self.read();
        inner
            .index
            .export()
            .into_iter()
            .map(|record| StoredDocument {
                text: inner.texts.get(&record.id).cloned().unwrap_or_default(),
                id: record.id,
                vector: record.vector,
                metadata: record.metadata,
            })
            .collect()
    }

    fn import(&self, documents: Vec<StoredDocument<M>>) {
        let mut inner = self.write();
        for doc in documents {
            inner
                .index
                .add_batch([VectorRecord::new(doc.id.clone(), doc.vector, doc.metadata)]);
            inner.texts.insert(doc.id, doc.text);
        }
    }
}

impl<M> std::fmt::Debug for SemanticStore<M> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SemanticStore")
            .field("embedder", &self.embedder.name())
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Tests
// ============================================================================
