//! The document store capability.
//!
//! [`DocumentStore`] is the seam every layer implements: the base
//! [`SemanticStore`](crate::SemanticStore) and each policy wrapper
//! (chunking, deduplication, temporal boost, persistence). Wrappers hold an
//! inner `S: DocumentStore<M>` and delegate to it, so policies stack in any
//! order.
//!
//! All methods take `&self`; implementations use interior mutability and
//! never hold a lock across an `.await`.

use async_trait::async_trait;
use semdex_core::Result;
use std::sync::Arc;

use crate::types::{AddOutcome, Document, DocumentHit, Metadata, SearchOptions, StoredDocument};

/// Text-level document operations over a vector index.
#[async_trait]
pub trait DocumentStore<M: Metadata>: Send + Sync {
    /// Embed and store a document, overwriting any entry with the same id.
    async fn add_document(&self, document: Document<M>) -> Result<AddOutcome>;

    /// Add several documents, returning their outcomes in input order.
    ///
    /// Default implementation calls `add_document` for each document in
    /// order. Not atomic: an error leaves earlier documents stored.
    /// Implementations that embed in one batch drop documents the embedder
    /// returned no vector for, so the result may be shorter than the input.
    async fn add_documents(&self, documents: Vec<Document<M>>) -> Result<Vec<AddOutcome>> {
        let mut outcomes = Vec::with_capacity(documents.len());
        for document in documents {
            outcomes.push(self.add_document(document).await?);
        }
        Ok(outcomes)
    }

    /// Embed `query` and return the ranked matches.
    async fn search(&self, query: &str, options: SearchOptions<M>) -> Result<Vec<DocumentHit<M>>>;

    /// Remove a document. Returns whether anything was removed.
    async fn remove(&self, id: &str) -> Result<bool>;

    /// Remove every document.
    async fn clear(&self) -> Result<()>;

    /// Look up a stored document.
    fn get(&self, id: &str) -> Option<StoredDocument<M>>;

    /// All stored ids, in no particular order.
    fn ids(&self) -> Vec<String>;

    /// Number of stored documents (chunks count individually).
    fn len(&self) -> usize;

    /// Whether the store is empty.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether the embedding provider is ready.
    fn is_initialized(&self) -> bool;

    /// Every stored document, in no particular order.
    fn export(&self) -> Vec<StoredDocument<M>>;

    /// Upsert documents with precomputed vectors. Idempotent.
    fn import(&self, documents: Vec<StoredDocument<M>>);
}

macro_rules! delegate_document_store {
    ($wrapper:ident) => {
        #[async_trait]
        impl<M, S> DocumentStore<M> for $wrapper<S>
        where
            M: Metadata,
            S: DocumentStore<M> + ?Sized,
        {
            async fn add_document(&self, document: Document<M>) -> Result<AddOutcome> {
                (**self).add_document(document).await
            }

            async fn add_documents(&self, documents: Vec<Document<M>>) -> Result<Vec<AddOutcome>> {
                (**self).add_documents(documents).await
            }

            async fn search(
                &self,
                query: &str,
                options: SearchOptions<M>,
            ) -> Result<Vec<DocumentHit<M>>> {
                (**self).search(query, options).await
            }

            async fn remove(&self, id: &str) -> Result<bool> {
                (**self).remove(id).await
            }

            async fn clear(&self) -> Result<()> {
                (**self).clear().await
            }

            fn get(&self, id: &str) -> Option<StoredDocument<M>> {
                (**self).get(id)
            }

            fn ids(&self) -> Vec<String> {
                (**self).ids()
            }

            fn len(&self) -> usize {
                (**self).len()
            }

            fn is_initialized(&self) -> bool {
                (**self).is_initialized()
            }

            fn export(&self) -> Vec<StoredDocument<M>> {
                (**self).export()
            }

            fn import(&self, documents: Vec<StoredDocument<M>>) {
                (**self).import(documents)
            }
        }
    };
}

delegate_document_store!(Box);
delegate_document_store!(Arc);
