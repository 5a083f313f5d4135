//! Exact and fuzzy duplicate suppression.
//!
//! [`DedupStore`] keeps a map from canonical text (see
//! [`canonicalize`](semdex_core::canonicalize)) to the id that owns it.
//! An add is skipped when its canonical text is already owned, or, with a
//! fuzzy threshold above zero, when the closest stored document is at least
//! that similar. Skips are reported through [`AddOutcome::Skipped`].
//!
//! A document stored as chunks owns its whole text under its own id, and
//! each chunk owns its chunk text. Rebuilding after an import restores the
//! whole text by rejoining the chunks.

use async_trait::async_trait;
use semdex_core::{Result, StoreConfig, canonicalize};
use std::collections::HashMap;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::chunking::{chunk_id, rejoin_chunks, split_chunk_id};
use crate::store::DocumentStore;
use crate::types::{
    AddOutcome, Document, DocumentHit, Metadata, SearchOptions, SkipReason, StoredDocument,
};

/// Canonical texts and their owners, indexed both ways.
#[derive(Debug, Default)]
struct TextIndex {
    owners: HashMap<String, String>,
    texts: HashMap<String, Vec<String>>,
}

impl TextIndex {
    fn owner(&self, canonical: &str) -> Option<&String> {
        self.owners.get(canonical)
    }

    fn len(&self) -> usize {
        self.owners.len()
    }

    fn insert(&mut self, owner: &str, canonical: String) {
        let previous = self.owners.insert(canonical.clone(), owner.to_string());
        if previous.as_deref() == Some(owner) {
            return;
        }
        self.texts.entry(owner.to_string()).or_default().push(canonical);
    }

    /// Drop every text `owner` still owns.
    fn release(&mut self, owner: &str) {
        let Some(texts) = self.texts.remove(owner) else {
            return;
        };
        for text in texts {
            if self.owners.get(&text).is_some_and(|o| o == owner) {
                self.owners.remove(&text);
            }
        }
    }

    /// Release `id` and every chunk of it.
    fn release_with_chunks(&mut self, id: &str) {
        self.release(id);
        // Chunk ids are contiguous from zero.
        let mut index = 0;
        loop {
            let chunk = chunk_id(id, index);
            if !self.texts.contains_key(&chunk) {
                break;
            }
            self.release(&chunk);
            index += 1;
        }
    }

    fn clear(&mut self) {
        self.owners.clear();
        self.texts.clear();
    }
}

/// Document store wrapper that skips duplicate documents.
#[derive(Debug)]
pub struct DedupStore<S> {
    inner: S,
    exact: bool,
    similarity_threshold: f32,
    normalized: RwLock<TextIndex>,
}

impl<S> DedupStore<S> {
    /// Wrap `inner` using the dedup settings from `config`.
    pub fn new(inner: S, config: &StoreConfig) -> Self {
        Self {
            inner,
            exact: config.deduplicate_exact,
            similarity_threshold: config.deduplicate_similarity,
            normalized: RwLock::new(TextIndex::default()),
        }
    }

    /// The wrapped store.
    pub fn inner(&self) -> &S {
        &self.inner
    }

    /// Id owning the canonical form of `text`, if any.
    pub fn find_exact(&self, text: &str) -> Option<String> {
        self.read().owner(&canonicalize(text)).cloned()
    }

    /// Number of canonical texts tracked.
    pub fn normalized_len(&self) -> usize {
        self.read().len()
    }

    fn read(&self) -> RwLockReadGuard<'_, TextIndex> {
        self.normalized.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, TextIndex> {
        self.normalized.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn exact_duplicate(&self, canonical: &str) -> Option<SkipReason> {
        if !self.exact {
            return None;
        }
        self.read()
            .owner(canonical)
            .map(|existing_id| SkipReason::ExactDuplicate {
                existing_id: existing_id.clone(),
            })
    }
}

impl<S> DedupStore<S> {
    async fn similar_duplicate<M>(&self, text: &str) -> Result<Option<SkipReason>>
    where
        M: Metadata,
        S: DocumentStore<M>,
    {
        // A zero threshold disables the fuzzy check.
        if self.similarity_threshold <= 0.0 || self.inner.is_empty() {
            return Ok(None);
        }

        let options = SearchOptions::new()
            .with_limit(1)
            .with_min_similarity(self.similarity_threshold)
            .with_temporal_boost(false);
        let hits = self.inner.search(text, options).await?;

        Ok(hits.into_iter().next().map(|hit| SkipReason::SimilarDuplicate {
            existing_id: hit.id,
            similarity: hit.similarity,
        }))
    }

    async fn check<M>(&self, document: &Document<M>, canonical: &str) -> Result<Option<SkipReason>>
    where
        M: Metadata,
        S: DocumentStore<M>,
    {
        if let Some(reason) = self.exact_duplicate(canonical) {
            return Ok(Some(reason));
        }
        self.similar_duplicate::<M>(&document.text).await
    }

    /// Record the texts of a freshly stored document, replacing whatever an
    /// earlier version of `id` owned.
    fn record<M>(&self, id: &str, canonical: String, outcome: &AddOutcome)
    where
        M: Metadata,
        S: DocumentStore<M>,
    {
        let AddOutcome::Added { ids } = outcome else {
            return;
        };

        let chunk_texts: Vec<(String, String)> = ids
            .iter()
            .filter(|stored| stored.as_str() != id)
            .filter_map(|stored| {
                let doc = self.inner.get(stored)?;
                Some((stored.clone(), canonicalize(&doc.text)))
            })
            .collect();

        let mut index = self.write();
        index.release_with_chunks(id);
        index.insert(id, canonical);
        for (chunk, text) in chunk_texts {
            index.insert(&chunk, text);
        }
    }

    fn rebuild<M>(&self)
    where
        M: Metadata,
        S: DocumentStore<M>,
    {
        let mut rebuilt = TextIndex::default();
        let mut chunked: HashMap<String, Vec<(usize, String)>> = HashMap::new();

        for doc in self.inner.export() {
            rebuilt.insert(&doc.id, canonicalize(&doc.text));
            if let Some((parent, index)) = split_chunk_id(&doc.id) {
                chunked
                    .entry(parent.to_string())
                    .or_default()
                    .push((index, doc.text));
            }
        }

        for (parent, mut chunks) in chunked {
            if self.inner.get(&parent).is_some() {
                continue;
            }
            chunks.sort_by_key(|(index, _)| *index);
            let texts: Vec<&str> = chunks.iter().map(|(_, text)| text.as_str()).collect();
            rebuilt.insert(&parent, canonicalize(&rejoin_chunks(&texts)));
        }

        log::debug!("Rebuilt normalized-text index ({} entries)", rebuilt.len());
        *self.write() = rebuilt;
    }
}

#[async_trait]
impl<M, S> DocumentStore<M> for DedupStore<S>
where
    M: Metadata,
    S: DocumentStore<M>,
{
    async fn add_document(&self, document: Document<M>) -> Result<AddOutcome> {
        let canonical = canonicalize(&document.text);
        if let Some(reason) = self.check(&document, &canonical).await? {
            log::debug!("Skipping duplicate '{}': {:?}", document.id, reason);
            return Ok(AddOutcome::Skipped(reason));
        }

        let id = document.id.clone();
        let outcome = self.inner.add_document(document).await?;
        self.record::<M>(&id, canonical, &outcome);
        Ok(outcome)
    }

    async fn add_documents(&self, documents: Vec<Document<M>>) -> Result<Vec<AddOutcome>> {
        let mut slots: Vec<Option<AddOutcome>> = Vec::with_capacity(documents.len());
        let mut accepted: Vec<(usize, String, String)> = Vec::new();
        let mut batch = Vec::new();
        let mut pending: HashMap<String, String> = HashMap::new();

        // Fuzzy checks only see documents already stored, not earlier
        // members of this batch.
        for document in documents {
            let canonical = canonicalize(&document.text);
            let skip = match pending.get(&canonical).filter(|_| self.exact) {
                Some(existing_id) => Some(SkipReason::ExactDuplicate {
                    existing_id: existing_id.clone(),
                }),
                None => self.check(&document, &canonical).await?,
            };

            if let Some(reason) = skip {
                log::debug!("Skipping duplicate '{}': {:?}", document.id, reason);
                slots.push(Some(AddOutcome::Skipped(reason)));
                continue;
            }

            pending.insert(canonical.clone(), document.id.clone());
            accepted.push((slots.len(), canonical, document.id.clone()));
            slots.push(None);
            batch.push(document);
        }

        if !batch.is_empty() {
            let outcomes = self.inner.add_documents(batch).await?;
            for ((slot, canonical, id), outcome) in accepted.into_iter().zip(outcomes) {
                self.record::<M>(&id, canonical, &outcome);
                slots[slot] = Some(outcome);
            }
        }

        Ok(slots.into_iter().flatten().collect())
    }

    async fn search(&self, query: &str, options: SearchOptions<M>) -> Result<Vec<DocumentHit<M>>> {
        self.inner.search(query, options).await
    }

    async fn remove(&self, id: &str) -> Result<bool> {
        let removed = self.inner.remove(id).await?;
        if removed {
            let mut index = self.write();
            index.release_with_chunks(id);
            // A parent missing one of its chunks no longer holds its whole text.
            if let Some((parent, _)) = split_chunk_id(id) {
                index.release(parent);
            }
        }
        Ok(removed)
    }

    async fn clear(&self) -> Result<()> {
        self.inner.clear().await?;
        self.write().clear();
        Ok(())
    }

    fn get(&self, id: &str) -> Option<StoredDocument<M>> {
        self.inner.get(id)
    }

    fn ids(&self) -> Vec<String> {
        self.inner.ids()
    }

    fn len(&self) -> usize {
        self.inner.len()
    }

    fn is_initialized(&self) -> bool {
        self.inner.is_initialized()
    }

    fn export(&self) -> Vec<StoredDocument<M>> {
        self.inner.export()
    }

    fn import(&self, documents: Vec<StoredDocument<M>>) {
        self.inner.import(documents);
        self.rebuild::<M>();
    }
}

// ============================================================================
// Tests
// ============================================================================
