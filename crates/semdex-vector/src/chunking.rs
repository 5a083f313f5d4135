//! Long-document chunking.
//!
//! [`ChunkingStore`] splits documents whose estimated token count exceeds
//! `max_chunk_tokens` into overlapping runs of whole sentences and stores
//! each run as its own document. Chunk ids are `{parent}#chunk{n}`; a
//! document that yields a single chunk keeps its own id and text.

use async_trait::async_trait;
use semdex_core::{Result, StoreConfig, estimate_tokens, split_sentences};
use std::collections::HashSet;

use crate::store::DocumentStore;
use crate::types::{AddOutcome, Document, DocumentHit, Metadata, SearchOptions, StoredDocument};

/// Separator between a parent id and its chunk index.
pub const CHUNK_ID_SEPARATOR: &str = "#chunk";

/// Id of the `index`-th chunk of `parent_id`.
pub fn chunk_id(parent_id: &str, index: usize) -> String {
    format!("{parent_id}{CHUNK_ID_SEPARATOR}{index}")
}

/// Whether `candidate` is a chunk id derived from `parent_id`.
pub fn is_chunk_of(candidate: &str, parent_id: &str) -> bool {
    candidate
        .strip_prefix(parent_id)
        .and_then(|rest| rest.strip_prefix(CHUNK_ID_SEPARATOR))
        .is_some_and(|n| !n.is_empty() && n.bytes().all(|b| b.is_ascii_digit()))
}

/// Parent id and chunk index encoded in a chunk id.
pub fn split_chunk_id(candidate: &str) -> Option<(&str, usize)> {
    let (parent, index) = candidate.rsplit_once(CHUNK_ID_SEPARATOR)?;
    if index.is_empty() || !index.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    Some((parent, index.parse().ok()?))
}

/// Split `text` into chunks of at most roughly `max_tokens` estimated tokens.
///
/// Sentences are packed greedily. When the next sentence would push the
/// running estimate over `max_tokens`, the chunk is closed and the next one
/// starts with the last `floor(overlap / max_tokens * sentences)` sentences
/// of the closed chunk (at least one). A single sentence longer than
/// `max_tokens` becomes an oversized chunk of its own.
///
/// Text within the budget, or with `max_tokens == 0`, comes back as one
/// chunk.
pub fn chunk_text(text: &str, max_tokens: usize, overlap: usize) -> Vec<String> {
    if max_tokens == 0 || estimate_tokens(text) <= max_tokens {
        return vec![text.to_string()];
    }

    let sentences = split_sentences(text);
    if sentences.len() <= 1 {
        return vec![text.to_string()];
    }

    let overlap_ratio = overlap as f64 / max_tokens as f64;
    let mut chunks = Vec::new();
    let mut current: Vec<&str> = Vec::new();
    let mut current_tokens = 0;

    for sentence in sentences {
        let tokens = estimate_tokens(sentence);
        if !current.is_empty() && current_tokens + tokens > max_tokens {
            chunks.push(current.join(" "));

            let dropped = current.len() - overlap_sentences(overlap_ratio, current.len());
            current.drain(..dropped);
            current_tokens = current.iter().map(|s| estimate_tokens(s)).sum();
        }
        current.push(sentence);
        current_tokens += tokens;
    }

    if !current.is_empty() {
        chunks.push(current.join(" "));
    }
    chunks
}

/// Number of trailing sentences carried into the next chunk.
///
/// Never the whole chunk when it has more than one sentence, so every chunk
/// advances past its predecessor.
fn overlap_sentences(ratio: f64, count: usize) -> usize {
    let wanted = (ratio * count as f64).floor() as usize;
    wanted.clamp(1, count.saturating_sub(1).max(1))
}

/// Rebuild the sentence sequence of a chunked text from its chunks, in
/// chunk order.
///
/// Consecutive chunks share at least one sentence and each adds at least one
/// new one; the longest such shared run is dropped from the later chunk. The
/// result is the original text up to whitespace between sentences, so its
/// canonical form matches the original's.
pub fn rejoin_chunks<S: AsRef<str>>(chunks: &[S]) -> String {
    let mut sentences: Vec<&str> = Vec::new();

    for chunk in chunks {
        let next = split_sentences(chunk.as_ref());
        let max_shared = sentences.len().min(next.len().saturating_sub(1));
        let shared = (1..=max_shared)
            .rev()
            .find(|&k| sentences[sentences.len() - k..] == next[..k])
            .unwrap_or(0);
        sentences.extend_from_slice(&next[shared..]);
    }
    sentences.join(" ")
}

/// Split a document into chunk documents.
///
/// Returns the document untouched when it fits in one chunk. Otherwise each
/// chunk gets id `{parent}#chunk{n}` and the parent's metadata with chunk
/// lineage merged over it.
pub fn chunk_document<M: Metadata>(
    document: Document<M>,
    max_tokens: usize,
    overlap: usize,
) -> Vec<Document<M>> {
    let chunks = chunk_text(&document.text, max_tokens, overlap);
    if chunks.len() <= 1 {
        return vec![document];
    }

    let parent = document.metadata.unwrap_or_default();
    chunks
        .into_iter()
        .enumerate()
        .map(|(index, text)| Document {
            id: chunk_id(&document.id, index),
            text,
            metadata: Some(parent.for_chunk(&document.id, index)),
        })
        .collect()
}

/// Merge per-chunk outcomes into one outcome for the parent.
fn merge_outcomes(outcomes: Vec<AddOutcome>) -> Option<AddOutcome> {
    let mut ids = Vec::new();
    let mut first_skip = None;

    for outcome in outcomes {
        match outcome {
            AddOutcome::Added { ids: added } => ids.extend(added),
            AddOutcome::Skipped(reason) => {
                first_skip.get_or_insert(reason);
            }
        }
    }

    if !ids.is_empty() {
        Some(AddOutcome::Added { ids })
    } else {
        first_skip.map(AddOutcome::Skipped)
    }
}

/// Document store wrapper that chunks long documents.
#[derive(Debug)]
pub struct ChunkingStore<S> {
    inner: S,
    enabled: bool,
    max_tokens: usize,
    overlap: usize,
}

impl<S> ChunkingStore<S> {
    /// Wrap `inner` using the chunking settings from `config`.
    pub fn new(inner: S, config: &StoreConfig) -> Self {
        Self {
            inner,
            enabled: config.auto_chunk,
            max_tokens: config.max_chunk_tokens,
            overlap: config.chunk_overlap,
        }
    }

    /// The wrapped store.
    pub fn inner(&self) -> &S {
        &self.inner
    }

    fn split<M: Metadata>(&self, document: Document<M>) -> Vec<Document<M>> {
        if self.enabled {
            chunk_document(document, self.max_tokens, self.overlap)
        } else {
            vec![document]
        }
    }

    /// Remove what an earlier version of `parent_id` left behind once its
    /// replacement is stored as `kept`.
    async fn prune_stale<M>(&self, parent_id: &str, kept: &[String]) -> Result<()>
    where
        M: Metadata,
        S: DocumentStore<M>,
    {
        let chunked = kept.first().is_some_and(|id| id != parent_id);
        if chunked && self.inner.get(parent_id).is_some() {
            self.inner.remove(parent_id).await?;
        }

        // Chunk ids are contiguous from zero.
        let mut index = if chunked { kept.len() } else { 0 };
        loop {
            let stale = chunk_id(parent_id, index);
            if self.inner.get(&stale).is_none() {
                break;
            }
            log::debug!("Removing stale chunk '{stale}'");
            self.inner.remove(&stale).await?;
            index += 1;
        }
        Ok(())
    }
}

#[async_trait]
impl<M, S> DocumentStore<M> for ChunkingStore<S>
where
    M: Metadata,
    S: DocumentStore<M>,
{
    async fn add_document(&self, document: Document<M>) -> Result<AddOutcome> {
        let parent_id = document.id.clone();
        let mut chunks = self.split(document);

        let outcome = if chunks.len() == 1
            && let Some(chunk) = chunks.pop()
        {
            self.inner.add_document(chunk).await?
        } else {
            log::debug!("Split '{}' into {} chunks", parent_id, chunks.len());
            let outcomes = self.inner.add_documents(chunks).await?;
            merge_outcomes(outcomes).unwrap_or(AddOutcome::Added { ids: Vec::new() })
        };

        if let AddOutcome::Added { ids } = &outcome {
            self.prune_stale::<M>(&parent_id, ids).await?;
        }
        Ok(outcome)
    }

    async fn add_documents(&self, documents: Vec<Document<M>>) -> Result<Vec<AddOutcome>> {
        let mut groups = Vec::with_capacity(documents.len());
        let mut chunks = Vec::new();
        for document in documents {
            let parent_id = document.id.clone();
            let split = self.split(document);
            groups.push((parent_id, split.len()));
            chunks.extend(split);
        }

        let mut outcomes = self.inner.add_documents(chunks).await?.into_iter();
        let mut merged = Vec::with_capacity(groups.len());
        for (parent_id, count) in groups {
            let group: Vec<AddOutcome> = outcomes.by_ref().take(count).collect();
            let Some(outcome) = merge_outcomes(group) else {
                break;
            };
            if let AddOutcome::Added { ids } = &outcome {
                self.prune_stale::<M>(&parent_id, ids).await?;
            }
            merged.push(outcome);
        }
        Ok(merged)
    }

    async fn search(&self, query: &str, options: SearchOptions<M>) -> Result<Vec<DocumentHit<M>>> {
        self.inner.search(query, options).await
    }

    async fn remove(&self, id: &str) -> Result<bool> {
        let mut removed = self.inner.remove(id).await?;

        let siblings: HashSet<String> = self
            .inner
            .ids()
            .into_iter()
            .filter(|candidate| is_chunk_of(candidate, id))
            .collect();

        for sibling in siblings {
            removed |= self.inner.remove(&sibling).await?;
        }
        Ok(removed)
    }

    async fn clear(&self) -> Result<()> {
        self.inner.clear().await
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
        self.inner.import(documents)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::MockEmbeddingProvider;
    use crate::semantic::SemanticStore;
    use crate::types::{DocumentMetadata, SkipReason};
    use std::sync::Arc;

    // Sentence estimates: 4, 4, 5, 5 tokens (17 for the whole text).
    const FOUR_SENTENCES: &str =
        "One two three. Four five six. Seven eight nine. Ten eleven twelve.";

    fn chunking_store(max_tokens: usize) -> ChunkingStore<SemanticStore> {
        let config = StoreConfig::default().with_chunking(max_tokens, 5);
        let semantic = SemanticStore::new(Arc::new(MockEmbeddingProvider::new(16)), config.clone());
        ChunkingStore::new(semantic, &config)
    }

    // ------------------------------------------------------------------------
    // chunk_text
    // ------------------------------------------------------------------------

    #[test]
    fn test_short_text_is_one_chunk() {
        assert_eq!(chunk_text("Short. Text.", 500, 50), vec!["Short. Text."]);
    }

    #[test]
    fn test_chunks_overlap_by_one_sentence() {
        let chunks = chunk_text(FOUR_SENTENCES, 10, 5);
        assert_eq!(
            chunks,
            vec![
                "One two three. Four five six.",
                "Four five six. Seven eight nine.",
                "Seven eight nine. Ten eleven twelve.",
            ]
        );
    }

    #[test]
    fn test_zero_overlap_still_keeps_one_sentence() {
        assert_eq!(chunk_text(FOUR_SENTENCES, 10, 0), chunk_text(FOUR_SENTENCES, 10, 5));
    }

    #[test]
    fn test_full_overlap_still_advances() {
        let chunks = chunk_text(FOUR_SENTENCES, 10, 10);
        assert!(chunks.len() > 1);
        assert!(chunks.last().unwrap().ends_with("Ten eleven twelve."));
        assert!(chunks.len() < 10);
    }

    #[test]
    fn test_single_long_sentence_is_not_split() {
        let text = "word ".repeat(40);
        assert_eq!(chunk_text(&text, 10, 5), vec![text.clone()]);
    }

    #[test]
    fn test_zero_budget_disables_splitting() {
        assert_eq!(chunk_text(FOUR_SENTENCES, 0, 5).len(), 1);
    }

    #[test]
    fn test_is_chunk_of() {
        assert!(is_chunk_of("doc#chunk0", "doc"));
        assert!(is_chunk_of("doc#chunk12", "doc"));
        assert!(!is_chunk_of("doc", "doc"));
        assert!(!is_chunk_of("doc#chunk", "doc"));
        assert!(!is_chunk_of("doc2#chunk0", "doc"));
        assert!(!is_chunk_of("doc#chunk1#chunk0", "doc"));
    }

    #[test]
    fn test_overlap_sentences_bounds() {
        assert_eq!(overlap_sentences(0.0, 4), 1);
        assert_eq!(overlap_sentences(0.5, 4), 2);
        assert_eq!(overlap_sentences(1.0, 4), 3);
        assert_eq!(overlap_sentences(1.0, 1), 1);
    }

    // ------------------------------------------------------------------------
    // chunk_document
    // ------------------------------------------------------------------------

    #[test]
    fn test_chunk_document_ids_and_lineage() {
        let doc = Document::new("doc", FOUR_SENTENCES)
            .with_metadata(DocumentMetadata::new().with_attribute("src", "a"));
        let chunks = chunk_document(doc, 10, 5);

        assert_eq!(chunks.len(), 3);
        for (i, chunk) in chunks.iter().enumerate() {
            assert_eq!(chunk.id, format!("doc#chunk{i}"));
            let meta = chunk.metadata.as_ref().unwrap();
            assert_eq!(meta.chunk_index, Some(i));
            assert_eq!(meta.parent_id.as_deref(), Some("doc"));
            assert!(meta.attribute("src").is_some());
        }
    }

    #[test]
    fn test_chunk_document_single_chunk_unchanged() {
        let doc: Document<DocumentMetadata> = Document::new("doc", "tiny");
        assert_eq!(chunk_document(doc.clone(), 10, 5), vec![doc]);
    }

    #[test]
    fn test_merge_outcomes() {
        let skip = SkipReason::ExactDuplicate {
            existing_id: "x".to_string(),
        };
        assert_eq!(
            merge_outcomes(vec![AddOutcome::added("a"), AddOutcome::Skipped(skip.clone())]),
            Some(AddOutcome::Added {
                ids: vec!["a".to_string()]
            })
        );
        assert_eq!(
            merge_outcomes(vec![AddOutcome::Skipped(skip.clone())]),
            Some(AddOutcome::Skipped(skip))
        );
        assert_eq!(merge_outcomes(Vec::new()), None);
    }

    // ------------------------------------------------------------------------
    // ChunkingStore
    // ------------------------------------------------------------------------

    #[tokio::test]
    async fn test_store_adds_chunks() {
        let store = chunking_store(10);
        let outcome = store
            .add_document(Document::new("doc", FOUR_SENTENCES))
            .await
            .unwrap();

        assert_eq!(outcome.ids().len(), 3);
        assert_eq!(store.len(), 3);
        assert!(store.ids().iter().all(|id| id.starts_with("doc#chunk")));
        assert!(store.get("doc").is_none());
    }

    #[tokio::test]
    async fn test_store_disabled_passes_through() {
        let config = StoreConfig::default();
        let semantic: SemanticStore = SemanticStore::new(Arc::new(MockEmbeddingProvider::new(16)), config.clone());
        let store = ChunkingStore::new(semantic, &config);

        store
            .add_document(Document::new("doc", FOUR_SENTENCES))
            .await
            .unwrap();
        assert_eq!(store.ids(), vec!["doc".to_string()]);
    }

    #[tokio::test]
    async fn test_store_add_documents_groups_by_parent() {
        let store = chunking_store(10);
        let outcomes = store
            .add_documents(vec![
                Document::new("long", FOUR_SENTENCES),
                Document::new("short", "Brief."),
            ])
            .await
            .unwrap();

        assert_eq!(outcomes.len(), 2);
        assert_eq!(outcomes[0].ids().len(), 3);
        assert_eq!(outcomes[1], AddOutcome::added("short"));
        assert_eq!(store.len(), 4);
    }

    #[tokio::test]
    async fn test_remove_parent_removes_chunks() {
        let store = chunking_store(10);
        store
            .add_document(Document::new("doc", FOUR_SENTENCES))
            .await
            .unwrap();
        store
            .add_document(Document::new("doc2", "Unrelated."))
            .await
            .unwrap();

        assert!(store.remove("doc").await.unwrap());
        assert_eq!(store.ids(), vec!["doc2".to_string()]);
        assert!(!store.remove("doc").await.unwrap());
    }

    #[tokio::test]
    async fn test_remove_single_chunk_by_id() {
        let store = chunking_store(10);
        store
            .add_document(Document::new("doc", FOUR_SENTENCES))
            .await
            .unwrap();

        assert!(store.remove("doc#chunk1").await.unwrap());
        assert_eq!(store.len(), 2);
    }

    #[tokio::test]
    async fn test_readd_as_single_document_drops_old_chunks() {
        let store = chunking_store(10);
        store
            .add_document(Document::new("doc", FOUR_SENTENCES))
            .await
            .unwrap();

        let outcome = store
            .add_document(Document::new("doc", "Replacement."))
            .await
            .unwrap();
        assert_eq!(outcome, AddOutcome::added("doc"));
        assert_eq!(store.ids(), vec!["doc".to_string()]);
    }

    #[tokio::test]
    async fn test_readd_with_fewer_chunks_drops_tail() {
        let store = chunking_store(10);
        let long = format!("{FOUR_SENTENCES} Thirteen fourteen fifteen. Sixteen seventeen.");
        store.add_document(Document::new("doc", long)).await.unwrap();
        let before = store.len();
        assert!(before > 3);

        store
            .add_document(Document::new("doc", FOUR_SENTENCES))
            .await
            .unwrap();
        let mut ids = store.ids();
        ids.sort();
        assert_eq!(ids, vec!["doc#chunk0", "doc#chunk1", "doc#chunk2"]);
    }

    #[tokio::test]
    async fn test_readd_chunked_replaces_whole_document() {
        let store = chunking_store(10);
        store.add_document(Document::new("doc", "Short.")).await.unwrap();

        store
            .add_documents(vec![Document::new("doc", FOUR_SENTENCES)])
            .await
            .unwrap();
        assert!(store.get("doc").is_none());
        assert_eq!(store.len(), 3);
    }

    // ------------------------------------------------------------------------
    // Chunk ids and rejoining
    // ------------------------------------------------------------------------

    #[test]
    fn test_split_chunk_id() {
        assert_eq!(split_chunk_id("doc#chunk3"), Some(("doc", 3)));
        assert_eq!(split_chunk_id("a#chunk1#chunk0"), Some(("a#chunk1", 0)));
        assert_eq!(split_chunk_id("doc"), None);
        assert_eq!(split_chunk_id("doc#chunkx"), None);
        assert_eq!(split_chunk_id("doc#chunk"), None);
    }

    #[test]
    fn test_rejoin_chunks_restores_sentences() {
        for (max, overlap) in [(10, 5), (10, 0), (10, 10), (9, 3)] {
            let chunks = chunk_text(FOUR_SENTENCES, max, overlap);
            assert_eq!(rejoin_chunks(&chunks), FOUR_SENTENCES, "max {max} overlap {overlap}");
        }
    }

    #[test]
    fn test_rejoin_chunks_without_overlap_match() {
        assert_eq!(rejoin_chunks(&["A b.", "C d."]), "A b. C d.");
        assert_eq!(rejoin_chunks::<&str>(&[]), "");
    }
}
