//! Exact cosine-similarity vector index.
//!
//! [`VectorIndex`] maps ids to vectors plus optional metadata and answers
//! queries with a full linear scan. There is no ANN structure: every stored
//! entry is compared on every search.
//!
//! Vectors of different lengths may coexist in the index. Searching with a
//! query whose length differs from any scanned entry fails with
//! [`Error::DimensionMismatch`](semdex_core::Error::DimensionMismatch).

use semdex_core::{Result, StoreConfig, cosine_similarity};
use std::collections::HashMap;

use crate::types::{IndexHit, SearchOptions, VectorRecord};

/// Stored vector and payload for one id.
#[derive(Debug, Clone, PartialEq)]
struct Entry<M> {
    vector: Vec<f32>,
    metadata: Option<M>,
}

/// In-memory associative vector store with ranked similarity search.
#[derive(Debug, Clone)]
pub struct VectorIndex<M> {
    entries: HashMap<String, Entry<M>>,
    min_similarity: f32,
    default_limit: usize,
}

impl<M> Default for VectorIndex<M> {
    fn default() -> Self {
        let config = StoreConfig::default();
        Self {
            entries: HashMap::new(),
            min_similarity: config.min_similarity,
            default_limit: config.default_limit,
        }
    }
}

impl<M: Clone> VectorIndex<M> {
    /// Create an empty index with the given search defaults.
    pub fn new(min_similarity: f32, default_limit: usize) -> Self {
        Self {
            entries: HashMap::new(),
            min_similarity,
            default_limit,
        }
    }

    /// Create an empty index using the search defaults from `config`.
    pub fn from_config(config: &StoreConfig) -> Self {
        Self::new(config.min_similarity, config.default_limit)
    }

    /// Insert or overwrite an entry.
    pub fn add(&mut self, id: impl Into<String>, vector: Vec<f32>, metadata: Option<M>) {
        self.entries.insert(id.into(), Entry { vector, metadata });
    }

    /// Apply `add` for each record in order.
    pub fn add_batch(&mut self, records: impl IntoIterator<Item = VectorRecord<M>>) {
        for record in records {
            self.add(record.id, record.vector, record.metadata);
        }
    }

    /// Ranked similarity query.
    ///
    /// Entries rejected by the filter are skipped before scoring. Hits below
    /// the threshold are dropped, the rest are sorted by similarity
    /// (descending) and truncated to the limit. Ties come out in no
    /// particular order.
    pub fn search(&self, query: &[f32], options: &SearchOptions<M>) -> Result<Vec<IndexHit<M>>> {
        let threshold = options.min_similarity.unwrap_or(self.min_similarity);
        let limit = options.limit.unwrap_or(self.default_limit);

        let mut hits = Vec::new();
        for (id, entry) in &self.entries {
            if !options.accepts(entry.metadata.as_ref()) {
                continue;
            }

            let similarity = cosine_similarity(query, &entry.vector)?;
            if similarity >= threshold {
                hits.push(IndexHit {
                    id: id.clone(),
                    similarity,
                    metadata: entry.metadata.clone(),
                });
            }
        }

        hits.sort_by(|a, b| b.similarity.total_cmp(&a.similarity));
        hits.truncate(limit);
        Ok(hits)
    }

    /// Look up a record by id.
    pub fn get(&self, id: &str) -> Option<VectorRecord<M>> {
        self.entries
            .get(id)
            .map(|entry| VectorRecord::new(id, entry.vector.clone(), entry.metadata.clone()))
    }

    /// Whether `id` is stored.
    pub fn contains(&self, id: &str) -> bool {
        self.entries.contains_key(id)
    }

    /// Remove an entry. Returns whether it existed.
    pub fn remove(&mut self, id: &str) -> bool {
        self.entries.remove(id).is_some()
    }

    /// Remove every entry.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the index is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// All stored ids, in no particular order.
    pub fn keys(&self) -> Vec<String> {
        self.entries.keys().cloned().collect()
    }

    /// Every record, in no particular order.
    pub fn export(&self) -> Vec<VectorRecord<M>> {
        self.entries
            .iter()
            .map(|(id, entry)| VectorRecord::new(id, entry.vector.clone(), entry.metadata.clone()))
            .collect()
    }

    /// Upsert every record (same overwrite semantics as [`add`](Self::add)).
    pub fn import(&mut self, records: impl IntoIterator<Item = VectorRecord<M>>) {
        self.add_batch(records);
    }
}

// ============================================================================
// Tests
// ============================================================================
