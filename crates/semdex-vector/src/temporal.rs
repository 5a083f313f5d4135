//! Recency re-ranking.
//!
//! Scores are `similarity * (0.7 + 0.3 * boost)` where
//! `boost = 1 / (1 + ln(1 + age_days))`. A brand-new (or undated) document
//! keeps its full similarity; older documents lose up to 30%.

use async_trait::async_trait;
use semdex_core::{Result, StoreConfig};

use crate::store::DocumentStore;
use crate::types::{AddOutcome, Document, DocumentHit, Metadata, SearchOptions, StoredDocument};

/// Milliseconds in a day.
pub const MS_PER_DAY: f64 = 86_400_000.0;

/// Share of the score carried by raw similarity.
pub const SIMILARITY_WEIGHT: f32 = 0.7;

/// Share of the score carried by recency.
pub const RECENCY_WEIGHT: f32 = 0.3;

/// How many extra candidates are fetched before re-ranking, as a multiple
/// of the requested limit.
pub const CANDIDATE_MULTIPLIER: usize = 3;

/// Current time in epoch milliseconds.
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Recency factor in `(0, 1]` for a document `age_days` old.
pub fn recency_boost(age_days: f64) -> f64 {
    1.0 / (1.0 + (1.0 + age_days.max(0.0)).ln())
}

/// Rescore, re-sort and truncate hits by recency as of `now_ms`.
///
/// Hits without a timestamp count as brand-new. Timestamps in the future
/// are treated as age zero.
pub fn apply_temporal_boost<M: Metadata>(
    mut hits: Vec<DocumentHit<M>>,
    now_ms: i64,
    limit: usize,
) -> Vec<DocumentHit<M>> {
    for hit in &mut hits {
        let timestamp = hit
            .metadata
            .as_ref()
            .and_then(Metadata::timestamp)
            .unwrap_or(now_ms);
        let age_days = now_ms.saturating_sub(timestamp).max(0) as f64 / MS_PER_DAY;
        let boost = recency_boost(age_days) as f32;
        hit.score = hit.similarity * (SIMILARITY_WEIGHT + RECENCY_WEIGHT * boost);
    }

    hits.sort_by(|a, b| b.score.total_cmp(&a.score));
    hits.truncate(limit);
    hits
}

/// Document store wrapper that stamps and re-ranks by recency.
#[derive(Debug)]
pub struct TemporalStore<S> {
    inner: S,
    enabled: bool,
    default_limit: usize,
}

impl<S> TemporalStore<S> {
    /// Wrap `inner` using the boost setting and default limit from `config`.
    pub fn new(inner: S, config: &StoreConfig) -> Self {
        Self {
            inner,
            enabled: config.temporal_boost,
            default_limit: config.default_limit,
        }
    }

    /// The wrapped store.
    pub fn inner(&self) -> &S {
        &self.inner
    }

    fn stamp<M: Metadata>(&self, mut document: Document<M>, now_ms: i64) -> Document<M> {
        if !self.enabled {
            return document;
        }
        let metadata = document.metadata.get_or_insert_with(M::default);
        if metadata.timestamp().is_none() {
            metadata.set_timestamp(now_ms);
        }
        document
    }
}

#[async_trait]
impl<M, S> DocumentStore<M> for TemporalStore<S>
where
    M: Metadata,
    S: DocumentStore<M>,
{
    async fn add_document(&self, document: Document<M>) -> Result<AddOutcome> {
        let document = self.stamp(document, now_millis());
        self.inner.add_document(document).await
    }

    async fn add_documents(&self, documents: Vec<Document<M>>) -> Result<Vec<AddOutcome>> {
        let now_ms = now_millis();
        let documents = documents
            .into_iter()
            .map(|document| self.stamp(document, now_ms))
            .collect();
        self.inner.add_documents(documents).await
    }

    async fn search(&self, query: &str, options: SearchOptions<M>) -> Result<Vec<DocumentHit<M>>> {
        if !options.temporal_boost.unwrap_or(self.enabled) {
            return self.inner.search(query, options).await;
        }

        let limit = options.limit.unwrap_or(self.default_limit);
        let pool = options
            .with_limit(limit.saturating_mul(CANDIDATE_MULTIPLIER))
            .with_temporal_boost(false);
        let hits = self.inner.search(query, pool).await?;
        Ok(apply_temporal_boost(hits, now_millis(), limit))
    }

    async fn remove(&self, id: &str) -> Result<bool> {
        self.inner.remove(id).await
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
