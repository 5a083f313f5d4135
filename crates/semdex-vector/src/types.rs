//! Common types for the vector index and document stores.
//!
//! Metadata is an opaque payload chosen per store instance. The
//! [`Metadata`] trait exposes only the few fields the policies touch
//! (timestamp, chunk lineage); everything else is caller-defined.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

// ============================================================================
// Metadata
// ============================================================================

/// Opaque, caller-defined attributes attached to a document.
pub trait Metadata:
    Clone + fmt::Debug + Default + Send + Sync + Serialize + DeserializeOwned + 'static
{
    /// Creation time in milliseconds since the Unix epoch, if recorded.
    fn timestamp(&self) -> Option<i64>;

    /// Record a creation time in milliseconds since the Unix epoch.
    fn set_timestamp(&mut self, millis: i64);

    /// Copy of this metadata with chunk lineage (`chunkIndex`, `parentId`)
    /// merged over it.
    fn for_chunk(&self, parent_id: &str, chunk_index: usize) -> Self;
}

/// Typed metadata with a free-form attribute bag.
///
/// Serializes as a flat JSON object: `timestamp`, `chunkIndex` and
/// `parentId` when present, plus every attribute at the top level.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DocumentMetadata {
    /// Creation time (epoch milliseconds).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<i64>,

    /// Position of this chunk within its parent document.
    #[serde(
        rename = "chunkIndex",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub chunk_index: Option<usize>,

    /// Id of the document this chunk was split from.
    #[serde(rename = "parentId", default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,

    /// Caller-defined attributes.
    #[serde(flatten)]
    pub attributes: BTreeMap<String, Value>,
}

impl DocumentMetadata {
    /// Create empty metadata.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the creation timestamp.
    pub fn with_timestamp(mut self, millis: i64) -> Self {
        self.timestamp = Some(millis);
        self
    }

    /// Add an attribute.
    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    /// Look up an attribute.
    pub fn attribute(&self, key: &str) -> Option<&Value> {
        self.attributes.get(key)
    }
}

impl Metadata for DocumentMetadata {
    fn timestamp(&self) -> Option<i64> {
        self.timestamp
    }

    fn set_timestamp(&mut self, millis: i64) {
        self.timestamp = Some(millis);
    }

    fn for_chunk(&self, parent_id: &str, chunk_index: usize) -> Self {
        Self {
            chunk_index: Some(chunk_index),
            parent_id: Some(parent_id.to_string()),
            ..self.clone()
        }
    }
}

impl Metadata for Value {
    fn timestamp(&self) -> Option<i64> {
        let ts = self.get("timestamp")?;
        ts.as_i64().or_else(|| ts.as_f64().map(|f| f as i64))
    }

    fn set_timestamp(&mut self, millis: i64) {
        if let Some(obj) = as_object_mut(self) {
            obj.insert("timestamp".to_string(), Value::from(millis));
        }
    }

    fn for_chunk(&self, parent_id: &str, chunk_index: usize) -> Self {
        let mut merged = self.clone();
        if let Some(obj) = as_object_mut(&mut merged) {
            obj.insert("chunkIndex".to_string(), Value::from(chunk_index));
            obj.insert("parentId".to_string(), Value::from(parent_id));
        }
        merged
    }
}

/// Object view of a JSON value, promoting `null` to an empty object.
///
/// Scalars and arrays cannot carry named fields and yield `None`.
fn as_object_mut(value: &mut Value) -> Option<&mut Map<String, Value>> {
    if value.is_null() {
        *value = Value::Object(Map::new());
    }
    value.as_object_mut()
}

// ============================================================================
// Records and documents
// ============================================================================

/// A raw entry in the vector index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorRecord<M> {
    /// Unique identifier.
    pub id: String,

    /// Embedding vector.
    pub vector: Vec<f32>,

    /// Optional payload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<M>,
}

impl<M> VectorRecord<M> {
    /// Create a record.
    pub fn new(id: impl Into<String>, vector: Vec<f32>, metadata: Option<M>) -> Self {
        Self {
            id: id.into(),
            vector,
            metadata,
        }
    }
}

/// A document to be embedded and stored.
#[derive(Debug, Clone, PartialEq)]
pub struct Document<M> {
    /// Unique document identifier.
    pub id: String,

    /// Text to embed.
    pub text: String,

    /// Optional payload.
    pub metadata: Option<M>,
}

impl<M> Document<M> {
    /// Create a document without metadata.
    pub fn new(id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            text: text.into(),
            metadata: None,
        }
    }

    /// Attach metadata.
    pub fn with_metadata(mut self, metadata: M) -> Self {
        self.metadata = Some(metadata);
        self
    }
}

/// A stored document: the export/import and on-disk snapshot shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredDocument<M> {
    /// Document identifier.
    pub id: String,

    /// Original text.
    pub text: String,

    /// Embedding vector.
    pub vector: Vec<f32>,

    /// Optional payload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<M>,
}

// ============================================================================
// Search types
// ============================================================================

/// Caller-supplied predicate over a record's metadata.
pub type MetadataFilter<M> = Arc<dyn Fn(Option<&M>) -> bool + Send + Sync>;

/// Per-call search options. Unset fields fall back to the store's config.
pub struct SearchOptions<M> {
    /// Maximum results to return.
    pub limit: Option<usize>,

    /// Minimum similarity for a hit.
    pub min_similarity: Option<f32>,

    /// Records for which this returns `false` are skipped before scoring.
    pub filter: Option<MetadataFilter<M>>,

    /// Override the instance's recency re-ranking setting.
    pub temporal_boost: Option<bool>,
}

impl<M> SearchOptions<M> {
    /// Options with every field unset.
    pub fn new() -> Self {
        Self {
            limit: None,
            min_similarity: None,
            filter: None,
            temporal_boost: None,
        }
    }

    /// Set the result limit.
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Set the similarity threshold.
    pub fn with_min_similarity(mut self, threshold: f32) -> Self {
        self.min_similarity = Some(threshold);
        self
    }

    /// Set a metadata filter.
    pub fn with_filter<F>(mut self, filter: F) -> Self
    where
        F: Fn(Option<&M>) -> bool + Send + Sync + 'static,
    {
        self.filter = Some(Arc::new(filter));
        self
    }

    /// Force recency re-ranking on or off for this call.
    pub fn with_temporal_boost(mut self, enabled: bool) -> Self {
        self.temporal_boost = Some(enabled);
        self
    }

    /// Whether a record with this metadata passes the filter.
    pub fn accepts(&self, metadata: Option<&M>) -> bool {
        self.filter.as_ref().is_none_or(|f| f(metadata))
    }
}

impl<M> Default for SearchOptions<M> {
    fn default() -> Self {
        Self::new()
    }
}

impl<M> Clone for SearchOptions<M> {
    fn clone(&self) -> Self {
        Self {
            limit: self.limit,
            min_similarity: self.min_similarity,
            filter: self.filter.clone(),
            temporal_boost: self.temporal_boost,
        }
    }
}

impl<M> fmt::Debug for SearchOptions<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SearchOptions")
            .field("limit", &self.limit)
            .field("min_similarity", &self.min_similarity)
            .field("filter", &self.filter.as_ref().map(|_| "<fn>"))
            .field("temporal_boost", &self.temporal_boost)
            .finish()
    }
}

/// A single hit from the raw vector index.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexHit<M> {
    /// Record identifier.
    pub id: String,

    /// Cosine similarity to the query.
    pub similarity: f32,

    /// Metadata snapshot.
    pub metadata: Option<M>,
}

/// A single document search result.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DocumentHit<M> {
    /// Document identifier.
    pub id: String,

    /// Original text (empty if it went missing).
    pub text: String,

    /// Cosine similarity to the query.
    pub similarity: f32,

    /// Ranking score. Equals `similarity` unless re-ranked.
    pub score: f32,

    /// Metadata snapshot.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<M>,
}

// ============================================================================
// Add outcomes
// ============================================================================

/// Why an add was skipped.
#[derive(Debug, Clone, PartialEq)]
pub enum SkipReason {
    /// The canonical text is already stored under `existing_id`.
    ExactDuplicate {
        /// Id that owns the canonical text.
        existing_id: String,
    },

    /// A stored document is at least as similar as the fuzzy threshold.
    SimilarDuplicate {
        /// Closest stored document.
        existing_id: String,
        /// Its similarity to the new text.
        similarity: f32,
    },
}

/// Result of adding a document.
#[derive(Debug, Clone, PartialEq)]
pub enum AddOutcome {
    /// The document was stored under these ids (several when chunked).
    Added {
        /// Stored ids, in chunk order.
        ids: Vec<String>,
    },

    /// The document was a duplicate; nothing changed.
    Skipped(SkipReason),
}

impl AddOutcome {
    /// Outcome for a single stored id.
    pub fn added(id: impl Into<String>) -> Self {
        Self::Added {
            ids: vec![id.into()],
        }
    }

    /// Whether anything was stored.
    pub fn is_added(&self) -> bool {
        matches!(self, Self::Added { .. })
    }

    /// Whether the add was a duplicate no-op.
    pub fn is_skipped(&self) -> bool {
        matches!(self, Self::Skipped(_))
    }

    /// Stored ids; empty when skipped.
    pub fn ids(&self) -> &[String] {
        match self {
            Self::Added { ids } => ids,
            Self::Skipped(_) => &[],
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
