//! Exact cosine vector index and document stores for semdex.
//!
//! This crate provides an in-memory vector index with full linear-scan
//! search, a document layer that embeds text through a pluggable
//! [`EmbeddingProvider`], and policy wrappers (chunking, deduplication,
//! recency boost, persistence) that compose over the [`DocumentStore`]
//! trait.
//!
//! # Features
//!
//! - `fastembed`: Enable local embedding generation via fastembed
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      semdex-vector                          │
//! ├─────────────────────────────────────────────────────────────┤
//! │  EmbeddingProvider trait                                    │
//! │  ├── MockEmbeddingProvider (always available)               │
//! │  ├── FastEmbedProvider (feature: fastembed)                 │
//! │  └── EmbedderCache (shared, named provider handles)         │
//! ├─────────────────────────────────────────────────────────────┤
//! │  VectorIndex (exact cosine scan, filter, threshold, limit)  │
//! ├─────────────────────────────────────────────────────────────┤
//! │  DocumentStore trait                                        │
//! │  ├── SemanticStore (embeddings + index + texts)             │
//! │  ├── ChunkingStore / DedupStore / TemporalStore             │
//! │  ├── PersistentStore (serialized JSON snapshots)            │
//! │  └── EnhancedStore (all of the above, config-driven)        │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! use semdex_core::StoreConfig;
//! use semdex_vector::{
//!     Document, DocumentStore, EnhancedStore, MockEmbeddingProvider, SearchOptions,
//! };
//! use std::sync::Arc;
//!
//! let provider = Arc::new(MockEmbeddingProvider::new(384));
//! let config = StoreConfig::default().with_store_path(None);
//! let store: EnhancedStore = EnhancedStore::new(provider, config)?;
//!
//! store.add_document(Document::new("intro", "Vectors all the way down.")).await?;
//!
//! let hits = store
//!     .search("vectors", SearchOptions::new().with_limit(5).with_min_similarity(0.2))
//!     .await?;
//! for hit in hits {
//!     println!("{}: {:.3}", hit.id, hit.score);
//! }
//! ```

// Core modules (always available)
pub mod embedder_cache;
pub mod embedding;
pub mod index;
pub mod types;

// Document layer
pub mod semantic;
pub mod store;

// Policies
pub mod chunking;
pub mod dedup;
pub mod enhanced;
pub mod persistence;
pub mod temporal;

// Feature-gated provider
#[cfg(feature = "fastembed")]
pub mod fastembed;

// Re-exports — core types
pub use types::{
    AddOutcome, Document, DocumentHit, DocumentMetadata, IndexHit, Metadata, MetadataFilter,
    SearchOptions, SkipReason, StoredDocument, VectorRecord,
};

// Re-exports — embedding
pub use embedder_cache::EmbedderCache;
pub use embedding::{EmbeddingProvider, MockEmbeddingProvider};

// Re-exports — index and stores
pub use enhanced::EnhancedStore;
pub use index::VectorIndex;
pub use semantic::SemanticStore;
pub use store::DocumentStore;

// Re-exports — policies
pub use chunking::{ChunkingStore, chunk_document, chunk_text};
pub use dedup::DedupStore;
pub use persistence::PersistentStore;
pub use temporal::{TemporalStore, apply_temporal_boost, recency_boost};

// Re-exports — feature-gated
#[cfg(feature = "fastembed")]
pub use fastembed::FastEmbedProvider;
