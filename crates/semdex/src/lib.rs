//! semdex: an in-process semantic document index.
//!
//! Re-exports [`semdex_core`] (errors, configuration, similarity and text
//! primitives) and [`semdex_vector`] (vector index, embedding providers and
//! document stores). Most callers only need the [`prelude`].
//!
//! # Features
//!
//! - `fastembed`: local embedding generation via fastembed

pub use semdex_core as core;
pub use semdex_vector as vector;

pub use semdex_core::{Error, Result, StoreConfig, cosine_similarity, normalize_vector};
pub use semdex_vector::{
    AddOutcome, Document, DocumentHit, DocumentMetadata, DocumentStore, EmbedderCache,
    EmbeddingProvider, EnhancedStore, Metadata, MockEmbeddingProvider, SearchOptions,
    SemanticStore, SkipReason, StoredDocument, VectorIndex,
};

#[cfg(feature = "fastembed")]
pub use semdex_vector::FastEmbedProvider;

/// The types needed to build and query a store.
pub mod prelude {
    pub use semdex_core::{Error, Result, StoreConfig};
    pub use semdex_vector::{
        AddOutcome, Document, DocumentHit, DocumentMetadata, DocumentStore, EmbedderCache,
        EmbeddingProvider, EnhancedStore, Metadata, SearchOptions, SemanticStore, SkipReason,
        StoredDocument,
    };
}
