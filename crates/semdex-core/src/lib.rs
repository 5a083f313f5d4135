//! semdex core: shared errors, configuration, and pure primitives.
//!
//! This crate has no internal semdex dependencies (dependency level 0).
//!
//! # Modules
//!
//! - [`error`]: Error types and Result alias
//! - [`config`]: Per-instance store configuration and loading
//! - [`similarity`]: Cosine similarity and vector normalization
//! - [`text`]: Canonicalization, token estimation, sentence splitting

#![doc = include_str!("../README.md")]

pub mod config;
pub mod error;
pub mod similarity;
pub mod text;

// Re-export key types at crate root for convenience
pub use config::{DEFAULT_STORE_PATH, StoreConfig};
pub use error::{Error, Result};
pub use similarity::{cosine_similarity, normalize_vector};
pub use text::{canonicalize, estimate_tokens, split_sentences};
