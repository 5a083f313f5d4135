//! Error types for semdex operations.
//!
//! This module provides the common `Error` type and `Result<T>` alias used
//! across all semdex crates. Uses `thiserror` for derive macros.
//!
//! Contract violations (dimension mismatch, missing initialization, bad
//! configuration) are always returned to the caller. Persistence failures
//! raised inside background saves are logged by the store and never reach
//! the caller of the mutating operation.

use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors that can occur in semdex operations.
#[derive(Error, Debug)]
pub enum Error {
    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// I/O error tied to a specific path.
    #[error("I/O error at {}: {source}", path.display())]
    IoWithPath {
        /// Path being accessed.
        path: PathBuf,
        /// Underlying error.
        source: std::io::Error,
    },

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Content not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Invalid data or format.
    #[error("Invalid data: {0}")]
    InvalidData(String),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Two vectors of different lengths were compared.
    #[error("Vector dimension mismatch: {left} vs {right}")]
    DimensionMismatch {
        /// Length of the left-hand vector.
        left: usize,
        /// Length of the right-hand vector.
        right: usize,
    },

    /// The embedding provider has not completed initialization.
    #[error("Not initialized: {0}")]
    NotInitialized(String),

    /// Snapshot read or write failed.
    #[error("Persistence error: {0}")]
    Persistence(String),

    /// Generic operation failure (embedding backend, task join, etc.).
    #[error("Operation failed: {0}")]
    Operation(String),
}

impl Error {
    /// Create a configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a not found error.
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    /// Create an invalid data error.
    pub fn invalid_data(msg: impl Into<String>) -> Self {
        Self::InvalidData(msg.into())
    }

    /// Create a not-initialized error.
    pub fn not_initialized(msg: impl Into<String>) -> Self {
        Self::NotInitialized(msg.into())
    }

    /// Create a persistence error.
    pub fn persistence(msg: impl Into<String>) -> Self {
        Self::Persistence(msg.into())
    }

    /// Create an operation error.
    pub fn operation(msg: impl Into<String>) -> Self {
        Self::Operation(msg.into())
    }

    /// Wrap an I/O error with the path that produced it.
    pub fn io_with_path(source: std::io::Error, path: impl AsRef<Path>) -> Self {
        Self::IoWithPath {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    /// Whether this error is a dimension mismatch.
    pub fn is_dimension_mismatch(&self) -> bool {
        matches!(self, Self::DimensionMismatch { .. })
    }

    /// Whether this error signals an uninitialized embedder.
    pub fn is_not_initialized(&self) -> bool {
        matches!(self, Self::NotInitialized(_))
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

/// Result type alias using semdex's Error type.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dimension_mismatch_display() {
        let err = Error::DimensionMismatch { left: 3, right: 4 };
        assert_eq!(err.to_string(), "Vector dimension mismatch: 3 vs 4");
        assert!(err.is_dimension_mismatch());
        assert!(!err.is_not_initialized());
    }

    #[test]
    fn test_io_with_path_display() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err = Error::io_with_path(io, "/tmp/store.json");
        let msg = err.to_string();
        assert!(msg.contains("/tmp/store.json"));
        assert!(msg.contains("gone"));
    }

    #[test]
    fn test_from_serde_json() {
        let parse_err = serde_json::from_str::<Vec<u32>>("not json").unwrap_err();
        let err: Error = parse_err.into();
        assert!(matches!(err, Error::Serialization(_)));
    }

    #[test]
    fn test_constructors() {
        assert!(matches!(Error::config("x"), Error::Config(_)));
        assert!(matches!(Error::persistence("x"), Error::Persistence(_)));
        assert!(Error::not_initialized("embedder").is_not_initialized());
    }
}
