//! Vector similarity primitives.
//!
//! Pure functions over fixed-length `f32` slices. Nothing here allocates
//! except [`normalize_vector`], which always returns a fresh copy.

use crate::{Error, Result};

/// Dot product of two equal-length vectors.
///
/// Returns [`Error::DimensionMismatch`] when the lengths differ.
pub fn dot_product(a: &[f32], b: &[f32]) -> Result<f32> {
    if a.len() != b.len() {
        return Err(Error::DimensionMismatch {
            left: a.len(),
            right: b.len(),
        });
    }
    Ok(a.iter().zip(b).map(|(x, y)| x * y).sum())
}

/// Euclidean magnitude of a vector.
pub fn magnitude(v: &[f32]) -> f32 {
    v.iter().map(|x| x * x).sum::<f32>().sqrt()
}

/// Cosine similarity between two vectors.
///
/// - Different lengths fail with [`Error::DimensionMismatch`].
/// - Two empty vectors score `0.0`.
/// - A zero-magnitude operand scores `0.0`.
///
/// The result is not clamped; rounding can put it slightly outside `[-1, 1]`.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> Result<f32> {
    let dot = dot_product(a, b)?;
    if a.is_empty() {
        return Ok(0.0);
    }

    let norm_a = magnitude(a);
    let norm_b = magnitude(b);
    if norm_a == 0.0 || norm_b == 0.0 {
        return Ok(0.0);
    }

    Ok(dot / (norm_a * norm_b))
}

/// Scale a vector to unit magnitude.
///
/// A zero-magnitude input comes back as an unchanged copy.
pub fn normalize_vector(v: &[f32]) -> Vec<f32> {
    let norm = magnitude(v);
    if norm == 0.0 {
        return v.to_vec();
    }
    v.iter().map(|x| x / norm).collect()
}

// ============================================================================
// Tests
// ============================================================================
