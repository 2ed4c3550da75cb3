//! Vector normalization and similarity computation for embeddings.

use serde::Serialize;

use crate::Embedding;
use crate::error::{EmbeddingError, Result};

/// An embedding rescaled to unit Euclidean length.
///
/// The only way to obtain one is [`normalize`], so every value of this type
/// either has norm 1 (within floating point tolerance) or is the zero vector
/// flagged as degenerate. Once two vectors are normalized their inner product
/// is their cosine similarity.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NormalizedEmbedding {
    values: Embedding,
    degenerate: bool,
}

impl NormalizedEmbedding {
    /// Components of the normalized vector.
    pub fn as_slice(&self) -> &[f32] {
        &self.values
    }

    /// Number of components.
    pub fn dimension(&self) -> usize {
        self.values.len()
    }

    /// True when the input had zero length and was passed through unchanged.
    pub fn is_degenerate(&self) -> bool {
        self.degenerate
    }

    /// Inner product with another normalized vector.
    pub fn dot(&self, other: &NormalizedEmbedding) -> Result<f32> {
        dot_product(&self.values, &other.values)
    }

    /// Consume the wrapper and return the raw components.
    pub fn into_inner(self) -> Embedding {
        self.values
    }
}

/// Normalize an embedding to unit length.
///
/// A zero vector cannot be scaled; it is returned unchanged with
/// [`NormalizedEmbedding::is_degenerate`] set so callers decide what to do
/// with it instead of carrying NaNs around.
pub fn normalize(mut embedding: Embedding) -> NormalizedEmbedding {
    // Accumulate in f64 so long vectors still land within 1e-6 of unit norm.
    let magnitude = embedding
        .iter()
        .map(|x| f64::from(*x) * f64::from(*x))
        .sum::<f64>()
        .sqrt();

    if magnitude == 0.0 {
        return NormalizedEmbedding {
            values: embedding,
            degenerate: true,
        };
    }

    for x in embedding.iter_mut() {
        *x = (f64::from(*x) / magnitude) as f32;
    }

    NormalizedEmbedding {
        values: embedding,
        degenerate: false,
    }
}

/// Euclidean length of a vector.
pub fn l2_norm(v: &[f32]) -> f32 {
    v.iter()
        .map(|x| f64::from(*x) * f64::from(*x))
        .sum::<f64>()
        .sqrt() as f32
}

/// Compute the dot product between two embeddings.
pub fn dot_product(a: &[f32], b: &[f32]) -> Result<f32> {
    if a.len() != b.len() {
        return Err(EmbeddingError::DimensionMismatch {
            expected: a.len(),
            actual: b.len(),
        });
    }

    Ok(a.iter().zip(b.iter()).map(|(x, y)| x * y).sum())
}

/// Compute the cosine similarity between two raw embeddings.
///
/// Returns a value between -1.0 and 1.0, where:
/// - 1.0 means identical vectors
/// - 0.0 means orthogonal vectors (or either side is the zero vector)
/// - -1.0 means opposite vectors
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> Result<f32> {
    let dot = dot_product(a, b)?;
    let magnitude_a = l2_norm(a);
    let magnitude_b = l2_norm(b);

    if magnitude_a == 0.0 || magnitude_b == 0.0 {
        return Ok(0.0);
    }

    Ok((dot / (magnitude_a * magnitude_b)).clamp(-1.0, 1.0))
}
