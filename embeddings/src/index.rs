//! Exact similarity index over normalized embeddings.

use std::cmp::Reverse;

use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{EmbeddingError, Result};
use crate::similarity::NormalizedEmbedding;

/// A scored hit returned by [`SimilarityIndex::search`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoredMatch {
    /// Inner product with the query, i.e. cosine similarity in `[-1, 1]`.
    pub score: f32,

    /// Position of the matched vector, which is also its catalog position.
    pub index: usize,
}

/// A flat inner-product index.
///
/// Vectors are kept in the order they were given to [`SimilarityIndex::build`];
/// that order is the mapping back to whatever the caller embedded. Search is
/// a linear scan, so results are exact. The index is immutable once built, so
/// a shared reference can be searched from any number of tasks at once.
#[derive(Debug, Clone)]
pub struct SimilarityIndex {
    /// Stored vectors, in insertion order.
    vectors: Vec<NormalizedEmbedding>,

    /// Dimension shared by every stored vector.
    dimension: usize,
}

impl SimilarityIndex {
    /// Build an index from an ordered set of normalized vectors.
    pub fn build(vectors: Vec<NormalizedEmbedding>) -> Result<Self> {
        let dimension = vectors
            .first()
            .map(NormalizedEmbedding::dimension)
            .ok_or(EmbeddingError::EmptyIndex)?;

        for (index, vector) in vectors.iter().enumerate() {
            if vector.dimension() != dimension {
                return Err(EmbeddingError::DimensionMismatch {
                    expected: dimension,
                    actual: vector.dimension(),
                });
            }
            if vector.is_degenerate() {
                return Err(EmbeddingError::DegenerateEmbedding { index });
            }
        }

        info!(
            "Built similarity index with {} vectors of dimension {dimension}",
            vectors.len()
        );

        Ok(Self { vectors, dimension })
    }

    /// Get the number of vectors in the index.
    pub fn len(&self) -> usize {
        self.vectors.len()
    }

    /// Always false for a successfully built index; kept for API symmetry with `len`.
    pub fn is_empty(&self) -> bool {
        self.vectors.is_empty()
    }

    /// Dimension of every stored vector.
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Get the stored vector at a position.
    pub fn get(&self, index: usize) -> Option<&NormalizedEmbedding> {
        self.vectors.get(index)
    }

    /// Search for the `k` vectors with the highest inner product.
    ///
    /// Returns `min(k, len)` hits sorted by descending score. Equal scores are
    /// ordered by ascending index so repeated searches agree.
    pub fn search(&self, query: &NormalizedEmbedding, k: usize) -> Result<Vec<ScoredMatch>> {
        if query.dimension() != self.dimension {
            return Err(EmbeddingError::DimensionMismatch {
                expected: self.dimension,
                actual: query.dimension(),
            });
        }

        let mut scores: Vec<(OrderedFloat<f32>, usize)> = Vec::with_capacity(self.vectors.len());
        for (index, vector) in self.vectors.iter().enumerate() {
            scores.push((OrderedFloat(vector.dot(query)?), index));
        }

        scores.sort_by_key(|&(score, index)| (Reverse(score), index));

        let results: Vec<ScoredMatch> = scores
            .into_iter()
            .take(k)
            .map(|(score, index)| ScoredMatch {
                score: score.0,
                index,
            })
            .collect();

        debug!("Index search returned {} hits", results.len());
        Ok(results)
    }

    /// Search for the single most similar vector.
    pub fn search_one(&self, query: &NormalizedEmbedding) -> Result<ScoredMatch> {
        self.search(query, 1)?
            .into_iter()
            .next()
            .ok_or(EmbeddingError::EmptyIndex)
    }
}
