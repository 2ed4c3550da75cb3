//! Error types for the match engine.

use std::path::PathBuf;

use faqbot_embeddings::EmbeddingError;
use thiserror::Error;

/// Result type alias for matcher operations.
pub type Result<T> = std::result::Result<T, MatchError>;

/// Errors that can occur while loading a catalog, building the engine or
/// answering a query.
#[derive(Error, Debug)]
pub enum MatchError {
    /// The catalog has no entries.
    #[error("catalog is empty")]
    EmptyCatalog,

    /// A catalog entry violates the catalog's structural rules.
    #[error("catalog entry {index} is malformed: {reason}")]
    CatalogShape { index: usize, reason: String },

    /// The catalog source could not be read.
    #[error("failed to read catalog {}: {source}", .path.display())]
    CatalogRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The catalog source is not a JSON array of question/answer objects.
    #[error("invalid catalog format: {0}")]
    CatalogParse(#[from] serde_json::Error),

    /// Similarity threshold outside `[-1, 1]`.
    #[error("similarity threshold {0} is outside [-1, 1]")]
    InvalidThreshold(f32),

    /// Query or catalog vectors disagree on dimension.
    #[error("embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// A catalog question embedded to the zero vector.
    #[error("catalog question {index} produced a zero embedding")]
    DegenerateEmbedding { index: usize },

    /// The query was empty or whitespace only.
    #[error("query is empty")]
    EmptyQuery,

    /// `answer` was called before the engine was initialized.
    #[error("match engine not initialized")]
    NotInitialized,

    /// The embedding provider failed.
    #[error("embedding provider error: {0}")]
    EmbeddingProvider(EmbeddingError),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),
}

impl MatchError {
    /// True for errors caused by the caller's input rather than the system.
    pub fn is_client_error(&self) -> bool {
        matches!(self, MatchError::EmptyQuery)
    }
}

impl From<EmbeddingError> for MatchError {
    fn from(err: EmbeddingError) -> Self {
        match err {
            EmbeddingError::DimensionMismatch { expected, actual } => {
                MatchError::DimensionMismatch { expected, actual }
            }
            EmbeddingError::DegenerateEmbedding { index } => {
                MatchError::DegenerateEmbedding { index }
            }
            EmbeddingError::EmptyIndex => MatchError::EmptyCatalog,
            other => MatchError::EmbeddingProvider(other),
        }
    }
}
