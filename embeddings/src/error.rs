//! Error types for the embeddings system.

use thiserror::Error;

/// Result type alias for embedding operations.
pub type Result<T> = std::result::Result<T, EmbeddingError>;

/// Errors that can occur in the embeddings system.
#[derive(Error, Debug)]
pub enum EmbeddingError {
    /// Provider not configured.
    #[error("embedding provider not configured")]
    ProviderNotConfigured,

    /// API request failed.
    #[error("API request failed: {0}")]
    ApiRequest(String),

    /// Invalid response from provider.
    #[error("invalid response: {0}")]
    InvalidResponse(String),

    /// Rate limit exceeded.
    #[error("rate limit exceeded, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    /// Dimension mismatch.
    #[error("dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// An index was built from zero vectors.
    #[error("cannot build a similarity index from an empty vector set")]
    EmptyIndex,

    /// A stored vector had zero length and cannot be compared.
    #[error("degenerate (zero) embedding at position {index}")]
    DegenerateEmbedding { index: usize },

    /// A local model could not be fetched or loaded.
    #[error("model error: {0}")]
    Model(String),

    /// Tensor computation failed.
    #[error("inference error: {0}")]
    Inference(#[from] candle_core::Error),

    /// Cache error.
    #[error("cache error: {0}")]
    Cache(String),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP error.
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
}
