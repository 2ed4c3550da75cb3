//! # Embeddings
//!
//! This crate provides text embedding and exact similarity search for the
//! faqbot matcher.
//!
//! ## Features
//!
//! - **Embedding Generation**: Convert text to dense vectors (a local BERT
//!   sentence encoder, OpenAI-compatible HTTP APIs, or offline feature hashing)
//! - **Normalization**: Rescale vectors so inner product is cosine similarity
//! - **Similarity Search**: Exact nearest-neighbour lookup in catalog order
//! - **Caching**: Avoid re-embedding the same text on every rebuild
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                    Embeddings System                            │
//! ├─────────────────────────────────────────────────────────────────┤
//! │  EmbeddingProvider ──► Embedding ──► normalize()                │
//! │       │                                  │                      │
//! │       ▼                                  ▼                      │
//! │  CachedProvider                   SimilarityIndex               │
//! └─────────────────────────────────────────────────────────────────┘
//! ```

pub mod cache;
pub mod error;
pub mod index;
pub mod local;
pub mod provider;
pub mod similarity;

pub use cache::{CachedProvider, EmbeddingCache};
pub use error::{EmbeddingError, Result};
pub use index::{ScoredMatch, SimilarityIndex};
pub use local::LocalBertProvider;
pub use provider::{
    EmbeddingProvider, EmbeddingRequest, EmbeddingResponse, HashingProvider, OpenAIProvider,
};
pub use similarity::{NormalizedEmbedding, cosine_similarity, dot_product, normalize};

/// A dense vector embedding.
pub type Embedding = Vec<f32>;
