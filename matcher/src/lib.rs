//! # FAQ Matcher
//!
//! Answers free-text questions from a fixed catalog of question/answer pairs
//! by semantic similarity.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                         Match Engine                            │
//! ├─────────────────────────────────────────────────────────────────┤
//! │                                                                 │
//! │  Catalog ──► EmbeddingProvider ──► normalize ──► SimilarityIndex│
//! │                                                        │        │
//! │  query ────► EmbeddingProvider ──► normalize ──► search (k=1)   │
//! │                                                        │        │
//! │                                                        ▼        │
//! │                                          score >= threshold ?   │
//! │                                           answer : LowConfidence│
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use faqbot_matcher::{Catalog, MatchEngine};
//! use faqbot_embeddings::HashingProvider;
//!
//! let catalog = Catalog::load("faqs.json").await?;
//! let engine = MatchEngine::initialize(catalog, Arc::new(HashingProvider::new()), 0.5).await?;
//!
//! let result = engine.answer("When do you open?").await?;
//! ```

pub mod catalog;
pub mod config;
pub mod engine;
pub mod error;

pub use catalog::{Catalog, CatalogEntry};
pub use config::{EmbeddingConfig, EmbeddingProviderType, MatcherConfig, ServerConfig};
pub use engine::{MatchAnswer, MatchEngine, MatchEngineBuilder, MatchResult};
pub use error::{MatchError, Result};

// Re-export from dependencies for convenience
pub use faqbot_embeddings::{
    EmbeddingProvider, HashingProvider, LocalBertProvider, OpenAIProvider,
};
