//! Match engine implementation.

use std::sync::Arc;

use faqbot_embeddings::{
    Embedding, EmbeddingError, EmbeddingProvider, EmbeddingRequest, NormalizedEmbedding,
    SimilarityIndex, normalize,
};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::catalog::Catalog;
use crate::config::{DEFAULT_THRESHOLD, MatcherConfig, validate_threshold};
use crate::error::{MatchError, Result};

/// What the engine concluded for a query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "text", rename_all = "snake_case")]
pub enum MatchAnswer {
    /// The catalog answer of the best match.
    Answer(String),

    /// The best match scored below the threshold. Wording a fallback is up
    /// to the caller.
    LowConfidence,
}

impl MatchAnswer {
    /// The catalog answer, if the match was confident.
    pub fn as_answer(&self) -> Option<&str> {
        match self {
            MatchAnswer::Answer(text) => Some(text),
            MatchAnswer::LowConfidence => None,
        }
    }
}

/// Result of answering one query.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MatchResult {
    /// Catalog answer or the low-confidence sentinel.
    pub answer: MatchAnswer,

    /// Cosine similarity between the query and the best catalog question.
    pub similarity: f32,

    /// Catalog position of the best match.
    pub matched_index: usize,

    /// Text of the best-matching catalog question, for diagnostics.
    pub matched_question: String,
}

impl MatchResult {
    /// True when the similarity cleared the threshold.
    pub fn is_confident(&self) -> bool {
        matches!(self.answer, MatchAnswer::Answer(_))
    }
}

/// State held once the index is built.
struct ReadyEngine {
    catalog: Catalog,
    index: SimilarityIndex,
    provider: Arc<dyn EmbeddingProvider>,
    threshold: f32,
}

enum EngineState {
    Uninitialized,
    Ready(Box<ReadyEngine>),
}

/// Semantic FAQ matcher.
///
/// An engine starts `Uninitialized` and becomes `Ready` through
/// [`MatchEngine::initialize`]. A ready engine is never mutated again, so it
/// can be wrapped in an `Arc` and queried from many tasks concurrently.
pub struct MatchEngine {
    state: EngineState,
}

impl MatchEngine {
    /// Create an engine that has not been initialized.
    pub fn new() -> Self {
        Self {
            state: EngineState::Uninitialized,
        }
    }

    /// Create a new engine builder.
    pub fn builder() -> MatchEngineBuilder {
        MatchEngineBuilder::new()
    }

    /// Embed every catalog question and build the similarity index.
    ///
    /// Fails without producing an engine if the threshold is out of range,
    /// the catalog is empty, or the provider returns unusable vectors.
    pub async fn initialize(
        catalog: Catalog,
        provider: Arc<dyn EmbeddingProvider>,
        threshold: f32,
    ) -> Result<Self> {
        validate_threshold(threshold)?;
        if catalog.is_empty() {
            return Err(MatchError::EmptyCatalog);
        }

        info!(
            "Embedding {} catalog questions with {} ({})",
            catalog.len(),
            provider.name(),
            provider.default_model()
        );

        let requests: Vec<EmbeddingRequest> =
            catalog.questions().map(EmbeddingRequest::new).collect();
        let responses = provider.embed_batch(requests).await?;

        if responses.len() != catalog.len() {
            return Err(MatchError::EmbeddingProvider(
                EmbeddingError::InvalidResponse(format!(
                    "expected {} embeddings, got {}",
                    catalog.len(),
                    responses.len()
                )),
            ));
        }

        let vectors = responses
            .into_iter()
            .map(|response| checked_normalize(response.embedding))
            .collect::<Result<Vec<_>>>()?;

        let index = SimilarityIndex::build(vectors)?;

        info!(
            "Match engine ready: {} entries, dimension {}, threshold {threshold}",
            index.len(),
            index.dimension()
        );

        Ok(Self {
            state: EngineState::Ready(Box::new(ReadyEngine {
                catalog,
                index,
                provider,
                threshold,
            })),
        })
    }

    /// Load the configured catalog and provider and initialize an engine.
    pub async fn from_config(config: &MatcherConfig) -> Result<Self> {
        config.validate()?;
        let catalog = Catalog::load(&config.catalog_path).await?;
        let provider = config.embedding.build_provider().await?;
        Self::initialize(catalog, provider, config.threshold).await
    }

    /// Whether the engine can answer queries.
    pub fn is_ready(&self) -> bool {
        matches!(self.state, EngineState::Ready(_))
    }

    /// The similarity threshold, once ready.
    pub fn threshold(&self) -> Option<f32> {
        self.ready().ok().map(|r| r.threshold)
    }

    /// The catalog, once ready.
    pub fn catalog(&self) -> Option<&Catalog> {
        self.ready().ok().map(|r| &r.catalog)
    }

    /// Number of indexed entries (zero before initialization).
    pub fn len(&self) -> usize {
        self.ready().map_or(0, |r| r.index.len())
    }

    /// True before initialization.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn ready(&self) -> Result<&ReadyEngine> {
        match &self.state {
            EngineState::Ready(ready) => Ok(ready),
            EngineState::Uninitialized => Err(MatchError::NotInitialized),
        }
    }

    /// Answer a free-text query with the best catalog entry.
    ///
    /// A score at or above the threshold returns the catalog answer; below
    /// it returns [`MatchAnswer::LowConfidence`] together with the score and
    /// index of the closest entry. Errors are per call and leave the engine
    /// usable.
    pub async fn answer(&self, query: &str) -> Result<MatchResult> {
        let ready = self.ready()?;

        let query = query.trim();
        if query.is_empty() {
            return Err(MatchError::EmptyQuery);
        }

        debug!("Processing query: {query}");

        let response = ready.provider.embed(EmbeddingRequest::new(query)).await?;
        let vector = normalize(finite(response.embedding)?);

        if vector.dimension() != ready.index.dimension() {
            return Err(MatchError::DimensionMismatch {
                expected: ready.index.dimension(),
                actual: vector.dimension(),
            });
        }

        if vector.is_degenerate() {
            warn!("Query embedded to the zero vector; treating as low confidence");
            return Ok(ready.result(MatchAnswer::LowConfidence, 0.0, 0));
        }

        let hit = ready.index.search_one(&vector)?;
        debug!(
            "Best match: index {} with similarity {:.4}",
            hit.index, hit.score
        );

        if hit.score < ready.threshold {
            return Ok(ready.result(MatchAnswer::LowConfidence, hit.score, hit.index));
        }

        // The index was built from this catalog, so every hit has an entry.
        let Some(entry) = ready.catalog.get(hit.index) else {
            return Err(MatchError::CatalogShape {
                index: hit.index,
                reason: "search hit outside the catalog".to_string(),
            });
        };
        let answer = MatchAnswer::Answer(entry.answer.clone());

        Ok(ready.result(answer, hit.score, hit.index))
    }
}

impl ReadyEngine {
    fn result(&self, answer: MatchAnswer, similarity: f32, index: usize) -> MatchResult {
        let matched_question = self
            .catalog
            .get(index)
            .map(|entry| entry.question.clone())
            .unwrap_or_default();

        MatchResult {
            answer,
            similarity,
            matched_index: index,
            matched_question,
        }
    }
}

impl Default for MatchEngine {
    fn default() -> Self {
        Self::new()
    }
}

/// Reject vectors a provider should never produce.
fn finite(embedding: Embedding) -> Result<Embedding> {
    if embedding.iter().all(|x| x.is_finite()) {
        Ok(embedding)
    } else {
        Err(MatchError::EmbeddingProvider(
            EmbeddingError::InvalidResponse("embedding contains non-finite values".to_string()),
        ))
    }
}

fn checked_normalize(embedding: Embedding) -> Result<NormalizedEmbedding> {
    Ok(normalize(finite(embedding)?))
}

/// Builder for [`MatchEngine`].
pub struct MatchEngineBuilder {
    threshold: f32,
}

impl MatchEngineBuilder {
    /// Create a new builder with the default threshold.
    pub fn new() -> Self {
        Self {
            threshold: DEFAULT_THRESHOLD,
        }
    }

    /// Set the similarity threshold.
    pub fn with_threshold(mut self, threshold: f32) -> Self {
        self.threshold = threshold;
        self
    }

    /// Build the engine.
    pub async fn build(
        self,
        catalog: Catalog,
        provider: Arc<dyn EmbeddingProvider>,
    ) -> Result<MatchEngine> {
        MatchEngine::initialize(catalog, provider, self.threshold).await
    }
}

impl Default for MatchEngineBuilder {
    fn default() -> Self {
        Self::new()
    }
}
