//! Embedding providers.
//!
//! The matcher only needs `text -> vector`. This module holds the provider
//! trait, an HTTP client for OpenAI-compatible `/embeddings` endpoints and an
//! offline hashing provider that needs no model at all. The local sentence
//! encoder lives in [`crate::local`].

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::Embedding;
use crate::error::{EmbeddingError, Result};

/// Request for generating embeddings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingRequest {
    /// Text to embed.
    pub text: String,

    /// Model to use (provider-specific).
    pub model: Option<String>,

    /// Dimensions for the output (if supported by provider).
    pub dimensions: Option<usize>,
}

impl EmbeddingRequest {
    /// Create a new embedding request.
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            model: None,
            dimensions: None,
        }
    }

    /// Set the model to use.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Set the output dimensions.
    pub fn with_dimensions(mut self, dimensions: usize) -> Self {
        self.dimensions = Some(dimensions);
        self
    }
}

/// Response from embedding generation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingResponse {
    /// The generated embedding.
    pub embedding: Embedding,

    /// Model used to generate the embedding.
    pub model: String,

    /// Dimension of the embedding.
    pub dimension: usize,

    /// Token usage (if available).
    pub tokens_used: Option<u64>,
}

impl EmbeddingResponse {
    fn new(embedding: Embedding, model: impl Into<String>) -> Self {
        let dimension = embedding.len();
        Self {
            embedding,
            model: model.into(),
            dimension,
            tokens_used: None,
        }
    }
}

/// Trait for embedding providers.
///
/// Implementations must be deterministic for a fixed model: the same text
/// always maps to the same vector, and every vector has the same dimension.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Get the name of this provider.
    fn name(&self) -> &str;

    /// Get the default model for this provider.
    fn default_model(&self) -> &str;

    /// Get the default embedding dimension.
    fn default_dimension(&self) -> usize;

    /// Generate an embedding for the given text.
    async fn embed(&self, request: EmbeddingRequest) -> Result<EmbeddingResponse>;

    /// Generate embeddings for multiple texts, preserving input order.
    async fn embed_batch(&self, requests: Vec<EmbeddingRequest>) -> Result<Vec<EmbeddingResponse>> {
        // Default implementation: process sequentially
        let mut results = Vec::with_capacity(requests.len());
        for request in requests {
            results.push(self.embed(request).await?);
        }
        Ok(results)
    }

    /// Check if the provider is available (API key set, etc.).
    fn is_available(&self) -> bool;
}

/// OpenAI-compatible embedding provider.
pub struct OpenAIProvider {
    /// API key.
    api_key: Option<String>,

    /// API base URL.
    base_url: String,

    /// HTTP client.
    client: reqwest::Client,

    /// Default model.
    default_model: String,

    /// Maximum inputs per API request.
    batch_size: usize,
}

impl OpenAIProvider {
    /// Default API endpoint.
    pub const DEFAULT_BASE_URL: &'static str = "https://api.openai.com/v1";

    /// Default embedding model.
    pub const DEFAULT_MODEL: &'static str = "text-embedding-3-small";

    /// Largest `input` array the OpenAI embeddings API accepts.
    pub const DEFAULT_BATCH_SIZE: usize = 2048;

    /// Create a provider with no API key.
    pub fn new() -> Self {
        Self {
            api_key: None,
            base_url: Self::DEFAULT_BASE_URL.to_string(),
            client: reqwest::Client::new(),
            default_model: Self::DEFAULT_MODEL.to_string(),
            batch_size: Self::DEFAULT_BATCH_SIZE,
        }
    }

    /// Create a provider that reads its key from `OPENAI_API_KEY`.
    pub fn from_env() -> Self {
        Self {
            api_key: std::env::var("OPENAI_API_KEY").ok(),
            ..Self::new()
        }
    }

    /// Set the API key.
    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    /// Set the base URL.
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    /// Set the default model.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.default_model = model.into();
        self
    }

    /// Set the maximum number of inputs sent in one request (at least one).
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    async fn request_embeddings(
        &self,
        input: serde_json::Value,
        model: &str,
        dimensions: Option<usize>,
    ) -> Result<OpenAIEmbeddingResponse> {
        let api_key = self
            .api_key
            .as_ref()
            .ok_or(EmbeddingError::ProviderNotConfigured)?;

        let mut body = serde_json::json!({
            "input": input,
            "model": model
        });

        if let Some(dims) = dimensions {
            body["dimensions"] = serde_json::json!(dims);
        }

        let response = self
            .client
            .post(format!("{}/embeddings", self.base_url))
            .header("Authorization", format!("Bearer {api_key}"))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await?;

        if response.status() == reqwest::StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.parse().ok())
                .unwrap_or(60);

            return Err(EmbeddingError::RateLimited {
                retry_after_secs: retry_after,
            });
        }

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(EmbeddingError::ApiRequest(format!(
                "{status}: {error_text}"
            )));
        }

        Ok(response.json().await?)
    }
}

impl Default for OpenAIProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EmbeddingProvider for OpenAIProvider {
    fn name(&self) -> &str {
        "openai"
    }

    fn default_model(&self) -> &str {
        &self.default_model
    }

    fn default_dimension(&self) -> usize {
        match self.default_model.as_str() {
            "text-embedding-3-large" => 3072,
            "all-MiniLM-L6-v2" => 384,
            "distilbert-base-nli-mean-tokens" => 768,
            _ => 1536,
        }
    }

    async fn embed(&self, request: EmbeddingRequest) -> Result<EmbeddingResponse> {
        let model = request
            .model
            .unwrap_or_else(|| self.default_model.clone());

        debug!("Generating embedding with model: {model}");

        let result = self
            .request_embeddings(serde_json::json!(request.text), &model, request.dimensions)
            .await?;

        let tokens_used = result.usage.as_ref().map(|u| u.total_tokens);
        let embedding = result
            .data
            .into_iter()
            .next()
            .ok_or_else(|| EmbeddingError::InvalidResponse("No embedding in response".to_string()))?
            .embedding;

        let mut response = EmbeddingResponse::new(embedding, result.model);
        response.tokens_used = tokens_used;
        Ok(response)
    }

    async fn embed_batch(&self, requests: Vec<EmbeddingRequest>) -> Result<Vec<EmbeddingResponse>> {
        let Some(first) = requests.first() else {
            return Ok(Vec::new());
        };

        let model = first
            .model
            .clone()
            .unwrap_or_else(|| self.default_model.clone());
        let dimensions = first.dimensions;

        let texts: Vec<&str> = requests.iter().map(|r| r.text.as_str()).collect();

        debug!(
            "Generating batch embeddings for {} texts with model: {model}",
            texts.len()
        );

        let mut responses = Vec::with_capacity(texts.len());
        for chunk in texts.chunks(self.batch_size) {
            let result = self
                .request_embeddings(serde_json::json!(chunk), &model, dimensions)
                .await?;
            let model = result.model.clone();
            responses.extend(
                ordered_embeddings(result, chunk.len())?
                    .into_iter()
                    .map(|embedding| EmbeddingResponse::new(embedding, model.clone())),
            );
        }

        info!("Generated {} batch embeddings", responses.len());

        Ok(responses)
    }

    fn is_available(&self) -> bool {
        self.api_key.is_some()
    }
}

/// OpenAI API response format.
#[derive(Debug, Deserialize)]
struct OpenAIEmbeddingResponse {
    data: Vec<OpenAIEmbeddingData>,
    model: String,
    usage: Option<OpenAIUsage>,
}

#[derive(Debug, Deserialize)]
struct OpenAIEmbeddingData {
    embedding: Vec<f32>,
    index: usize,
}

#[derive(Debug, Deserialize)]
struct OpenAIUsage {
    total_tokens: u64,
}

/// Put a batch response back in input order.
///
/// The API tags every item with its input position, so array order is not
/// trusted; the positions must be exactly `0..expected`.
fn ordered_embeddings(
    response: OpenAIEmbeddingResponse,
    expected: usize,
) -> Result<Vec<Embedding>> {
    let mut data = response.data;
    if data.len() != expected {
        return Err(EmbeddingError::InvalidResponse(format!(
            "expected {expected} embeddings, got {}",
            data.len()
        )));
    }

    data.sort_by_key(|item| item.index);
    if let Some((position, item)) = data
        .iter()
        .enumerate()
        .find(|(position, item)| item.index != *position)
    {
        return Err(EmbeddingError::InvalidResponse(format!(
            "embedding index {} at position {position}; indices must cover 0..{expected}",
            item.index
        )));
    }

    Ok(data.into_iter().map(|item| item.embedding).collect())
}

/// Offline embedding provider based on feature hashing.
///
/// Each lowercased word and each character trigram of a word is hashed into
/// one of `dimension` buckets with a pseudo-random sign. Texts sharing words
/// or word fragments land close together; texts with no alphanumeric content
/// map to the zero vector. No model download, fully deterministic.
///
/// Similarity here is lexical, not semantic: paraphrases with no shared
/// words score low. Use it for tests and for hosts that cannot load
/// [`crate::LocalBertProvider`].
pub struct HashingProvider {
    dimension: usize,
}

impl HashingProvider {
    /// Model identifier reported in responses.
    pub const MODEL: &'static str = "feature-hash-v1";

    /// Default number of buckets.
    pub const DEFAULT_DIMENSION: usize = 384;

    /// Weight of a character trigram relative to a whole word.
    const TRIGRAM_WEIGHT: f32 = 0.5;

    /// Create a hashing provider with the default dimension.
    pub fn new() -> Self {
        Self::with_dimension(Self::DEFAULT_DIMENSION)
    }

    /// Create a hashing provider with `dimension` buckets (at least one).
    pub fn with_dimension(dimension: usize) -> Self {
        Self {
            dimension: dimension.max(1),
        }
    }

    fn embed_text(&self, text: &str, dimension: usize) -> Embedding {
        let mut vector = vec![0.0f32; dimension];

        let lowered = text.to_lowercase();
        for word in lowered
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
        {
            add_feature(&mut vector, ("w", word), 1.0);

            let padded: Vec<char> = format!("<{word}>").chars().collect();
            for gram in padded.windows(3) {
                add_feature(&mut vector, ("c", gram), Self::TRIGRAM_WEIGHT);
            }
        }

        vector
    }
}

impl Default for HashingProvider {
    fn default() -> Self {
        Self::new()
    }
}

fn add_feature(vector: &mut [f32], feature: impl Hash, weight: f32) {
    let mut hasher = DefaultHasher::new();
    feature.hash(&mut hasher);
    let hash = hasher.finish();

    let bucket = (hash % vector.len() as u64) as usize;
    let sign = if hash >> 63 == 0 { 1.0 } else { -1.0 };
    vector[bucket] += sign * weight;
}

#[async_trait]
impl EmbeddingProvider for HashingProvider {
    fn name(&self) -> &str {
        "hashing"
    }

    fn default_model(&self) -> &str {
        Self::MODEL
    }

    fn default_dimension(&self) -> usize {
        self.dimension
    }

    async fn embed(&self, request: EmbeddingRequest) -> Result<EmbeddingResponse> {
        let dimension = request.dimensions.unwrap_or(self.dimension).max(1);
        let embedding = self.embed_text(&request.text, dimension);

        let mut response = EmbeddingResponse::new(embedding, Self::MODEL);
        response.tokens_used = Some(request.text.split_whitespace().count() as u64);
        Ok(response)
    }

    fn is_available(&self) -> bool {
        true
    }
}
