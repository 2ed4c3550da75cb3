//! Configuration for the FAQ matcher.
//!
//! Every field has a default, so an empty TOML file (or no file at all) is a
//! valid configuration:
//!
//! ```toml
//! catalog_path = "faqs.json"
//! threshold = 0.5
//! verbose = false
//!
//! [embedding]
//! provider = "local"
//! model = "sentence-transformers/all-MiniLM-L6-v2"
//!
//! [server]
//! bind = "0.0.0.0:8000"
//! request_timeout_secs = 30
//! ```

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;

use faqbot_embeddings::{
    CachedProvider, EmbeddingCache, EmbeddingProvider, HashingProvider, LocalBertProvider,
    OpenAIProvider,
};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{MatchError, Result};

/// Default similarity threshold.
pub const DEFAULT_THRESHOLD: f32 = 0.5;

/// Top-level matcher configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MatcherConfig {
    /// Path to the JSON catalog.
    pub catalog_path: PathBuf,

    /// Minimum similarity for a confident answer (inclusive).
    pub threshold: f32,

    /// Surface the matched question and raw score to the user.
    pub verbose: bool,

    /// Embedding provider configuration.
    pub embedding: EmbeddingConfig,

    /// HTTP transport configuration.
    pub server: ServerConfig,
}

impl MatcherConfig {
    /// Parse a configuration from TOML.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Self =
            toml::from_str(content).map_err(|e| MatchError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load a configuration file.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| MatchError::Config(format!("{}: {e}", path.display())))?;

        let config = Self::from_toml_str(&content)?;
        info!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Set the catalog path.
    pub fn with_catalog_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.catalog_path = path.into();
        self
    }

    /// Set the similarity threshold.
    pub fn with_threshold(mut self, threshold: f32) -> Self {
        self.threshold = threshold;
        self
    }

    /// Set the embedding configuration.
    pub fn with_embedding(mut self, embedding: EmbeddingConfig) -> Self {
        self.embedding = embedding;
        self
    }

    /// Check values that would otherwise only fail at engine start.
    pub fn validate(&self) -> Result<()> {
        validate_threshold(self.threshold)?;
        if self.embedding.cache_max_entries == 0 {
            return Err(MatchError::Config(
                "embedding.cache_max_entries must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for MatcherConfig {
    fn default() -> Self {
        Self {
            catalog_path: PathBuf::from("faqs.json"),
            threshold: DEFAULT_THRESHOLD,
            verbose: false,
            embedding: EmbeddingConfig::default(),
            server: ServerConfig::default(),
        }
    }
}

/// Reject thresholds outside `[-1, 1]`, including NaN.
pub fn validate_threshold(threshold: f32) -> Result<()> {
    if (-1.0..=1.0).contains(&threshold) {
        Ok(())
    } else {
        Err(MatchError::InvalidThreshold(threshold))
    }
}

/// Configuration for the embedding provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    /// Which provider to use.
    pub provider: EmbeddingProviderType,

    /// Model override for the provider. For `local` this is a Hugging Face
    /// model id or a directory holding the model files.
    pub model: Option<String>,

    /// Base URL of an OpenAI-compatible endpoint.
    pub base_url: Option<String>,

    /// Environment variable holding the API key.
    pub api_key_env: String,

    /// Vector dimension for the hashing provider.
    pub dimension: Option<usize>,

    /// Texts per request (`openai`) or forward pass (`local`).
    pub batch_size: Option<usize>,

    /// Whether to cache embeddings.
    pub cache_enabled: bool,

    /// Maximum cache size.
    pub cache_max_entries: usize,

    /// Where to persist the cache; in-memory only when unset.
    pub cache_path: Option<PathBuf>,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: EmbeddingProviderType::Local,
            model: None,
            base_url: None,
            api_key_env: "OPENAI_API_KEY".to_string(),
            dimension: None,
            batch_size: None,
            cache_enabled: true,
            cache_max_entries: 10000,
            cache_path: None,
        }
    }
}

impl EmbeddingConfig {
    /// Construct the configured provider.
    ///
    /// The returned handle is owned by whoever composes the engine; nothing
    /// here is global, so several engines can run side by side.
    pub async fn build_provider(&self) -> Result<Arc<dyn EmbeddingProvider>> {
        match self.provider {
            EmbeddingProviderType::OpenAI => {
                let mut provider = OpenAIProvider::new();
                if let Ok(key) = std::env::var(&self.api_key_env) {
                    provider = provider.with_api_key(key);
                }
                if let Some(url) = &self.base_url {
                    provider = provider.with_base_url(url);
                }
                if let Some(model) = &self.model {
                    provider = provider.with_model(model);
                }
                if let Some(batch_size) = self.batch_size {
                    provider = provider.with_batch_size(batch_size);
                }
                if !provider.is_available() {
                    return Err(MatchError::Config(format!(
                        "openai provider selected but {} is not set",
                        self.api_key_env
                    )));
                }
                self.wrap(provider).await
            }
            EmbeddingProviderType::Local => {
                let model = self
                    .model
                    .as_deref()
                    .unwrap_or(LocalBertProvider::DEFAULT_MODEL);
                let mut provider = if Path::new(model).is_dir() {
                    LocalBertProvider::from_dir(model).await?
                } else {
                    LocalBertProvider::load(model).await?
                };
                if let Some(batch_size) = self.batch_size {
                    provider = provider.with_batch_size(batch_size);
                }
                self.wrap(provider).await
            }
            EmbeddingProviderType::Hashing => {
                let dimension = self.dimension.unwrap_or(HashingProvider::DEFAULT_DIMENSION);
                // Hashing is cheaper than a cache lookup.
                Ok(Arc::new(HashingProvider::with_dimension(dimension)))
            }
        }
    }

    async fn wrap<P>(&self, provider: P) -> Result<Arc<dyn EmbeddingProvider>>
    where
        P: EmbeddingProvider + 'static,
    {
        if !self.cache_enabled {
            return Ok(Arc::new(provider));
        }

        let cache = match &self.cache_path {
            Some(path) => EmbeddingCache::with_persistence(path, self.cache_max_entries).await?,
            None => EmbeddingCache::new(self.cache_max_entries),
        };
        Ok(Arc::new(CachedProvider::new(provider, cache)))
    }
}

/// Type of embedding provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EmbeddingProviderType {
    /// Sentence-transformer model run in process.
    #[serde(rename = "local")]
    Local,
    /// OpenAI-compatible embeddings API.
    #[serde(rename = "openai")]
    OpenAI,
    /// Lexical feature hashing; no model files needed.
    #[serde(rename = "hashing")]
    Hashing,
}

impl FromStr for EmbeddingProviderType {
    type Err = MatchError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "local" => Ok(Self::Local),
            "openai" => Ok(Self::OpenAI),
            "hashing" => Ok(Self::Hashing),
            other => Err(MatchError::Config(format!(
                "unknown embedding provider: {other}"
            ))),
        }
    }
}

impl fmt::Display for EmbeddingProviderType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Local => f.write_str("local"),
            Self::OpenAI => f.write_str("openai"),
            Self::Hashing => f.write_str("hashing"),
        }
    }
}

/// Configuration for the HTTP transport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Socket address to listen on.
    pub bind: String,

    /// Per-request deadline, covering embedding of the query.
    pub request_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:8000".to_string(),
            request_timeout_secs: 30,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_empty_toml_is_default() {
        let config = MatcherConfig::from_toml_str("").unwrap();
        assert_eq!(config, MatcherConfig::default());
        assert_eq!(config.threshold, 0.5);
        assert_eq!(config.catalog_path, PathBuf::from("faqs.json"));
    }

    #[test]
    fn test_partial_toml_overrides() {
        let config = MatcherConfig::from_toml_str(
            r#"
            threshold = 0.7
            verbose = true

            [embedding]
            provider = "openai"
            model = "all-MiniLM-L6-v2"
            base_url = "http://localhost:8080/v1"

            [server]
            request_timeout_secs = 5
            "#,
        )
        .unwrap();

        assert_eq!(config.threshold, 0.7);
        assert!(config.verbose);
        assert_eq!(config.embedding.provider, EmbeddingProviderType::OpenAI);
        assert_eq!(config.embedding.model.as_deref(), Some("all-MiniLM-L6-v2"));
        assert_eq!(config.server.request_timeout_secs, 5);
        assert_eq!(config.server.bind, "0.0.0.0:8000");
    }

    #[test]
    fn test_out_of_range_threshold_rejected() {
        let err = MatcherConfig::from_toml_str("threshold = 1.5").unwrap_err();
        assert!(matches!(err, MatchError::InvalidThreshold(_)));
    }

    #[test]
    fn test_unknown_provider_rejected() {
        let err = MatcherConfig::from_toml_str("[embedding]\nprovider = \"magic\"").unwrap_err();
        assert!(matches!(err, MatchError::Config(_)));
        assert!("magic".parse::<EmbeddingProviderType>().is_err());
        assert_eq!(
            "OpenAI".parse::<EmbeddingProviderType>().unwrap(),
            EmbeddingProviderType::OpenAI
        );
    }

    #[test]
    fn test_threshold_bounds_are_inclusive() {
        assert!(validate_threshold(-1.0).is_ok());
        assert!(validate_threshold(1.0).is_ok());
        assert!(validate_threshold(f32::NAN).is_err());
    }

    #[tokio::test]
    async fn test_hashing_provider_from_config() {
        let config = EmbeddingConfig {
            provider: EmbeddingProviderType::Hashing,
            dimension: Some(64),
            ..EmbeddingConfig::default()
        };
        let provider = config.build_provider().await.unwrap();
        assert_eq!(provider.name(), "hashing");
        assert_eq!(provider.default_dimension(), 64);
    }

    #[tokio::test]
    async fn test_openai_without_key_is_config_error() {
        let config = EmbeddingConfig {
            provider: EmbeddingProviderType::OpenAI,
            api_key_env: "FAQBOT_TEST_KEY_THAT_IS_NEVER_SET".to_string(),
            ..EmbeddingConfig::default()
        };
        let err = config.build_provider().await.err().unwrap();
        assert!(matches!(err, MatchError::Config(_)));
    }

    #[test]
    fn test_local_model_is_the_default() {
        let config = EmbeddingConfig::default();
        assert_eq!(config.provider, EmbeddingProviderType::Local);
        assert_eq!(
            "local".parse::<EmbeddingProviderType>().unwrap(),
            EmbeddingProviderType::Local
        );
        assert_eq!(EmbeddingProviderType::Local.to_string(), "local");
    }

    #[tokio::test]
    async fn test_local_model_dir_without_files_fails() {
        let dir = tempfile::tempdir().unwrap();
        let config = EmbeddingConfig {
            model: Some(dir.path().display().to_string()),
            ..EmbeddingConfig::default()
        };
        let err = config.build_provider().await.err().unwrap();
        assert!(matches!(err, MatchError::EmbeddingProvider(_)));
    }
}
