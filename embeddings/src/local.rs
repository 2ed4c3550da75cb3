//! Offline sentence embeddings from a BERT-family encoder.
//!
//! Weights are fetched once from the Hugging Face hub (or read from a local
//! directory) and run on the CPU, or CUDA when available. Token states are
//! mean-pooled over the attention mask and L2-normalized, which is how
//! sentence-transformers models are meant to be used.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use candle_core::{DType, Device, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::models::bert::{BertModel, Config};
use hf_hub::api::sync::Api;
use hf_hub::{Repo, RepoType};
use serde::Deserialize;
use tokenizers::{PaddingParams, Tokenizer, TruncationParams};
use tracing::{debug, info};

use crate::Embedding;
use crate::error::{EmbeddingError, Result};
use crate::provider::{EmbeddingProvider, EmbeddingRequest, EmbeddingResponse};

/// Sentence-embedding provider backed by a local BERT model.
pub struct LocalBertProvider {
    model: Arc<LoadedModel>,
    model_id: String,
    batch_size: usize,
}

struct LoadedModel {
    bert: BertModel,
    tokenizer: Tokenizer,
    device: Device,
    dimension: usize,
}

/// The one field of `config.json` needed outside the model itself.
#[derive(Deserialize)]
struct EncoderShape {
    hidden_size: usize,
}

impl LocalBertProvider {
    /// Default sentence-transformers checkpoint.
    pub const DEFAULT_MODEL: &'static str = "sentence-transformers/all-MiniLM-L6-v2";

    /// Texts per forward pass.
    pub const DEFAULT_BATCH_SIZE: usize = 64;

    /// Longer inputs are truncated to this many tokens.
    const MAX_TOKENS: usize = 256;

    /// Download (or reuse the hub cache of) `model_id` and load it.
    pub async fn load(model_id: impl Into<String>) -> Result<Self> {
        let model_id = model_id.into();
        let repo_id = model_id.clone();

        let started = Instant::now();
        let model = blocking(move || {
            let api = Api::new().map_err(model_error)?;
            let repo = api.repo(Repo::new(repo_id, RepoType::Model));
            let fetch = |file: &str| repo.get(file).map_err(model_error);
            LoadedModel::from_files(
                fetch("config.json")?,
                fetch("tokenizer.json")?,
                fetch("model.safetensors")?,
            )
        })
        .await?;

        info!(
            "Loaded {model_id} (dimension {}) in {:.2}s",
            model.dimension,
            started.elapsed().as_secs_f32()
        );

        Ok(Self {
            model: Arc::new(model),
            model_id,
            batch_size: Self::DEFAULT_BATCH_SIZE,
        })
    }

    /// Load a model from a directory holding `config.json`, `tokenizer.json`
    /// and `model.safetensors`.
    pub async fn from_dir(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        let model_id = dir.display().to_string();

        let model = blocking(move || {
            LoadedModel::from_files(
                dir.join("config.json"),
                dir.join("tokenizer.json"),
                dir.join("model.safetensors"),
            )
        })
        .await?;

        info!("Loaded {model_id} (dimension {})", model.dimension);

        Ok(Self {
            model: Arc::new(model),
            model_id,
            batch_size: Self::DEFAULT_BATCH_SIZE,
        })
    }

    /// Set how many texts share one forward pass (at least one).
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    async fn encode(&self, texts: Vec<String>) -> Result<Vec<Embedding>> {
        let model = Arc::clone(&self.model);
        let batch_size = self.batch_size;
        blocking(move || {
            let mut embeddings = Vec::with_capacity(texts.len());
            for chunk in texts.chunks(batch_size) {
                embeddings.extend(model.encode_chunk(chunk)?);
            }
            Ok(embeddings)
        })
        .await
    }
}

impl LoadedModel {
    fn from_files(
        config_path: PathBuf,
        tokenizer_path: PathBuf,
        weights_path: PathBuf,
    ) -> Result<Self> {
        let config_json = std::fs::read_to_string(config_path)?;
        let config: Config = serde_json::from_str(&config_json)?;
        let EncoderShape { hidden_size } = serde_json::from_str(&config_json)?;

        let mut tokenizer = Tokenizer::from_file(tokenizer_path).map_err(model_error)?;
        tokenizer.with_padding(Some(PaddingParams::default()));
        tokenizer
            .with_truncation(Some(TruncationParams {
                max_length: LocalBertProvider::MAX_TOKENS,
                ..Default::default()
            }))
            .map_err(model_error)?;

        let device = Device::cuda_if_available(0)?;
        // SAFETY: the weights file is not modified while mapped.
        let vb = unsafe {
            VarBuilder::from_mmaped_safetensors(&[weights_path], DType::F32, &device)?
        };
        let bert = BertModel::load(vb, &config)?;

        Ok(Self {
            bert,
            tokenizer,
            device,
            dimension: hidden_size,
        })
    }

    fn encode_chunk(&self, texts: &[String]) -> Result<Vec<Embedding>> {
        let inputs: Vec<&str> = texts.iter().map(String::as_str).collect();
        let encodings = self
            .tokenizer
            .encode_batch(inputs, true)
            .map_err(model_error)?;

        let Some(seq_len) = encodings.first().map(|e| e.get_ids().len()) else {
            return Ok(Vec::new());
        };

        let ids: Vec<u32> = encodings
            .iter()
            .flat_map(|e| e.get_ids().iter().copied())
            .collect();
        let mask: Vec<u32> = encodings
            .iter()
            .flat_map(|e| e.get_attention_mask().iter().copied())
            .collect();

        let ids = Tensor::from_vec(ids, (encodings.len(), seq_len), &self.device)?;
        let mask = Tensor::from_vec(mask, (encodings.len(), seq_len), &self.device)?;
        let type_ids = ids.zeros_like()?;

        let hidden = self.bert.forward(&ids, &type_ids, Some(&mask))?;
        let pooled = l2_normalize(&mean_pooling(&hidden, &mask)?)?;

        debug!("Encoded {} texts ({seq_len} tokens)", encodings.len());
        pooled.to_vec2::<f32>().map_err(EmbeddingError::from)
    }
}

fn mean_pooling(hidden_states: &Tensor, attention_mask: &Tensor) -> candle_core::Result<Tensor> {
    let mask_expanded = attention_mask
        .unsqueeze(2)?
        .broadcast_as(hidden_states.shape())?
        .to_dtype(hidden_states.dtype())?;
    let sum_embeddings = (hidden_states * &mask_expanded)?.sum(1)?;
    let sum_mask = mask_expanded.sum(1)?.clamp(1e-9, f64::MAX)?;
    sum_embeddings.broadcast_div(&sum_mask)
}

fn l2_normalize(tensor: &Tensor) -> candle_core::Result<Tensor> {
    let norm = tensor.sqr()?.sum_keepdim(1)?.sqrt()?;
    tensor.broadcast_div(&norm.clamp(1e-12, f64::MAX)?)
}

fn model_error(err: impl std::fmt::Display) -> EmbeddingError {
    EmbeddingError::Model(err.to_string())
}

/// Run CPU-bound model work off the async executor.
async fn blocking<T, F>(work: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(model_error)?
}

#[async_trait]
impl EmbeddingProvider for LocalBertProvider {
    fn name(&self) -> &str {
        "local"
    }

    fn default_model(&self) -> &str {
        &self.model_id
    }

    fn default_dimension(&self) -> usize {
        self.model.dimension
    }

    async fn embed(&self, request: EmbeddingRequest) -> Result<EmbeddingResponse> {
        let mut batch = self.embed_batch(vec![request]).await?;
        batch
            .pop()
            .ok_or_else(|| EmbeddingError::InvalidResponse("no embedding produced".to_string()))
    }

    async fn embed_batch(&self, requests: Vec<EmbeddingRequest>) -> Result<Vec<EmbeddingResponse>> {
        let texts: Vec<String> = requests.into_iter().map(|r| r.text).collect();
        let embeddings = self.encode(texts).await?;

        Ok(embeddings
            .into_iter()
            .map(|embedding| EmbeddingResponse {
                dimension: embedding.len(),
                embedding,
                model: self.model_id.clone(),
                tokens_used: None,
            })
            .collect())
    }

    fn is_available(&self) -> bool {
        true
    }
}
