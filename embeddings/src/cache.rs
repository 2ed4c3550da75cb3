//! Embedding cache for efficient retrieval.
//!
//! Rebuilding the index re-embeds every catalog question. With a remote
//! provider that is one paid round trip per restart, so vectors can be kept
//! in memory and optionally persisted as JSON between runs.
//!
//! Only batch embeds (the catalog build) write the cache file. Single query
//! misses stay in memory until the next batch or an explicit
//! [`EmbeddingCache::persist`].

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::fs;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::Embedding;
use crate::error::{EmbeddingError, Result};
use crate::provider::{EmbeddingProvider, EmbeddingRequest, EmbeddingResponse};

/// Cache entry for an embedding.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry {
    /// Hash of the embedded text and model.
    pub text_hash: String,

    /// The embedding vector.
    pub embedding: Embedding,

    /// Model used to generate the embedding.
    pub model: String,

    /// Requested output dimension, if the request set one.
    #[serde(default)]
    pub dimensions: Option<usize>,

    /// Insertion sequence number; the lowest is evicted first.
    pub sequence: u64,
}

#[derive(Debug, Default)]
struct CacheState {
    entries: HashMap<String, CacheEntry>,
    next_sequence: u64,
}

/// Cache for embeddings to avoid redundant API calls.
pub struct EmbeddingCache {
    /// In-memory cache.
    state: Arc<RwLock<CacheState>>,

    /// Path for persistent cache storage.
    cache_path: Option<PathBuf>,

    /// Maximum cache size.
    max_entries: usize,

    /// Serializes writers of the cache file.
    persist_lock: Mutex<()>,
}

impl EmbeddingCache {
    /// Create a new in-memory cache.
    pub fn new(max_entries: usize) -> Self {
        Self {
            state: Arc::new(RwLock::new(CacheState::default())),
            cache_path: None,
            max_entries: max_entries.max(1),
            persist_lock: Mutex::new(()),
        }
    }

    /// Create a cache backed by a JSON file, loading it if it exists.
    pub async fn with_persistence(path: impl AsRef<Path>, max_entries: usize) -> Result<Self> {
        let cache = Self {
            cache_path: Some(path.as_ref().to_path_buf()),
            ..Self::new(max_entries)
        };

        cache.load().await?;
        Ok(cache)
    }

    /// Compute a hash for cache lookup.
    fn hash_key(text: &str, model: &str, dimensions: Option<usize>) -> String {
        use std::collections::hash_map::DefaultHasher;
        use std::hash::{Hash, Hasher};

        let mut hasher = DefaultHasher::new();
        text.hash(&mut hasher);
        model.hash(&mut hasher);
        dimensions.hash(&mut hasher);
        format!("{:x}", hasher.finish())
    }

    /// Get an embedding from the cache.
    pub async fn get(
        &self,
        text: &str,
        model: &str,
        dimensions: Option<usize>,
    ) -> Option<Embedding> {
        let key = Self::hash_key(text, model, dimensions);
        let state = self.state.read().await;
        state.entries.get(&key).map(|e| e.embedding.clone())
    }

    /// Put an embedding in the cache, evicting the oldest entry when full.
    pub async fn put(
        &self,
        text: &str,
        model: &str,
        dimensions: Option<usize>,
        embedding: Embedding,
    ) {
        let key = Self::hash_key(text, model, dimensions);
        let mut state = self.state.write().await;

        if !state.entries.contains_key(&key) && state.entries.len() >= self.max_entries {
            if let Some(oldest_key) = state
                .entries
                .iter()
                .min_by_key(|(_, v)| v.sequence)
                .map(|(k, _)| k.clone())
            {
                state.entries.remove(&oldest_key);
            }
        }

        let sequence = state.next_sequence;
        state.next_sequence += 1;
        state.entries.insert(
            key.clone(),
            CacheEntry {
                text_hash: key,
                embedding,
                model: model.to_string(),
                dimensions,
                sequence,
            },
        );
        debug!("Cached embedding for text (model: {model})");
    }

    /// Check if an embedding is cached.
    pub async fn contains(&self, text: &str, model: &str, dimensions: Option<usize>) -> bool {
        let key = Self::hash_key(text, model, dimensions);
        self.state.read().await.entries.contains_key(&key)
    }

    /// Clear the entire cache.
    pub async fn clear(&self) {
        self.state.write().await.entries.clear();
        info!("Cleared embedding cache");
    }

    /// Get cache statistics.
    pub async fn stats(&self) -> CacheStats {
        let state = self.state.read().await;
        let mut models: Vec<String> = state
            .entries
            .values()
            .map(|e| e.model.clone())
            .collect::<std::collections::HashSet<_>>()
            .into_iter()
            .collect();
        models.sort();

        CacheStats {
            entries: state.entries.len(),
            max_entries: self.max_entries,
            models,
        }
    }

    /// Write the cache to disk if persistence is enabled.
    ///
    /// The file is replaced atomically: a reader sees either the previous
    /// contents or the new ones.
    pub async fn persist(&self) -> Result<()> {
        let Some(path) = &self.cache_path else {
            return Ok(());
        };

        let _guard = self.persist_lock.lock().await;
        let content = {
            let state = self.state.read().await;
            let mut entries: Vec<&CacheEntry> = state.entries.values().collect();
            entries.sort_by_key(|e| e.sequence);
            serde_json::to_string(&entries)?
        };

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }

        let mut staging = path.clone().into_os_string();
        staging.push(".tmp");
        let staging = PathBuf::from(staging);

        fs::write(&staging, content).await?;
        fs::rename(&staging, path).await?;
        debug!("Saved embedding cache to {}", path.display());
        Ok(())
    }

    /// Load cache from disk.
    async fn load(&self) -> Result<()> {
        let Some(path) = &self.cache_path else {
            return Ok(());
        };
        if !fs::try_exists(path).await? {
            return Ok(());
        }

        let content = fs::read_to_string(path).await?;
        let entries: Vec<CacheEntry> = serde_json::from_str(&content)?;

        let mut state = self.state.write().await;
        for entry in entries {
            state.next_sequence = state.next_sequence.max(entry.sequence + 1);
            state.entries.insert(entry.text_hash.clone(), entry);
        }

        info!("Loaded {} cache entries from disk", state.entries.len());
        Ok(())
    }
}

/// Statistics about the embedding cache.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheStats {
    /// Number of entries in cache.
    pub entries: usize,

    /// Maximum cache size.
    pub max_entries: usize,

    /// Models with cached embeddings.
    pub models: Vec<String>,
}

/// A provider wrapper that serves repeated texts from an [`EmbeddingCache`].
pub struct CachedProvider<P> {
    provider: P,
    cache: EmbeddingCache,
}

impl<P> CachedProvider<P>
where
    P: EmbeddingProvider,
{
    /// Create a new cached provider.
    pub fn new(provider: P, cache: EmbeddingCache) -> Self {
        Self { provider, cache }
    }

    /// Get the underlying cache.
    pub fn cache(&self) -> &EmbeddingCache {
        &self.cache
    }

    fn model_for(&self, request: &EmbeddingRequest) -> String {
        request
            .model
            .clone()
            .unwrap_or_else(|| self.provider.default_model().to_string())
    }

    /// Persist new entries, logging rather than returning a failed write.
    async fn persist_quietly(&self) {
        if let Err(err) = self.cache.persist().await {
            warn!("Failed to save embedding cache: {err}");
        }
    }
}

#[async_trait]
impl<P> EmbeddingProvider for CachedProvider<P>
where
    P: EmbeddingProvider,
{
    fn name(&self) -> &str {
        self.provider.name()
    }

    fn default_model(&self) -> &str {
        self.provider.default_model()
    }

    fn default_dimension(&self) -> usize {
        self.provider.default_dimension()
    }

    async fn embed(&self, request: EmbeddingRequest) -> Result<EmbeddingResponse> {
        let model = self.model_for(&request);

        let dimensions = request.dimensions;
        if let Some(embedding) = self.cache.get(&request.text, &model, dimensions).await {
            debug!("Cache hit for embedding");
            return Ok(EmbeddingResponse {
                dimension: embedding.len(),
                embedding,
                model,
                tokens_used: None,
            });
        }

        let text = request.text.clone();
        let response = self.provider.embed(request).await?;
        self.cache
            .put(&text, &model, dimensions, response.embedding.clone())
            .await;

        Ok(response)
    }

    async fn embed_batch(&self, requests: Vec<EmbeddingRequest>) -> Result<Vec<EmbeddingResponse>> {
        let mut results: Vec<Option<EmbeddingResponse>> = Vec::with_capacity(requests.len());
        let mut misses = Vec::new();

        for (position, request) in requests.into_iter().enumerate() {
            let model = self.model_for(&request);
            match self.cache.get(&request.text, &model, request.dimensions).await {
                Some(embedding) => results.push(Some(EmbeddingResponse {
                    dimension: embedding.len(),
                    embedding,
                    model,
                    tokens_used: None,
                })),
                None => {
                    results.push(None);
                    misses.push((position, model, request));
                }
            }
        }

        debug!(
            "Embedding batch: {} cached, {} to compute",
            results.len() - misses.len(),
            misses.len()
        );

        if !misses.is_empty() {
            let requests: Vec<EmbeddingRequest> =
                misses.iter().map(|(_, _, request)| request.clone()).collect();
            let computed = self.provider.embed_batch(requests).await?;

            for ((position, model, request), response) in misses.into_iter().zip(computed) {
                self.cache
                    .put(
                        &request.text,
                        &model,
                        request.dimensions,
                        response.embedding.clone(),
                    )
                    .await;
                results[position] = Some(response);
            }
            self.persist_quietly().await;
        }

        results
            .into_iter()
            .map(|r| {
                r.ok_or_else(|| {
                    EmbeddingError::InvalidResponse(
                        "provider returned fewer embeddings than requested".to_string(),
                    )
                })
            })
            .collect()
    }

    fn is_available(&self) -> bool {
        self.provider.is_available()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::HashingProvider;
    use pretty_assertions::assert_eq;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn test_cache_put_get() {
        let cache = EmbeddingCache::new(100);
        let embedding = vec![1.0, 2.0, 3.0];

        cache.put("hello", "model-1", None, embedding.clone()).await;

        assert_eq!(cache.get("hello", "model-1", None).await, Some(embedding));
        assert!(cache.get("hello", "model-2", None).await.is_none());
    }

    #[tokio::test]
    async fn test_cache_miss() {
        let cache = EmbeddingCache::new(100);
        let result = cache.get("not cached", "model-1", None).await;
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn test_cache_eviction_drops_oldest() {
        let cache = EmbeddingCache::new(2);

        cache.put("a", "model", None, vec![1.0]).await;
        cache.put("b", "model", None, vec![2.0]).await;
        cache.put("c", "model", None, vec![3.0]).await;

        let stats = cache.stats().await;
        assert_eq!(stats.entries, 2);
        assert!(!cache.contains("a", "model", None).await);
        assert!(cache.contains("c", "model", None).await);
    }

    #[tokio::test]
    async fn test_cache_persistence_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache/embeddings.json");

        let cache = EmbeddingCache::with_persistence(&path, 10).await.unwrap();
        cache.put("hello", "m", None, vec![0.5, 0.5]).await;
        cache.persist().await.unwrap();

        let reloaded = EmbeddingCache::with_persistence(&path, 10).await.unwrap();
        assert_eq!(reloaded.get("hello", "m", None).await, Some(vec![0.5, 0.5]));
    }

    struct CountingProvider {
        inner: HashingProvider,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl EmbeddingProvider for CountingProvider {
        fn name(&self) -> &str {
            "counting"
        }

        fn default_model(&self) -> &str {
            self.inner.default_model()
        }

        fn default_dimension(&self) -> usize {
            self.inner.default_dimension()
        }

        async fn embed(&self, request: EmbeddingRequest) -> Result<EmbeddingResponse> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.inner.embed(request).await
        }

        fn is_available(&self) -> bool {
            true
        }
    }

    #[tokio::test]
    async fn test_cached_provider_skips_repeat_calls() {
        let provider = CachedProvider::new(counting(8), EmbeddingCache::new(100));

        let first = provider.embed(EmbeddingRequest::new("hours")).await.unwrap();
        let batch = provider
            .embed_batch(vec![
                EmbeddingRequest::new("location"),
                EmbeddingRequest::new("hours"),
            ])
            .await
            .unwrap();

        assert_eq!(provider.provider.calls.load(Ordering::SeqCst), 2);
        assert_eq!(batch.len(), 2);
        assert_eq!(batch[1].embedding, first.embedding);
    }

    fn counting(dimension: usize) -> CountingProvider {
        CountingProvider {
            inner: HashingProvider::with_dimension(dimension),
            calls: AtomicUsize::new(0),
        }
    }

    #[tokio::test]
    async fn test_cache_key_includes_dimensions() {
        let provider = CachedProvider::new(counting(8), EmbeddingCache::new(100));

        let small = provider
            .embed(EmbeddingRequest::new("hours").with_dimensions(4))
            .await
            .unwrap();
        let large = provider
            .embed(EmbeddingRequest::new("hours").with_dimensions(16))
            .await
            .unwrap();

        assert_eq!(provider.provider.calls.load(Ordering::SeqCst), 2);
        assert_eq!(small.dimension, 4);
        assert_eq!(large.dimension, 16);
    }

    #[tokio::test]
    async fn test_query_miss_does_not_touch_cache_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("embeddings.json");
        let cache = EmbeddingCache::with_persistence(&path, 10).await.unwrap();
        let provider = CachedProvider::new(counting(8), cache);

        provider.embed(EmbeddingRequest::new("hours")).await.unwrap();

        assert!(!path.exists());
        assert!(provider.cache().contains("hours", HashingProvider::MODEL, None).await);
    }

    #[tokio::test]
    async fn test_batch_persists_and_reloads() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("embeddings.json");
        let cache = EmbeddingCache::with_persistence(&path, 10).await.unwrap();
        let provider = CachedProvider::new(counting(8), cache);

        provider
            .embed_batch(vec![
                EmbeddingRequest::new("hours"),
                EmbeddingRequest::new("location"),
            ])
            .await
            .unwrap();

        assert!(!dir.path().join("embeddings.json.tmp").exists());
        let reloaded = EmbeddingCache::with_persistence(&path, 10).await.unwrap();
        assert_eq!(reloaded.stats().await.entries, 2);
    }

    #[tokio::test]
    async fn test_unwritable_cache_file_does_not_fail_embedding() {
        let dir = tempfile::tempdir().unwrap();
        let cache_dir = dir.path().join("cachedir");
        let cache = EmbeddingCache::with_persistence(cache_dir.join("cache.json"), 10)
            .await
            .unwrap();
        let provider = CachedProvider::new(counting(8), cache);

        // A plain file where the cache directory should be.
        std::fs::write(&cache_dir, b"").unwrap();

        let batch = provider
            .embed_batch(vec![EmbeddingRequest::new("where is the shop located")])
            .await
            .unwrap();
        assert_eq!(batch.len(), 1);

        let single = provider
            .embed(EmbeddingRequest::new("what time do you open"))
            .await
            .unwrap();
        assert_eq!(single.dimension, 8);
        assert!(provider.cache().persist().await.is_err());
    }
}
