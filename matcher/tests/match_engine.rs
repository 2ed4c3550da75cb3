//! Behavioural tests for the match engine using a fixed-vector provider.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use faqbot_embeddings::{
    EmbeddingError, EmbeddingProvider, EmbeddingRequest, EmbeddingResponse, normalize,
};
use faqbot_matcher::{
    Catalog, CatalogEntry, EmbeddingConfig, EmbeddingProviderType, MatchAnswer, MatchEngine,
    MatchError,
};
use pretty_assertions::assert_eq;

/// Provider double that maps known texts to hand-picked vectors.
struct FixedProvider {
    vectors: HashMap<String, Vec<f32>>,
    fallback: Vec<f32>,
    failing: Vec<String>,
    calls: Arc<AtomicUsize>,
}

impl FixedProvider {
    fn new(fallback: Vec<f32>) -> Self {
        Self {
            vectors: HashMap::new(),
            fallback,
            failing: Vec::new(),
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    fn with(mut self, text: &str, vector: Vec<f32>) -> Self {
        self.vectors.insert(text.to_string(), vector);
        self
    }

    fn failing_on(mut self, text: &str) -> Self {
        self.failing.push(text.to_string());
        self
    }
}

#[async_trait]
impl EmbeddingProvider for FixedProvider {
    fn name(&self) -> &str {
        "fixed"
    }

    fn default_model(&self) -> &str {
        "fixed-v1"
    }

    fn default_dimension(&self) -> usize {
        self.fallback.len()
    }

    async fn embed(
        &self,
        request: EmbeddingRequest,
    ) -> faqbot_embeddings::Result<EmbeddingResponse> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        if self.failing.contains(&request.text) {
            return Err(EmbeddingError::ApiRequest("model unavailable".to_string()));
        }

        let embedding = self
            .vectors
            .get(&request.text)
            .cloned()
            .unwrap_or_else(|| self.fallback.clone());

        Ok(EmbeddingResponse {
            dimension: embedding.len(),
            embedding,
            model: "fixed-v1".to_string(),
            tokens_used: None,
        })
    }

    fn is_available(&self) -> bool {
        true
    }
}

fn faq_catalog() -> Catalog {
    Catalog::new(vec![
        CatalogEntry::new("What are your hours?", "9am-5pm"),
        CatalogEntry::new("Where are you located?", "Main St"),
    ])
    .unwrap()
}

fn faq_provider() -> FixedProvider {
    FixedProvider::new(vec![0.0, 0.0, 1.0])
        .with("What are your hours?", vec![1.0, 0.0, 0.0])
        .with("Where are you located?", vec![0.0, 1.0, 0.0])
        .with("What time do you open?", vec![0.9, 0.1, 0.1])
        .with("asdkj qweroiu", vec![0.1, 0.1, 1.0])
}

async fn faq_engine(threshold: f32) -> MatchEngine {
    MatchEngine::initialize(faq_catalog(), Arc::new(faq_provider()), threshold)
        .await
        .unwrap()
}

#[tokio::test]
async fn test_paraphrase_matches_and_nonsense_falls_back() {
    let engine = faq_engine(0.5).await;

    let result = engine.answer("What time do you open?").await.unwrap();
    assert_eq!(result.matched_index, 0);
    assert_eq!(result.answer, MatchAnswer::Answer("9am-5pm".to_string()));
    assert!(result.similarity > 0.5);
    assert_eq!(result.matched_question, "What are your hours?");

    let nonsense = engine.answer("asdkj qweroiu").await.unwrap();
    assert!(nonsense.similarity < 0.5);
    assert_eq!(nonsense.answer, MatchAnswer::LowConfidence);
    assert!(!nonsense.is_confident());
}

#[tokio::test]
async fn test_low_confidence_keeps_raw_score_and_index() {
    let provider = faq_provider().with("near location", vec![0.1, 0.3, 0.9]);
    let engine = MatchEngine::initialize(faq_catalog(), Arc::new(provider), 0.9)
        .await
        .unwrap();

    let result = engine.answer("near location").await.unwrap();
    assert_eq!(result.answer, MatchAnswer::LowConfidence);
    assert_eq!(result.matched_index, 1);
    let expected = 0.3 / (0.01f32 + 0.09 + 0.81).sqrt();
    assert!((result.similarity - expected).abs() < 1e-5);
}

#[tokio::test]
async fn test_answers_are_deterministic() {
    let engine = faq_engine(0.5).await;

    let first = engine.answer("What time do you open?").await.unwrap();
    let second = engine.answer("What time do you open?").await.unwrap();
    assert_eq!(first, second);
}

#[tokio::test]
async fn test_catalog_questions_match_themselves() {
    let engine = faq_engine(0.5).await;

    for (index, entry) in faq_catalog().entries().iter().enumerate() {
        let result = engine.answer(&entry.question).await.unwrap();
        assert_eq!(result.matched_index, index);
        assert!((result.similarity - 1.0).abs() < 1e-6);
        assert_eq!(result.answer.as_answer(), Some(entry.answer.as_str()));
    }
}

#[tokio::test]
async fn test_threshold_boundary_is_inclusive() {
    let catalog = Catalog::new(vec![CatalogEntry::new("only", "yes")]).unwrap();
    let query = vec![0.6, 0.8];
    let score_at_boundary = normalize(query.clone()).as_slice()[0];

    let provider = || {
        Arc::new(
            FixedProvider::new(vec![0.0, 1.0])
                .with("only", vec![1.0, 0.0])
                .with("boundary", query.clone()),
        )
    };

    let at = MatchEngine::initialize(catalog.clone(), provider(), score_at_boundary)
        .await
        .unwrap();
    let accepted = at.answer("boundary").await.unwrap();
    assert_eq!(accepted.similarity, score_at_boundary);
    assert!(accepted.is_confident());

    let just_above = f32::from_bits(score_at_boundary.to_bits() + 1);
    let above = MatchEngine::initialize(catalog, provider(), just_above)
        .await
        .unwrap();
    assert!(!above.answer("boundary").await.unwrap().is_confident());
}

#[tokio::test]
async fn test_permuted_catalog_keeps_answers_correlated() {
    let reversed = Catalog::new(faq_catalog().entries().iter().rev().cloned().collect()).unwrap();
    let engine = MatchEngine::initialize(reversed, Arc::new(faq_provider()), 0.5)
        .await
        .unwrap();

    let result = engine.answer("What time do you open?").await.unwrap();
    assert_eq!(result.matched_index, 1);
    assert_eq!(result.answer.as_answer(), Some("9am-5pm"));
}

#[tokio::test]
async fn test_empty_catalog_never_becomes_ready() {
    let empty = Catalog::new(Vec::new()).unwrap();
    let result = MatchEngine::initialize(empty, Arc::new(faq_provider()), 0.5).await;
    assert!(matches!(result, Err(MatchError::EmptyCatalog)));
}

#[tokio::test]
async fn test_empty_query_skips_provider() {
    let provider = faq_provider();
    let calls = Arc::clone(&provider.calls);
    let engine = MatchEngine::initialize(faq_catalog(), Arc::new(provider), 0.5)
        .await
        .unwrap();
    let after_build = calls.load(Ordering::SeqCst);

    assert!(matches!(engine.answer("").await, Err(MatchError::EmptyQuery)));
    assert!(matches!(engine.answer("   ").await, Err(MatchError::EmptyQuery)));
    assert!(matches!(engine.answer("\t\n").await, Err(MatchError::EmptyQuery)));
    assert_eq!(calls.load(Ordering::SeqCst), after_build);
}

#[tokio::test]
async fn test_query_dimension_mismatch_is_per_call() {
    let provider = faq_provider().with("short", vec![1.0, 0.0]);
    let engine = MatchEngine::initialize(faq_catalog(), Arc::new(provider), 0.5)
        .await
        .unwrap();

    assert!(matches!(
        engine.answer("short").await,
        Err(MatchError::DimensionMismatch {
            expected: 3,
            actual: 2
        })
    ));
    assert!(engine.answer("What time do you open?").await.unwrap().is_confident());
}

#[tokio::test]
async fn test_inconsistent_catalog_dimensions_fail_initialize() {
    let provider = faq_provider().with("Where are you located?", vec![0.0, 1.0]);
    let result = MatchEngine::initialize(faq_catalog(), Arc::new(provider), 0.5).await;
    assert!(matches!(result, Err(MatchError::DimensionMismatch { .. })));
}

#[tokio::test]
async fn test_zero_catalog_vector_fails_initialize() {
    let provider = faq_provider().with("Where are you located?", vec![0.0, 0.0, 0.0]);
    let result = MatchEngine::initialize(faq_catalog(), Arc::new(provider), 0.5).await;
    assert!(matches!(
        result,
        Err(MatchError::DegenerateEmbedding { index: 1 })
    ));
}

#[tokio::test]
async fn test_non_finite_catalog_vector_fails_initialize() {
    let provider = faq_provider().with("What are your hours?", vec![f32::NAN, 0.0, 1.0]);
    let result = MatchEngine::initialize(faq_catalog(), Arc::new(provider), 0.5).await;
    assert!(matches!(result, Err(MatchError::EmbeddingProvider(_))));
}

#[tokio::test]
async fn test_provider_failure_does_not_poison_engine() {
    let provider = faq_provider().failing_on("boom");
    let engine = MatchEngine::initialize(faq_catalog(), Arc::new(provider), 0.5)
        .await
        .unwrap();

    assert!(matches!(
        engine.answer("boom").await,
        Err(MatchError::EmbeddingProvider(EmbeddingError::ApiRequest(_)))
    ));
    assert!(engine.is_ready());
    assert_eq!(
        engine.answer("What time do you open?").await.unwrap().matched_index,
        0
    );
}

#[tokio::test]
async fn test_provider_failure_during_build_is_fatal() {
    let provider = faq_provider().failing_on("What are your hours?");
    let result = MatchEngine::initialize(faq_catalog(), Arc::new(provider), 0.5).await;
    assert!(matches!(result, Err(MatchError::EmbeddingProvider(_))));
}

#[tokio::test]
async fn test_concurrent_queries_agree() {
    let engine = Arc::new(faq_engine(0.5).await);
    let expected = engine.answer("What time do you open?").await.unwrap();

    let handles: Vec<_> = (0..16)
        .map(|_| {
            let engine = Arc::clone(&engine);
            tokio::spawn(async move { engine.answer("What time do you open?").await })
        })
        .collect();

    for handle in handles {
        assert_eq!(handle.await.unwrap().unwrap(), expected);
    }
}

#[tokio::test]
async fn test_engine_from_config_file() {
    let dir = tempfile::tempdir().unwrap();
    let catalog_path = dir.path().join("faqs.json");
    std::fs::write(
        &catalog_path,
        r#"[{"question": "What are your opening hours?", "answer": "9am-5pm"},
            {"question": "Where is the library?", "answer": "Main St"}]"#,
    )
    .unwrap();

    let config = faqbot_matcher::MatcherConfig::default()
        .with_catalog_path(&catalog_path)
        .with_embedding(EmbeddingConfig {
            provider: EmbeddingProviderType::Hashing,
            ..EmbeddingConfig::default()
        });
    let engine = MatchEngine::from_config(&config).await.unwrap();

    assert_eq!(engine.len(), 2);
    let result = engine.answer("where is the library").await.unwrap();
    assert_eq!(result.answer.as_answer(), Some("Main St"));
}
