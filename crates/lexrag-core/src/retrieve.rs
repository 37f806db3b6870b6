//! Filtered similarity retrieval with optional hybrid keyword rescoring.
//!
//! The retrieval algorithm operates entirely through the [`Store`] trait and
//! the [`EmbeddingGateway`]; it has no database or configuration
//! dependencies.
//!
//! # Algorithm
//!
//! 1. Validate [`RetrievalOptions`]. A blank query returns no results.
//! 2. Embed the query (cached).
//! 3. Fetch up to `top_k` chunks whose cosine similarity exceeds
//!    `similarity_threshold`, with metadata filters pushed into the store.
//! 4. Optionally rescore:
//!    `combined = similarity × vector_weight + min(boost, boost_cap) × keyword_weight`
//!    where `boost = boost_per_occurrence × Σ keyword occurrences`.
//! 5. Truncate to `final_results`.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use crate::embedding::{EmbeddingGateway, EmbeddingProvider};
use crate::error::{RagError, Result};
use crate::keywords::{count_occurrences, extract_keywords};
use crate::models::RetrievalResult;
use crate::store::{SearchFilter, Store};

/// Weights of the hybrid vector + keyword score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HybridWeights {
    pub vector_weight: f64,
    pub keyword_weight: f64,
    /// Boost added per keyword occurrence in a chunk.
    pub boost_per_occurrence: f64,
    /// Upper bound of the summed keyword boost.
    pub boost_cap: f64,
}

impl Default for HybridWeights {
    fn default() -> Self {
        Self {
            vector_weight: 0.7,
            keyword_weight: 0.3,
            boost_per_occurrence: 0.1,
            boost_cap: 0.3,
        }
    }
}

/// Per-request retrieval options. Every field has a default, so a JSON
/// request body may carry any subset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalOptions {
    /// Exact match on the document-type tag.
    pub document_type: Option<String>,
    /// Case-insensitive substring of the document title.
    pub title_contains: Option<String>,
    /// Inclusive lower bound on document creation time (Unix seconds).
    pub date_from: Option<i64>,
    /// Inclusive upper bound on document creation time (Unix seconds).
    pub date_to: Option<i64>,
    /// Results must score strictly above this cosine similarity.
    pub similarity_threshold: f64,
    /// Candidates fetched from the store.
    pub top_k: usize,
    /// Results returned to the caller.
    pub final_results: usize,
    pub use_keyword_boost: bool,
    /// Keywords for hybrid rescoring; extracted from the query when empty.
    pub keywords: Vec<String>,
    pub weights: HybridWeights,
}

impl Default for RetrievalOptions {
    fn default() -> Self {
        Self {
            document_type: None,
            title_contains: None,
            date_from: None,
            date_to: None,
            similarity_threshold: 0.3,
            top_k: 10,
            final_results: 4,
            use_keyword_boost: false,
            keywords: Vec::new(),
            weights: HybridWeights::default(),
        }
    }
}

impl RetrievalOptions {
    pub fn validate(&self) -> Result<()> {
        if self.top_k == 0 {
            return Err(RagError::validation("top_k must be >= 1"));
        }
        if self.final_results == 0 {
            return Err(RagError::validation("final_results must be >= 1"));
        }
        if !self.similarity_threshold.is_finite()
            || !(-1.0..=1.0).contains(&self.similarity_threshold)
        {
            return Err(RagError::validation(format!(
                "similarity_threshold must be within [-1, 1], got {}",
                self.similarity_threshold
            )));
        }
        if let (Some(from), Some(to)) = (self.date_from, self.date_to) {
            if from > to {
                return Err(RagError::validation("date_from must not be after date_to"));
            }
        }
        let w = &self.weights;
        for (name, value) in [
            ("vector_weight", w.vector_weight),
            ("keyword_weight", w.keyword_weight),
            ("boost_per_occurrence", w.boost_per_occurrence),
            ("boost_cap", w.boost_cap),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(RagError::validation(format!(
                    "{} must be a non-negative number, got {}",
                    name, value
                )));
            }
        }
        Ok(())
    }

    /// Metadata predicates for the store.
    pub fn filter(&self) -> SearchFilter {
        SearchFilter {
            document_type: self.document_type.clone(),
            title_contains: self.title_contains.clone(),
            date_from: self.date_from,
            date_to: self.date_to,
        }
    }
}

/// Retrieve the chunks most relevant to `query`.
///
/// Returns `Ok(vec![])` when nothing clears the threshold. Provider and
/// store failures propagate as [`RagError::Embedding`] / [`RagError::Store`].
pub async fn retrieve<S, P>(
    store: &S,
    gateway: &EmbeddingGateway<P>,
    query: &str,
    options: &RetrievalOptions,
) -> Result<Vec<RetrievalResult>>
where
    S: Store + ?Sized,
    P: EmbeddingProvider,
{
    options.validate()?;
    if query.trim().is_empty() {
        return Ok(Vec::new());
    }

    let query_vec = gateway.embed_one(query).await?;

    let candidates = store
        .similarity_search(
            &query_vec,
            &options.filter(),
            options.similarity_threshold,
            options.top_k,
        )
        .await
        .map_err(RagError::Store)?;

    let mut results: Vec<RetrievalResult> = candidates
        .into_iter()
        .filter(|c| c.similarity > options.similarity_threshold)
        .map(|c| RetrievalResult {
            chunk_id: c.chunk_id,
            content: c.content,
            similarity: c.similarity,
            metadata: Some(c.metadata),
            combined_score: None,
        })
        .collect();
    sort_desc(&mut results, |r| r.similarity);
    results.truncate(options.top_k);

    if options.use_keyword_boost && !results.is_empty() {
        let keywords = if options.keywords.is_empty() {
            extract_keywords(query)
        } else {
            options.keywords.clone()
        };
        apply_keyword_boost(&mut results, &keywords, &options.weights);
    }

    results.truncate(options.final_results);
    tracing::debug!(
        results = results.len(),
        hybrid = options.use_keyword_boost,
        "retrieval finished"
    );
    Ok(results)
}

/// Set `combined_score` on every result and re-sort by it (stable).
pub fn apply_keyword_boost(
    results: &mut [RetrievalResult],
    keywords: &[String],
    weights: &HybridWeights,
) {
    for result in results.iter_mut() {
        let occurrences: usize = keywords
            .iter()
            .map(|k| count_occurrences(&result.content, k))
            .sum();
        let boost = (weights.boost_per_occurrence * occurrences as f64).min(weights.boost_cap);
        result.combined_score =
            Some(result.similarity * weights.vector_weight + boost * weights.keyword_weight);
    }
    sort_desc(results, RetrievalResult::active_score);
}

fn sort_desc(results: &mut [RetrievalResult], key: impl Fn(&RetrievalResult) -> f64) {
    results.sort_by(|a, b| key(b).partial_cmp(&key(a)).unwrap_or(Ordering::Equal));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::EmbeddingCache;
    use crate::models::{Chunk, Document, DocumentMetadata};
    use crate::store::memory::InMemoryStore;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};
    use std::sync::Arc;

    /// Always embeds to `[1, 0]`.
    struct FixedProvider {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl EmbeddingProvider for FixedProvider {
        fn model_name(&self) -> &str {
            "fixed"
        }
        fn dims(&self) -> usize {
            2
        }
        async fn embed(&self, _text: &str) -> anyhow::Result<Vec<f32>> {
            self.calls.fetch_add(1, AtomicOrdering::SeqCst);
            Ok(vec![1.0, 0.0])
        }
    }

    struct BrokenStore;

    #[async_trait]
    impl Store for BrokenStore {
        async fn upsert_document(&self, _doc: &Document) -> anyhow::Result<String> {
            anyhow::bail!("down")
        }
        async fn replace_chunks(
            &self,
            _doc_id: &str,
            _chunks: &[Chunk],
            _vectors: &[Vec<f32>],
        ) -> anyhow::Result<()> {
            anyhow::bail!("down")
        }
        async fn delete_document(&self, _id: &str) -> anyhow::Result<bool> {
            anyhow::bail!("down")
        }
        async fn get_document(
            &self,
            _id: &str,
        ) -> anyhow::Result<Option<crate::store::DocumentResponse>> {
            anyhow::bail!("down")
        }
        async fn list_documents(&self) -> anyhow::Result<Vec<Document>> {
            anyhow::bail!("down")
        }
        async fn similarity_search(
            &self,
            _query_vec: &[f32],
            _filter: &SearchFilter,
            _min_similarity: f64,
            _limit: usize,
        ) -> anyhow::Result<Vec<crate::store::ChunkCandidate>> {
            anyhow::bail!("down")
        }
        async fn record_query_log(&self, _log: &crate::models::QueryLog) -> anyhow::Result<()> {
            anyhow::bail!("down")
        }
        async fn recent_query_logs(
            &self,
            _limit: usize,
            _since: Option<i64>,
        ) -> anyhow::Result<Vec<crate::models::QueryLog>> {
            anyhow::bail!("down")
        }
    }

    fn gateway() -> EmbeddingGateway<FixedProvider> {
        EmbeddingGateway::new(
            FixedProvider {
                calls: AtomicUsize::new(0),
            },
            Arc::new(EmbeddingCache::new(8)),
            8,
        )
    }

    /// Stores one single-chunk document per `(content, vector, doc_type)`.
    async fn seeded_store(entries: &[(&str, Vec<f32>, &str)]) -> InMemoryStore {
        let store = InMemoryStore::new();
        for (content, vector, doc_type) in entries {
            let doc = Document::new(
                *content,
                DocumentMetadata {
                    title: Some(format!("Doc {}", content)),
                    doc_type: Some(doc_type.to_string()),
                    source: None,
                },
            );
            store.upsert_document(&doc).await.unwrap();
            let chunk = Chunk::new(doc.chunk_metadata(), 0, content);
            store
                .replace_chunks(&doc.id, &[chunk], &[vector.clone()])
                .await
                .unwrap();
        }
        store
    }

    /// Unit vector with cosine `sim` against `[1, 0]`.
    fn at(sim: f32) -> Vec<f32> {
        vec![sim, (1.0 - sim * sim).sqrt()]
    }

    #[tokio::test]
    async fn test_empty_corpus_returns_empty() {
        let store = InMemoryStore::new();
        let results = retrieve(&store, &gateway(), "anything", &RetrievalOptions::default())
            .await
            .unwrap();
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn test_vector_only_ordering() {
        let store = seeded_store(&[("low", at(0.4), "ley"), ("high", at(0.9), "ley")]).await;
        let results = retrieve(&store, &gateway(), "query", &RetrievalOptions::default())
            .await
            .unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].content, "high");
        assert!((results[0].similarity - 0.9).abs() < 1e-5);
        assert!((results[1].similarity - 0.4).abs() < 1e-5);
        assert!(results.iter().all(|r| r.combined_score.is_none()));
    }

    #[tokio::test]
    async fn test_threshold_is_strict_and_monotonic() {
        let store = seeded_store(&[
            ("a", at(0.9), "ley"),
            ("b", at(0.5), "ley"),
            ("c", at(0.35), "ley"),
        ])
        .await;
        let gw = gateway();

        let mut previous = usize::MAX;
        for threshold in [0.0, 0.3, 0.5, 0.8, 0.95] {
            let options = RetrievalOptions {
                similarity_threshold: threshold,
                final_results: 10,
                ..Default::default()
            };
            let results = retrieve(&store, &gw, "q", &options).await.unwrap();
            assert!(results.iter().all(|r| r.similarity > threshold));
            assert!(results.len() <= previous);
            previous = results.len();
        }
        assert_eq!(previous, 0);
    }

    #[tokio::test]
    async fn test_final_results_and_top_k_caps() {
        let store = seeded_store(&[
            ("a", at(0.9), "ley"),
            ("b", at(0.8), "ley"),
            ("c", at(0.7), "ley"),
            ("d", at(0.6), "ley"),
        ])
        .await;
        let options = RetrievalOptions {
            top_k: 3,
            final_results: 10,
            ..Default::default()
        };
        let results = retrieve(&store, &gateway(), "q", &options).await.unwrap();
        assert_eq!(results.len(), 3);

        let options = RetrievalOptions {
            final_results: 2,
            ..Default::default()
        };
        let results = retrieve(&store, &gateway(), "q", &options).await.unwrap();
        assert_eq!(results.len(), 2);
        for pair in results.windows(2) {
            assert!(pair[0].active_score() >= pair[1].active_score());
        }
    }

    #[tokio::test]
    async fn test_document_type_filter() {
        let store = seeded_store(&[("a", at(0.9), "ley"), ("b", at(0.8), "acta")]).await;
        let options = RetrievalOptions {
            document_type: Some("acta".into()),
            ..Default::default()
        };
        let results = retrieve(&store, &gateway(), "q", &options).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].content, "b");
    }

    #[tokio::test]
    async fn test_keyword_boost_reorders() {
        let store = seeded_store(&[
            ("nothing relevant here", at(0.8), "ley"),
            ("licencia licencia de conducir", at(0.75), "ley"),
        ])
        .await;
        let options = RetrievalOptions {
            use_keyword_boost: true,
            keywords: vec!["licencia".into()],
            ..Default::default()
        };
        let results = retrieve(&store, &gateway(), "q", &options).await.unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].content, "licencia licencia de conducir");
        // 0.75 * 0.7 + min(0.2, 0.3) * 0.3
        assert!((results[0].combined_score.unwrap() - 0.585).abs() < 1e-5);
        // 0.8 * 0.7
        assert!((results[1].combined_score.unwrap() - 0.56).abs() < 1e-5);
    }

    #[tokio::test]
    async fn test_keyword_boost_extracts_keywords_from_query() {
        let store = seeded_store(&[
            ("sin coincidencias", at(0.75), "ley"),
            ("requisitos de licencia", at(0.7), "ley"),
        ])
        .await;
        let options = RetrievalOptions {
            use_keyword_boost: true,
            ..Default::default()
        };
        let results = retrieve(&store, &gateway(), "requisitos licencia", &options)
            .await
            .unwrap();
        assert_eq!(results[0].content, "requisitos de licencia");
        assert!(results.iter().all(|r| r.combined_score.is_some()));
    }

    #[test]
    fn test_boost_never_lowers_full_match() {
        let weights = HybridWeights::default();
        let mut results = vec![RetrievalResult {
            chunk_id: "c".into(),
            content: "alpha beta".into(),
            similarity: 0.6,
            metadata: None,
            combined_score: None,
        }];
        apply_keyword_boost(&mut results, &["alpha".into(), "beta".into()], &weights);
        let combined = results[0].combined_score.unwrap();
        assert!(combined >= 0.6 * weights.vector_weight);
        assert!((combined - 0.48).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_blank_query_skips_provider() {
        let store = seeded_store(&[("a", at(0.9), "ley")]).await;
        let gw = gateway();
        let results = retrieve(&store, &gw, "   ", &RetrievalOptions::default())
            .await
            .unwrap();
        assert!(results.is_empty());
        assert_eq!(gw.provider().calls.load(AtomicOrdering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_store_failure_propagates() {
        let err = retrieve(&BrokenStore, &gateway(), "q", &RetrievalOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, RagError::Store(_)));
    }

    #[test]
    fn test_validation() {
        let ok = RetrievalOptions::default();
        assert!(ok.validate().is_ok());

        let bad = [
            RetrievalOptions { top_k: 0, ..ok.clone() },
            RetrievalOptions { final_results: 0, ..ok.clone() },
            RetrievalOptions { similarity_threshold: 1.5, ..ok.clone() },
            RetrievalOptions { similarity_threshold: f64::NAN, ..ok.clone() },
            RetrievalOptions { date_from: Some(10), date_to: Some(5), ..ok.clone() },
            RetrievalOptions {
                weights: HybridWeights { keyword_weight: -0.1, ..HybridWeights::default() },
                ..ok.clone()
            },
        ];
        for options in bad {
            assert!(matches!(options.validate(), Err(RagError::Validation(_))));
        }
    }

    #[test]
    fn test_options_deserialize_with_defaults() {
        let options: RetrievalOptions =
            serde_json::from_str(r#"{"top_k": 5, "weights": {"boost_cap": 0.5}}"#).unwrap();
        assert_eq!(options.top_k, 5);
        assert_eq!(options.final_results, 4);
        assert_eq!(options.weights.boost_cap, 0.5);
        assert_eq!(options.weights.vector_weight, 0.7);
    }
}
