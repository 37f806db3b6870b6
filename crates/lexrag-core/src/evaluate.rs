//! Retrieval quality evaluation and query-log analysis.
//!
//! Two independent tools:
//!
//! - [`evaluate`] runs a list of canned queries through [`retrieve`] and
//!   aggregates similarity, latency, success and diversity metrics.
//! - [`analyze_logs`] classifies historical query/answer logs into
//!   problem buckets (generic answers, empty retrievals, weak matches,
//!   slow retrievals).

use std::collections::HashSet;
use std::time::Instant;

use serde::{Deserialize, Serialize};

use crate::embedding::{EmbeddingGateway, EmbeddingProvider};
use crate::error::{RagError, Result};
use crate::models::{mean, QueryLog, RetrievalResult};
use crate::retrieve::{retrieve, RetrievalOptions};
use crate::store::Store;

// ============ Evaluation ============

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EvaluationOptions {
    /// Options applied to every evaluated query.
    pub retrieval: RetrievalOptions,
    /// Queries whose mean similarity falls below this are low-confidence.
    pub low_confidence_threshold: f64,
}

impl Default for EvaluationOptions {
    fn default() -> Self {
        Self {
            retrieval: RetrievalOptions::default(),
            low_confidence_threshold: 0.5,
        }
    }
}

/// Metrics for a single evaluated query.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryEvaluation {
    pub query: String,
    pub result_count: usize,
    /// `None` when the query returned nothing.
    pub mean_similarity: Option<f64>,
    pub retrieval_ms: f64,
    pub diversity: f64,
}

/// Aggregate evaluation metrics.
///
/// Similarity statistics only consider queries with at least one result
/// and are `None` when there are none.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct EvaluationReport {
    pub total_queries: usize,
    pub mean_retrieval_ms: f64,
    pub mean_similarity: Option<f64>,
    pub median_similarity: Option<f64>,
    pub min_similarity: Option<f64>,
    pub max_similarity: Option<f64>,
    /// Fraction of queries that returned at least one result.
    pub success_rate: f64,
    pub mean_result_count: f64,
    pub low_confidence_count: usize,
    pub mean_diversity: f64,
    pub queries: Vec<QueryEvaluation>,
}

/// Distinct source documents over result count; `1.0` below two results.
pub fn diversity(results: &[RetrievalResult]) -> f64 {
    if results.len() < 2 {
        return 1.0;
    }
    let distinct: HashSet<&str> = results
        .iter()
        .map(|r| r.document_id().unwrap_or(r.chunk_id.as_str()))
        .collect();
    distinct.len() as f64 / results.len() as f64
}

fn median(values: &mut [f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    values.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let mid = values.len() / 2;
    if values.len() % 2 == 0 {
        Some((values[mid - 1] + values[mid]) / 2.0)
    } else {
        Some(values[mid])
    }
}

/// Run `queries` sequentially and aggregate the results.
///
/// The first retrieval failure aborts the run and is returned.
pub async fn evaluate<S, P>(
    store: &S,
    gateway: &EmbeddingGateway<P>,
    queries: &[String],
    options: &EvaluationOptions,
) -> Result<EvaluationReport>
where
    S: Store + ?Sized,
    P: EmbeddingProvider,
{
    let mut per_query = Vec::with_capacity(queries.len());

    for query in queries {
        let started = Instant::now();
        let results = retrieve(store, gateway, query, &options.retrieval).await?;
        let retrieval_ms = started.elapsed().as_secs_f64() * 1000.0;

        per_query.push(QueryEvaluation {
            query: query.clone(),
            result_count: results.len(),
            mean_similarity: mean(results.iter().map(|r| r.similarity)),
            retrieval_ms,
            diversity: diversity(&results),
        });
    }

    let report = summarize(per_query, options.low_confidence_threshold);
    tracing::debug!(
        queries = report.total_queries,
        success_rate = report.success_rate,
        "evaluation finished"
    );
    Ok(report)
}

/// Aggregate per-query metrics into a report.
pub fn summarize(queries: Vec<QueryEvaluation>, low_confidence_threshold: f64) -> EvaluationReport {
    let total = queries.len();
    if total == 0 {
        return EvaluationReport::default();
    }

    let mut similarities: Vec<f64> = queries.iter().filter_map(|q| q.mean_similarity).collect();
    let zero_result = queries.iter().filter(|q| q.result_count == 0).count();

    EvaluationReport {
        total_queries: total,
        mean_retrieval_ms: mean(queries.iter().map(|q| q.retrieval_ms)).unwrap_or(0.0),
        mean_similarity: mean(similarities.iter().copied()),
        median_similarity: median(&mut similarities),
        min_similarity: similarities.iter().copied().reduce(f64::min),
        max_similarity: similarities.iter().copied().reduce(f64::max),
        success_rate: (total - zero_result) as f64 / total as f64,
        mean_result_count: mean(queries.iter().map(|q| q.result_count as f64)).unwrap_or(0.0),
        low_confidence_count: similarities
            .iter()
            .filter(|&&s| s < low_confidence_threshold)
            .count(),
        mean_diversity: mean(queries.iter().map(|q| q.diversity)).unwrap_or(0.0),
        queries,
    }
}

// ============ Log analysis ============

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogAnalysisOptions {
    pub low_similarity_threshold: f64,
    pub slow_retrieval_ms: u64,
}

impl Default for LogAnalysisOptions {
    fn default() -> Self {
        Self {
            low_similarity_threshold: 0.5,
            slow_retrieval_ms: 3000,
        }
    }
}

/// Buckets of problematic logs. A log may appear in several buckets.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LogAnalysis {
    pub total_logs: usize,
    pub generic_answers: Vec<QueryLog>,
    pub zero_results: Vec<QueryLog>,
    pub low_similarity: Vec<QueryLog>,
    pub slow_retrievals: Vec<QueryLog>,
    pub generic_answer_rate: f64,
    pub zero_result_rate: f64,
    pub low_similarity_rate: f64,
    pub slow_retrieval_rate: f64,
}

/// Phrases that mark an answer as a "don't know" reply (English and Spanish).
const GENERIC_ANSWER_MARKERS: &[&str] = &[
    "i don't know",
    "i do not know",
    "i'm not sure",
    "i am not sure",
    "i couldn't find",
    "i could not find",
    "no information available",
    "don't have information",
    "do not have information",
    "no lo sé",
    "no sé",
    "no tengo información",
    "no tengo informacion",
    "no encontré información",
    "no encontre informacion",
    "no dispongo de información",
    "no cuento con información",
    "no puedo responder",
];

/// Whether an answer is a generic non-answer.
pub fn is_generic_answer(answer: &str) -> bool {
    let lower = answer.to_lowercase();
    GENERIC_ANSWER_MARKERS.iter().any(|m| lower.contains(*m))
}

pub fn analyze_logs(logs: &[QueryLog], options: &LogAnalysisOptions) -> LogAnalysis {
    let mut analysis = LogAnalysis {
        total_logs: logs.len(),
        ..Default::default()
    };

    for log in logs {
        if is_generic_answer(&log.answer) {
            analysis.generic_answers.push(log.clone());
        }
        if log.result_count == 0 {
            analysis.zero_results.push(log.clone());
        }
        if log
            .mean_similarity
            .is_some_and(|s| s < options.low_similarity_threshold)
        {
            analysis.low_similarity.push(log.clone());
        }
        if log.retrieval_ms > options.slow_retrieval_ms {
            analysis.slow_retrievals.push(log.clone());
        }
    }

    if !logs.is_empty() {
        let total = logs.len() as f64;
        analysis.generic_answer_rate = analysis.generic_answers.len() as f64 / total;
        analysis.zero_result_rate = analysis.zero_results.len() as f64 / total;
        analysis.low_similarity_rate = analysis.low_similarity.len() as f64 / total;
        analysis.slow_retrieval_rate = analysis.slow_retrievals.len() as f64 / total;
    }
    analysis
}

/// Fetch the `sample_size` most recent logs (optionally since a Unix time)
/// and analyze them.
pub async fn analyze_recent_logs<S>(
    store: &S,
    sample_size: usize,
    since: Option<i64>,
    options: &LogAnalysisOptions,
) -> Result<LogAnalysis>
where
    S: Store + ?Sized,
{
    let logs = store
        .recent_query_logs(sample_size, since)
        .await
        .map_err(RagError::Store)?;
    Ok(analyze_logs(&logs, options))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::EmbeddingCache;
    use crate::models::{ChunkMetadata, QueryLog};
    use crate::store::memory::InMemoryStore;
    use async_trait::async_trait;
    use std::sync::Arc;

    fn result(doc: &str, similarity: f64) -> RetrievalResult {
        RetrievalResult {
            chunk_id: format!("{}-chunk", doc),
            content: String::new(),
            similarity,
            metadata: Some(ChunkMetadata {
                document_id: doc.into(),
                title: None,
                doc_type: None,
                source: None,
                created_at: 0,
            }),
            combined_score: None,
        }
    }

    fn evaluation(query: &str, count: usize, sim: Option<f64>) -> QueryEvaluation {
        QueryEvaluation {
            query: query.into(),
            result_count: count,
            mean_similarity: sim,
            retrieval_ms: 10.0,
            diversity: 1.0,
        }
    }

    #[test]
    fn test_diversity() {
        assert_eq!(diversity(&[]), 1.0);
        assert_eq!(diversity(&[result("a", 0.9)]), 1.0);
        assert_eq!(diversity(&[result("a", 0.9), result("b", 0.8)]), 1.0);
        let same = [result("a", 0.9), result("a", 0.8), result("b", 0.7), result("b", 0.6)];
        assert!((diversity(&same) - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_summarize_empty() {
        let report = summarize(Vec::new(), 0.5);
        assert_eq!(report, EvaluationReport::default());
    }

    #[test]
    fn test_summarize_metrics() {
        let report = summarize(
            vec![
                evaluation("a", 3, Some(0.9)),
                evaluation("b", 1, Some(0.4)),
                evaluation("c", 0, None),
                evaluation("d", 2, Some(0.6)),
            ],
            0.5,
        );
        assert_eq!(report.total_queries, 4);
        assert!((report.success_rate - 0.75).abs() < 1e-9);
        assert!((report.mean_result_count - 1.5).abs() < 1e-9);
        assert_eq!(report.median_similarity, Some(0.6));
        assert_eq!(report.min_similarity, Some(0.4));
        assert_eq!(report.max_similarity, Some(0.9));
        assert!((report.mean_similarity.unwrap() - 0.6333333).abs() < 1e-6);
        assert_eq!(report.low_confidence_count, 1);
        assert!((report.mean_retrieval_ms - 10.0).abs() < 1e-9);
    }

    #[test]
    fn test_median_even() {
        let m = median(&mut [0.2, 0.8, 0.4, 0.6]).unwrap();
        assert!((m - 0.5).abs() < 1e-9);
        assert_eq!(median(&mut []), None);
    }

    struct UnitProvider;

    #[async_trait]
    impl EmbeddingProvider for UnitProvider {
        fn model_name(&self) -> &str {
            "unit"
        }
        fn dims(&self) -> usize {
            1
        }
        async fn embed(&self, _text: &str) -> anyhow::Result<Vec<f32>> {
            Ok(vec![1.0])
        }
    }

    #[tokio::test]
    async fn test_evaluate_against_empty_store() {
        let store = InMemoryStore::new();
        let gw = EmbeddingGateway::new(UnitProvider, Arc::new(EmbeddingCache::new(4)), 4);
        let queries = vec!["uno".to_string(), "dos".to_string()];
        let report = evaluate(&store, &gw, &queries, &EvaluationOptions::default())
            .await
            .unwrap();
        assert_eq!(report.total_queries, 2);
        assert_eq!(report.success_rate, 0.0);
        assert_eq!(report.mean_similarity, None);
        assert_eq!(report.queries.len(), 2);
        assert_eq!(report.mean_diversity, 1.0);
    }

    #[tokio::test]
    async fn test_evaluate_aborts_on_invalid_options() {
        let store = InMemoryStore::new();
        let gw = EmbeddingGateway::new(UnitProvider, Arc::new(EmbeddingCache::new(4)), 4);
        let mut options = EvaluationOptions::default();
        options.retrieval.top_k = 0;
        let err = evaluate(&store, &gw, &["q".to_string()], &options)
            .await
            .unwrap_err();
        assert!(matches!(err, RagError::Validation(_)));
    }

    fn log(answer: &str, count: usize, sim: Option<f64>, ms: u64) -> QueryLog {
        let mut l = QueryLog::new("q", answer);
        l.result_count = count;
        l.mean_similarity = sim;
        l.retrieval_ms = ms;
        l
    }

    #[test]
    fn test_analyze_logs_buckets() {
        let logs = vec![
            log("Lo siento, no tengo información sobre eso.", 0, None, 100),
            log("The fee is 20 dollars.", 3, Some(0.82), 4000),
            log("I don't know.", 2, Some(0.31), 200),
            log("Se requiere cédula.", 4, Some(0.7), 150),
        ];
        let analysis = analyze_logs(&logs, &LogAnalysisOptions::default());
        assert_eq!(analysis.total_logs, 4);
        assert_eq!(analysis.generic_answers.len(), 2);
        assert_eq!(analysis.zero_results.len(), 1);
        assert_eq!(analysis.low_similarity.len(), 1);
        assert_eq!(analysis.slow_retrievals.len(), 1);
        assert!((analysis.generic_answer_rate - 0.5).abs() < 1e-9);
        assert!((analysis.slow_retrieval_rate - 0.25).abs() < 1e-9);
    }

    #[test]
    fn test_analyze_no_logs() {
        let analysis = analyze_logs(&[], &LogAnalysisOptions::default());
        assert_eq!(analysis, LogAnalysis::default());
    }

    #[tokio::test]
    async fn test_analyze_recent_logs_reads_store() {
        let store = InMemoryStore::new();
        store
            .record_query_log(&log("No sé la respuesta", 0, None, 10))
            .await
            .unwrap();
        let analysis = analyze_recent_logs(&store, 10, None, &LogAnalysisOptions::default())
            .await
            .unwrap();
        assert_eq!(analysis.total_logs, 1);
        assert_eq!(analysis.generic_answers.len(), 1);
    }
}
