//! The [`RagEngine`] facade.
//!
//! Bundles a store, an embedding gateway (with its cache) and the default
//! chunking/evaluation settings behind the operations the CLI and HTTP
//! server call. One engine, and therefore one cache, per process.

use std::sync::Arc;

use crate::cache::{CacheStats, EmbeddingCache};
use crate::chunk::ChunkingParams;
use crate::embedding::{EmbeddingGateway, EmbeddingProvider};
use crate::error::{RagError, Result};
use crate::evaluate::{
    analyze_recent_logs, evaluate, EvaluationOptions, EvaluationReport, LogAnalysis,
    LogAnalysisOptions,
};
use crate::ingest::{ingest_document, reindex_all, IngestReport, ReindexReport};
use crate::models::{Document, DocumentMetadata, QueryLog, RetrievalResult};
use crate::retrieve::{retrieve, RetrievalOptions};
use crate::store::{DocumentResponse, Store};

/// Engine-wide settings that are not per request.
#[derive(Debug, Clone, Default)]
pub struct EngineSettings {
    pub chunking: ChunkingParams,
    pub log_analysis: LogAnalysisOptions,
    /// Query-log sample analyzed when the caller does not give one.
    pub log_sample_size: usize,
}

pub struct RagEngine<S, P> {
    store: S,
    gateway: EmbeddingGateway<P>,
    settings: EngineSettings,
}

impl<S, P> RagEngine<S, P>
where
    S: Store,
    P: EmbeddingProvider,
{
    pub fn new(
        store: S,
        provider: P,
        cache: Arc<EmbeddingCache>,
        batch_size: usize,
        settings: EngineSettings,
    ) -> Self {
        Self {
            store,
            gateway: EmbeddingGateway::new(provider, cache, batch_size),
            settings,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn gateway(&self) -> &EmbeddingGateway<P> {
        &self.gateway
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    /// Create a new document from raw text and ingest it.
    pub async fn ingest(&self, content: &str, metadata: DocumentMetadata) -> Result<IngestReport> {
        let doc = Document::new(content, metadata);
        self.ingest_document(&doc).await
    }

    /// Ingest (or re-ingest) a fully specified document.
    pub async fn ingest_document(&self, doc: &Document) -> Result<IngestReport> {
        ingest_document(&self.store, &self.gateway, doc, &self.settings.chunking).await
    }

    pub async fn reindex(&self) -> Result<ReindexReport> {
        reindex_all(&self.store, &self.gateway, &self.settings.chunking).await
    }

    pub async fn retrieve(
        &self,
        query: &str,
        options: &RetrievalOptions,
    ) -> Result<Vec<RetrievalResult>> {
        retrieve(&self.store, &self.gateway, query, options).await
    }

    pub async fn evaluate(
        &self,
        queries: &[String],
        options: &EvaluationOptions,
    ) -> Result<EvaluationReport> {
        evaluate(&self.store, &self.gateway, queries, options).await
    }

    /// Analyze the most recent logs. `sample_size` defaults to the
    /// configured sample.
    pub async fn analyze_logs(
        &self,
        sample_size: Option<usize>,
        since: Option<i64>,
    ) -> Result<LogAnalysis> {
        let sample = sample_size.unwrap_or(self.settings.log_sample_size);
        analyze_recent_logs(&self.store, sample, since, &self.settings.log_analysis).await
    }

    pub async fn record_query_log(&self, log: &QueryLog) -> Result<()> {
        if log.query.trim().is_empty() {
            return Err(RagError::validation("query log has an empty query"));
        }
        self.store
            .record_query_log(log)
            .await
            .map_err(RagError::Store)
    }

    pub async fn delete_document(&self, id: &str) -> Result<bool> {
        self.store.delete_document(id).await.map_err(RagError::Store)
    }

    pub async fn get_document(&self, id: &str) -> Result<Option<DocumentResponse>> {
        self.store.get_document(id).await.map_err(RagError::Store)
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.gateway.cache().stats()
    }

    pub fn clear_cache(&self) {
        self.gateway.cache().clear();
        tracing::debug!("embedding cache cleared");
    }
}
