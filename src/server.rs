//! JSON HTTP API.
//!
//! One [`AppEngine`] (and therefore one embedding cache) is built at
//! startup and shared by every handler through an `Arc`.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`    | `/health` | Health check (returns version) |
//! | `POST`   | `/ingest` | Ingest a document `{content, title?, doc_type?, source?, id?}` |
//! | `POST`   | `/retrieve` | Retrieve `{query, ...options}` |
//! | `POST`   | `/evaluate` | Evaluate `{queries, low_confidence_threshold?, ...options}` |
//! | `POST`   | `/logs` | Record a query/answer log |
//! | `GET`    | `/logs/analysis` | Analyze recent logs (`?sample_size=&since=`) |
//! | `GET`    | `/documents/{id}` | Document with its chunks |
//! | `DELETE` | `/documents/{id}` | Delete a document and its chunks |
//! | `GET`    | `/cache/stats` | Embedding cache occupancy |
//! | `POST`   | `/cache/clear` | Empty the embedding cache |
//!
//! Options omitted from a request fall back to the `[retrieval]` config.
//! `/retrieve` is bounded by `retrieval.timeout_secs`; `/evaluate` gets that
//! budget once per query. Expiry answers `408 timeout`.
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "bad_request", "message": "invalid request: top_k must be >= 1" } }
//! ```
//!
//! Error codes: `bad_request` (400), `not_found` (404), `timeout` (408),
//! `embedding_failed` (502), `internal` (500).
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tower_http::cors::{Any, CorsLayer};

use lexrag_core::cache::CacheStats;
use lexrag_core::evaluate::{EvaluationReport, LogAnalysis};
use lexrag_core::ingest::IngestReport;
use lexrag_core::models::{Document, DocumentMetadata, QueryLog, RetrievalResult};
use lexrag_core::retrieve::RetrievalOptions;
use lexrag_core::store::DocumentResponse;
use lexrag_core::RagError;

use crate::config::Config;
use crate::engine::{build_engine, AppEngine};

/// Shared state passed to all route handlers.
#[derive(Clone)]
pub struct AppState {
    engine: Arc<AppEngine>,
    config: Arc<Config>,
}

impl AppState {
    pub fn new(engine: Arc<AppEngine>, config: Arc<Config>) -> Self {
        Self { engine, config }
    }

    fn retrieval_timeout(&self) -> Duration {
        self.config.retrieval.timeout()
    }

    /// One retrieval budget per query.
    fn evaluation_timeout(&self, queries: usize) -> Duration {
        evaluation_budget(self.retrieval_timeout(), queries)
    }
}

fn evaluation_budget(per_query: Duration, queries: usize) -> Duration {
    let queries = u32::try_from(queries.max(1)).unwrap_or(u32::MAX);
    per_query.saturating_mul(queries)
}

/// Build the router with CORS applied.
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handle_health))
        .route("/ingest", post(handle_ingest))
        .route("/retrieve", post(handle_retrieve))
        .route("/evaluate", post(handle_evaluate))
        .route("/logs", post(handle_record_log))
        .route("/logs/analysis", get(handle_analyze_logs))
        .route(
            "/documents/{id}",
            get(handle_get_document).delete(handle_delete_document),
        )
        .route("/cache/stats", get(handle_cache_stats))
        .route("/cache/clear", post(handle_cache_clear))
        .layer(cors)
        .with_state(state)
}

/// Start the server on `[server].bind` and run until the process ends.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let engine = Arc::new(build_engine(config).await?);
    let state = AppState::new(engine, Arc::new(config.clone()));

    let listener = tokio::net::TcpListener::bind(&config.server.bind).await?;
    tracing::info!(bind = %config.server.bind, "lexrag server listening");
    println!("lexrag server listening on http://{}", config.server.bind);

    axum::serve(listener, router(state)).await?;
    Ok(())
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

#[derive(Debug)]
pub struct AppError {
    status: StatusCode,
    code: &'static str,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code.to_string(),
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "bad_request",
        message: message.into(),
    }
}

fn not_found(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::NOT_FOUND,
        code: "not_found",
        message: message.into(),
    }
}

impl From<RagError> for AppError {
    fn from(err: RagError) -> Self {
        let (status, code) = match &err {
            RagError::Validation(_) => (StatusCode::BAD_REQUEST, "bad_request"),
            RagError::Timeout(_) => (StatusCode::REQUEST_TIMEOUT, "timeout"),
            RagError::Embedding(_) => (StatusCode::BAD_GATEWAY, "embedding_failed"),
            RagError::Store(_) => (StatusCode::INTERNAL_SERVER_ERROR, "internal"),
        };
        if status.is_server_error() {
            tracing::error!(error = %err, "request failed");
        }
        AppError {
            status,
            code,
            message: err.to_string(),
        }
    }
}

// ============ Request options ============

/// Per-request overrides of the configured retrieval options.
#[derive(Debug, Default, Deserialize)]
struct RetrievalOverrides {
    document_type: Option<String>,
    title_contains: Option<String>,
    /// Unix seconds, inclusive.
    date_from: Option<i64>,
    /// Unix seconds, inclusive.
    date_to: Option<i64>,
    similarity_threshold: Option<f64>,
    top_k: Option<usize>,
    final_results: Option<usize>,
    use_keyword_boost: Option<bool>,
    #[serde(default)]
    keywords: Vec<String>,
}

impl RetrievalOverrides {
    fn apply(self, mut options: RetrievalOptions) -> RetrievalOptions {
        options.document_type = self.document_type;
        options.title_contains = self.title_contains;
        options.date_from = self.date_from;
        options.date_to = self.date_to;
        if let Some(v) = self.similarity_threshold {
            options.similarity_threshold = v;
        }
        if let Some(v) = self.top_k {
            options.top_k = v;
        }
        if let Some(v) = self.final_results {
            options.final_results = v;
        }
        if let Some(v) = self.use_keyword_boost {
            options.use_keyword_boost = v;
        }
        options.keywords = self.keywords;
        options
    }
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// ============ POST /ingest ============

#[derive(Deserialize)]
struct IngestRequest {
    content: String,
    /// Re-ingest under an existing id, replacing its chunks.
    id: Option<String>,
    #[serde(flatten)]
    metadata: DocumentMetadata,
}

async fn handle_ingest(
    State(state): State<AppState>,
    Json(req): Json<IngestRequest>,
) -> Result<(StatusCode, Json<IngestReport>), AppError> {
    let mut doc = Document::new(req.content, req.metadata);
    if let Some(id) = req.id {
        if id.trim().is_empty() {
            return Err(bad_request("id must not be empty"));
        }
        doc.id = id;
    }

    let report = state.engine.ingest_document(&doc).await?;
    Ok((StatusCode::CREATED, Json(report)))
}

// ============ POST /retrieve ============

#[derive(Deserialize)]
struct RetrieveRequest {
    query: String,
    #[serde(flatten)]
    overrides: RetrievalOverrides,
}

#[derive(Serialize)]
struct RetrieveResponse {
    results: Vec<RetrievalResult>,
    retrieval_ms: u64,
}

async fn handle_retrieve(
    State(state): State<AppState>,
    Json(req): Json<RetrieveRequest>,
) -> Result<Json<RetrieveResponse>, AppError> {
    let options = req.overrides.apply(state.config.retrieval.to_options());
    let deadline = state.retrieval_timeout();

    let started = Instant::now();
    let results = tokio::time::timeout(deadline, state.engine.retrieve(&req.query, &options))
        .await
        .map_err(|_| RagError::Timeout(deadline))??;

    Ok(Json(RetrieveResponse {
        results,
        retrieval_ms: started.elapsed().as_millis() as u64,
    }))
}

// ============ POST /evaluate ============

#[derive(Deserialize)]
struct EvaluateRequest {
    queries: Vec<String>,
    low_confidence_threshold: Option<f64>,
    #[serde(flatten)]
    overrides: RetrievalOverrides,
}

async fn handle_evaluate(
    State(state): State<AppState>,
    Json(req): Json<EvaluateRequest>,
) -> Result<Json<EvaluationReport>, AppError> {
    let retrieval = req.overrides.apply(state.config.retrieval.to_options());
    let mut options = state.config.evaluation.to_options(retrieval);
    if let Some(threshold) = req.low_confidence_threshold {
        options.low_confidence_threshold = threshold;
    }

    let deadline = state.evaluation_timeout(req.queries.len());
    let report = tokio::time::timeout(deadline, state.engine.evaluate(&req.queries, &options))
        .await
        .map_err(|_| RagError::Timeout(deadline))??;
    Ok(Json(report))
}

// ============ Query logs ============

#[derive(Serialize)]
struct RecordLogResponse {
    id: String,
}

async fn handle_record_log(
    State(state): State<AppState>,
    Json(log): Json<QueryLog>,
) -> Result<(StatusCode, Json<RecordLogResponse>), AppError> {
    state.engine.record_query_log(&log).await?;
    Ok((StatusCode::CREATED, Json(RecordLogResponse { id: log.id })))
}

#[derive(Deserialize)]
struct AnalysisParams {
    sample_size: Option<usize>,
    /// Unix seconds.
    since: Option<i64>,
}

async fn handle_analyze_logs(
    State(state): State<AppState>,
    Query(params): Query<AnalysisParams>,
) -> Result<Json<LogAnalysis>, AppError> {
    if params.sample_size == Some(0) {
        return Err(bad_request("sample_size must be >= 1"));
    }
    let analysis = state
        .engine
        .analyze_logs(params.sample_size, params.since)
        .await?;
    Ok(Json(analysis))
}

// ============ Documents ============

async fn handle_get_document(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<DocumentResponse>, AppError> {
    state
        .engine
        .get_document(&id)
        .await?
        .map(Json)
        .ok_or_else(|| not_found(format!("document not found: {}", id)))
}

#[derive(Serialize)]
struct DeleteResponse {
    deleted: bool,
}

async fn handle_delete_document(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<DeleteResponse>, AppError> {
    if state.engine.delete_document(&id).await? {
        Ok(Json(DeleteResponse { deleted: true }))
    } else {
        Err(not_found(format!("document not found: {}", id)))
    }
}

// ============ Cache ============

async fn handle_cache_stats(State(state): State<AppState>) -> Json<CacheStats> {
    Json(state.engine.cache_stats())
}

async fn handle_cache_clear(State(state): State<AppState>) -> Json<CacheStats> {
    state.engine.clear_cache();
    Json(state.engine.cache_stats())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_mapping() {
        let cases = [
            (RagError::validation("top_k must be >= 1"), 400, "bad_request"),
            (RagError::Timeout(Duration::from_secs(1)), 408, "timeout"),
            (RagError::Embedding(anyhow::anyhow!("503")), 502, "embedding_failed"),
            (RagError::Store(anyhow::anyhow!("locked")), 500, "internal"),
        ];
        for (err, status, code) in cases {
            let app_err = AppError::from(err);
            assert_eq!(app_err.status.as_u16(), status);
            assert_eq!(app_err.code, code);
        }
    }

    #[test]
    fn test_evaluation_budget_scales_with_queries() {
        let per_query = Duration::from_secs(30);
        assert_eq!(evaluation_budget(per_query, 0), per_query);
        assert_eq!(evaluation_budget(per_query, 1), per_query);
        assert_eq!(evaluation_budget(per_query, 4), Duration::from_secs(120));
        assert_eq!(
            evaluation_budget(per_query, usize::MAX),
            per_query * u32::MAX
        );
        assert_eq!(evaluation_budget(Duration::MAX, 2), Duration::MAX);
    }

    #[test]
    fn test_overrides_keep_config_baseline() {
        let overrides: RetrievalOverrides =
            serde_json::from_value(serde_json::json!({"top_k": 3, "document_type": "ley"}))
                .unwrap();
        let base = RetrievalOptions {
            similarity_threshold: 0.45,
            ..RetrievalOptions::default()
        };
        let options = overrides.apply(base);
        assert_eq!(options.top_k, 3);
        assert_eq!(options.similarity_threshold, 0.45);
        assert_eq!(options.document_type.as_deref(), Some("ley"));
        assert!(!options.use_keyword_boost);
    }

    #[test]
    fn test_retrieve_request_flattens_options() {
        let req: RetrieveRequest = serde_json::from_value(serde_json::json!({
            "query": "licencia",
            "use_keyword_boost": true,
            "keywords": ["licencia"]
        }))
        .unwrap();
        assert_eq!(req.query, "licencia");
        assert_eq!(req.overrides.use_keyword_boost, Some(true));
        assert_eq!(req.overrides.keywords, vec!["licencia".to_string()]);
    }
}
