//! Storage abstraction for lexrag.
//!
//! The [`Store`] trait defines every storage operation the engine needs:
//! document and chunk persistence, filtered vector similarity search, and
//! the query log consumed by quality analysis. Backends are pluggable
//! (SQLite in the app crate, [`InMemoryStore`](memory::InMemoryStore) here).
//!
//! Implementations must be `Send + Sync` to work with async runtimes.

pub mod memory;

use anyhow::Result;
use async_trait::async_trait;
use serde::Serialize;

use crate::models::{Chunk, ChunkMetadata, Document, QueryLog};

/// Metadata predicates pushed down into [`Store::similarity_search`].
///
/// Every set field must match; an empty filter matches everything.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchFilter {
    /// Exact match on the document-type tag.
    pub document_type: Option<String>,
    /// Case-insensitive substring of the document title.
    pub title_contains: Option<String>,
    /// Inclusive lower bound on document creation time (Unix seconds).
    pub date_from: Option<i64>,
    /// Inclusive upper bound on document creation time (Unix seconds).
    pub date_to: Option<i64>,
}

impl SearchFilter {
    pub fn is_empty(&self) -> bool {
        self == &SearchFilter::default()
    }

    /// Evaluate the filter against a chunk's metadata snapshot.
    pub fn matches(&self, meta: &ChunkMetadata) -> bool {
        if let Some(doc_type) = &self.document_type {
            if meta.doc_type.as_deref() != Some(doc_type.as_str()) {
                return false;
            }
        }
        if let Some(needle) = &self.title_contains {
            let needle = needle.to_lowercase();
            match &meta.title {
                Some(title) if title.to_lowercase().contains(&needle) => {}
                _ => return false,
            }
        }
        if self.date_from.is_some_and(|from| meta.created_at < from) {
            return false;
        }
        if self.date_to.is_some_and(|to| meta.created_at > to) {
            return false;
        }
        true
    }
}

/// A chunk scored against a query vector by [`Store::similarity_search`].
#[derive(Debug, Clone)]
pub struct ChunkCandidate {
    pub chunk_id: String,
    pub document_id: String,
    pub content: String,
    /// Cosine similarity against the query vector.
    pub similarity: f64,
    pub metadata: ChunkMetadata,
}

/// Full document response including metadata, content, and chunks.
#[derive(Debug, Clone, Serialize)]
pub struct DocumentResponse {
    pub id: String,
    pub title: Option<String>,
    pub doc_type: Option<String>,
    pub source: Option<String>,
    /// ISO 8601.
    pub created_at: String,
    /// ISO 8601.
    pub updated_at: String,
    pub content: String,
    pub chunks: Vec<ChunkResponse>,
}

/// A single chunk within a [`DocumentResponse`].
#[derive(Debug, Clone, Serialize)]
pub struct ChunkResponse {
    pub index: i64,
    pub content: String,
}

/// Format Unix seconds as `YYYY-MM-DDTHH:MM:SSZ`.
pub fn format_ts_iso(ts: i64) -> String {
    chrono::DateTime::from_timestamp(ts, 0)
        .map(|dt| dt.format("%Y-%m-%dT%H:%M:%SZ").to_string())
        .unwrap_or_else(|| ts.to_string())
}

/// Abstract storage backend.
///
/// # Operations
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`upsert_document`](Store::upsert_document) | Insert or replace a document |
/// | [`replace_chunks`](Store::replace_chunks) | Atomically replace all chunks (and vectors) of a document |
/// | [`delete_document`](Store::delete_document) | Delete a document and its chunks |
/// | [`get_document`](Store::get_document) | Retrieve full document with chunks |
/// | [`list_documents`](Store::list_documents) | Every stored document, oldest first |
/// | [`similarity_search`](Store::similarity_search) | Filtered cosine similarity search |
/// | [`record_query_log`](Store::record_query_log) | Append a query/answer log entry |
/// | [`recent_query_logs`](Store::recent_query_logs) | Most recent log entries |
#[async_trait]
pub trait Store: Send + Sync {
    /// Insert a document, replacing any existing record with the same id.
    ///
    /// Returns the document id.
    async fn upsert_document(&self, doc: &Document) -> Result<String>;

    /// Replace all chunks of a document. `vectors[i]` belongs to `chunks[i]`.
    ///
    /// Either every chunk is written or none is.
    async fn replace_chunks(&self, doc_id: &str, chunks: &[Chunk], vectors: &[Vec<f32>])
        -> Result<()>;

    /// Delete a document and every chunk derived from it.
    ///
    /// Returns `false` when no such document existed.
    async fn delete_document(&self, id: &str) -> Result<bool>;

    async fn get_document(&self, id: &str) -> Result<Option<DocumentResponse>>;

    async fn list_documents(&self) -> Result<Vec<Document>>;

    /// Chunks matching `filter` whose similarity to `query_vec` exceeds
    /// `min_similarity`, best first, at most `limit`.
    async fn similarity_search(
        &self,
        query_vec: &[f32],
        filter: &SearchFilter,
        min_similarity: f64,
        limit: usize,
    ) -> Result<Vec<ChunkCandidate>>;

    async fn record_query_log(&self, log: &QueryLog) -> Result<()>;

    /// Up to `limit` logs, newest first, optionally only those created at
    /// or after `since` (Unix seconds).
    async fn recent_query_logs(&self, limit: usize, since: Option<i64>) -> Result<Vec<QueryLog>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta(doc_type: Option<&str>, title: Option<&str>, created_at: i64) -> ChunkMetadata {
        ChunkMetadata {
            document_id: "d".into(),
            title: title.map(String::from),
            doc_type: doc_type.map(String::from),
            source: None,
            created_at,
        }
    }

    #[test]
    fn test_empty_filter_matches_everything() {
        let filter = SearchFilter::default();
        assert!(filter.is_empty());
        assert!(filter.matches(&meta(None, None, 0)));
    }

    #[test]
    fn test_doc_type_is_exact() {
        let filter = SearchFilter {
            document_type: Some("ley".into()),
            ..Default::default()
        };
        assert!(filter.matches(&meta(Some("ley"), None, 0)));
        assert!(!filter.matches(&meta(Some("Ley"), None, 0)));
        assert!(!filter.matches(&meta(None, None, 0)));
    }

    #[test]
    fn test_title_contains_ignores_case() {
        let filter = SearchFilter {
            title_contains: Some("tránsito".into()),
            ..Default::default()
        };
        assert!(filter.matches(&meta(None, Some("Ley de TRÁNSITO"), 0)));
        assert!(!filter.matches(&meta(None, Some("Ley de aguas"), 0)));
        assert!(!filter.matches(&meta(None, None, 0)));
    }

    #[test]
    fn test_date_bounds_are_inclusive() {
        let filter = SearchFilter {
            date_from: Some(100),
            date_to: Some(200),
            ..Default::default()
        };
        assert!(filter.matches(&meta(None, None, 100)));
        assert!(filter.matches(&meta(None, None, 200)));
        assert!(!filter.matches(&meta(None, None, 99)));
        assert!(!filter.matches(&meta(None, None, 201)));
    }

    #[test]
    fn test_format_ts_iso() {
        assert_eq!(format_ts_iso(0), "1970-01-01T00:00:00Z");
    }
}
