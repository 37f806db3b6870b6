//! Core data models shared by the engine and its storage backends.
//!
//! These types represent the documents, chunks, retrieval results and
//! query logs that flow through ingestion, retrieval and evaluation.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

/// Caller-supplied descriptive fields of a document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentMetadata {
    #[serde(default)]
    pub title: Option<String>,
    /// Free-form category tag, e.g. `"ley"` or `"acta"`.
    #[serde(default)]
    pub doc_type: Option<String>,
    /// Where the document came from (path, URL, registry number).
    #[serde(default)]
    pub source: Option<String>,
}

/// A stored document. Never mutated in place: re-ingesting an existing id
/// replaces the record and every chunk derived from it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub title: Option<String>,
    pub doc_type: Option<String>,
    pub source: Option<String>,
    pub content: String,
    /// Unix seconds.
    pub created_at: i64,
    /// Unix seconds.
    pub updated_at: i64,
}

impl Document {
    /// Build a new document with a fresh UUID, stamped with the current time.
    pub fn new(content: impl Into<String>, metadata: DocumentMetadata) -> Self {
        let now = chrono::Utc::now().timestamp();
        Self {
            id: Uuid::new_v4().to_string(),
            title: metadata.title,
            doc_type: metadata.doc_type,
            source: metadata.source,
            content: content.into(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn metadata(&self) -> DocumentMetadata {
        DocumentMetadata {
            title: self.title.clone(),
            doc_type: self.doc_type.clone(),
            source: self.source.clone(),
        }
    }

    /// Snapshot of the fields copied onto every chunk for filter pushdown.
    pub fn chunk_metadata(&self) -> ChunkMetadata {
        ChunkMetadata {
            document_id: self.id.clone(),
            title: self.title.clone(),
            doc_type: self.doc_type.clone(),
            source: self.source.clone(),
            created_at: self.created_at,
        }
    }
}

/// Copy of the owning document's metadata carried by each chunk and
/// returned with each retrieval result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkMetadata {
    pub document_id: String,
    pub title: Option<String>,
    pub doc_type: Option<String>,
    pub source: Option<String>,
    /// Creation time of the owning document (Unix seconds).
    pub created_at: i64,
}

/// Output unit of the chunker, before ids and hashes are assigned.
#[derive(Debug, Clone, PartialEq)]
pub struct ChunkSegment {
    pub content: String,
    pub metadata: Option<ChunkMetadata>,
}

/// A persisted chunk of a document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    pub id: String,
    pub document_id: String,
    pub chunk_index: i64,
    pub content: String,
    /// SHA-256 of `content`, hex encoded.
    pub hash: String,
    pub metadata: ChunkMetadata,
}

impl Chunk {
    /// Create a chunk with a fresh UUID and SHA-256 content hash.
    pub fn new(metadata: ChunkMetadata, index: i64, content: &str) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            document_id: metadata.document_id.clone(),
            chunk_index: index,
            content: content.to_string(),
            hash: content_hash(content),
            metadata,
        }
    }
}

/// Hex-encoded SHA-256 of a text.
pub fn content_hash(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// One ranked chunk returned by retrieval.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RetrievalResult {
    pub chunk_id: String,
    pub content: String,
    /// Raw cosine similarity against the query vector.
    pub similarity: f64,
    pub metadata: Option<ChunkMetadata>,
    /// Weighted vector + keyword score; only set when hybrid rescoring ran.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub combined_score: Option<f64>,
}

impl RetrievalResult {
    /// The score the result list is ordered by.
    pub fn active_score(&self) -> f64 {
        self.combined_score.unwrap_or(self.similarity)
    }

    pub fn document_id(&self) -> Option<&str> {
        self.metadata.as_ref().map(|m| m.document_id.as_str())
    }
}

/// A historical query/answer pair recorded by the conversation layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryLog {
    #[serde(default = "new_log_id")]
    pub id: String,
    pub query: String,
    #[serde(default)]
    pub answer: String,
    #[serde(default)]
    pub result_count: usize,
    #[serde(default)]
    pub mean_similarity: Option<f64>,
    #[serde(default)]
    pub retrieval_ms: u64,
    /// Unix seconds.
    #[serde(default = "now_ts")]
    pub created_at: i64,
}

fn new_log_id() -> String {
    Uuid::new_v4().to_string()
}

fn now_ts() -> i64 {
    chrono::Utc::now().timestamp()
}

impl QueryLog {
    /// Build a log entry stamped with a fresh id and the current time.
    pub fn new(query: impl Into<String>, answer: impl Into<String>) -> Self {
        Self {
            id: new_log_id(),
            query: query.into(),
            answer: answer.into(),
            result_count: 0,
            mean_similarity: None,
            retrieval_ms: 0,
            created_at: now_ts(),
        }
    }

    /// Fill in the retrieval-side fields from a result list.
    pub fn with_results(mut self, results: &[RetrievalResult], retrieval_ms: u64) -> Self {
        self.result_count = results.len();
        self.mean_similarity = mean(results.iter().map(|r| r.similarity));
        self.retrieval_ms = retrieval_ms;
        self
    }
}

pub(crate) fn mean(values: impl Iterator<Item = f64>) -> Option<f64> {
    let (sum, count) = values.fold((0.0, 0usize), |(s, c), v| (s + v, c + 1));
    if count == 0 {
        None
    } else {
        Some(sum / count as f64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chunk_hash_is_content_sha256() {
        let doc = Document::new("body", DocumentMetadata::default());
        let chunk = Chunk::new(doc.chunk_metadata(), 0, "hello");
        assert_eq!(
            chunk.hash,
            "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824"
        );
        assert_eq!(chunk.document_id, doc.id);
    }

    #[test]
    fn test_query_log_with_results() {
        let meta = Document::new("x", DocumentMetadata::default()).chunk_metadata();
        let results = vec![
            RetrievalResult {
                chunk_id: "a".into(),
                content: String::new(),
                similarity: 0.8,
                metadata: Some(meta.clone()),
                combined_score: None,
            },
            RetrievalResult {
                chunk_id: "b".into(),
                content: String::new(),
                similarity: 0.4,
                metadata: Some(meta),
                combined_score: None,
            },
        ];
        let log = QueryLog::new("q", "a").with_results(&results, 12);
        assert_eq!(log.result_count, 2);
        assert!((log.mean_similarity.unwrap() - 0.6).abs() < 1e-9);
        assert_eq!(log.retrieval_ms, 12);
    }

    #[test]
    fn test_mean_empty() {
        assert_eq!(mean(std::iter::empty()), None);
    }
}
