//! In-memory [`Store`] implementation for tests and embedding in other
//! programs.
//!
//! Uses `HashMap` and `Vec` behind `std::sync::RwLock`. Similarity search
//! is brute-force cosine similarity over every chunk that passes the
//! metadata filter.

use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;

use crate::embedding::cosine_similarity;
use crate::models::{Chunk, Document, QueryLog};

use super::{
    format_ts_iso, ChunkCandidate, ChunkResponse, DocumentResponse, SearchFilter, Store,
};

struct StoredChunk {
    chunk: Chunk,
    vector: Vec<f32>,
}

/// In-memory store.
#[derive(Default)]
pub struct InMemoryStore {
    docs: RwLock<HashMap<String, Document>>,
    chunks: RwLock<Vec<StoredChunk>>,
    logs: RwLock<Vec<QueryLog>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored chunks across all documents.
    pub fn chunk_count(&self) -> Result<usize> {
        Ok(read(&self.chunks)?.len())
    }
}

fn read<T>(lock: &RwLock<T>) -> Result<RwLockReadGuard<'_, T>> {
    lock.read().map_err(|_| anyhow!("in-memory store lock poisoned"))
}

fn write<T>(lock: &RwLock<T>) -> Result<RwLockWriteGuard<'_, T>> {
    lock.write().map_err(|_| anyhow!("in-memory store lock poisoned"))
}

#[async_trait]
impl Store for InMemoryStore {
    async fn upsert_document(&self, doc: &Document) -> Result<String> {
        write(&self.docs)?.insert(doc.id.clone(), doc.clone());
        Ok(doc.id.clone())
    }

    async fn replace_chunks(
        &self,
        doc_id: &str,
        chunks: &[Chunk],
        vectors: &[Vec<f32>],
    ) -> Result<()> {
        if chunks.len() != vectors.len() {
            bail!(
                "{} chunks but {} vectors for document {}",
                chunks.len(),
                vectors.len(),
                doc_id
            );
        }
        let mut stored = write(&self.chunks)?;
        stored.retain(|sc| sc.chunk.document_id != doc_id);
        stored.extend(chunks.iter().zip(vectors).map(|(c, v)| StoredChunk {
            chunk: c.clone(),
            vector: v.clone(),
        }));
        Ok(())
    }

    async fn delete_document(&self, id: &str) -> Result<bool> {
        let removed = write(&self.docs)?.remove(id).is_some();
        write(&self.chunks)?.retain(|sc| sc.chunk.document_id != id);
        Ok(removed)
    }

    async fn get_document(&self, id: &str) -> Result<Option<DocumentResponse>> {
        let docs = read(&self.docs)?;
        let doc = match docs.get(id) {
            Some(d) => d,
            None => return Ok(None),
        };

        let mut chunks: Vec<ChunkResponse> = read(&self.chunks)?
            .iter()
            .filter(|sc| sc.chunk.document_id == id)
            .map(|sc| ChunkResponse {
                index: sc.chunk.chunk_index,
                content: sc.chunk.content.clone(),
            })
            .collect();
        chunks.sort_by_key(|c| c.index);

        Ok(Some(DocumentResponse {
            id: doc.id.clone(),
            title: doc.title.clone(),
            doc_type: doc.doc_type.clone(),
            source: doc.source.clone(),
            created_at: format_ts_iso(doc.created_at),
            updated_at: format_ts_iso(doc.updated_at),
            content: doc.content.clone(),
            chunks,
        }))
    }

    async fn list_documents(&self) -> Result<Vec<Document>> {
        let mut docs: Vec<Document> = read(&self.docs)?.values().cloned().collect();
        docs.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(docs)
    }

    async fn similarity_search(
        &self,
        query_vec: &[f32],
        filter: &SearchFilter,
        min_similarity: f64,
        limit: usize,
    ) -> Result<Vec<ChunkCandidate>> {
        let stored = read(&self.chunks)?;
        let mut candidates: Vec<ChunkCandidate> = stored
            .iter()
            .filter(|sc| filter.matches(&sc.chunk.metadata))
            .filter_map(|sc| {
                let similarity = cosine_similarity(query_vec, &sc.vector);
                (similarity > min_similarity).then(|| ChunkCandidate {
                    chunk_id: sc.chunk.id.clone(),
                    document_id: sc.chunk.document_id.clone(),
                    content: sc.chunk.content.clone(),
                    similarity,
                    metadata: sc.chunk.metadata.clone(),
                })
            })
            .collect();

        candidates.sort_by(|a, b| {
            b.similarity
                .partial_cmp(&a.similarity)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        candidates.truncate(limit);
        Ok(candidates)
    }

    async fn record_query_log(&self, log: &QueryLog) -> Result<()> {
        write(&self.logs)?.push(log.clone());
        Ok(())
    }

    async fn recent_query_logs(&self, limit: usize, since: Option<i64>) -> Result<Vec<QueryLog>> {
        let logs = read(&self.logs)?;
        // Newest first; insertion order breaks ties so later writes win.
        let mut selected: Vec<(usize, &QueryLog)> = logs
            .iter()
            .enumerate()
            .filter(|(_, l)| since.map_or(true, |s| l.created_at >= s))
            .collect();
        selected.sort_by(|(ia, a), (ib, b)| b.created_at.cmp(&a.created_at).then(ib.cmp(ia)));
        Ok(selected
            .into_iter()
            .take(limit)
            .map(|(_, l)| l.clone())
            .collect())
    }
}
