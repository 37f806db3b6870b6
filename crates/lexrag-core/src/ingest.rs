//! Document ingestion: chunk, embed, then persist.
//!
//! Every chunk vector is computed before anything is written, so a provider
//! failure leaves the store exactly as it was. Re-ingesting a document id
//! replaces the document row and all of its chunks.

use serde::Serialize;

use crate::chunk::{chunk_text, ChunkingParams};
use crate::embedding::{EmbeddingGateway, EmbeddingProvider};
use crate::error::{RagError, Result};
use crate::models::{Chunk, Document};
use crate::store::Store;

/// Outcome of ingesting one document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IngestReport {
    pub document_id: String,
    pub chunk_count: usize,
}

/// Outcome of re-chunking and re-embedding every stored document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReindexReport {
    pub documents: usize,
    pub chunks: usize,
}

/// Chunk `doc`, embed all chunks in batches, then write the document and its chunks.
pub async fn ingest_document<S, P>(
    store: &S,
    gateway: &EmbeddingGateway<P>,
    doc: &Document,
    params: &ChunkingParams,
) -> Result<IngestReport>
where
    S: Store + ?Sized,
    P: EmbeddingProvider,
{
    params.validate()?;
    if doc.content.trim().is_empty() {
        return Err(RagError::validation("document content is empty"));
    }

    let metadata = doc.chunk_metadata();
    let chunks: Vec<Chunk> = chunk_text(&doc.content, Some(&metadata), params)
        .into_iter()
        .enumerate()
        .map(|(i, seg)| Chunk::new(metadata.clone(), i as i64, &seg.content))
        .collect();

    let texts: Vec<String> = chunks.iter().map(|c| c.content.clone()).collect();
    let vectors = gateway.embed_batch(&texts).await?;

    store.upsert_document(doc).await.map_err(RagError::Store)?;
    store
        .replace_chunks(&doc.id, &chunks, &vectors)
        .await
        .map_err(RagError::Store)?;

    tracing::debug!(document_id = %doc.id, chunks = chunks.len(), "ingested document");
    Ok(IngestReport {
        document_id: doc.id.clone(),
        chunk_count: chunks.len(),
    })
}

/// Re-chunk and re-embed every stored document with the current parameters
/// and provider. Stops at the first failure; documents already processed
/// keep their new chunks.
pub async fn reindex_all<S, P>(
    store: &S,
    gateway: &EmbeddingGateway<P>,
    params: &ChunkingParams,
) -> Result<ReindexReport>
where
    S: Store + ?Sized,
    P: EmbeddingProvider,
{
    let docs = store.list_documents().await.map_err(RagError::Store)?;
    let mut report = ReindexReport::default();

    for mut doc in docs {
        doc.updated_at = chrono::Utc::now().timestamp();
        let ingested = ingest_document(store, gateway, &doc, params).await?;
        report.documents += 1;
        report.chunks += ingested.chunk_count;
    }
    Ok(report)
}
