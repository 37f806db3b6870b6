//! SQLite-backed [`Store`] implementation.
//!
//! Document-type and date filters are pushed into the `WHERE` clause; the
//! title filter and cosine similarity are evaluated in Rust over the
//! remaining rows (SQLite's `lower()` only folds ASCII).

use anyhow::{bail, Result};
use async_trait::async_trait;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use lexrag_core::embedding::{blob_to_vec, cosine_similarity, vec_to_blob};
use lexrag_core::models::{content_hash, Chunk, ChunkMetadata, Document, QueryLog};
use lexrag_core::store::{
    format_ts_iso, ChunkCandidate, ChunkResponse, DocumentResponse, SearchFilter, Store,
};

/// SQLite implementation of the [`Store`] trait.
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

fn row_to_document(row: &SqliteRow) -> Document {
    Document {
        id: row.get("id"),
        title: row.get("title"),
        doc_type: row.get("doc_type"),
        source: row.get("source"),
        content: row.get("content"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

fn row_to_log(row: &SqliteRow) -> QueryLog {
    let result_count: i64 = row.get("result_count");
    let retrieval_ms: i64 = row.get("retrieval_ms");
    QueryLog {
        id: row.get("id"),
        query: row.get("query"),
        answer: row.get("answer"),
        result_count: result_count.max(0) as usize,
        mean_similarity: row.get("mean_similarity"),
        retrieval_ms: retrieval_ms.max(0) as u64,
        created_at: row.get("created_at"),
    }
}

#[async_trait]
impl Store for SqliteStore {
    async fn upsert_document(&self, doc: &Document) -> Result<String> {
        sqlx::query(
            r#"
            INSERT INTO documents (id, title, doc_type, source, content, content_hash,
                                   created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                title = excluded.title,
                doc_type = excluded.doc_type,
                source = excluded.source,
                content = excluded.content,
                content_hash = excluded.content_hash,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&doc.id)
        .bind(&doc.title)
        .bind(&doc.doc_type)
        .bind(&doc.source)
        .bind(&doc.content)
        .bind(content_hash(&doc.content))
        .bind(doc.created_at)
        .bind(doc.updated_at)
        .execute(&self.pool)
        .await?;

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

        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM chunks WHERE document_id = ?")
            .bind(doc_id)
            .execute(&mut *tx)
            .await?;

        for (chunk, vector) in chunks.iter().zip(vectors) {
            sqlx::query(
                r#"
                INSERT INTO chunks (id, document_id, chunk_index, content, hash,
                                    title, doc_type, source, created_at, embedding)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&chunk.id)
            .bind(doc_id)
            .bind(chunk.chunk_index)
            .bind(&chunk.content)
            .bind(&chunk.hash)
            .bind(&chunk.metadata.title)
            .bind(&chunk.metadata.doc_type)
            .bind(&chunk.metadata.source)
            .bind(chunk.metadata.created_at)
            .bind(vec_to_blob(vector))
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn delete_document(&self, id: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM documents WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn get_document(&self, id: &str) -> Result<Option<DocumentResponse>> {
        let doc_row = sqlx::query(
            "SELECT id, title, doc_type, source, content, created_at, updated_at FROM documents WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        let doc = match doc_row {
            Some(row) => row_to_document(&row),
            None => return Ok(None),
        };

        let chunk_rows = sqlx::query(
            "SELECT chunk_index, content FROM chunks WHERE document_id = ? ORDER BY chunk_index ASC",
        )
        .bind(id)
        .fetch_all(&self.pool)
        .await?;

        let chunks: Vec<ChunkResponse> = chunk_rows
            .iter()
            .map(|row| ChunkResponse {
                index: row.get("chunk_index"),
                content: row.get("content"),
            })
            .collect();

        Ok(Some(DocumentResponse {
            id: doc.id,
            title: doc.title,
            doc_type: doc.doc_type,
            source: doc.source,
            created_at: format_ts_iso(doc.created_at),
            updated_at: format_ts_iso(doc.updated_at),
            content: doc.content,
            chunks,
        }))
    }

    async fn list_documents(&self) -> Result<Vec<Document>> {
        let rows = sqlx::query(
            "SELECT id, title, doc_type, source, content, created_at, updated_at FROM documents ORDER BY created_at ASC, id ASC",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.iter().map(row_to_document).collect())
    }

    async fn similarity_search(
        &self,
        query_vec: &[f32],
        filter: &SearchFilter,
        min_similarity: f64,
        limit: usize,
    ) -> Result<Vec<ChunkCandidate>> {
        let rows = sqlx::query(
            r#"
            SELECT id, document_id, content, title, doc_type, source, created_at, embedding
            FROM chunks
            WHERE (? IS NULL OR doc_type = ?)
              AND (? IS NULL OR created_at >= ?)
              AND (? IS NULL OR created_at <= ?)
            "#,
        )
        .bind(&filter.document_type)
        .bind(&filter.document_type)
        .bind(filter.date_from)
        .bind(filter.date_from)
        .bind(filter.date_to)
        .bind(filter.date_to)
        .fetch_all(&self.pool)
        .await?;

        let mut candidates: Vec<ChunkCandidate> = rows
            .iter()
            .filter_map(|row| {
                let metadata = ChunkMetadata {
                    document_id: row.get("document_id"),
                    title: row.get("title"),
                    doc_type: row.get("doc_type"),
                    source: row.get("source"),
                    created_at: row.get("created_at"),
                };
                if !filter.matches(&metadata) {
                    return None;
                }

                let blob: Vec<u8> = row.get("embedding");
                let similarity = cosine_similarity(query_vec, &blob_to_vec(&blob));
                if similarity <= min_similarity {
                    return None;
                }

                Some(ChunkCandidate {
                    chunk_id: row.get("id"),
                    document_id: metadata.document_id.clone(),
                    content: row.get("content"),
                    similarity,
                    metadata,
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
        sqlx::query(
            r#"
            INSERT OR REPLACE INTO query_logs (id, query, answer, result_count,
                                               mean_similarity, retrieval_ms, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&log.id)
        .bind(&log.query)
        .bind(&log.answer)
        .bind(log.result_count as i64)
        .bind(log.mean_similarity)
        .bind(log.retrieval_ms as i64)
        .bind(log.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn recent_query_logs(&self, limit: usize, since: Option<i64>) -> Result<Vec<QueryLog>> {
        let rows = sqlx::query(
            r#"
            SELECT id, query, answer, result_count, mean_similarity, retrieval_ms, created_at
            FROM query_logs
            WHERE (? IS NULL OR created_at >= ?)
            ORDER BY created_at DESC, rowid DESC
            LIMIT ?
            "#,
        )
        .bind(since)
        .bind(since)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(row_to_log).collect())
    }
}
