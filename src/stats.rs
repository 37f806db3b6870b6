//! Database statistics.
//!
//! Provides a quick summary of what's indexed: document, chunk and
//! query-log counts plus a per document-type breakdown. Used by
//! `lexrag stats`.

use anyhow::Result;
use serde::Serialize;
use sqlx::{Row, SqlitePool};

use crate::config::Config;
use crate::db;
use crate::migrate;

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct DocTypeStats {
    /// `None` for untyped documents.
    pub doc_type: Option<String>,
    pub documents: i64,
    pub chunks: i64,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct DbStats {
    pub size_bytes: u64,
    pub documents: i64,
    pub chunks: i64,
    pub query_logs: i64,
    pub by_doc_type: Vec<DocTypeStats>,
}

/// Collect counts from an open pool. `size_bytes` is left at zero.
pub async fn collect_stats(pool: &SqlitePool) -> Result<DbStats> {
    let documents: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM documents")
        .fetch_one(pool)
        .await?;
    let chunks: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM chunks")
        .fetch_one(pool)
        .await?;
    let query_logs: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM query_logs")
        .fetch_one(pool)
        .await?;

    let rows = sqlx::query(
        r#"
        SELECT
            d.doc_type AS doc_type,
            COUNT(DISTINCT d.id) AS doc_count,
            COUNT(c.id) AS chunk_count
        FROM documents d
        LEFT JOIN chunks c ON c.document_id = d.id
        GROUP BY d.doc_type
        ORDER BY doc_count DESC, d.doc_type ASC
        "#,
    )
    .fetch_all(pool)
    .await?;

    let by_doc_type = rows
        .iter()
        .map(|row| DocTypeStats {
            doc_type: row.get("doc_type"),
            documents: row.get("doc_count"),
            chunks: row.get("chunk_count"),
        })
        .collect();

    Ok(DbStats {
        size_bytes: 0,
        documents,
        chunks,
        query_logs,
        by_doc_type,
    })
}

/// Run the stats command: query the database and print a summary.
pub async fn run_stats(config: &Config, json: bool) -> Result<()> {
    let pool = db::connect(config).await?;
    migrate::apply(&pool).await?;

    let mut stats = collect_stats(&pool).await?;
    stats.size_bytes = std::fs::metadata(&config.db.path)
        .map(|m| m.len())
        .unwrap_or(0);
    pool.close().await;

    if json {
        println!("{}", serde_json::to_string_pretty(&stats)?);
        return Ok(());
    }

    println!("lexrag Database Stats");
    println!("=====================");
    println!();
    println!("  Database:    {}", config.db.path.display());
    println!("  Size:        {}", format_bytes(stats.size_bytes));
    println!();
    println!("  Documents:   {}", stats.documents);
    println!("  Chunks:      {}", stats.chunks);
    println!("  Query logs:  {}", stats.query_logs);

    if !stats.by_doc_type.is_empty() {
        println!();
        println!("  By document type:");
        println!("  {:<24} {:>6} {:>8}", "TYPE", "DOCS", "CHUNKS");
        println!("  {}", "-".repeat(40));
        for t in &stats.by_doc_type {
            println!(
                "  {:<24} {:>6} {:>8}",
                t.doc_type.as_deref().unwrap_or("(none)"),
                t.documents,
                t.chunks
            );
        }
    }

    println!();
    Ok(())
}

/// Format a byte count as a human-readable string.
fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else if bytes < 1024 * 1024 * 1024 {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    } else {
        format!("{:.2} GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(2048), "2.0 KB");
        assert_eq!(format_bytes(5 * 1024 * 1024), "5.0 MB");
    }

    #[tokio::test]
    async fn test_collect_stats_groups_by_type() {
        let dir = tempfile::TempDir::new().unwrap();
        let pool = db::connect_path(&dir.path().join("s.sqlite")).await.unwrap();
        migrate::apply(&pool).await.unwrap();

        for (id, doc_type) in [("a", Some("ley")), ("b", Some("ley")), ("c", None)] {
            sqlx::query(
                "INSERT INTO documents (id, doc_type, content, content_hash, created_at, updated_at) VALUES (?, ?, 'x', 'h', 0, 0)",
            )
            .bind(id)
            .bind(doc_type)
            .execute(&pool)
            .await
            .unwrap();
        }

        let stats = collect_stats(&pool).await.unwrap();
        assert_eq!(stats.documents, 3);
        assert_eq!(stats.chunks, 0);
        assert_eq!(stats.by_doc_type[0].doc_type.as_deref(), Some("ley"));
        assert_eq!(stats.by_doc_type[0].documents, 2);
        assert_eq!(stats.by_doc_type[1].doc_type, None);
    }
}
