//! File and directory ingestion.
//!
//! `lexrag ingest <path>` accepts a single file or a directory. Directories
//! are walked with `walkdir` and filtered by the `[ingest]` include/exclude
//! globs; every matching file becomes one document whose `source` is its
//! path. Re-ingesting a path that is already stored reuses the document id,
//! so its chunks are replaced rather than duplicated.

use anyhow::{bail, Context, Result};
use globset::{Glob, GlobSet, GlobSetBuilder};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use lexrag_core::models::{Document, DocumentMetadata};
use lexrag_core::store::Store;

use crate::config::{Config, IngestConfig};
use crate::engine::{build_engine, AppEngine};

/// Resolve `path` into the list of files to ingest, sorted by path.
///
/// A file path is returned as-is, whatever the globs say.
pub fn collect_files(path: &Path, ingest: &IngestConfig) -> Result<Vec<PathBuf>> {
    if !path.exists() {
        bail!("Path does not exist: {}", path.display());
    }
    if path.is_file() {
        return Ok(vec![path.to_path_buf()]);
    }

    let include_set = build_globset(&ingest.include_globs)?;

    let mut default_excludes = vec![
        "**/.git/**".to_string(),
        "**/target/**".to_string(),
        "**/node_modules/**".to_string(),
    ];
    default_excludes.extend(ingest.exclude_globs.clone());
    let exclude_set = build_globset(&default_excludes)?;

    let mut files = Vec::new();
    for entry in WalkDir::new(path).follow_links(ingest.follow_symlinks) {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }

        let file = entry.path();
        let relative = file.strip_prefix(path).unwrap_or(file);
        let rel_str = relative.to_string_lossy().to_string();

        if exclude_set.is_match(&rel_str) || !include_set.is_match(&rel_str) {
            continue;
        }
        files.push(file.to_path_buf());
    }

    files.sort();
    Ok(files)
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern).with_context(|| format!("Invalid glob: {}", pattern))?);
    }
    Ok(builder.build()?)
}

fn file_title(path: &Path) -> Option<String> {
    path.file_stem().map(|s| s.to_string_lossy().to_string())
}

/// Counters printed at the end of `lexrag ingest`.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct IngestSummary {
    pub documents: usize,
    pub chunks: usize,
    pub skipped: usize,
}

/// Ingest every file under `path`.
///
/// `metadata.title` only applies when `path` is a single file; otherwise
/// each document is titled after its file stem. Empty files are skipped.
pub async fn ingest_path(
    engine: &AppEngine,
    ingest: &IngestConfig,
    path: &Path,
    metadata: &DocumentMetadata,
) -> Result<IngestSummary> {
    let files = collect_files(path, ingest)?;
    let single_file = path.is_file();

    // source -> (id, created_at) of documents already stored
    let existing: HashMap<String, (String, i64)> = engine
        .store()
        .list_documents()
        .await?
        .into_iter()
        .filter_map(|d| d.source.map(|s| (s, (d.id, d.created_at))))
        .collect();

    let mut summary = IngestSummary::default();

    for file in &files {
        let content = std::fs::read_to_string(file)
            .with_context(|| format!("Failed to read {}", file.display()))?;
        if content.trim().is_empty() {
            tracing::warn!(file = %file.display(), "skipping empty file");
            summary.skipped += 1;
            continue;
        }

        let source = metadata
            .source
            .clone()
            .filter(|_| single_file)
            .unwrap_or_else(|| file.display().to_string());
        let title = if single_file {
            metadata.title.clone().or_else(|| file_title(file))
        } else {
            file_title(file)
        };

        let mut doc = Document::new(
            content,
            DocumentMetadata {
                title,
                doc_type: metadata.doc_type.clone(),
                source: Some(source.clone()),
            },
        );
        if let Some((id, created_at)) = existing.get(&source) {
            doc.id = id.clone();
            doc.created_at = *created_at;
        }

        let report = engine
            .ingest_document(&doc)
            .await
            .with_context(|| format!("Failed to ingest {}", file.display()))?;
        tracing::debug!(file = %file.display(), chunks = report.chunk_count, "ingested");

        summary.documents += 1;
        summary.chunks += report.chunk_count;
    }

    Ok(summary)
}

pub async fn run_ingest(config: &Config, path: &Path, metadata: DocumentMetadata) -> Result<()> {
    let engine = build_engine(config).await?;
    let summary = ingest_path(&engine, &config.ingest, path, &metadata).await?;

    println!("ingest {}", path.display());
    println!("  documents: {}", summary.documents);
    println!("  chunks written: {}", summary.chunks);
    if summary.skipped > 0 {
        println!("  skipped (empty): {}", summary.skipped);
    }
    println!("ok");

    engine.store().pool().close().await;
    Ok(())
}

pub async fn run_ingest_text(config: &Config, text: &str, metadata: DocumentMetadata) -> Result<()> {
    let engine = build_engine(config).await?;
    let report = engine.ingest(text, metadata).await?;

    println!("document: {}", report.document_id);
    println!("chunks written: {}", report.chunk_count);

    engine.store().pool().close().await;
    Ok(())
}

pub async fn run_reindex(config: &Config) -> Result<()> {
    let engine = build_engine(config).await?;
    let report = engine.reindex().await?;

    println!("reindex");
    println!("  documents: {}", report.documents);
    println!("  chunks written: {}", report.chunks);
    println!("ok");

    engine.store().pool().close().await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write(dir: &Path, rel: &str, content: &str) {
        let path = dir.join(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, content).unwrap();
    }

    #[test]
    fn test_collect_files_applies_globs() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "a.md", "a");
        write(dir.path(), "sub/b.txt", "b");
        write(dir.path(), "c.pdf", "c");
        write(dir.path(), ".git/HEAD.md", "x");

        let files = collect_files(dir.path(), &IngestConfig::default()).unwrap();
        let names: Vec<String> = files
            .iter()
            .map(|f| f.strip_prefix(dir.path()).unwrap().to_string_lossy().to_string())
            .collect();
        assert_eq!(names, vec!["a.md".to_string(), "sub/b.txt".to_string()]);
    }

    #[test]
    fn test_collect_files_exclude_globs() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "keep.md", "a");
        write(dir.path(), "drafts/skip.md", "b");

        let config = IngestConfig {
            exclude_globs: vec!["drafts/**".to_string()],
            ..IngestConfig::default()
        };
        let files = collect_files(dir.path(), &config).unwrap();
        assert_eq!(files.len(), 1);
        assert!(files[0].ends_with("keep.md"));
    }

    #[test]
    fn test_single_file_ignores_globs() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "notes.rst", "x");
        let file = dir.path().join("notes.rst");
        assert_eq!(collect_files(&file, &IngestConfig::default()).unwrap(), vec![file]);
    }

    #[test]
    fn test_missing_path_errors() {
        let dir = TempDir::new().unwrap();
        assert!(collect_files(&dir.path().join("nope"), &IngestConfig::default()).is_err());
    }
}
