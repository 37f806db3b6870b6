//! Document lookup and deletion by ID.
//!
//! Used by the `lexrag get` / `lexrag delete` commands; the HTTP server
//! calls the same engine operations.

use anyhow::{bail, Result};

use lexrag_core::store::DocumentResponse;

use crate::config::Config;
use crate::engine::build_engine;

/// CLI entry point: fetch a document and print it to stdout.
pub async fn run_get(config: &Config, id: &str, json: bool) -> Result<()> {
    let engine = build_engine(config).await?;
    let doc = engine.get_document(id).await?;
    engine.store().pool().close().await;

    let Some(doc) = doc else {
        bail!("document not found: {}", id);
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&doc)?);
    } else {
        print_document(&doc);
    }
    Ok(())
}

fn print_document(doc: &DocumentResponse) {
    println!("--- Document ---");
    println!("id:         {}", doc.id);
    println!("title:      {}", doc.title.as_deref().unwrap_or("(untitled)"));
    println!("doc_type:   {}", doc.doc_type.as_deref().unwrap_or("-"));
    println!("source:     {}", doc.source.as_deref().unwrap_or("-"));
    println!("created_at: {}", doc.created_at);
    println!("updated_at: {}", doc.updated_at);
    println!();

    println!("--- Content ---");
    println!("{}", doc.content);
    println!();

    println!("--- Chunks ({}) ---", doc.chunks.len());
    for chunk in &doc.chunks {
        println!("[chunk {}]", chunk.index);
        println!("{}", chunk.content);
        println!();
    }
}

pub async fn run_delete(config: &Config, id: &str) -> Result<()> {
    let engine = build_engine(config).await?;
    let deleted = engine.delete_document(id).await?;
    engine.store().pool().close().await;

    if !deleted {
        bail!("document not found: {}", id);
    }
    println!("deleted {}", id);
    Ok(())
}
