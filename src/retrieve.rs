//! `lexrag retrieve`: run one retrieval against the configured store.

use anyhow::{anyhow, Result};
use chrono::NaiveDate;
use clap::Args;

use lexrag_core::models::RetrievalResult;
use lexrag_core::retrieve::RetrievalOptions;

use crate::config::Config;
use crate::engine::build_engine;

#[derive(Debug, Clone, Default, Args)]
pub struct RetrieveArgs {
    /// Natural-language query
    pub query: String,

    /// Only documents of this type
    #[arg(long = "doc-type")]
    pub doc_type: Option<String>,

    /// Only documents whose title contains this text (case-insensitive)
    #[arg(long)]
    pub title: Option<String>,

    /// Created on or after this date (YYYY-MM-DD)
    #[arg(long)]
    pub from: Option<String>,

    /// Created on or before this date (YYYY-MM-DD)
    #[arg(long)]
    pub to: Option<String>,

    /// Minimum cosine similarity (exclusive)
    #[arg(long)]
    pub threshold: Option<f64>,

    /// Candidates fetched from the store
    #[arg(long = "top-k")]
    pub top_k: Option<usize>,

    /// Results returned
    #[arg(long)]
    pub limit: Option<usize>,

    /// Rescore with keyword boosting
    #[arg(long)]
    pub hybrid: bool,

    /// Keyword for hybrid rescoring (repeatable; extracted from the query if omitted)
    #[arg(long = "keyword")]
    pub keywords: Vec<String>,

    /// Print results as JSON
    #[arg(long)]
    pub json: bool,
}

/// Parse `YYYY-MM-DD` as Unix seconds at the start (00:00:00 UTC) or end
/// (23:59:59 UTC) of that day.
pub fn parse_date(s: &str, end_of_day: bool) -> Result<i64> {
    let date = NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .map_err(|e| anyhow!("Invalid date '{}' (expected YYYY-MM-DD): {}", s, e))?;
    let dt = if end_of_day {
        date.and_hms_opt(23, 59, 59)
    } else {
        date.and_hms_opt(0, 0, 0)
    }
    .ok_or_else(|| anyhow!("Invalid date: {}", s))?;
    Ok(dt.and_utc().timestamp())
}

/// Build request options from the configured baseline and the CLI flags.
pub fn build_options(config: &Config, args: &RetrieveArgs) -> Result<RetrievalOptions> {
    let mut options = config.retrieval.to_options();

    options.document_type = args.doc_type.clone();
    options.title_contains = args.title.clone();
    options.date_from = args.from.as_deref().map(|s| parse_date(s, false)).transpose()?;
    options.date_to = args.to.as_deref().map(|s| parse_date(s, true)).transpose()?;

    if let Some(threshold) = args.threshold {
        options.similarity_threshold = threshold;
    }
    if let Some(top_k) = args.top_k {
        options.top_k = top_k;
    }
    if let Some(limit) = args.limit {
        options.final_results = limit;
    }
    if args.hybrid || !args.keywords.is_empty() {
        options.use_keyword_boost = true;
    }
    options.keywords = args.keywords.clone();

    options.validate()?;
    Ok(options)
}

pub async fn run_retrieve(config: &Config, args: &RetrieveArgs) -> Result<()> {
    let options = build_options(config, args)?;
    let engine = build_engine(config).await?;
    let results = engine.retrieve(&args.query, &options).await?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&results)?);
    } else {
        print_results(&results);
    }

    engine.store().pool().close().await;
    Ok(())
}

fn print_results(results: &[RetrievalResult]) {
    if results.is_empty() {
        println!("No results.");
        return;
    }

    for (i, r) in results.iter().enumerate() {
        let (title, doc_type, doc_id) = match &r.metadata {
            Some(m) => (
                m.title.as_deref().unwrap_or("(untitled)"),
                m.doc_type.as_deref().unwrap_or("-"),
                m.document_id.as_str(),
            ),
            None => ("(untitled)", "-", "-"),
        };

        match r.combined_score {
            Some(combined) => println!(
                "{}. [{:.3} | sim {:.3}] {} ({})",
                i + 1,
                combined,
                r.similarity,
                title,
                doc_type
            ),
            None => println!("{}. [{:.3}] {} ({})", i + 1, r.similarity, title, doc_type),
        }
        println!("    document: {}", doc_id);
        println!("    chunk:    {}", r.chunk_id);
        println!("    > {}", snippet(&r.content, 240));
        println!();
    }
}

fn snippet(text: &str, max_chars: usize) -> String {
    let flat: String = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if flat.chars().count() <= max_chars {
        flat
    } else {
        let cut: String = flat.chars().take(max_chars).collect();
        format!("{}…", cut.trim_end())
    }
}
