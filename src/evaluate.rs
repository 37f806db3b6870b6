//! `lexrag evaluate` and `lexrag analyze-logs`.

use anyhow::{bail, Context, Result};
use std::path::Path;

use lexrag_core::evaluate::{EvaluationReport, LogAnalysis};
use lexrag_core::models::QueryLog;

use crate::config::Config;
use crate::engine::build_engine;
use crate::retrieve::parse_date;

/// Read one query per line. Blank lines and `#` comments are skipped.
pub fn load_queries(path: &Path) -> Result<Vec<String>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read queries file: {}", path.display()))?;
    Ok(parse_queries(&content))
}

fn parse_queries(content: &str) -> Vec<String> {
    content
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with('#'))
        .map(String::from)
        .collect()
}

pub async fn run_evaluate(config: &Config, queries_file: Option<&Path>, json: bool) -> Result<()> {
    let queries = match queries_file {
        Some(path) => load_queries(path)?,
        None => config.evaluation.queries.clone(),
    };
    if queries.is_empty() {
        bail!("No queries to evaluate. Pass --queries-file or set [evaluation].queries.");
    }

    let engine = build_engine(config).await?;
    let options = config
        .evaluation
        .to_options(config.retrieval.to_options());
    let report = engine.evaluate(&queries, &options).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report(&report, options.low_confidence_threshold);
    }

    engine.store().pool().close().await;
    Ok(())
}

fn fmt_opt(value: Option<f64>) -> String {
    value
        .map(|v| format!("{:.3}", v))
        .unwrap_or_else(|| "-".to_string())
}

fn print_report(report: &EvaluationReport, low_confidence_threshold: f64) {
    println!("Retrieval Evaluation");
    println!("====================");
    println!();
    println!("  Queries:            {}", report.total_queries);
    println!("  Success rate:       {:.1}%", report.success_rate * 100.0);
    println!("  Mean results:       {:.2}", report.mean_result_count);
    println!("  Mean retrieval:     {:.1} ms", report.mean_retrieval_ms);
    println!("  Mean similarity:    {}", fmt_opt(report.mean_similarity));
    println!("  Median similarity:  {}", fmt_opt(report.median_similarity));
    println!(
        "  Min / max:          {} / {}",
        fmt_opt(report.min_similarity),
        fmt_opt(report.max_similarity)
    );
    println!("  Mean diversity:     {:.3}", report.mean_diversity);
    println!(
        "  Low confidence:     {} (< {:.2})",
        report.low_confidence_count, low_confidence_threshold
    );
    println!();
    println!(
        "  {:<48} {:>7} {:>8} {:>9} {:>9}",
        "QUERY", "RESULTS", "MEAN", "DIVERSITY", "MS"
    );
    println!("  {}", "-".repeat(86));
    for q in &report.queries {
        println!(
            "  {:<48} {:>7} {:>8} {:>9.3} {:>9.1}",
            truncate(&q.query, 48),
            q.result_count,
            fmt_opt(q.mean_similarity),
            q.diversity,
            q.retrieval_ms
        );
    }
    println!();
}

pub async fn run_analyze_logs(
    config: &Config,
    sample: Option<usize>,
    since: Option<&str>,
    json: bool,
) -> Result<()> {
    let since_ts = since.map(|s| parse_date(s, false)).transpose()?;

    let engine = build_engine(config).await?;
    let analysis = engine.analyze_logs(sample, since_ts).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&analysis)?);
    } else {
        print_analysis(&analysis);
    }

    engine.store().pool().close().await;
    Ok(())
}

fn print_analysis(analysis: &LogAnalysis) {
    println!("Query Log Analysis");
    println!("==================");
    println!();
    println!("  Logs analyzed:      {}", analysis.total_logs);
    if analysis.total_logs == 0 {
        println!();
        return;
    }

    let buckets: [(&str, &[QueryLog], f64); 4] = [
        ("Generic answers", &analysis.generic_answers, analysis.generic_answer_rate),
        ("Zero results", &analysis.zero_results, analysis.zero_result_rate),
        ("Low similarity", &analysis.low_similarity, analysis.low_similarity_rate),
        ("Slow retrievals", &analysis.slow_retrievals, analysis.slow_retrieval_rate),
    ];

    for (label, logs, rate) in buckets {
        println!("  {:<19} {} ({:.1}%)", format!("{}:", label), logs.len(), rate * 100.0);
    }

    for (label, logs, _) in buckets {
        if logs.is_empty() {
            continue;
        }
        println!();
        println!("  {}:", label);
        for log in logs.iter().take(10) {
            println!("    - {}", truncate(&log.query, 72));
        }
        if logs.len() > 10 {
            println!("    ... and {} more", logs.len() - 10);
        }
    }
    println!();
}

fn truncate(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        s.to_string()
    } else {
        let cut: String = s.chars().take(max_chars.saturating_sub(1)).collect();
        format!("{}…", cut)
    }
}
