//! TOML configuration.
//!
//! Only `[db]` is required; every other section falls back to defaults.
//!
//! ```toml
//! [db]
//! path = "./data/lexrag.sqlite"
//!
//! [embedding]
//! provider = "hashed"
//! dims = 256
//! ```

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use lexrag_core::chunk::ChunkingParams;
use lexrag_core::evaluate::{EvaluationOptions, LogAnalysisOptions};
use lexrag_core::retrieve::{HybridWeights, RetrievalOptions};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    #[serde(default)]
    pub chunking: ChunkingParams,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub evaluation: EvaluationConfig,
    #[serde(default)]
    pub ingest: IngestConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_similarity_threshold")]
    pub similarity_threshold: f64,
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    #[serde(default = "default_final_results")]
    pub final_results: usize,
    #[serde(default)]
    pub use_keyword_boost: bool,
    #[serde(default = "default_vector_weight")]
    pub vector_weight: f64,
    #[serde(default = "default_keyword_weight")]
    pub keyword_weight: f64,
    #[serde(default = "default_boost_per_occurrence")]
    pub boost_per_occurrence: f64,
    #[serde(default = "default_boost_cap")]
    pub boost_cap: f64,
    /// Deadline for one retrieval in the HTTP server.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_similarity_threshold() -> f64 {
    0.3
}
fn default_top_k() -> usize {
    10
}
fn default_final_results() -> usize {
    4
}
fn default_vector_weight() -> f64 {
    0.7
}
fn default_keyword_weight() -> f64 {
    0.3
}
fn default_boost_per_occurrence() -> f64 {
    0.1
}
fn default_boost_cap() -> f64 {
    0.3
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            similarity_threshold: default_similarity_threshold(),
            top_k: default_top_k(),
            final_results: default_final_results(),
            use_keyword_boost: false,
            vector_weight: default_vector_weight(),
            keyword_weight: default_keyword_weight(),
            boost_per_occurrence: default_boost_per_occurrence(),
            boost_cap: default_boost_cap(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl RetrievalConfig {
    /// Baseline per-request options; callers override individual fields.
    pub fn to_options(&self) -> RetrievalOptions {
        RetrievalOptions {
            similarity_threshold: self.similarity_threshold,
            top_k: self.top_k,
            final_results: self.final_results,
            use_keyword_boost: self.use_keyword_boost,
            weights: HybridWeights {
                vector_weight: self.vector_weight,
                keyword_weight: self.keyword_weight,
                boost_per_occurrence: self.boost_per_occurrence,
                boost_cap: self.boost_cap,
            },
            ..RetrievalOptions::default()
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    /// Base URL for the Ollama provider.
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: None,
            dims: None,
            url: None,
            batch_size: default_batch_size(),
            max_retries: default_max_retries(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_provider() -> String {
    "disabled".to_string()
}
fn default_batch_size() -> usize {
    64
}
fn default_max_retries() -> u32 {
    5
}
fn default_timeout_secs() -> u64 {
    30
}

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct CacheConfig {
    #[serde(default = "default_cache_size")]
    pub max_size: usize,
}

fn default_cache_size() -> usize {
    1000
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_size: default_cache_size(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct EvaluationConfig {
    #[serde(default = "default_half")]
    pub low_confidence_threshold: f64,
    #[serde(default = "default_half")]
    pub low_similarity_threshold: f64,
    #[serde(default = "default_slow_retrieval_ms")]
    pub slow_retrieval_ms: u64,
    #[serde(default = "default_log_sample_size")]
    pub log_sample_size: usize,
    /// Canned queries for `lexrag evaluate`.
    #[serde(default)]
    pub queries: Vec<String>,
}

fn default_half() -> f64 {
    0.5
}
fn default_slow_retrieval_ms() -> u64 {
    3000
}
fn default_log_sample_size() -> usize {
    100
}

impl Default for EvaluationConfig {
    fn default() -> Self {
        Self {
            low_confidence_threshold: default_half(),
            low_similarity_threshold: default_half(),
            slow_retrieval_ms: default_slow_retrieval_ms(),
            log_sample_size: default_log_sample_size(),
            queries: Vec::new(),
        }
    }
}

impl EvaluationConfig {
    pub fn to_options(&self, retrieval: RetrievalOptions) -> EvaluationOptions {
        EvaluationOptions {
            retrieval,
            low_confidence_threshold: self.low_confidence_threshold,
        }
    }

    pub fn log_analysis(&self) -> LogAnalysisOptions {
        LogAnalysisOptions {
            low_similarity_threshold: self.low_similarity_threshold,
            slow_retrieval_ms: self.slow_retrieval_ms,
        }
    }
}

/// File selection for `lexrag ingest <dir>`.
#[derive(Debug, Deserialize, Clone)]
pub struct IngestConfig {
    #[serde(default = "default_include_globs")]
    pub include_globs: Vec<String>,
    #[serde(default)]
    pub exclude_globs: Vec<String>,
    #[serde(default)]
    pub follow_symlinks: bool,
}

fn default_include_globs() -> Vec<String> {
    vec!["**/*.md".to_string(), "**/*.txt".to_string()]
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            include_globs: default_include_globs(),
            exclude_globs: Vec::new(),
            follow_symlinks: false,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

fn default_bind() -> String {
    "127.0.0.1:7340".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    parse_config(&content)
}

/// Parse and validate a TOML config string.
pub fn parse_config(content: &str) -> Result<Config> {
    let config: Config = toml::from_str(content).with_context(|| "Failed to parse config file")?;

    // Validate chunking
    config
        .chunking
        .validate()
        .map_err(|e| anyhow::anyhow!("chunking: {}", e))?;

    // Validate retrieval
    config
        .retrieval
        .to_options()
        .validate()
        .map_err(|e| anyhow::anyhow!("retrieval: {}", e))?;
    if config.retrieval.timeout_secs == 0 {
        bail!("retrieval.timeout_secs must be > 0");
    }

    // Validate cache
    if config.cache.max_size == 0 {
        bail!("cache.max_size must be >= 1");
    }

    // Validate embedding
    let embedding = &config.embedding;
    match embedding.provider.as_str() {
        "openai" | "ollama" => {
            if embedding.model.is_none() {
                bail!(
                    "embedding.model must be specified when provider is '{}'",
                    embedding.provider
                );
            }
            if embedding.dims.unwrap_or(0) == 0 {
                bail!(
                    "embedding.dims must be > 0 when provider is '{}'",
                    embedding.provider
                );
            }
        }
        "hashed" => {
            if embedding.dims.unwrap_or(0) == 0 {
                bail!("embedding.dims must be > 0 when provider is 'hashed'");
            }
        }
        "disabled" | "local" => {}
        other => bail!(
            "Unknown embedding provider: '{}'. Must be disabled, openai, ollama, hashed, or local.",
            other
        ),
    }
    if embedding.batch_size == 0 {
        bail!("embedding.batch_size must be >= 1");
    }

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_config_uses_defaults() {
        let config = parse_config("[db]\npath = \"x.sqlite\"\n").unwrap();
        assert_eq!(config.chunking, ChunkingParams::default());
        assert_eq!(config.retrieval.top_k, 10);
        assert_eq!(config.retrieval.final_results, 4);
        assert_eq!(config.cache.max_size, 1000);
        assert_eq!(config.embedding.provider, "disabled");
        assert_eq!(config.server.bind, "127.0.0.1:7340");
        assert_eq!(config.evaluation.log_sample_size, 100);
        assert_eq!(config.ingest.include_globs.len(), 2);
    }

    #[test]
    fn test_retrieval_options_from_config() {
        let config = parse_config(
            r#"
[db]
path = "x.sqlite"

[retrieval]
similarity_threshold = 0.45
use_keyword_boost = true
boost_cap = 0.5
"#,
        )
        .unwrap();
        let options = config.retrieval.to_options();
        assert_eq!(options.similarity_threshold, 0.45);
        assert!(options.use_keyword_boost);
        assert_eq!(options.weights.boost_cap, 0.5);
        assert_eq!(options.weights.vector_weight, 0.7);
    }

    #[test]
    fn test_rejects_bad_values() {
        let cases = [
            "[chunking]\nmin_chunk_size = 500\nchunk_size = 100",
            "[chunking]\noverlap_fraction = 1.0",
            "[retrieval]\ntop_k = 0",
            "[retrieval]\nsimilarity_threshold = 2.0",
            "[retrieval]\nkeyword_weight = -1.0",
            "[cache]\nmax_size = 0",
            "[embedding]\nprovider = \"openai\"\ndims = 1536",
            "[embedding]\nprovider = \"hashed\"",
            "[embedding]\nprovider = \"cohere\"",
        ];
        for case in cases {
            let toml = format!("[db]\npath = \"x.sqlite\"\n{}\n", case);
            assert!(parse_config(&toml).is_err(), "accepted: {}", case);
        }
    }

    #[test]
    fn test_missing_db_section_fails() {
        assert!(parse_config("[server]\nbind = \"0.0.0.0:1\"").is_err());
    }
}
