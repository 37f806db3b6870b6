//! Wiring of the app-level [`RagEngine`]: SQLite store, configured
//! embedding provider, and one shared embedding cache.

use anyhow::{Context, Result};
use std::sync::Arc;

use lexrag_core::cache::EmbeddingCache;
use lexrag_core::embedding::EmbeddingProvider;
use lexrag_core::{EngineSettings, RagEngine};

use crate::config::Config;
use crate::db;
use crate::embedding::create_provider;
use crate::migrate;
use crate::sqlite_store::SqliteStore;

/// The engine type used by the CLI and the HTTP server.
pub type AppEngine = RagEngine<SqliteStore, Box<dyn EmbeddingProvider>>;

pub fn engine_settings(config: &Config) -> EngineSettings {
    EngineSettings {
        chunking: config.chunking.clone(),
        log_analysis: config.evaluation.log_analysis(),
        log_sample_size: config.evaluation.log_sample_size,
    }
}

/// Open the database (creating the schema if needed) and build the engine.
pub async fn build_engine(config: &Config) -> Result<AppEngine> {
    let pool = db::connect(config).await?;
    migrate::apply(&pool)
        .await
        .context("Failed to prepare database schema")?;

    let provider = create_provider(&config.embedding)?;
    tracing::info!(
        provider = %config.embedding.provider,
        model = provider.model_name(),
        dims = provider.dims(),
        "embedding provider ready"
    );

    let cache = Arc::new(EmbeddingCache::new(config.cache.max_size));

    Ok(RagEngine::new(
        SqliteStore::new(pool),
        provider,
        cache,
        config.embedding.batch_size,
        engine_settings(config),
    ))
}
