//! Embedding provider trait, the caching gateway, and vector utilities.
//!
//! Defines the [`EmbeddingProvider`] trait that all embedding backends
//! implement and the [`EmbeddingGateway`] that the engine talks to. The
//! gateway consults the [`EmbeddingCache`] for single query texts and
//! sends ingestion batches straight to the provider.
//!
//! Concrete provider implementations (OpenAI, Ollama, hashed, fastembed)
//! live in the `lexrag` app crate.

use std::sync::Arc;

use anyhow::anyhow;
use async_trait::async_trait;

use crate::cache::EmbeddingCache;
use crate::error::{RagError, Result};

/// Trait for embedding providers.
///
/// Providers report failures as `anyhow::Error`; the gateway wraps them in
/// [`RagError::Embedding`].
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Returns the model identifier (e.g. `"text-embedding-3-small"`).
    fn model_name(&self) -> &str;
    /// Returns the embedding vector dimensionality (e.g. `1536`).
    fn dims(&self) -> usize;

    /// Embed one text.
    async fn embed(&self, text: &str) -> anyhow::Result<Vec<f32>>;

    /// Embed several texts, returning one vector per input in order.
    ///
    /// The default implementation calls [`embed`](Self::embed) once per text.
    async fn embed_batch(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
        let mut vectors = Vec::with_capacity(texts.len());
        for text in texts {
            vectors.push(self.embed(text).await?);
        }
        Ok(vectors)
    }
}

#[async_trait]
impl<P: EmbeddingProvider + ?Sized> EmbeddingProvider for Box<P> {
    fn model_name(&self) -> &str {
        (**self).model_name()
    }
    fn dims(&self) -> usize {
        (**self).dims()
    }
    async fn embed(&self, text: &str) -> anyhow::Result<Vec<f32>> {
        (**self).embed(text).await
    }
    async fn embed_batch(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
        (**self).embed_batch(texts).await
    }
}

#[async_trait]
impl<P: EmbeddingProvider + ?Sized> EmbeddingProvider for Arc<P> {
    fn model_name(&self) -> &str {
        (**self).model_name()
    }
    fn dims(&self) -> usize {
        (**self).dims()
    }
    async fn embed(&self, text: &str) -> anyhow::Result<Vec<f32>> {
        (**self).embed(text).await
    }
    async fn embed_batch(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
        (**self).embed_batch(texts).await
    }
}

/// Provider front-end used by ingestion and retrieval.
pub struct EmbeddingGateway<P> {
    provider: P,
    cache: Arc<EmbeddingCache>,
    batch_size: usize,
}

impl<P: EmbeddingProvider> EmbeddingGateway<P> {
    /// A `batch_size` of 0 is treated as 1.
    pub fn new(provider: P, cache: Arc<EmbeddingCache>, batch_size: usize) -> Self {
        Self {
            provider,
            cache,
            batch_size: batch_size.max(1),
        }
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    pub fn cache(&self) -> &EmbeddingCache {
        &self.cache
    }

    /// Embed a single text, serving repeated texts from the cache.
    ///
    /// The vector is cached only after the provider call succeeds.
    pub async fn embed_one(&self, text: &str) -> Result<Vec<f32>> {
        if let Some(vector) = self.cache.get(text) {
            tracing::debug!("embedding cache hit");
            return Ok(vector);
        }

        let vector = self
            .provider
            .embed(text)
            .await
            .map_err(RagError::Embedding)?;
        if vector.is_empty() {
            return Err(RagError::Embedding(anyhow!(
                "provider {} returned an empty vector",
                self.provider.model_name()
            )));
        }

        self.cache.put(text, vector.clone());
        Ok(vector)
    }

    /// Embed many texts in `batch_size` sub-batches without touching the cache.
    ///
    /// Either every text gets a vector or the whole call fails.
    pub async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut vectors = Vec::with_capacity(texts.len());

        for (batch_no, batch) in texts.chunks(self.batch_size).enumerate() {
            let batch_vectors = self
                .provider
                .embed_batch(batch)
                .await
                .map_err(RagError::Embedding)?;

            if batch_vectors.len() != batch.len() {
                return Err(RagError::Embedding(anyhow!(
                    "batch {} returned {} vectors for {} inputs",
                    batch_no,
                    batch_vectors.len(),
                    batch.len()
                )));
            }
            if batch_vectors.iter().any(Vec::is_empty) {
                return Err(RagError::Embedding(anyhow!(
                    "batch {} contained an empty vector",
                    batch_no
                )));
            }
            vectors.extend(batch_vectors);
        }

        tracing::debug!(count = vectors.len(), "embedded batch");
        Ok(vectors)
    }
}

/// Encode a float vector as a BLOB (little-endian f32 bytes).
///
/// # Example
///
/// ```rust
/// use lexrag_core::embedding::{vec_to_blob, blob_to_vec};
///
/// let v = vec![1.0f32, -2.5, 3.125];
/// let blob = vec_to_blob(&v);
/// assert_eq!(blob.len(), 12);
/// assert_eq!(blob_to_vec(&blob), v);
/// ```
pub fn vec_to_blob(vec: &[f32]) -> Vec<u8> {
    vec.iter().flat_map(|v| v.to_le_bytes()).collect()
}

/// Decode a BLOB produced by [`vec_to_blob`]. Trailing partial values are ignored.
pub fn blob_to_vec(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect()
}

/// Cosine similarity in `[-1.0, 1.0]`.
///
/// Returns `0.0` for empty vectors, zero vectors, or vectors of different
/// lengths.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let (mut dot, mut norm_a, mut norm_b) = (0.0f64, 0.0f64, 0.0f64);
    for (&x, &y) in a.iter().zip(b.iter()) {
        let (x, y) = (x as f64, y as f64);
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < f64::EPSILON {
        return 0.0;
    }
    (dot / denom).clamp(-1.0, 1.0)
}
