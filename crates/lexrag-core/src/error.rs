//! Error taxonomy for the retrieval engine.
//!
//! Every fallible engine operation returns [`RagError`]. The variants
//! separate failures the caller may retry (provider, store, timeout) from
//! requests that will never succeed as written (validation).
//!
//! An empty result list is *not* an error: a query that clears no
//! similarity threshold returns `Ok(vec![])`.

use std::time::Duration;

use thiserror::Error;

/// Failure raised by the engine.
#[derive(Debug, Error)]
pub enum RagError {
    /// The embedding provider failed, timed out, or returned a malformed response.
    #[error("embedding provider failed: {0}")]
    Embedding(#[source] anyhow::Error),

    /// The document/vector store failed.
    #[error("vector store failed: {0}")]
    Store(#[source] anyhow::Error),

    /// A caller-imposed deadline expired before the operation finished.
    #[error("operation timed out after {0:?}")]
    Timeout(Duration),

    /// The request is malformed (bad options, empty document content).
    #[error("invalid request: {0}")]
    Validation(String),
}

impl RagError {
    /// Whether retrying the same call could succeed.
    pub fn is_transient(&self) -> bool {
        !matches!(self, RagError::Validation(_))
    }

    /// Shorthand for building a [`RagError::Validation`].
    pub fn validation(message: impl Into<String>) -> Self {
        RagError::Validation(message.into())
    }
}

/// Result alias used across the core crate.
pub type Result<T> = std::result::Result<T, RagError>;
