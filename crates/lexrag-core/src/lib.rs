//! # lexrag core
//!
//! Retrieval engine for lexrag: data models, structure-aware chunking,
//! the embedding cache and gateway, store abstraction, filtered and hybrid
//! retrieval, ingestion, and quality evaluation.
//!
//! This crate contains no database, HTTP or filesystem code. Concrete
//! stores and embedding providers live in the `lexrag` app crate; an
//! [`InMemoryStore`](store::memory::InMemoryStore) is provided for tests
//! and embedding.

pub mod cache;
pub mod chunk;
pub mod embedding;
pub mod engine;
pub mod error;
pub mod evaluate;
pub mod ingest;
pub mod keywords;
pub mod models;
pub mod retrieve;
pub mod store;

pub use engine::{EngineSettings, RagEngine};
pub use error::{RagError, Result};
