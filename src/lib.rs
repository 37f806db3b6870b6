//! # lexrag
//!
//! Structure-aware retrieval over legal and administrative documents.
//!
//! The engine itself lives in [`lexrag_core`]: chunking by article
//! markers, paragraphs or sliding windows; a bounded query-embedding
//! cache; filtered similarity search with optional keyword boosting; and
//! retrieval quality evaluation. This crate wires it to SQLite, to real
//! embedding providers, and to a CLI and an HTTP server.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐   ┌──────────────┐   ┌───────────┐
//! │ Files/Text  │──▶│ Chunk+Embed  │──▶│  SQLite   │
//! │  (ingest)   │   │ (lexrag-core)│   │ docs+vecs │
//! └─────────────┘   └──────────────┘   └─────┬─────┘
//!                                            │
//!                        ┌───────────────────┤
//!                        ▼                   ▼
//!                   ┌──────────┐       ┌──────────┐
//!                   │   CLI    │       │   HTTP   │
//!                   │ (lexrag) │       │  (axum)  │
//!                   └──────────┘       └──────────┘
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing and validation |
//! | [`logging`] | `tracing` subscriber setup |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema creation |
//! | [`sqlite_store`] | SQLite implementation of the core `Store` trait |
//! | [`embedding`] | Concrete embedding providers |
//! | [`engine`] | Builds the app-level `RagEngine` |
//! | [`ingest`] | File/directory ingestion and reindexing |
//! | [`retrieve`] | `lexrag retrieve` |
//! | [`evaluate`] | `lexrag evaluate` / `lexrag analyze-logs` |
//! | [`get`] | Document lookup and deletion |
//! | [`stats`] | Database statistics |
//! | [`server`] | HTTP server |

pub mod config;
pub mod db;
pub mod embedding;
pub mod engine;
pub mod evaluate;
pub mod get;
pub mod ingest;
pub mod logging;
pub mod migrate;
pub mod retrieve;
pub mod server;
pub mod sqlite_store;
pub mod stats;

pub use lexrag_core;
