//! # lexrag CLI
//!
//! The `lexrag` binary ingests documents into a local SQLite index, runs
//! filtered and hybrid retrievals, evaluates retrieval quality, and serves
//! the same operations over HTTP.
//!
//! ## Usage
//!
//! ```bash
//! lexrag --config ./config/lexrag.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `lexrag init` | Create the SQLite database and schema |
//! | `lexrag ingest <path>` | Ingest a file or a directory |
//! | `lexrag ingest-text --text "..."` | Ingest inline text as one document |
//! | `lexrag retrieve "<query>"` | Retrieve the best-matching chunks |
//! | `lexrag get <id>` | Show a document and its chunks |
//! | `lexrag delete <id>` | Delete a document and its chunks |
//! | `lexrag reindex` | Re-chunk and re-embed every stored document |
//! | `lexrag evaluate` | Run canned queries and report quality metrics |
//! | `lexrag analyze-logs` | Inspect recent query/answer logs |
//! | `lexrag stats` | Database overview |
//! | `lexrag serve` | Start the HTTP server |
//!
//! ## Examples
//!
//! ```bash
//! lexrag init
//! lexrag ingest ./corpus --doc-type ley
//! lexrag retrieve "requisitos licencia de conducir" --doc-type ley --hybrid
//! lexrag evaluate --queries-file ./queries.txt --json
//! ```

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use lexrag::retrieve::RetrieveArgs;
use lexrag::{config, evaluate, get, ingest, logging, migrate, retrieve, server, stats};
use lexrag_core::models::DocumentMetadata;

/// lexrag — structure-aware retrieval over legal and administrative text.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/lexrag.example.toml` for a full example.
#[derive(Parser)]
#[command(name = "lexrag", version, about)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/lexrag.toml")]
    config: PathBuf,

    /// Log level filter (overridden by RUST_LOG), e.g. `debug` or `lexrag=trace`.
    #[arg(long = "log-level", global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema.
    ///
    /// Idempotent: running it multiple times is safe.
    Init,

    /// Ingest a file, or every matching file under a directory.
    ///
    /// Directory walks use `[ingest].include_globs` / `exclude_globs`.
    /// A path that was ingested before replaces its previous chunks.
    Ingest {
        /// File or directory to ingest.
        path: PathBuf,

        /// Document type tag applied to every ingested document.
        #[arg(long = "doc-type")]
        doc_type: Option<String>,

        /// Title (single file only; defaults to the file name).
        #[arg(long)]
        title: Option<String>,

        /// Source label (single file only; defaults to the path).
        #[arg(long)]
        source: Option<String>,
    },

    /// Ingest inline text as a new document.
    IngestText {
        /// Document content.
        #[arg(long)]
        text: String,

        #[arg(long = "doc-type")]
        doc_type: Option<String>,

        #[arg(long)]
        title: Option<String>,

        #[arg(long)]
        source: Option<String>,
    },

    /// Retrieve the chunks that best match a query.
    Retrieve(RetrieveArgs),

    /// Show a document and its chunks.
    Get {
        /// Document UUID.
        id: String,

        /// Print as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Delete a document and all of its chunks.
    Delete {
        /// Document UUID.
        id: String,
    },

    /// Re-chunk and re-embed every stored document with the current settings.
    Reindex,

    /// Run evaluation queries and print aggregate retrieval metrics.
    Evaluate {
        /// File with one query per line (`#` starts a comment).
        /// Defaults to `[evaluation].queries`.
        #[arg(long = "queries-file")]
        queries_file: Option<PathBuf>,

        /// Print the report as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Analyze recent query/answer logs for problem patterns.
    AnalyzeLogs {
        /// Number of most recent logs to inspect.
        #[arg(long)]
        sample: Option<usize>,

        /// Only logs created on or after this date (YYYY-MM-DD).
        #[arg(long)]
        since: Option<String>,

        /// Print the analysis as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Show database statistics.
    Stats {
        /// Print as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Start the HTTP server on `[server].bind`.
    Serve,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    logging::init(cli.log_level.as_deref());

    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized successfully.");
        }
        Commands::Ingest {
            path,
            doc_type,
            title,
            source,
        } => {
            let metadata = DocumentMetadata {
                title,
                doc_type,
                source,
            };
            ingest::run_ingest(&cfg, &path, metadata).await?;
        }
        Commands::IngestText {
            text,
            doc_type,
            title,
            source,
        } => {
            let metadata = DocumentMetadata {
                title,
                doc_type,
                source,
            };
            ingest::run_ingest_text(&cfg, &text, metadata).await?;
        }
        Commands::Retrieve(args) => {
            retrieve::run_retrieve(&cfg, &args).await?;
        }
        Commands::Get { id, json } => {
            get::run_get(&cfg, &id, json).await?;
        }
        Commands::Delete { id } => {
            get::run_delete(&cfg, &id).await?;
        }
        Commands::Reindex => {
            ingest::run_reindex(&cfg).await?;
        }
        Commands::Evaluate { queries_file, json } => {
            evaluate::run_evaluate(&cfg, queries_file.as_deref(), json).await?;
        }
        Commands::AnalyzeLogs { sample, since, json } => {
            evaluate::run_analyze_logs(&cfg, sample, since.as_deref(), json).await?;
        }
        Commands::Stats { json } => {
            stats::run_stats(&cfg, json).await?;
        }
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
    }

    Ok(())
}
