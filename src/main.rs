//! # RFP Harness CLI (`rfp`)
//!
//! The `rfp` binary ingests reference documents, searches them, drafts
//! RFPs and RFIs, and starts the HTTP API.
//!
//! ## Usage
//!
//! ```bash
//! rfp --config ./config/rfp.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `rfp init` | Connect the vector store and prepare the collection |
//! | `rfp ingest all` | Ingest every matching file in the source directory |
//! | `rfp ingest file <name>` | Ingest (or re-ingest) a single file |
//! | `rfp clear` | Delete every stored document |
//! | `rfp search "<query>"` | Semantic search with optional filters |
//! | `rfp similar <id>` | Documents similar to a stored one |
//! | `rfp suggest <partial>` | Autocomplete suggestions |
//! | `rfp stats` | Document counts by industry |
//! | `rfp get <id>` | Print a stored document |
//! | `rfp generate --input <json>` | Draft an RFP (or RFI) |
//! | `rfp validate <file>` | Check a document for required sections |
//! | `rfp serve` | Start the HTTP API |
//!
//! Logs go to stderr; set `RUST_LOG` to adjust verbosity.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use rfp_harness::models::SearchFilters;
use rfp_harness::{compliance, config, generate, ingest, search, server, store};

/// RFP Harness CLI: retrieval-augmented authoring for procurement documents.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/rfp.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "rfp",
    about = "RFP Harness: ingest, search, and draft government procurement documents",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/rfp.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Connect the vector store and create the collection if needed.
    Init,

    /// Ingest reference documents.
    Ingest {
        #[command(subcommand)]
        action: IngestAction,
    },

    /// Delete every stored document.
    Clear,

    /// Search stored documents.
    ///
    /// Falls back to curated sample results when the store is unavailable.
    Search {
        /// The search query string.
        query: String,

        /// Only return documents from this industry.
        #[arg(long)]
        industry: Option<String>,

        /// Only return documents of this project type.
        #[arg(long)]
        project_type: Option<String>,

        /// Only return documents of this type (RFP, RFI, ...).
        #[arg(long)]
        document_type: Option<String>,

        /// Maximum number of results to return.
        #[arg(long)]
        limit: Option<usize>,
    },

    /// List documents similar to a stored one (by file name or id).
    Similar {
        document_id: String,

        #[arg(long)]
        limit: Option<usize>,
    },

    /// Autocomplete suggestions for a partial query.
    Suggest {
        partial: String,

        #[arg(long, default_value_t = 5)]
        limit: usize,
    },

    /// Show document counts by industry.
    Stats,

    /// Print a stored document by file name or id.
    Get { document_id: String },

    /// Draft an RFP from a JSON request file.
    ///
    /// The document is printed to stdout; a one-line summary goes to stderr.
    Generate {
        /// Path to a JSON generation request.
        #[arg(long)]
        input: PathBuf,

        /// Produce an RFI instead of an RFP.
        #[arg(long)]
        rfi: bool,

        /// Use a stored document as the leading reference.
        #[arg(long)]
        template: Option<String>,
    },

    /// Check a document for the required solicitation sections.
    ///
    /// Exits non-zero when any section is missing.
    Validate { file: PathBuf },

    /// Start the HTTP API on `[server].bind`.
    Serve,
}

#[derive(Subcommand)]
enum IngestAction {
    /// Ingest every matching file in a directory.
    All {
        /// Source directory. Defaults to `[ingestion].source_dir`.
        #[arg(long)]
        dir: Option<PathBuf>,
    },
    /// Ingest a single file, replacing any earlier copy.
    File {
        name: String,

        #[arg(long)]
        dir: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    // Validation needs no store, so it runs without a config file.
    if let Commands::Validate { file } = &cli.command {
        return compliance::run_validate(file);
    }

    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            store::run_init(&cfg).await?;
        }
        Commands::Ingest { action } => match action {
            IngestAction::All { dir } => {
                ingest::run_ingest_all(&cfg, dir.as_deref()).await?;
            }
            IngestAction::File { name, dir } => {
                ingest::run_ingest_file(&cfg, &name, dir.as_deref()).await?;
            }
        },
        Commands::Clear => {
            ingest::run_clear(&cfg).await?;
        }
        Commands::Search {
            query,
            industry,
            project_type,
            document_type,
            limit,
        } => {
            let filters = SearchFilters {
                industry,
                project_type,
                document_type,
            };
            search::run_search(&cfg, &query, &filters, limit).await?;
        }
        Commands::Similar { document_id, limit } => {
            search::run_similar(&cfg, &document_id, limit).await?;
        }
        Commands::Suggest { partial, limit } => {
            search::run_suggest(&cfg, &partial, limit).await?;
        }
        Commands::Stats => {
            search::run_stats(&cfg).await?;
        }
        Commands::Get { document_id } => {
            search::run_get(&cfg, &document_id).await?;
        }
        Commands::Generate {
            input,
            rfi,
            template,
        } => {
            generate::run_generate(&cfg, &input, rfi, template.as_deref()).await?;
        }
        Commands::Validate { .. } => {
            // Handled above (before config loading)
            unreachable!()
        }
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
    }

    Ok(())
}
