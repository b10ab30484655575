//! # notebook-rag CLI (`nbr`)
//!
//! Hybrid retrieval and RAG context building over a personal notes corpus.
//!
//! ## Usage
//!
//! ```bash
//! nbr --config ./config/nbr.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `nbr search "<query>"` | Semantic or hybrid search |
//! | `nbr ask "<question>"` | Build a RAG context with citations |
//! | `nbr expand "<query>"` | Show the synonym-expanded query |
//! | `nbr chunk <id>` | Show how a note is chunked |
//! | `nbr serve` | Start the HTTP API |
//!
//! ## Examples
//!
//! ```bash
//! # Hybrid search within one notebook
//! nbr search "ownership rules" --notebook work
//!
//! # Semantic-only search
//! nbr search "memory safety" --mode semantic --limit 3
//!
//! # RAG context plus the system prompt for a model
//! nbr ask "how does rust manage memory?" --prompt
//! ```

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use notebook_rag::rag::{RagOptions, RagService};
use notebook_rag::{commands, config, server};

/// notebook-rag: hybrid retrieval and RAG context building for notes.
#[derive(Parser)]
#[command(name = "nbr", version, about)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/nbr.toml")]
    config: PathBuf,

    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Search notes.
    Search {
        /// Search query text.
        query: String,

        /// Search mode: `semantic` or `hybrid`.
        #[arg(long, default_value = "hybrid")]
        mode: String,

        /// Restrict results to one notebook.
        #[arg(long)]
        notebook: Option<String>,

        /// Maximum number of results (defaults to `retrieval.top_k`).
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Build a citation-annotated context for a question.
    Ask {
        question: String,

        #[arg(long)]
        notebook: Option<String>,

        #[arg(long)]
        limit: Option<usize>,

        /// Semantic retrieval only.
        #[arg(long)]
        no_hybrid: bool,

        /// Use whole notes instead of their most relevant paragraphs.
        #[arg(long)]
        no_chunking: bool,

        /// Also print the system prompt for a downstream model.
        #[arg(long)]
        prompt: bool,
    },

    /// Show the synonym-expanded form of a query. Needs no config.
    Expand { query: String },

    /// Show how a note is chunked for embedding.
    Chunk { id: String },

    /// Start the HTTP API on `[server].bind`.
    Serve,
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_json);

    // Commands that don't require config
    if let Commands::Expand { query } = &cli.command {
        commands::run_expand(query);
        return Ok(());
    }

    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Search {
            query,
            mode,
            notebook,
            limit,
        } => {
            commands::run_search(cfg, &query, &mode, notebook, limit).await?;
        }
        Commands::Ask {
            question,
            notebook,
            limit,
            no_hybrid,
            no_chunking,
            prompt,
        } => {
            let options = RagOptions {
                use_hybrid: cfg.retrieval.use_hybrid && !no_hybrid,
                use_chunking: cfg.retrieval.use_chunking && !no_chunking,
            };
            commands::run_ask(cfg, &question, notebook, limit, options, prompt).await?;
        }
        Commands::Chunk { id } => {
            commands::run_chunk(&cfg, &id)?;
        }
        Commands::Serve => {
            let rag = RagService::open(cfg).await?;
            server::run_server(Arc::new(rag)).await?;
        }
        Commands::Expand { .. } => {}
    }

    Ok(())
}
