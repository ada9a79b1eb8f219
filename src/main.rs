//! # docqa CLI
//!
//! The `docqa` binary drives the whole pipeline: PDF extraction, indexing,
//! retrieval, one-shot and interactive question answering, and the HTTP API.
//!
//! ## Usage
//!
//! ```bash
//! docqa --config ./config/docqa.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `docqa init` | Create directories, an example config, and the index database |
//! | `docqa extract` | Convert every PDF in the inbox to normalized text |
//! | `docqa index [--rebuild]` | Build (or replace) the vector index |
//! | `docqa query "<text>"` | Show the most similar chunks without generating |
//! | `docqa ask "<question>"` | Answer a single question |
//! | `docqa chat [--resume <file>]` | Interactive session with ratings and export |
//! | `docqa stats` | Index and feedback overview |
//! | `docqa serve` | Start the JSON HTTP API |
//!
//! ## Examples
//!
//! ```bash
//! # First run
//! docqa init
//! cp manuals/*.pdf pdfs/
//! docqa extract && docqa index
//!
//! # Retrieval only, more results
//! docqa query "torque settings" --k 8
//!
//! # Ask with a named profile from the config
//! docqa --profile precise ask "What is the maximum operating pressure?"
//!
//! # Continue an exported conversation
//! docqa chat --resume exports/chat_history_20240501_120000.json
//! ```

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use docqa::{commands, config, logging, server, stats};

const DEFAULT_CONFIG: &str = "./config/docqa.toml";

/// docqa: ask questions about your documents.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/docqa.example.toml` for every option.
#[derive(Parser)]
#[command(
    name = "docqa",
    about = "docqa: a local-first document question-answering assistant",
    version,
    long_about = "docqa extracts text from PDFs, splits it into overlapping chunks, embeds them \
    into a local vector index, and answers questions conversationally with a language model, \
    citing the chunks each answer was grounded on."
)]
struct Cli {
    /// Path to configuration file (TOML).
    ///
    /// Defaults to `./config/docqa.toml`. If that default file does not
    /// exist, built-in defaults are used.
    #[arg(long, global = true, default_value = DEFAULT_CONFIG)]
    config: PathBuf,

    /// Apply a named `[profiles.<name>]` section on top of the config.
    #[arg(long, global = true)]
    profile: Option<String>,

    /// Log at debug level (overridden by `RUST_LOG`).
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// Create the directory layout, an example config, and the index database.
    ///
    /// Idempotent: existing files are left untouched.
    Init,

    /// Extract text from every PDF in `[paths].pdf_dir`.
    ///
    /// Writes one normalized `.txt` per PDF into `[paths].text_dir`. A PDF
    /// that cannot be parsed is reported and skipped.
    Extract,

    /// Chunk and embed the text directory into the vector index.
    ///
    /// Without `--rebuild` an existing index is kept as is.
    Index {
        /// Replace the existing index with a fresh build.
        #[arg(long)]
        rebuild: bool,
    },

    /// Show the chunks most similar to a piece of text.
    Query {
        /// Text to search for.
        text: String,

        /// Number of results (defaults to `[retrieval].k`).
        #[arg(long)]
        k: Option<usize>,
    },

    /// Answer a single question and print its sources.
    Ask {
        /// The question.
        question: String,
    },

    /// Start an interactive question-answering session.
    ///
    /// Type `help` inside the session for its commands.
    Chat {
        /// Seed the session with a previously exported conversation.
        #[arg(long)]
        resume: Option<PathBuf>,
    },

    /// Show index and feedback statistics.
    Stats,

    /// Start the JSON HTTP API on `[server].bind`.
    Serve,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // `init` writes the config, so a missing file is expected there
    let tolerate_missing =
        cli.config == PathBuf::from(DEFAULT_CONFIG) || matches!(cli.command, Commands::Init);
    let base = if tolerate_missing && !cli.config.exists() {
        config::Config::default()
    } else {
        config::load_config(&cli.config)?
    };
    let cfg = match &cli.profile {
        Some(name) => base.with_profile(name)?,
        None => base,
    };

    cfg.ensure_directories()?;
    let log_path = logging::init(&cfg.paths.logs_dir, cli.verbose)?;
    tracing::debug!(log = %log_path.display(), config = %cli.config.display(), "starting");

    match cli.command {
        Commands::Init => {
            commands::run_init(&cfg, &cli.config).await?;
        }
        Commands::Extract => {
            commands::run_extract(&cfg)?;
        }
        Commands::Index { rebuild } => {
            commands::run_index(&cfg, rebuild).await?;
        }
        Commands::Query { text, k } => {
            commands::run_query(&cfg, &text, k).await?;
        }
        Commands::Ask { question } => {
            commands::run_ask(&cfg, &question).await?;
        }
        Commands::Chat { resume } => {
            commands::run_chat(&cfg, resume.as_deref()).await?;
        }
        Commands::Stats => {
            stats::run_stats(&cfg).await?;
        }
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
    }

    Ok(())
}
