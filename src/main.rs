//! # Strategy Router CLI (`router`)
//!
//! Inspect and exercise strategy detection against live knowledge bases.
//!
//! ## Usage
//!
//! ```bash
//! router --config ./config/router.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `router detect "<query>"` | Pick a strategy for a query |
//! | `router strategies` | List configured strategies |
//! | `router sources` | Health of each configured knowledge base |
//! | `router collections <kb>` | Collections and their routing metadata |
//! | `router check` | Validate the configuration |
//!
//! ## Examples
//!
//! ```bash
//! # Route a query against two selected collections
//! router detect "how do I serve a model?" \
//!     --collection docs:openshift-ai-docs --collection docs:openshift-docs
//!
//! # Include prior turns for the intent classifier, print JSON
//! router detect "thanks!" --history ./history.json --json
//!
//! # Verbose stage decisions
//! RUST_LOG=strategy_router_core=debug router detect "hello"
//! ```

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use strategy_router::{config, detect, logging, sources};

/// Strategy Router CLI: strategy detection for RAG + LLM chat.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/router.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "router",
    about = "Strategy Router: pick a retrieval, intent, or default strategy for each chat turn",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/router.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Detect the strategy for a query.
    ///
    /// Runs the full pipeline: selected collections, configured rag
    /// strategies, the intent classifier, and the default fallback.
    Detect {
        /// The user's message.
        query: String,

        /// Selected collection as `<knowledge_base>:<collection>`. Repeatable;
        /// queried in the order given.
        #[arg(long = "collection")]
        collections: Vec<String>,

        /// JSON file with prior turns: `[{ "role": "user", "content": "..." }]`.
        #[arg(long)]
        history: Option<PathBuf>,

        /// Print the detection as JSON.
        #[arg(long)]
        json: bool,
    },

    /// List configured strategies in evaluation order.
    Strategies,

    /// Show the health of each configured knowledge base.
    Sources,

    /// List the collections of a knowledge base.
    Collections {
        /// Knowledge base name from `[knowledge_bases.<name>]`.
        knowledge_base: String,
    },

    /// Validate the configuration and exit.
    Check,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let cfg = config::load_config(&cli.config)?;
    logging::init_logging(&cfg.logging);

    match cli.command {
        Commands::Detect {
            query,
            collections,
            history,
            json,
        } => {
            detect::run_detect(&cfg, &query, &collections, history.as_deref(), json).await?;
        }
        Commands::Strategies => {
            sources::list_strategies(&cfg)?;
        }
        Commands::Sources => {
            sources::list_sources(&cfg).await?;
        }
        Commands::Collections { knowledge_base } => {
            sources::list_collections(&cfg, &knowledge_base).await?;
        }
        Commands::Check => {
            println!(
                "Configuration OK: {} strategies, {} knowledge bases, classifier {}",
                cfg.strategies.len(),
                cfg.knowledge_bases.len(),
                cfg.classifier.provider
            );
        }
    }

    Ok(())
}
