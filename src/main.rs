//! # netref CLI (`netref`)
//!
//! Local RFC retrieval, question routing and concept-card compilation.
//!
//! ## Usage
//!
//! ```bash
//! netref --config ./config/netref.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `netref init` | Create the SQLite database and run schema migrations |
//! | `netref index build` | Build the index and persist its manifest |
//! | `netref index verify` | Compare the stored manifest with the live corpus |
//! | `netref route "<query>"` | Show the router decision for a query |
//! | `netref search "<query>"` | Rank RFC sections |
//! | `netref ask "<query>"` | Route a question and answer it |
//! | `netref concept compile <slug>` | Compile one concept card |
//! | `netref concept compile-many <slug>...` | Compile many cards concurrently |
//! | `netref stats` | Index and card store summary |
//!
//! Logs go to stderr and default to `warn`; set `RUST_LOG` to change that.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use netref::concept_cmd::{self, split_list};
use netref::engine::{CompileOptions, Engine};
use netref::progress::ProgressMode;
use netref::{config, index_cmd, migrate, search, stats};
use netref_core::router::RouteContext;

/// netref: retrieval, routing and concept cards over an RFC corpus.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/netref.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "netref",
    about = "Local retrieval and concept-card compilation over an RFC corpus",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/netref.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

/// Operational context attached to a query.
#[derive(clap::Args, Debug, Default)]
struct ContextArgs {
    /// Device vendor, e.g. `cisco`.
    #[arg(long)]
    vendor: Option<String>,
    /// Interface name, e.g. `Gi0/1`.
    #[arg(long = "iface")]
    interface: Option<String>,
    /// Routing area or domain.
    #[arg(long)]
    area: Option<String>,
}

impl From<ContextArgs> for RouteContext {
    fn from(args: ContextArgs) -> Self {
        RouteContext {
            vendor: args.vendor,
            interface: args.interface,
            area: args.area,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema.
    ///
    /// Creates the SQLite database file and the card, manifest and index
    /// manifest tables. Safe to run more than once.
    Init,

    /// Manage the persisted index manifest.
    Index {
        #[command(subcommand)]
        action: IndexAction,
    },

    /// Show how a query would be routed.
    Route {
        query: String,
        #[command(flatten)]
        context: ContextArgs,
    },

    /// Rank RFC sections for a query.
    Search {
        query: String,

        /// Ranking mode: `tfidf`, `bm25`, or `hybrid`. Defaults to `[retrieval].mode`.
        #[arg(long)]
        mode: Option<String>,

        /// Only rank sections of this RFC.
        #[arg(long)]
        rfc: Option<u32>,

        /// Maximum number of results. Defaults to `[retrieval].final_limit`.
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Route a question and answer it with a definition, card, or case.
    Ask {
        query: String,

        /// Print the full response as JSON.
        #[arg(long)]
        json: bool,

        #[command(flatten)]
        context: ContextArgs,
    },

    /// Concept card commands.
    Concept {
        #[command(subcommand)]
        action: ConceptAction,
    },

    /// Show index and card store statistics.
    Stats,
}

#[derive(Subcommand)]
enum IndexAction {
    /// Load the corpus and persist the index manifest.
    Build,
    /// Compare the stored manifest with the live corpus. Exits 1 on mismatch.
    Verify,
    /// Print index statistics.
    Stats,
}

#[derive(Subcommand)]
enum ConceptAction {
    /// Compile one concept card.
    Compile {
        slug: String,

        /// Persist the card and its manifest entry.
        #[arg(long)]
        save: bool,

        /// Also compile each related slug, one level deep.
        #[arg(long)]
        pull: bool,

        /// Related slugs (comma-separated or repeated).
        #[arg(long)]
        related: Vec<String>,

        /// Tags (comma-separated or repeated).
        #[arg(long)]
        tags: Vec<String>,
    },

    /// Compile many concept cards concurrently.
    CompileMany {
        slugs: Vec<String>,

        /// Read additional slugs from a file, one per line.
        #[arg(long)]
        file: Option<PathBuf>,

        #[arg(long)]
        save: bool,

        #[arg(long)]
        pull: bool,

        /// Compiles in flight. Defaults to `[concepts].pool_size`.
        #[arg(long)]
        concurrency: Option<usize>,

        /// Progress output on stderr: `off`, `human`, or `json`.
        /// Defaults to `human` when stderr is a terminal.
        #[arg(long, value_parser = parse_progress)]
        progress: Option<ProgressMode>,
    },

    /// Show a stored card and whether it is stale.
    Get { slug: String },

    /// Diff the stored card against itself or a fresh compile.
    Diff {
        slug: String,

        #[arg(long)]
        recompile: bool,
    },

    /// Report missing links and cycles for a stored card.
    Validate { slug: String },

    /// List tags with card counts.
    Tags,

    /// Search stored cards.
    Search {
        query: String,

        #[arg(long, default_value_t = 10)]
        limit: usize,
    },

    /// List stored cards and the manifest root hash.
    List,

    /// Delete a stored card.
    Delete { slug: String },

    /// Remove orphaned cards and manifest entries.
    Gc,
}

fn parse_progress(s: &str) -> Result<ProgressMode, String> {
    match s {
        "off" => Ok(ProgressMode::Off),
        "human" => Ok(ProgressMode::Human),
        "json" => Ok(ProgressMode::Json),
        other => Err(format!(
            "invalid progress mode '{}': expected off, human, or json",
            other
        )),
    }
}

fn non_empty(values: Vec<String>) -> Option<Vec<String>> {
    let values = split_list(&values);
    (!values.is_empty()).then_some(values)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized successfully.");
        }
        Commands::Index { action } => match action {
            IndexAction::Build => {
                index_cmd::run_build(&cfg).await?;
            }
            IndexAction::Verify => {
                if !index_cmd::run_verify(&cfg).await? {
                    std::process::exit(1);
                }
            }
            IndexAction::Stats => {
                index_cmd::run_stats(&cfg).await?;
            }
        },
        Commands::Route { query, context } => {
            let (engine, _) = Engine::open(&cfg).await?;
            search::run_route(&engine, &query, &context.into()).await?;
        }
        Commands::Search {
            query,
            mode,
            rfc,
            limit,
        } => {
            let (engine, _) = Engine::open(&cfg).await?;
            search::run_search(&engine, &query, mode.as_deref(), rfc, limit)?;
        }
        Commands::Ask {
            query,
            json,
            context,
        } => {
            let (engine, _) = Engine::open(&cfg).await?;
            search::run_ask(&engine, &query, &context.into(), json).await?;
        }
        Commands::Concept { action } => {
            let (engine, _) = Engine::open(&cfg).await?;
            run_concept(&engine, action).await?;
        }
        Commands::Stats => {
            let (engine, store) = Engine::open(&cfg).await?;
            stats::run_stats(&cfg, &engine, &store).await?;
        }
    }

    Ok(())
}

async fn run_concept(engine: &Engine, action: ConceptAction) -> anyhow::Result<()> {
    match action {
        ConceptAction::Compile {
            slug,
            save,
            pull,
            related,
            tags,
        } => {
            let opts = CompileOptions {
                save,
                pull,
                related: non_empty(related),
                tags: non_empty(tags),
            };
            concept_cmd::run_compile(engine, &slug, opts).await
        }
        ConceptAction::CompileMany {
            mut slugs,
            file,
            save,
            pull,
            concurrency,
            progress,
        } => {
            if let Some(path) = file {
                slugs.extend(concept_cmd::read_slug_file(&path)?);
            }
            let opts = CompileOptions {
                save,
                pull,
                ..CompileOptions::default()
            };
            let progress = progress.unwrap_or_else(ProgressMode::default_for_tty);
            concept_cmd::run_compile_many(engine, slugs, opts, concurrency, progress).await
        }
        ConceptAction::Get { slug } => concept_cmd::run_get(engine, &slug).await,
        ConceptAction::Diff { slug, recompile } => {
            concept_cmd::run_diff(engine, &slug, recompile).await
        }
        ConceptAction::Validate { slug } => concept_cmd::run_validate(engine, &slug).await,
        ConceptAction::Tags => concept_cmd::run_tags(engine).await,
        ConceptAction::Search { query, limit } => {
            concept_cmd::run_search(engine, &query, limit).await
        }
        ConceptAction::List => concept_cmd::run_list(engine).await,
        ConceptAction::Delete { slug } => concept_cmd::run_delete(engine, &slug).await,
        ConceptAction::Gc => concept_cmd::run_gc(engine).await,
    }
}
