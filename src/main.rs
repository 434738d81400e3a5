//! # ragline CLI
//!
//! The `ragline` binary drives the library for local use: database
//! initialization, corpus seeding, document indexing, and queries.
//!
//! ## Usage
//!
//! ```bash
//! ragline --config ./config/ragline.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `ragline init` | Create the SQLite store and pin the embedding dimension |
//! | `ragline seed` | Index the starter corpus into an empty store |
//! | `ragline index <file>` | Embed and write documents from a JSON or PDF file |
//! | `ragline query "<question>"` | Run the query pipeline and print the reply |
//! | `ragline count` | Print the number of stored documents |

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

use ragline::config::{load_config, Config};
use ragline::document::Document;
use ragline::embedding::{create_client, EmbeddingClient};
use ragline::generator::{CompletionClient, HttpCompletionClient};
use ragline::loader;
use ragline::rag::{build_indexing_pipeline, index_with, Rag};
use ragline::store::{DedupPolicy, VectorStore};

/// ragline: a dataflow RAG pipeline engine with a vector-backed
/// document store.
#[derive(Parser)]
#[command(
    name = "ragline",
    about = "A dataflow RAG pipeline engine with a vector-backed document store",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/ragline.toml")]
    config: PathBuf,

    /// Enable debug logging.
    #[arg(long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the SQLite store and pin the embedding dimension.
    ///
    /// Idempotent: running it multiple times is safe, but reopening a
    /// store with a different configured dimension fails.
    Init,

    /// Index the built-in starter corpus, only if the store is empty.
    Seed,

    /// Embed and write documents from a file.
    ///
    /// `.json` files hold an array of `{id, content, metadata}` objects;
    /// `.pdf` files become one document per page, split when oversized.
    Index {
        /// Path to a `.json` or `.pdf` file.
        file: PathBuf,

        /// Dedup policy: `skip`, `overwrite`, or `fail`.
        /// Defaults to `store.write_policy` from config.
        #[arg(long)]
        policy: Option<String>,

        /// Split documents longer than this many characters.
        #[arg(long, default_value_t = 800)]
        split_chars: usize,

        /// Characters of overlap between split pieces.
        #[arg(long, default_value_t = 80)]
        overlap_chars: usize,
    },

    /// Run the query pipeline and print the generated reply.
    Query {
        /// The question to answer.
        question: String,

        /// Number of documents to retrieve (defaults to `retrieval.top_k`).
        #[arg(long)]
        top_k: Option<usize>,
    },

    /// Print the number of stored documents.
    Count,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("failed to set tracing subscriber")?;

    let config = load_config(&cli.config)
        .with_context(|| format!("failed to load config from {}", cli.config.display()))?;

    match cli.command {
        Commands::Init => {
            let store = VectorStore::connect(&config.store).await?;
            println!("store initialized (dimension: {})", store.dimension());
        }

        Commands::Seed => {
            let rag = build_rag(&config).await?;
            let written = rag.seed_if_empty().await?;
            if written == 0 {
                println!("store already has content, nothing seeded");
            } else {
                println!("seeded {} documents", written);
            }
        }

        Commands::Index {
            file,
            policy,
            split_chars,
            overlap_chars,
        } => {
            let policy = match policy.as_deref() {
                None => config.store.write_policy,
                Some("skip") => DedupPolicy::Skip,
                Some("overwrite") => DedupPolicy::Overwrite,
                Some("fail") => DedupPolicy::Fail,
                Some(other) => bail!(
                    "unknown policy: {}. Use skip, overwrite, or fail.",
                    other
                ),
            };

            let docs = load_file(&file, split_chars, overlap_chars)?;
            if docs.is_empty() {
                println!("no documents found in {}", file.display());
                return Ok(());
            }
            let total = docs.len();

            let store = Arc::new(VectorStore::connect(&config.store).await?);
            let embedder: Arc<dyn EmbeddingClient> =
                Arc::new(create_client(&config.embedding, config.store.dimension)?);
            let pipeline = build_indexing_pipeline(store, embedder, policy)?;
            let written = index_with(&pipeline, docs).await?;

            println!("indexed {} of {} documents", written, total);
        }

        Commands::Query { question, top_k } => {
            let rag = build_rag(&config).await?;
            let reply = rag.answer(&question, top_k).await?;
            println!("{}", reply);
        }

        Commands::Count => {
            let store = VectorStore::connect(&config.store).await?;
            println!("{}", store.count_documents().await?);
        }
    }

    Ok(())
}

async fn build_rag(config: &Config) -> Result<Rag> {
    let store = Arc::new(VectorStore::connect(&config.store).await?);
    let embedder: Arc<dyn EmbeddingClient> =
        Arc::new(create_client(&config.embedding, config.store.dimension)?);
    let completer: Arc<dyn CompletionClient> =
        Arc::new(HttpCompletionClient::new(&config.generation)?);
    Ok(Rag::new(store, embedder, completer, config)?)
}

fn load_file(file: &PathBuf, split_chars: usize, overlap_chars: usize) -> Result<Vec<Document>> {
    match file.extension().and_then(|e| e.to_str()) {
        Some("json") => {
            let content = std::fs::read_to_string(file)
                .with_context(|| format!("failed to read {}", file.display()))?;
            let docs: Vec<Document> = serde_json::from_str(&content)
                .with_context(|| format!("failed to parse {}", file.display()))?;
            Ok(docs)
        }
        Some("pdf") => {
            let pages = loader::load_pdf(file)?;
            Ok(loader::split_documents(&pages, split_chars, overlap_chars))
        }
        _ => bail!("unsupported file type: {}. Use .json or .pdf.", file.display()),
    }
}
