//! Inspect configs and exercise a context manager from the shell.
//!
//! # Examples
//!
//! ```sh
//! # Print the config JSON schema
//! tierctx schema > tierctx.schema.json
//!
//! # Validate a config file
//! tierctx check tierctx.json
//!
//! # Ingest files, query, rebalance and print a JSON report
//! tierctx run --config tierctx.json --input notes.md --input build.log \
//!   --query "why did the build fail" --limit 5 --optimize
//!
//! # Use an OpenAI-compatible embeddings endpoint
//! TIERCTX_EMBED_KEY=... tierctx run --input notes.md --query deploy \
//!   --embed-url https://api.openai.com/v1 --embed-model text-embedding-3-small
//! ```

use clap::{Args, Parser, Subcommand};
use futures::future::join_all;
use serde_json::json;
use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;
use tierctx::config::{ContextConfig, config_schema};
use tierctx::manager::ContextManager;
use tierctx::retrieval::embedding::HttpEmbedder;
use tierctx::segment::{CONTENT_TYPE_KEY, Metadata, SegmentId};
use tierctx::segmenter::ParagraphSegmenter;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Tiered context-memory manager.
#[derive(Parser)]
#[command(name = "tierctx", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print the JSON schema of the config file
    Schema,

    /// Validate a config file and print the effective config
    Check {
        /// Path to a JSON config file
        config: PathBuf,
    },

    /// Ingest files, optionally query and optimize, print a JSON report
    Run(RunArgs),
}

#[derive(Args)]
struct RunArgs {
    /// Path to a JSON config file (defaults when omitted)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Files to ingest, one context entry per file
    #[arg(long = "input", required = true)]
    inputs: Vec<PathBuf>,

    /// Query to retrieve relevant segments for
    #[arg(long)]
    query: Option<String>,

    /// Maximum number of retrieved segments
    #[arg(long, default_value_t = tierctx::DEFAULT_RETRIEVAL_LIMIT)]
    limit: usize,

    /// Run optimize() after ingestion and retrieval
    #[arg(long)]
    optimize: bool,

    /// Split at paragraph and sentence boundaries instead of fixed windows
    #[arg(long)]
    paragraphs: bool,

    // ── Embeddings ─────────────────────────────────────────────
    /// Base URL of an OpenAI-compatible embeddings API
    #[arg(long)]
    embed_url: Option<String>,

    /// Embedding model name
    #[arg(long, default_value = "text-embedding-3-small")]
    embed_model: String,
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();
}

fn load_config(path: Option<&Path>) -> Result<ContextConfig, String> {
    match path {
        Some(p) => ContextConfig::from_path(p).map_err(|e| e.to_string()),
        None => Ok(ContextConfig::default()),
    }
}

/// Content type for strategy overrides, taken from the file extension.
fn metadata_for(path: &Path) -> Metadata {
    let mut metadata = Metadata::new();
    metadata.insert("source".into(), path.display().to_string());
    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        metadata.insert(CONTENT_TYPE_KEY.into(), ext.to_ascii_lowercase());
    }
    metadata
}

async fn run(args: RunArgs) -> Result<String, String> {
    let RunArgs {
        config,
        inputs,
        query,
        limit,
        optimize,
        paragraphs,
        embed_url,
        embed_model,
    } = args;
    let config = load_config(config.as_deref())?;
    let mut builder = ContextManager::builder(config);
    if paragraphs {
        builder = builder.with_segmenter(Arc::new(ParagraphSegmenter));
    }
    if let Some(url) = embed_url {
        let mut embedder = HttpEmbedder::new(&url, embed_model).map_err(|e| e.to_string())?;
        if let Ok(key) = std::env::var("TIERCTX_EMBED_KEY") {
            embedder = embedder.with_api_key(key);
        }
        builder = builder.with_embedder(Arc::new(embedder));
    }
    let manager = builder.build().map_err(|e| e.to_string())?;

    // Read every input concurrently; insertion follows command-line order.
    let contents = join_all(inputs.iter().map(|p| tokio::fs::read_to_string(p))).await;
    let mut ingested = Vec::with_capacity(inputs.len());
    for (path, content) in inputs.iter().zip(contents) {
        let content =
            content.map_err(|e| format!("failed to read {}: {e}", path.display()))?;
        let ids: Vec<SegmentId> = manager
            .add_context(&content, metadata_for(path))
            .await
            .map_err(|e| format!("{}: {e}", path.display()))?;
        ingested.push(json!({ "path": path.display().to_string(), "segments": ids }));
    }

    let results: Vec<serde_json::Value> = match &query {
        Some(q) => {
            let hits = manager
                .retrieve_relevant(q, limit)
                .await
                .map_err(|e| e.to_string())?;
            hits.iter()
                .map(|seg| {
                    json!({
                        "id": seg.id,
                        "tier": seg.tier,
                        "tokens": seg.token_count,
                        "relevance": seg.relevance_score,
                        "source": seg.metadata.get("source"),
                        "content": seg.content(),
                    })
                })
                .collect()
        }
        None => Vec::new(),
    };

    let summary = if optimize {
        Some(manager.optimize().await.map_err(|e| e.to_string())?)
    } else {
        None
    };

    let report = json!({
        "ingested": ingested,
        "query": query,
        "results": results,
        "optimization": summary,
        "metrics": manager.get_metrics(),
    });
    serde_json::to_string_pretty(&report).map_err(|e| e.to_string())
}

async fn execute(cli: Cli) -> Result<String, String> {
    match cli.command {
        Command::Schema => {
            serde_json::to_string_pretty(&config_schema()).map_err(|e| e.to_string())
        }
        Command::Check { config } => {
            let config = load_config(Some(&config))?;
            Ok(config.to_json_pretty())
        }
        Command::Run(args) => run(args).await,
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing();

    match execute(cli).await {
        Ok(output) => println!("{output}"),
        Err(e) => {
            eprintln!("Error: {e}");
            process::exit(1);
        }
    }
}
