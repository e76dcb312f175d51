use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use policy_assistant::{config, embedding::get_embedding_client, logging, rag};

#[derive(Parser)]
#[command(
    name = "policy-ingest",
    about = "Chunk, embed and index the policy corpus for the policy assistant"
)]
struct Cli {
    /// Directory of `.txt` policy documents (defaults to POLICIES_DIR).
    #[arg(long)]
    policies_dir: Option<PathBuf>,
    /// Output directory for the index (defaults to INDEX_DIR).
    #[arg(long)]
    index_dir: Option<PathBuf>,
    /// Window size in characters (defaults to CHUNK_SIZE).
    #[arg(long)]
    chunk_size: Option<usize>,
    /// Overlap between windows in characters (defaults to CHUNK_OVERLAP).
    #[arg(long)]
    chunk_overlap: Option<usize>,
}

#[tokio::main]
async fn main() {
    if let Err(err) = run().await {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();
    let config = config::load().context("failed to load configuration")?;
    logging::init_tracing();

    let policies_dir = cli
        .policies_dir
        .unwrap_or_else(|| config.policies_dir.clone());
    let index_dir = cli.index_dir.unwrap_or_else(|| config.index_dir.clone());
    let chunk_size = cli.chunk_size.unwrap_or(config.chunk_size);
    let chunk_overlap = cli.chunk_overlap.unwrap_or(config.chunk_overlap);

    let embedder = get_embedding_client(&config).context("failed to build embedding client")?;
    let outcome = rag::ingest(
        &policies_dir,
        &index_dir,
        chunk_size,
        chunk_overlap,
        embedder,
    )
    .await
        .with_context(|| format!("failed to ingest {}", policies_dir.display()))?;

    println!(
        "Indexed {} chunks from {} documents ({} skipped) into {}",
        outcome.chunks,
        outcome.documents,
        outcome.skipped,
        index_dir.display()
    );
    Ok(())
}
