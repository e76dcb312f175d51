//! Offline corpus ingestion: read `.txt` policies, chunk them, embed, and build the index.

use crate::embedding::EmbeddingClient;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use walkdir::WalkDir;

use super::chunking::document_chunks;
use super::index::{IndexError, LocalIndex};
use super::types::{ChunkingError, DocumentChunk};

/// Errors emitted while ingesting the policy corpus.
#[derive(Debug, Error)]
pub enum IngestError {
    /// Corpus directory does not exist.
    #[error("Policies directory '{0}' does not exist")]
    MissingCorpus(String),
    /// No `.txt` file produced any chunk.
    #[error("No documents found to ingest in '{0}'. Check the folder and file extensions")]
    EmptyCorpus(String),
    /// A policy file could not be read.
    #[error("Failed to read {path}: {source}")]
    Read {
        /// File that failed.
        path: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
    /// Directory traversal failed.
    #[error("Failed to scan policies directory: {0}")]
    Walk(#[from] walkdir::Error),
    /// Window parameters were rejected.
    #[error("Failed to chunk document: {0}")]
    Chunking(#[from] ChunkingError),
    /// Building or saving the index failed.
    #[error("Failed to build index: {0}")]
    Index(#[from] IndexError),
}

/// Counters reported after a successful ingestion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IngestOutcome {
    /// Number of policy files that produced chunks.
    pub documents: usize,
    /// Files skipped because they produced no chunks.
    pub skipped: usize,
    /// Total chunks written to the index.
    pub chunks: usize,
}

/// List the `.txt` files directly under `dir`, sorted by file name.
pub fn policy_files(dir: &Path) -> Result<Vec<PathBuf>, IngestError> {
    if !dir.is_dir() {
        return Err(IngestError::MissingCorpus(dir.display().to_string()));
    }

    let mut files = Vec::new();
    for entry in WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name()
    {
        let entry = entry?;
        let is_text = entry
            .path()
            .extension()
            .is_some_and(|extension| extension == "txt");
        if entry.file_type().is_file() && is_text {
            files.push(entry.into_path());
        }
    }
    Ok(files)
}

/// Chunk every policy file under `dir`.
///
/// Files without any non-blank window are skipped with a warning. Returns the chunks and the
/// number of skipped files.
pub fn collect_chunks(
    dir: &Path,
    chunk_size: usize,
    overlap: usize,
) -> Result<(Vec<DocumentChunk>, usize), IngestError> {
    let mut chunks = Vec::new();
    let mut skipped = 0;

    for path in policy_files(dir)? {
        let source = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        let text = std::fs::read_to_string(&path).map_err(|source| IngestError::Read {
            path: path.display().to_string(),
            source,
        })?;

        let document = document_chunks(&source, &text, chunk_size, overlap)?;
        if document.is_empty() {
            tracing::warn!(file = %source, "No chunks generated for file");
            skipped += 1;
            continue;
        }
        tracing::debug!(file = %source, chunks = document.len(), "Chunked policy document");
        chunks.extend(document);
    }

    if chunks.is_empty() {
        return Err(IngestError::EmptyCorpus(dir.display().to_string()));
    }
    Ok((chunks, skipped))
}

/// Chunk, embed and persist the corpus in `policies_dir` into `index_dir`.
pub async fn ingest(
    policies_dir: &Path,
    index_dir: &Path,
    chunk_size: usize,
    overlap: usize,
    embedder: Arc<dyn EmbeddingClient>,
) -> Result<IngestOutcome, IngestError> {
    tracing::info!(
        policies_dir = %policies_dir.display(),
        chunk_size,
        overlap,
        "Ingesting policy corpus"
    );
    let (chunks, skipped) = collect_chunks(policies_dir, chunk_size, overlap)?;
    let documents = {
        let mut sources: Vec<&str> = chunks.iter().map(|chunk| chunk.source.as_str()).collect();
        sources.dedup();
        sources.len()
    };
    let chunk_count = chunks.len();

    let mut index = LocalIndex::build(chunks, embedder).await?;
    index.save(index_dir)?;

    tracing::info!(
        documents,
        skipped,
        chunks = chunk_count,
        index_dir = %index_dir.display(),
        "Ingestion complete"
    );
    Ok(IngestOutcome {
        documents,
        skipped,
        chunks: chunk_count,
    })
}
