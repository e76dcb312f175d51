//! File-backed embedding index.
//!
//! An index directory holds two files:
//!
//! - `chunks.json` – every [`DocumentChunk`] with its embedding vector, in ingestion order.
//! - `manifest.json` – embedding model, vector dimension, chunk count, build time and the
//!   SHA-256 of `chunks.json`.
//!
//! [`LocalIndex::load`] refuses directories whose files are missing, whose checksum does not
//! match, or whose vectors were produced by a different embedding model than the one the
//! process is configured with. Queries are exhaustive cosine-similarity scans.

use crate::embedding::{EmbeddingClient, EmbeddingClientError};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use time::{OffsetDateTime, format_description::well_known::Rfc3339};

use super::types::{ChunkMetadata, DocumentChunk, SearchHit};

const MANIFEST_FILE: &str = "manifest.json";
const CHUNKS_FILE: &str = "chunks.json";
const EMBEDDING_BATCH_SIZE: usize = 64;

/// Errors raised while loading, saving or querying the index.
#[derive(Debug, Error)]
pub enum IndexError {
    /// Index directory does not exist.
    #[error("Index directory not found at {0}. Run ingestion first: policy-ingest")]
    MissingDirectory(String),
    /// A file inside the index directory could not be read or written.
    #[error("Index I/O failed for {path}: {source}")]
    Io {
        /// File that failed.
        path: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
    /// Index contents are unreadable or inconsistent.
    #[error("Index at {path} is corrupt: {reason}")]
    Corrupt {
        /// Index directory.
        path: String,
        /// Human readable description of the inconsistency.
        reason: String,
    },
    /// Index was built with another embedding model.
    #[error("Index was built with embedding model '{indexed}' but '{configured}' is configured")]
    ModelMismatch {
        /// Model recorded in the manifest.
        indexed: String,
        /// Model the process is configured with.
        configured: String,
    },
    /// Query embedding does not match the stored vectors.
    #[error("Embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch {
        /// Dimension of the stored vectors.
        expected: usize,
        /// Dimension of the query embedding.
        actual: usize,
    },
    /// No chunks were supplied to build an index.
    #[error("Cannot build an index without chunks")]
    Empty,
    /// Embedding provider failed.
    #[error(transparent)]
    Embedding(#[from] EmbeddingClientError),
}

/// Nearest-neighbour lookup over stored chunks.
#[async_trait]
pub trait SimilaritySearch: Send + Sync {
    /// Return up to `k` chunks most similar to `query`, best match first.
    async fn similarity_search(
        &self,
        query: &str,
        k: usize,
    ) -> Result<Vec<SearchHit>, IndexError>;
}

/// Summary persisted next to the stored vectors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexManifest {
    /// Embedding model that produced the vectors.
    pub embedding_model: String,
    /// Dimension shared by every stored vector.
    pub dimension: usize,
    /// Number of stored chunks.
    pub chunk_count: usize,
    /// RFC3339 build timestamp.
    pub built_at: String,
    /// Hex SHA-256 of `chunks.json`.
    pub chunks_sha256: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct IndexEntry {
    #[serde(flatten)]
    chunk: DocumentChunk,
    vector: Vec<f32>,
    #[serde(skip)]
    norm: f32,
}

/// In-memory index handle shared read-only by all requests.
pub struct LocalIndex {
    manifest: IndexManifest,
    entries: Vec<IndexEntry>,
    embedder: Arc<dyn EmbeddingClient>,
}

impl LocalIndex {
    /// Embed `chunks` in batches and build an index in memory.
    pub async fn build(
        chunks: Vec<DocumentChunk>,
        embedder: Arc<dyn EmbeddingClient>,
    ) -> Result<Self, IndexError> {
        if chunks.is_empty() {
            return Err(IndexError::Empty);
        }

        let mut entries = Vec::with_capacity(chunks.len());
        for batch in chunks.chunks(EMBEDDING_BATCH_SIZE) {
            let texts = batch.iter().map(|chunk| chunk.text.clone()).collect();
            let vectors = embedder.generate_embeddings(texts).await?;
            if vectors.len() != batch.len() {
                return Err(IndexError::Corrupt {
                    path: "<memory>".into(),
                    reason: format!(
                        "embedding provider returned {} vectors for {} chunks",
                        vectors.len(),
                        batch.len()
                    ),
                });
            }
            tracing::debug!(
                embedded = entries.len() + batch.len(),
                total = chunks.len(),
                "Embedded batch"
            );
            entries.extend(
                batch
                    .iter()
                    .cloned()
                    .zip(vectors)
                    .map(|(chunk, vector)| IndexEntry::new(chunk, vector)),
            );
        }

        let dimension = entries.first().map_or(0, |entry| entry.vector.len());
        if dimension == 0 || entries.iter().any(|entry| entry.vector.len() != dimension) {
            return Err(IndexError::Corrupt {
                path: "<memory>".into(),
                reason: "embedding provider returned vectors of inconsistent dimension".into(),
            });
        }

        let built_at = OffsetDateTime::now_utc()
            .format(&Rfc3339)
            .unwrap_or_default();
        let manifest = IndexManifest {
            embedding_model: embedder.model().to_string(),
            dimension,
            chunk_count: entries.len(),
            built_at,
            chunks_sha256: String::new(),
        };

        Ok(Self {
            manifest,
            entries,
            embedder,
        })
    }

    /// Load a previously saved index from `dir`.
    pub fn load(dir: &Path, embedder: Arc<dyn EmbeddingClient>) -> Result<Self, IndexError> {
        if !dir.is_dir() {
            return Err(IndexError::MissingDirectory(dir.display().to_string()));
        }

        let manifest_bytes = read_file(&dir.join(MANIFEST_FILE))?;
        let manifest: IndexManifest =
            serde_json::from_slice(&manifest_bytes).map_err(|error| corrupt(dir, error))?;
        let chunk_bytes = read_file(&dir.join(CHUNKS_FILE))?;

        let digest = sha256_hex(&chunk_bytes);
        if digest != manifest.chunks_sha256 {
            return Err(corrupt(dir, "chunks.json checksum does not match manifest"));
        }

        let mut entries: Vec<IndexEntry> =
            serde_json::from_slice(&chunk_bytes).map_err(|error| corrupt(dir, error))?;
        if entries.len() != manifest.chunk_count {
            return Err(corrupt(
                dir,
                format!(
                    "manifest lists {} chunks but {} are stored",
                    manifest.chunk_count,
                    entries.len()
                ),
            ));
        }
        if entries
            .iter()
            .any(|entry| entry.vector.len() != manifest.dimension)
        {
            return Err(corrupt(dir, "stored vector dimension differs from manifest"));
        }
        if manifest.embedding_model != embedder.model() {
            return Err(IndexError::ModelMismatch {
                indexed: manifest.embedding_model,
                configured: embedder.model().to_string(),
            });
        }

        for entry in &mut entries {
            entry.norm = l2_norm(&entry.vector);
        }

        tracing::info!(
            path = %dir.display(),
            chunks = manifest.chunk_count,
            dimension = manifest.dimension,
            model = %manifest.embedding_model,
            built_at = %manifest.built_at,
            "Index loaded"
        );

        Ok(Self {
            manifest,
            entries,
            embedder,
        })
    }

    /// Persist the index to `dir`, creating it when needed.
    ///
    /// Each file is written to a temporary sibling and renamed into place.
    pub fn save(&mut self, dir: &Path) -> Result<(), IndexError> {
        fs::create_dir_all(dir).map_err(|source| io_error(dir, source))?;

        let chunk_bytes = serde_json::to_vec(&self.entries).map_err(|error| corrupt(dir, error))?;
        self.manifest.chunks_sha256 = sha256_hex(&chunk_bytes);
        let manifest_bytes =
            serde_json::to_vec_pretty(&self.manifest).map_err(|error| corrupt(dir, error))?;

        write_atomic(&dir.join(CHUNKS_FILE), &chunk_bytes)?;
        write_atomic(&dir.join(MANIFEST_FILE), &manifest_bytes)?;

        tracing::info!(
            path = %dir.display(),
            chunks = self.manifest.chunk_count,
            "Index saved"
        );
        Ok(())
    }

    /// Manifest describing the loaded or built index.
    pub fn manifest(&self) -> &IndexManifest {
        &self.manifest
    }

    /// Number of stored chunks.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the index holds no chunks.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn rank(&self, query: &[f32], k: usize) -> Result<Vec<SearchHit>, IndexError> {
        if query.len() != self.manifest.dimension {
            return Err(IndexError::DimensionMismatch {
                expected: self.manifest.dimension,
                actual: query.len(),
            });
        }

        let query_norm = l2_norm(query);
        let mut scored: Vec<(usize, f32)> = self
            .entries
            .iter()
            .enumerate()
            .map(|(position, entry)| {
                let score = cosine_similarity(query, &entry.vector, query_norm, entry.norm);
                (position, score)
            })
            .collect();
        // Stable sort keeps ingestion order between equal scores.
        scored.sort_by(|left, right| right.1.total_cmp(&left.1));

        Ok(scored
            .into_iter()
            .take(k)
            .map(|(position, _)| {
                let chunk = &self.entries[position].chunk;
                SearchHit {
                    text: chunk.text.clone(),
                    metadata: ChunkMetadata {
                        source: chunk.source.clone(),
                        chunk_index: chunk.chunk_index,
                    },
                }
            })
            .collect())
    }
}

#[async_trait]
impl SimilaritySearch for LocalIndex {
    async fn similarity_search(
        &self,
        query: &str,
        k: usize,
    ) -> Result<Vec<SearchHit>, IndexError> {
        let mut vectors = self
            .embedder
            .generate_embeddings(vec![query.to_string()])
            .await?;
        let vector = vectors.pop().ok_or_else(|| {
            EmbeddingClientError::InvalidResponse("provider returned no query vector".into())
        })?;
        self.rank(&vector, k)
    }
}

impl IndexEntry {
    fn new(chunk: DocumentChunk, vector: Vec<f32>) -> Self {
        let norm = l2_norm(&vector);
        Self {
            chunk,
            vector,
            norm,
        }
    }
}

fn l2_norm(vector: &[f32]) -> f32 {
    vector.iter().map(|value| value * value).sum::<f32>().sqrt()
}

fn cosine_similarity(a: &[f32], b: &[f32], a_norm: f32, b_norm: f32) -> f32 {
    if a_norm == 0.0 || b_norm == 0.0 {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    dot / (a_norm * b_norm)
}

fn sha256_hex(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

fn read_file(path: &Path) -> Result<Vec<u8>, IndexError> {
    fs::read(path).map_err(|source| io_error(path, source))
}

fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), IndexError> {
    let tmp: PathBuf = path.with_extension("tmp");
    fs::write(&tmp, bytes).map_err(|source| io_error(&tmp, source))?;
    fs::rename(&tmp, path).map_err(|source| io_error(path, source))
}

fn io_error(path: &Path, source: std::io::Error) -> IndexError {
    IndexError::Io {
        path: path.display().to_string(),
        source,
    }
}

fn corrupt(dir: &Path, reason: impl ToString) -> IndexError {
    IndexError::Corrupt {
        path: dir.display().to_string(),
        reason: reason.to_string(),
    }
}
