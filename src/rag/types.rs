//! Core data types and error definitions for chunking and retrieval.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use super::index::IndexError;

/// Errors produced while turning raw text into windows.
#[derive(Debug, Error)]
pub enum ChunkingError {
    /// Ingestion configured an impossible window size.
    #[error("chunk size must be greater than zero")]
    InvalidChunkSize,
    /// The window start would never advance.
    #[error("chunk overlap ({overlap}) must be smaller than chunk size ({chunk_size})")]
    OverlapTooLarge {
        /// Requested overlap in characters.
        overlap: usize,
        /// Requested window size in characters.
        chunk_size: usize,
    },
}

/// Errors emitted while retrieving supporting context for a question.
#[derive(Debug, Error)]
pub enum RetrievalError {
    /// Requested neighbour count is outside the supported range.
    #[error("top_k must be between 1 and {max}, got {requested}")]
    InvalidTopK {
        /// Value supplied by the caller.
        requested: usize,
        /// Largest accepted value.
        max: usize,
    },
    /// Index lookup failed.
    #[error("Index query failed: {0}")]
    Index(#[from] IndexError),
}

/// One indexable unit of a source document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentChunk {
    /// File name of the originating document.
    pub source: String,
    /// Position of the chunk within its source, starting at zero.
    pub chunk_index: usize,
    /// Trimmed window text.
    pub text: String,
}

/// Metadata stored next to every indexed chunk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkMetadata {
    /// File name of the originating document.
    pub source: String,
    /// Position of the chunk within its source.
    pub chunk_index: usize,
}

/// Chunk returned by a similarity query, in rank order.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchHit {
    /// Stored chunk text.
    pub text: String,
    /// Source metadata used to build the citation.
    pub metadata: ChunkMetadata,
}

/// Reference to a retrieved chunk, rendered as `<source>#chunk=<index>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Citation {
    /// File name of the originating document.
    pub source: String,
    /// Position of the chunk within its source.
    pub chunk_index: usize,
}

impl From<&ChunkMetadata> for Citation {
    fn from(metadata: &ChunkMetadata) -> Self {
        Self {
            source: metadata.source.clone(),
            chunk_index: metadata.chunk_index,
        }
    }
}

impl fmt::Display for Citation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#chunk={}", self.source, self.chunk_index)
    }
}

/// Sanitized chunk text paired with its citation.
#[derive(Debug, Clone, PartialEq)]
pub struct RetrievedChunk {
    /// Chunk text after injection screening.
    pub text: String,
    /// Citation for the chunk.
    pub citation: Citation,
}

/// Outcome of a retrieval: ranked chunks plus the clamped prompt context built from them.
#[derive(Debug, Clone, PartialEq)]
pub struct RetrievalResult {
    /// Retrieved chunks in similarity order.
    pub chunks: Vec<RetrievedChunk>,
    /// Context blob handed to the answer prompt.
    pub context: String,
}

impl RetrievalResult {
    /// Number of chunks returned by the index.
    pub fn retrieved_count(&self) -> usize {
        self.chunks.len()
    }

    /// Rendered citations in rank order.
    pub fn citations(&self) -> Vec<String> {
        self.chunks
            .iter()
            .map(|chunk| chunk.citation.to_string())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn citation_renders_source_and_index() {
        let citation = Citation {
            source: "leave_policy.txt".into(),
            chunk_index: 3,
        };
        assert_eq!(citation.to_string(), "leave_policy.txt#chunk=3");
    }
}
