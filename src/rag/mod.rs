//! Retrieval building blocks: chunking, the embedding index, injection screening and context
//! assembly.

pub mod chunking;
pub mod index;
pub mod ingest;
pub mod retriever;
pub mod sanitize;
pub mod types;

pub use chunking::{TextWindows, chunk_text, document_chunks};
pub use index::{IndexError, IndexManifest, LocalIndex, SimilaritySearch};
pub use ingest::{IngestError, IngestOutcome, ingest};
pub use retriever::{ContextRetriever, MAX_TOP_K, TRUNCATION_MARKER, clamp_text};
pub use sanitize::{INJECTION_SENTINEL, InjectionMatcher, RegexMatcher, Sanitizer};
pub use types::{
    ChunkMetadata, ChunkingError, Citation, DocumentChunk, RetrievalError, RetrievalResult,
    RetrievedChunk, SearchHit,
};
