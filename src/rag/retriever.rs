//! Context retrieval: nearest chunks, injection screening, citations and context clamping.

use std::sync::Arc;

use super::index::SimilaritySearch;
use super::sanitize::Sanitizer;
use super::types::{Citation, RetrievalError, RetrievalResult, RetrievedChunk};

/// Largest neighbour count a single request may ask for.
pub const MAX_TOP_K: usize = 20;

/// Marker appended when the context exceeds its character budget.
pub const TRUNCATION_MARKER: &str = "\n...[TRUNCATED]...";

/// Builds the prompt context for a question from the shared index.
pub struct ContextRetriever {
    index: Arc<dyn SimilaritySearch>,
    sanitizer: Arc<Sanitizer>,
    max_context_chars: usize,
}

impl ContextRetriever {
    /// Create a retriever over `index` that clamps context to `max_context_chars` characters.
    pub fn new(
        index: Arc<dyn SimilaritySearch>,
        sanitizer: Arc<Sanitizer>,
        max_context_chars: usize,
    ) -> Self {
        Self {
            index,
            sanitizer,
            max_context_chars,
        }
    }

    /// Retrieve the `k` nearest chunks for `question` and assemble the clamped context.
    ///
    /// Index failures abort the request; an unavailable index never degrades to an empty
    /// context.
    pub async fn retrieve(
        &self,
        question: &str,
        k: usize,
    ) -> Result<RetrievalResult, RetrievalError> {
        if !(1..=MAX_TOP_K).contains(&k) {
            return Err(RetrievalError::InvalidTopK {
                requested: k,
                max: MAX_TOP_K,
            });
        }

        let hits = self.index.similarity_search(question, k).await?;
        let citations: Vec<Citation> = hits
            .iter()
            .map(|hit| Citation::from(&hit.metadata))
            .collect();
        let texts = self
            .sanitizer
            .sanitize(hits.into_iter().map(|hit| hit.text).collect());

        let chunks: Vec<RetrievedChunk> = texts
            .into_iter()
            .zip(citations)
            .map(|(text, citation)| RetrievedChunk { text, citation })
            .collect();

        let context = clamp_text(&build_context(&chunks), self.max_context_chars);
        tracing::debug!(
            requested = k,
            retrieved = chunks.len(),
            context_chars = context.chars().count(),
            "Context retrieved"
        );

        Ok(RetrievalResult { chunks, context })
    }
}

/// Join chunks as `[citation]\ntext` blocks separated by blank lines, in rank order.
pub fn build_context(chunks: &[RetrievedChunk]) -> String {
    chunks
        .iter()
        .map(|chunk| format!("[{}]\n{}", chunk.citation, chunk.text))
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Cut `text` to `max_chars` characters and append [`TRUNCATION_MARKER`] when it is longer.
///
/// The cut happens at a raw character boundary and may split a citation or a chunk.
pub fn clamp_text(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        None => text.to_string(),
        Some((cut, _)) => {
            let mut clamped = String::with_capacity(cut + TRUNCATION_MARKER.len());
            clamped.push_str(&text[..cut]);
            clamped.push_str(TRUNCATION_MARKER);
            clamped
        }
    }
}
