//! Fixed-size character windowing for policy documents.
//!
//! Documents are split into windows of `chunk_size` characters (Unicode scalar values, not
//! bytes) where consecutive windows share `overlap` characters, so a passage straddling a
//! boundary is visible in full to at least one window. Each window is trimmed and empty
//! windows are dropped. Windowing is lazy: [`TextWindows::iter`] walks the text on demand and
//! may be called again to restart from the beginning.

use super::types::{ChunkingError, DocumentChunk};

/// Normalized document text paired with the window parameters used to split it.
#[derive(Debug, Clone)]
pub struct TextWindows {
    text: String,
    /// Byte offset of every character, plus a trailing `text.len()` sentinel.
    boundaries: Vec<usize>,
    chunk_size: usize,
    overlap: usize,
}

/// Split `text` into overlapping windows.
///
/// Fails fast when `chunk_size` is zero or `overlap >= chunk_size`, since the window start
/// would otherwise never advance.
pub fn chunk_text(
    text: &str,
    chunk_size: usize,
    overlap: usize,
) -> Result<TextWindows, ChunkingError> {
    if chunk_size == 0 {
        return Err(ChunkingError::InvalidChunkSize);
    }
    if overlap >= chunk_size {
        return Err(ChunkingError::OverlapTooLarge {
            overlap,
            chunk_size,
        });
    }

    let text = text.replace("\r\n", "\n");
    let boundaries = text
        .char_indices()
        .map(|(offset, _)| offset)
        .chain(std::iter::once(text.len()))
        .collect();

    Ok(TextWindows {
        text,
        boundaries,
        chunk_size,
        overlap,
    })
}

impl TextWindows {
    /// Lazily iterate over the trimmed, non-empty windows.
    pub fn iter(&self) -> WindowIter<'_> {
        WindowIter {
            windows: self,
            start: 0,
            finished: false,
        }
    }

    /// Number of characters in the normalized text.
    pub fn char_len(&self) -> usize {
        self.boundaries.len() - 1
    }

    /// Collect every window into owned strings.
    pub fn to_vec(&self) -> Vec<String> {
        self.iter().map(str::to_string).collect()
    }
}

impl<'a> IntoIterator for &'a TextWindows {
    type Item = &'a str;
    type IntoIter = WindowIter<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Iterator over the windows of a [`TextWindows`].
#[derive(Debug, Clone)]
pub struct WindowIter<'a> {
    windows: &'a TextWindows,
    start: usize,
    finished: bool,
}

impl<'a> Iterator for WindowIter<'a> {
    type Item = &'a str;

    fn next(&mut self) -> Option<Self::Item> {
        let windows = self.windows;
        let len = windows.char_len();

        while !self.finished && self.start < len {
            let end = self.start.saturating_add(windows.chunk_size).min(len);
            let slice = &windows.text[windows.boundaries[self.start]..windows.boundaries[end]];

            if end == len {
                self.finished = true;
            } else {
                self.start = end - windows.overlap;
            }

            let trimmed = slice.trim();
            if !trimmed.is_empty() {
                return Some(trimmed);
            }
        }

        None
    }
}

/// Chunk one source document into numbered [`DocumentChunk`]s.
///
/// Indices count only the windows that survive trimming, so they stay contiguous from zero.
pub fn document_chunks(
    source: &str,
    text: &str,
    chunk_size: usize,
    overlap: usize,
) -> Result<Vec<DocumentChunk>, ChunkingError> {
    let windows = chunk_text(text, chunk_size, overlap)?;
    Ok(windows
        .iter()
        .enumerate()
        .map(|(chunk_index, window)| DocumentChunk {
            source: source.to_string(),
            chunk_index,
            text: window.to_string(),
        })
        .collect())
}
