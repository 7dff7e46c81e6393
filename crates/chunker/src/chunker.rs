use crate::config::ChunkerConfig;
use crate::types::{Chunk, Document};
use std::ops::Range;

/// Main chunker interface for splitting documents into word windows
#[derive(Debug, Clone, Default)]
pub struct Chunker {
    config: ChunkerConfig,
}

impl Chunker {
    /// Create a new chunker with configuration.
    ///
    /// The configuration is not validated here; an `overlap_words >= window_words`
    /// degrades to a one-word step instead of failing.
    #[must_use]
    pub const fn new(config: ChunkerConfig) -> Self {
        Self { config }
    }

    #[must_use]
    pub const fn config(&self) -> &ChunkerConfig {
        &self.config
    }

    /// Chunk a single document
    #[must_use]
    pub fn chunk_document(&self, document: &Document) -> Vec<Chunk> {
        self.chunk_text(&document.file_path, &document.content)
    }

    /// Chunk every document, preserving document order
    #[must_use]
    pub fn chunk_documents(&self, documents: &[Document]) -> Vec<Chunk> {
        let chunks: Vec<Chunk> = documents
            .iter()
            .flat_map(|doc| self.chunk_document(doc))
            .collect();
        log::debug!(
            "Chunked {} documents into {} chunks (window {}, overlap {})",
            documents.len(),
            chunks.len(),
            self.config.window_words,
            self.config.overlap_words
        );
        chunks
    }

    /// Chunk raw text that belongs to `file_path`
    #[must_use]
    pub fn chunk_text(&self, file_path: &str, text: &str) -> Vec<Chunk> {
        let words: Vec<&str> = text.split_whitespace().collect();

        let mut chunks = Vec::new();
        for range in word_windows(words.len(), &self.config) {
            let content = words[range].join(" ");
            if content.trim().is_empty() {
                continue;
            }
            chunks.push(Chunk::new(file_path.to_string(), chunks.len(), content));
        }
        chunks
    }
}

/// Word ranges covered by each window over a sequence of `word_count` words.
///
/// Windows start at `0, step, 2*step, ...` and hold up to `window_words` words.
/// Iteration ends when the next start would fall past the last word or when a
/// window already reaches the last word.
#[must_use]
pub fn word_windows(word_count: usize, config: &ChunkerConfig) -> Vec<Range<usize>> {
    let mut windows = Vec::new();
    if config.window_words == 0 {
        return windows;
    }

    let step = config.step();
    let mut start = 0;
    while start < word_count {
        let end = start.saturating_add(config.window_words).min(word_count);
        windows.push(start..end);
        if end == word_count {
            break;
        }
        start += step;
    }
    windows
}
