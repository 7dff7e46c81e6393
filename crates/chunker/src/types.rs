use serde::{Deserialize, Serialize};

/// A readable file loaded from a repository
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Document {
    /// Path relative to the repository root, `/`-separated
    pub file_path: String,

    /// Decoded text content
    pub content: String,
}

impl Document {
    /// Create a new document
    pub fn new(file_path: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            file_path: file_path.into(),
            content: content.into(),
        }
    }
}

/// A contiguous word window of a document, the unit of retrieval
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct Chunk {
    /// Source file path
    pub file_path: String,

    /// Position of this chunk within its file (0-based, no gaps)
    pub chunk_id: usize,

    /// Window words joined by single spaces
    pub content: String,
}

impl Chunk {
    /// Create a new chunk
    #[must_use]
    pub const fn new(file_path: String, chunk_id: usize, content: String) -> Self {
        Self {
            file_path,
            chunk_id,
            content,
        }
    }

    /// Stable identifier of the form `file_path#chunk_id`
    #[must_use]
    pub fn id(&self) -> String {
        format!("{}#{}", self.file_path, self.chunk_id)
    }

    /// Number of words in this chunk
    #[must_use]
    pub fn word_count(&self) -> usize {
        self.content.split_whitespace().count()
    }
}
