use repolens_chunker::Chunk;
use serde::{Deserialize, Serialize};

/// A chunk together with its embedding, ready to be added to a [`crate::VectorIndex`]
#[derive(Debug, Clone, PartialEq)]
pub struct EmbeddedChunk {
    pub chunk: Chunk,
    pub embedding: Vec<f32>,
}

impl EmbeddedChunk {
    #[must_use]
    pub const fn new(chunk: Chunk, embedding: Vec<f32>) -> Self {
        Self { chunk, embedding }
    }
}

/// Metadata row stored at the same position as its vector
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChunkRecord {
    pub file_path: String,
    pub chunk_id: usize,
    pub content: String,
}

impl From<Chunk> for ChunkRecord {
    fn from(chunk: Chunk) -> Self {
        Self {
            file_path: chunk.file_path,
            chunk_id: chunk.chunk_id,
            content: chunk.content,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SearchHit {
    pub record: ChunkRecord,
    /// Inner product with the query (cosine similarity for unit vectors)
    pub score: f32,
    /// Insertion position inside the index
    pub position: usize,
}
