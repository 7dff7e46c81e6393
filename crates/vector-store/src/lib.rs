//! # repolens vector store
//!
//! Text embeddings and an exact inner-product index for repository chunks.
//!
//! ## Architecture
//!
//! ```text
//! Chunk[]
//!     │
//!     ├──> EmbeddingModel (ONNX Runtime or stub)
//!     │      └─> unit-length Vec<f32>[D]
//!     │
//!     ├──> VectorIndex
//!     │      └─> exhaustive inner-product search
//!     │
//!     └──> Persistent storage
//!            └─> vectors.bin + metadata.json
//! ```
//!
//! ## Example
//!
//! ```no_run
//! use repolens_chunker::Chunk;
//! use repolens_vector_store::{EmbeddedChunk, EmbeddingModel, IndexPaths, VectorIndex};
//!
//! # async fn demo() -> repolens_vector_store::Result<()> {
//! let model = EmbeddingModel::from_env()?;
//! let chunk = Chunk::new("src/main.py".into(), 0, "def main(): pass".into());
//! let embedding = model.embed(&chunk.content).await?;
//!
//! let mut index = VectorIndex::new(model.dimension()).with_model_id(model.model_id());
//! index.add(vec![EmbeddedChunk::new(chunk, embedding)])?;
//! index.save(&IndexPaths::in_dir(".repolens".as_ref()))?;
//!
//! let query = model.embed("entry point").await?;
//! for hit in index.search(&query, 5)? {
//!     println!("{} ({:.3})", hit.record.file_path, hit.score);
//! }
//! # Ok(())
//! # }
//! ```

mod checksum;
mod embeddings;
mod error;
mod index;
mod paths;
mod types;

pub use embeddings::{EmbeddingMode, EmbeddingModel, EmbeddingOptions, DEFAULT_MODEL_ID};
pub use error::{Result, VectorStoreError};
pub use index::VectorIndex;
pub use paths::{
    default_model_dir, lock_path_for_store, IndexPaths, CACHE_DIR_NAME, LOCK_FILE_NAME,
    METADATA_FILE_NAME, VECTORS_FILE_NAME,
};
pub use repolens_chunker::Chunk;
pub use types::{ChunkRecord, EmbeddedChunk, SearchHit};
