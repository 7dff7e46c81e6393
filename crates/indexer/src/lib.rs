//! # repolens indexer
//!
//! Repository ingestion and retrieval.
//!
//! ## Pipeline
//!
//! ```text
//! Directory
//!     │
//!     ├──> File Scanner (extension allow-list, ignored dirs)
//!     │      └─> Documents
//!     │
//!     ├──> Chunker (overlapping word windows)
//!     │      └─> Chunks
//!     │
//!     ├──> Embedder (batch embed, shared with queries)
//!     │      └─> VectorIndex built off to the side
//!     │
//!     └──> save + atomic swap
//!            └─> ask() reads a complete snapshot
//! ```
//!
//! ## Example
//!
//! ```no_run
//! use repolens_indexer::{RagConfig, RepoService};
//!
//! # async fn demo() -> repolens_indexer::Result<()> {
//! let service = RepoService::from_config(RagConfig::load(None)?)?;
//! let stats = service.ingest("/path/to/repo".as_ref()).await?;
//! println!("Indexed {} files, {} chunks", stats.files_loaded, stats.chunks_created);
//!
//! for passage in service.ask("where is the config parsed?", None).await? {
//!     println!("{}", passage.file_path);
//! }
//! # Ok(())
//! # }
//! ```

mod active;
mod config;
mod error;
mod index_lock;
mod indexer;
mod retriever;
mod scanner;
mod service;
mod source;
mod stats;

pub use active::ActiveIndex;
pub use config::{RagConfig, CONFIG_FILE_NAME};
pub use error::{ErrorKind, IndexerError, Result};
pub use indexer::{BuiltIndex, RepoIndexer};
pub use retriever::{Passage, Retriever};
pub use scanner::{
    FileScanner, LoadedDocuments, ScanOptions, DEFAULT_EXTENSIONS, DEFAULT_IGNORED_DIRS,
};
pub use service::{AnswerGenerator, AnswerOutcome, RepoService};
pub use source::{LocalDirectorySource, SourceProvider};
pub use stats::IngestStats;
