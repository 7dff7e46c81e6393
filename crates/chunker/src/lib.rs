//! # repolens Chunker
//!
//! Splits repository documents into overlapping, fixed-size word windows.
//!
//! ## Windowing
//!
//! ```text
//! words:   w0 w1 w2 ............................................ wN
//!          [──────── window 0 (W words) ────────]
//!                              [──────── window 1 ────────]
//!                              ^ start + (W - O)
//!                                                  [──── window 2 ────]
//! ```
//!
//! Every window becomes a [`Chunk`] addressed by `(file_path, chunk_id)`,
//! with `chunk_id` counting from zero within each document.
//!
//! ## Example
//!
//! ```rust
//! use repolens_chunker::{Chunker, ChunkerConfig, Document};
//!
//! let chunker = Chunker::new(ChunkerConfig::new(4, 1));
//! let doc = Document::new("notes.md", "one two three four five six seven");
//!
//! let chunks = chunker.chunk_document(&doc);
//! assert_eq!(chunks.len(), 2);
//! assert_eq!(chunks[0].content, "one two three four");
//! assert_eq!(chunks[1].content, "four five six seven");
//! ```

mod chunker;
mod config;
mod error;
mod types;

pub use chunker::{word_windows, Chunker};
pub use config::{ChunkerConfig, DEFAULT_OVERLAP_WORDS, DEFAULT_WINDOW_WORDS};
pub use error::{ChunkerError, Result};
pub use types::{Chunk, Document};
