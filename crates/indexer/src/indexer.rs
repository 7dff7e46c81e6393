use crate::error::{IndexerError, Result};
use crate::scanner::{FileScanner, LoadedDocuments, ScanOptions};
use crate::stats::IngestStats;
use repolens_chunker::{Chunk, Chunker, ChunkerConfig};
use repolens_vector_store::{EmbeddedChunk, EmbeddingModel, VectorIndex};
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

/// A freshly built index that nothing reads from yet
#[derive(Debug)]
pub struct BuiltIndex {
    pub index: VectorIndex,
    pub stats: IngestStats,
}

/// Load -> chunk -> embed -> add, producing a new index off to the side
pub struct RepoIndexer {
    scan_options: ScanOptions,
    chunker: Chunker,
    embedder: Arc<EmbeddingModel>,
    batch_size: usize,
}

impl RepoIndexer {
    pub fn new(
        scan_options: ScanOptions,
        chunker_config: ChunkerConfig,
        embedder: Arc<EmbeddingModel>,
        batch_size: usize,
    ) -> Result<Self> {
        chunker_config.validate()?;
        Ok(Self {
            scan_options,
            chunker: Chunker::new(chunker_config),
            embedder,
            batch_size: batch_size.max(1),
        })
    }

    pub async fn build(&self, root: &Path) -> Result<BuiltIndex> {
        let start = Instant::now();
        log::info!("Ingesting {}", root.display());

        let scanner = FileScanner::new(root, &self.scan_options);
        let LoadedDocuments { documents, skipped } =
            tokio::task::spawn_blocking(move || scanner.load_documents())
                .await
                .map_err(|err| {
                    IndexerError::IoError(std::io::Error::other(format!(
                        "join scan task: {err}"
                    )))
                })?;

        if documents.is_empty() {
            return Err(IndexerError::EmptyRepository {
                root: root.to_path_buf(),
            });
        }

        let chunks = self.chunker.chunk_documents(&documents);
        log::info!(
            "Loaded {} files ({skipped} skipped), {} chunks",
            documents.len(),
            chunks.len()
        );

        let mut index =
            VectorIndex::new(self.embedder.dimension()).with_model_id(self.embedder.model_id());
        self.embed_into(&mut index, chunks).await?;

        let stats = IngestStats {
            files_loaded: documents.len(),
            chunks_created: index.len(),
            files_skipped: skipped,
            time_ms: start.elapsed().as_millis() as u64,
        };
        log::info!(
            "Built index: {} files, {} chunks in {} ms",
            stats.files_loaded,
            stats.chunks_created,
            stats.time_ms
        );

        Ok(BuiltIndex { index, stats })
    }

    async fn embed_into(&self, index: &mut VectorIndex, chunks: Vec<Chunk>) -> Result<()> {
        let total = chunks.len();
        let mut done = 0usize;
        let mut remaining = chunks.into_iter().peekable();

        while remaining.peek().is_some() {
            let batch: Vec<Chunk> = remaining.by_ref().take(self.batch_size).collect();
            let texts: Vec<&str> = batch.iter().map(|chunk| chunk.content.as_str()).collect();
            let embeddings = self.embedder.embed_batch(texts).await?;

            done += batch.len();
            let last_id = batch.last().map(Chunk::id).unwrap_or_default();
            index.add(
                batch
                    .into_iter()
                    .zip(embeddings)
                    .map(|(chunk, embedding)| EmbeddedChunk::new(chunk, embedding))
                    .collect(),
            )?;
            log::debug!("Embedded {done}/{total} chunks (through {last_id})");
        }

        Ok(())
    }
}
