use crate::active::ActiveIndex;
use crate::config::RagConfig;
use crate::error::{IndexerError, Result};
use crate::index_lock::{acquire_index_read_lock, acquire_index_write_lock};
use crate::indexer::{BuiltIndex, RepoIndexer};
use crate::retriever::{Passage, Retriever};
use crate::source::SourceProvider;
use crate::stats::IngestStats;
use async_trait::async_trait;
use repolens_vector_store::{EmbeddingModel, VectorIndex, VectorStoreError};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Produces an answer from retrieved passages (typically an LLM call)
#[async_trait]
pub trait AnswerGenerator: Send + Sync {
    async fn generate_answer(&self, passages: &[Passage], question: &str) -> Result<String>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AnswerOutcome {
    Answered {
        answer: String,
        passages: Vec<Passage>,
    },
    /// Retrieval found nothing, so the generator was never called
    NoRelevantContext,
}

/// Owns the active index and the shared embedder; the entry point for
/// `ingest` and `ask`.
pub struct RepoService {
    config: RagConfig,
    embedder: Arc<EmbeddingModel>,
    indexer: RepoIndexer,
    active: ActiveIndex,
    ingest_guard: Mutex<()>,
}

impl RepoService {
    pub fn new(config: RagConfig, embedder: Arc<EmbeddingModel>) -> Result<Self> {
        config.validate()?;
        let indexer = RepoIndexer::new(
            config.scan_options(),
            config.chunker_config(),
            embedder.clone(),
            config.embed_batch_size,
        )?;
        Ok(Self {
            config,
            embedder,
            indexer,
            active: ActiveIndex::new(),
            ingest_guard: Mutex::new(()),
        })
    }

    /// Build the embedder described by `config.embedding` and wrap it in a service
    pub fn from_config(config: RagConfig) -> Result<Self> {
        let embedder = EmbeddingModel::from_options(&config.embedding)?;
        Self::new(config, Arc::new(embedder))
    }

    #[must_use]
    pub const fn config(&self) -> &RagConfig {
        &self.config
    }

    #[must_use]
    pub fn embedder(&self) -> Arc<EmbeddingModel> {
        self.embedder.clone()
    }

    #[must_use]
    pub fn has_index(&self) -> bool {
        self.active.is_loaded()
    }

    /// Index `root` and make the result the active index.
    ///
    /// Any failure (empty repository, embedding error, failed save) leaves
    /// the previously active index in place.
    pub async fn ingest(&self, root: &Path) -> Result<IngestStats> {
        let _guard = self.ingest_guard.lock().await;
        let _file_lock = match &self.config.store_dir {
            Some(dir) => Some(acquire_index_write_lock(dir).await?),
            None => None,
        };

        let BuiltIndex { index, stats } = self.indexer.build(root).await?;

        if let Some(paths) = self.config.index_paths() {
            index.save(&paths)?;
            log::info!("Saved index to {}", paths.vectors.display());
        }

        self.active.replace(Arc::new(index));
        log::info!("Active index swapped ({} chunks)", stats.chunks_created);
        Ok(stats)
    }

    /// Acquire `identifier` through `provider` (bounded by the configured
    /// timeout) and ingest the resulting directory.
    pub async fn ingest_source(
        &self,
        provider: &dyn SourceProvider,
        identifier: &str,
    ) -> Result<IngestStats> {
        let timeout = self.config.acquire_timeout();
        let root = match tokio::time::timeout(timeout, provider.acquire(identifier)).await {
            Ok(Ok(root)) => root,
            Ok(Err(err @ IndexerError::SourceUnavailable(_))) => return Err(err),
            Ok(Err(err)) => {
                return Err(IndexerError::SourceUnavailable(format!(
                    "{identifier}: {err}"
                )))
            }
            Err(_) => {
                return Err(IndexerError::SourceUnavailable(format!(
                    "{identifier}: timed out after {}s",
                    timeout.as_secs()
                )))
            }
        };
        self.ingest(&root).await
    }

    /// Passages most similar to `question`, best first
    pub async fn ask(&self, question: &str, top_k: Option<usize>) -> Result<Vec<Passage>> {
        let index = self.active.snapshot().ok_or(IndexerError::NotIngested)?;
        let top_k = top_k.unwrap_or(self.config.top_k);
        Retriever::new(self.embedder.clone(), index)
            .retrieve(question, top_k)
            .await
    }

    pub async fn answer(
        &self,
        question: &str,
        top_k: Option<usize>,
        generator: &dyn AnswerGenerator,
    ) -> Result<AnswerOutcome> {
        let passages = self.ask(question, top_k).await?;
        if passages.is_empty() {
            return Ok(AnswerOutcome::NoRelevantContext);
        }
        let answer = generator.generate_answer(&passages, question).await?;
        Ok(AnswerOutcome::Answered { answer, passages })
    }

    /// Activate the index persisted in the store directory.
    ///
    /// Returns `Ok(false)` when no store is configured or nothing has been
    /// saved yet. Corrupt or mismatched artifacts are errors.
    pub async fn restore(&self) -> Result<bool> {
        let (Some(store_dir), Some(paths)) = (&self.config.store_dir, self.config.index_paths())
        else {
            return Ok(false);
        };
        if !store_dir.is_dir() {
            log::debug!("No persisted index ({} missing)", store_dir.display());
            return Ok(false);
        }
        let _guard = self.ingest_guard.lock().await;
        // another process may be mid-save
        let _file_lock = acquire_index_read_lock(store_dir).await?;

        let dimension = self.embedder.dimension();
        let loaded = tokio::task::spawn_blocking(move || VectorIndex::load(&paths, dimension))
            .await
            .map_err(|err| {
                IndexerError::IoError(std::io::Error::other(format!("join load task: {err}")))
            })?;

        let index = match loaded {
            Ok(index) => index,
            Err(VectorStoreError::IndexNotFound { path }) => {
                log::debug!("No persisted index ({} missing)", path.display());
                return Ok(false);
            }
            Err(err) => return Err(err.into()),
        };

        if let Some(saved_model) = index.model_id() {
            if saved_model != self.embedder.model_id() {
                log::warn!(
                    "Index was built with embedding model '{saved_model}' but '{}' is active; re-ingest for reliable results",
                    self.embedder.model_id()
                );
            }
        }

        log::info!("Restored index with {} chunks", index.len());
        self.active.replace(Arc::new(index));
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    struct EchoGenerator;

    #[async_trait]
    impl AnswerGenerator for EchoGenerator {
        async fn generate_answer(&self, passages: &[Passage], question: &str) -> Result<String> {
            Ok(format!("{question} -> {}", passages[0].file_path))
        }
    }

    fn service(config: RagConfig) -> RepoService {
        RepoService::new(config, Arc::new(EmbeddingModel::stub(16))).unwrap()
    }

    #[tokio::test]
    async fn ask_before_ingest_is_not_ingested() {
        let service = service(RagConfig::default());
        assert!(!service.has_index());
        let err = service.ask("where is main?", None).await.unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::NotIngested);
    }

    #[tokio::test]
    async fn answer_calls_generator_with_passages() {
        let tmp = tempfile::tempdir().unwrap();
        fs::write(tmp.path().join("main.py"), "def main(): print('hi')").unwrap();

        let service = service(RagConfig::default());
        service.ingest(tmp.path()).await.unwrap();

        let outcome = service
            .answer("what does main do", Some(3), &EchoGenerator)
            .await
            .unwrap();
        match outcome {
            AnswerOutcome::Answered { answer, passages } => {
                assert_eq!(answer, "what does main do -> main.py");
                assert_eq!(passages.len(), 1);
            }
            AnswerOutcome::NoRelevantContext => panic!("expected an answer"),
        }
    }

    #[tokio::test]
    async fn restore_without_store_is_a_noop() {
        let service = service(RagConfig::default());
        assert!(!service.restore().await.unwrap());
        assert!(!service.has_index());
    }

    #[test]
    fn invalid_config_is_rejected_up_front() {
        let config = RagConfig {
            top_k: 0,
            ..RagConfig::default()
        };
        let result = RepoService::new(config, Arc::new(EmbeddingModel::stub(4)));
        assert!(matches!(result, Err(IndexerError::InvalidConfig(_))));
    }
}
