use crate::error::Result;
use repolens_vector_store::{EmbeddingModel, VectorIndex};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// What a query hands back: where the text came from and the text itself
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Passage {
    pub file_path: String,
    pub content: String,
}

/// Question in, ranked passages out
pub struct Retriever {
    embedder: Arc<EmbeddingModel>,
    index: Arc<VectorIndex>,
}

impl Retriever {
    #[must_use]
    pub const fn new(embedder: Arc<EmbeddingModel>, index: Arc<VectorIndex>) -> Self {
        Self { embedder, index }
    }

    /// Most similar passages first; empty when the index holds nothing
    pub async fn retrieve(&self, question: &str, top_k: usize) -> Result<Vec<Passage>> {
        if self.index.is_empty() || top_k == 0 {
            return Ok(vec![]);
        }

        let query = self.embedder.embed(question).await?;
        let hits = self.index.search(&query, top_k)?;
        log::debug!(
            "Retrieved {} of {} chunks for query ({} chars)",
            hits.len(),
            self.index.len(),
            question.len()
        );

        Ok(hits
            .into_iter()
            .map(|hit| Passage {
                file_path: hit.record.file_path,
                content: hit.record.content,
            })
            .collect())
    }
}
