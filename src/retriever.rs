//! Query-time retrieval over a built index.

use crate::config::Config;
use crate::error::{RagError, Result};
use crate::index::{IndexArtifacts, SearchHit};
use crate::llm::{EmbeddingService, OpenAiEmbedder};
use std::sync::Arc;
use tracing::debug;

/// A retrieved passage with its similarity score.
#[derive(Debug, Clone, PartialEq)]
pub struct Passage {
    pub position: usize,
    pub score: f32,
    pub text: String,
}

/// Embeds queries and returns the closest chunk texts.
pub struct Retriever {
    embedder: Arc<dyn EmbeddingService>,
    artifacts: IndexArtifacts,
}

impl Retriever {
    /// The embedder must use the model the index was built with.
    pub fn new(embedder: Arc<dyn EmbeddingService>, artifacts: IndexArtifacts) -> Result<Self> {
        if embedder.model() != artifacts.index.model() {
            return Err(RagError::EmbeddingModelMismatch {
                index_model: artifacts.index.model().to_string(),
                query_model: embedder.model().to_string(),
            });
        }
        Ok(Self {
            embedder,
            artifacts,
        })
    }

    /// Load the published index and embed queries with the configured model.
    pub fn open(config: &Config) -> Result<Self> {
        let artifacts = IndexArtifacts::load(&config.paths.index_dir())?;
        let embedder = Arc::new(OpenAiEmbedder::new(&config.llm, config.embedding.clone()));
        Self::new(embedder, artifacts)
    }

    /// Top-`k` passages with scores, best first.
    ///
    /// Scores are inner products (see [`crate::index`]).
    pub async fn retrieve_scored(&self, query: &str, k: usize) -> Result<Vec<Passage>> {
        let vector = self.embedder.embed_query(query).await?;
        let hits = self.artifacts.index.search(&vector, k)?;
        debug!("Retrieved {} passages for query of {} chars", hits.len(), query.chars().count());

        Ok(hits
            .into_iter()
            .map(|SearchHit { position, score }| Passage {
                position,
                score,
                text: self.artifacts.chunks[position].clone(),
            })
            .collect())
    }

    /// Top-`k` chunk texts, best first. Identical texts are not merged.
    pub async fn retrieve(&self, query: &str, k: usize) -> Result<Vec<String>> {
        Ok(self
            .retrieve_scored(query, k)
            .await?
            .into_iter()
            .map(|p| p.text)
            .collect())
    }
}
