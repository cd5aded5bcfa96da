//! Index construction: chunks → embeddings → alignment → vector index.
//!
//! Embeddings come either from a bulk job run (cheap, slow, resumable) or
//! from direct embedding calls. Both paths tag every vector with the chunk's
//! custom id and go through the same alignment check.

use crate::align::{AlignedEmbeddingSet, align};
use crate::batch::{
    BatchEndpoint, BatchOrchestrator, BatchRequestItem, BatchResultItem, CHUNK_IDS,
};
use crate::chunker::{Chunk, Chunker};
use crate::config::EmbeddingConfig;
use crate::corpus::{CorpusDocument, chunk_corpus};
use crate::error::{RagError, Result};
use crate::index::{IndexArtifacts, VectorIndex};
use crate::llm::{EmbeddingRequest, EmbeddingService};
use tracing::{info, warn};

/// Default bulk run name for index embeddings.
pub const EMBEDDING_RUN: &str = "embeddings";

/// Builds [`IndexArtifacts`] from a corpus.
pub struct IndexBuilder {
    chunker: Chunker,
    embedding: EmbeddingConfig,
}

impl IndexBuilder {
    pub fn new(chunker: Chunker, embedding: EmbeddingConfig) -> Self {
        Self { chunker, embedding }
    }

    /// Chunk documents; unusable documents are skipped.
    pub fn chunk(&self, documents: &[CorpusDocument]) -> Result<Vec<Chunk>> {
        let chunks = chunk_corpus(documents, &self.chunker);
        if chunks.is_empty() {
            return Err(RagError::Chunking {
                document: "<corpus>".to_string(),
                reason: "no document produced any chunk".to_string(),
            });
        }
        Ok(chunks)
    }

    /// One embedding request per chunk, keyed by the chunk's ordinal.
    pub fn requests(&self, chunks: &[Chunk]) -> Result<Vec<BatchRequestItem>> {
        chunks
            .iter()
            .map(|chunk| {
                let body = EmbeddingRequest::single(&self.embedding, chunk.text()).to_value()?;
                Ok(BatchRequestItem::new(
                    CHUNK_IDS.format(chunk.ordinal()),
                    BatchEndpoint::Embeddings,
                    body,
                ))
            })
            .collect()
    }

    /// Embed chunks through a bulk run and align the results.
    pub async fn embed_with_batch(
        &self,
        orchestrator: &BatchOrchestrator,
        run: &str,
        chunks: &[Chunk],
    ) -> Result<AlignedEmbeddingSet> {
        let requests = self.requests(chunks)?;
        let lines = orchestrator
            .submit_and_wait(run, BatchEndpoint::Embeddings, &requests)
            .await?;

        let mut items = Vec::with_capacity(lines.len());
        for line in &lines {
            match BatchResultItem::from_output(line) {
                Ok(item) => items.push(item),
                // Alignment reports the resulting gap by ordinal.
                Err(e) => warn!("Dropping output line: {}", e),
            }
        }

        align(&CHUNK_IDS, items, chunks.len())
    }

    /// Embed chunks with direct calls, `group_size` texts per request.
    pub async fn embed_direct(
        &self,
        embedder: &dyn EmbeddingService,
        chunks: &[Chunk],
        group_size: usize,
    ) -> Result<AlignedEmbeddingSet> {
        let mut items = Vec::with_capacity(chunks.len());

        for (i, group) in chunks.chunks(group_size.max(1)).enumerate() {
            let texts: Vec<String> = group.iter().map(|c| c.text().to_string()).collect();
            let vectors = embedder.embed(&texts).await?;
            if vectors.len() != group.len() {
                return Err(RagError::Api(format!(
                    "embedding group {} returned {} vectors for {} chunks",
                    i,
                    vectors.len(),
                    group.len()
                )));
            }

            items.extend(group.iter().zip(vectors).map(|(chunk, vector)| BatchResultItem {
                custom_id: CHUNK_IDS.format(chunk.ordinal()),
                vector,
            }));
        }

        align(&CHUNK_IDS, items, chunks.len())
    }

    /// Pair aligned embeddings with chunk texts.
    pub fn assemble(
        &self,
        model: &str,
        chunks: Vec<Chunk>,
        embeddings: AlignedEmbeddingSet,
    ) -> Result<IndexArtifacts> {
        if embeddings.len() != chunks.len() {
            return Err(RagError::AlignmentMismatch {
                expected: chunks.len(),
                missing: (embeddings.len()..chunks.len()).collect(),
                duplicated: Vec::new(),
                unexpected: (chunks.len()..embeddings.len()).collect(),
            });
        }

        let index = VectorIndex::build(model, embeddings);
        info!(
            "Built index: {} vectors of dimension {} ({})",
            index.len(),
            index.dimension(),
            model
        );
        let texts = chunks.into_iter().map(Chunk::into_text).collect();
        IndexArtifacts::new(index, texts)
    }

    pub fn embedding_model(&self) -> &str {
        &self.embedding.model
    }
}
