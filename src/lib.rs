//! Legal QA RAG - retrieval-augmented multiple-choice answering over court judgments.
//!
//! Reference documents are chunked, embedded through an asynchronous bulk
//! embedding service, and stored in a flat inner-product vector index. At
//! question time the closest chunks ground a language model that picks one
//! of four options; an evaluation harness scores the picks against a labeled
//! test set.
//!
//! # Overview
//!
//! 1. Split documents into overlapping, sentence-aware chunks
//! 2. Submit embedding requests in size-limited bulk jobs and wait for them
//! 3. Reassemble out-of-order results by chunk id and build the index
//! 4. Retrieve the top-k chunks for a question and ask for a single letter
//! 5. Tally accuracy, synchronously or from a bulk completion run
//!
//! # Quick Start
//!
//! ```no_run
//! use legal_qa_rag::{
//!     agent::{Answerer, AnsweringAgent, RagAgent},
//!     batch::{BatchOrchestrator, OpenAiBatchApi},
//!     chunker::Chunker,
//!     config::Config,
//!     corpus::load_corpus,
//!     eval::{evaluate, load_test_set},
//!     indexer::{EMBEDDING_RUN, IndexBuilder},
//!     llm::{LlmClient, OpenAiEmbedder},
//!     retriever::Retriever,
//! };
//! use std::path::Path;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load(None)?;
//!     config.validate()?;
//!
//!     // Build the index through bulk embedding jobs
//!     let builder = IndexBuilder::new(Chunker::from_config(&config.chunking)?, config.embedding.clone());
//!     let chunks = builder.chunk(&load_corpus(Path::new("corpus"))?)?;
//!     let api = Arc::new(OpenAiBatchApi::new(&config.llm, config.batch.completion_window.clone()));
//!     let orchestrator = BatchOrchestrator::new(api, config.paths.batch_dir(), (&config.batch).into());
//!     let embeddings = builder.embed_with_batch(&orchestrator, EMBEDDING_RUN, &chunks).await?;
//!     let artifacts = builder.assemble(builder.embedding_model(), chunks, embeddings)?;
//!     artifacts.save(&config.paths.index_dir())?;
//!
//!     // Answer and score
//!     let embedder = Arc::new(OpenAiEmbedder::new(&config.llm, config.embedding.clone()));
//!     let retriever = Retriever::new(embedder, artifacts)?;
//!     let agent = AnsweringAgent::new(Arc::new(LlmClient::new(config.llm.clone())));
//!     let rag = RagAgent::new(retriever, agent, config.retrieval.top_k);
//!
//!     let records = load_test_set(Path::new("kmmlu_criminal_law.json"))?;
//!     let report = evaluate(&records, &rag).await?;
//!     println!("{}", report);
//!
//!     Ok(())
//! }
//! ```
//!
//! # Architecture
//!
//! - **Chunker**: sentence-aware splitting with overlap
//! - **BatchOrchestrator**: partitioned, resumable bulk jobs
//! - **align**: ordinal alignment of out-of-order results
//! - **VectorIndex**: flat inner-product index with model metadata
//! - **Retriever** / **RagAgent**: query-time grounding and answering
//! - **eval**: test set loading, harness and accuracy report

pub mod agent;
pub mod align;
pub mod batch;
pub mod chunker;
pub mod config;
pub mod corpus;
pub mod error;
pub mod eval;
pub mod index;
pub mod indexer;
pub mod llm;
pub mod persistence;
pub mod retriever;

#[cfg(test)]
pub(crate) mod testing;

// Re-export commonly used types
pub use agent::{Answerer, AnsweringAgent, ClosedBookAgent, RagAgent};
pub use chunker::{Chunk, Chunker};
pub use config::Config;
pub use error::{RagError, Result};
pub use eval::{EvalReport, QARecord};
pub use index::{IndexArtifacts, VectorIndex};
pub use indexer::IndexBuilder;
pub use llm::{LlmClient, OpenAiEmbedder};
pub use retriever::Retriever;
