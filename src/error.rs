//! Error types for the retrieval and evaluation pipeline.

use crate::batch::JobState;
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias using our custom error.
pub type Result<T> = std::result::Result<T, RagError>;

/// Errors that can occur while building, querying or evaluating.
#[derive(Error, Debug)]
pub enum RagError {
    /// Error reading or writing files.
    #[error("I/O error for path '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Error during serialization/deserialization.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// The corpus path does not exist.
    #[error("Corpus path '{0}' does not exist")]
    InvalidCorpusPath(PathBuf),

    /// No usable documents found in the corpus.
    #[error("No documents found in corpus at '{0}'")]
    EmptyCorpus(PathBuf),

    /// The index artifacts do not exist.
    #[error("Index not found at '{0}'")]
    IndexNotFound(PathBuf),

    /// Configuration file or value error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Remote API returned an error.
    #[error("API error: {0}")]
    Api(String),

    /// Remote API response could not be parsed.
    #[error("Failed to parse API response: {0}")]
    Parse(String),

    /// HTTP request error.
    #[error("HTTP request failed: {0}")]
    Http(String),

    /// A document could not be chunked.
    #[error("Cannot chunk document '{document}': {reason}")]
    Chunking { document: String, reason: String },

    /// A bulk job ended in a non-success terminal state.
    #[error("Batch job '{job_id}' ended in state {state}")]
    BatchJobFailed { job_id: String, state: JobState },

    /// A completed bulk job did not reference an output file.
    #[error("Batch job '{0}' completed without an output file")]
    BatchOutputMissing(String),

    /// The service reported a state earlier than one already observed.
    #[error("Batch job '{job_id}' cannot move from {from} to {to}")]
    InvalidJobTransition {
        job_id: String,
        from: JobState,
        to: JobState,
    },

    /// The service reported a status string outside the known vocabulary.
    #[error("Unknown batch job status '{0}'")]
    UnknownJobStatus(String),

    /// A stored run manifest does not describe the current request set.
    #[error("Batch manifest mismatch: {0}")]
    ManifestMismatch(String),

    /// A custom id does not follow the expected identifier scheme.
    #[error("Malformed identifier '{0}'")]
    MalformedIdentifier(String),

    /// Returned items do not cover the requested ordinals exactly once.
    #[error(
        "Alignment mismatch: expected {expected} items, missing ordinals [{}], duplicated ordinals [{}], unexpected ordinals [{}]",
        join_ordinals(.missing),
        join_ordinals(.duplicated),
        join_ordinals(.unexpected)
    )]
    AlignmentMismatch {
        expected: usize,
        missing: Vec<usize>,
        duplicated: Vec<usize>,
        unexpected: Vec<usize>,
    },

    /// A vector does not have the dimensionality of the index.
    #[error("Embedding dimension mismatch: expected {expected}, got {actual}")]
    EmbeddingDimensionMismatch { expected: usize, actual: usize },

    /// The query embedding model differs from the one the index was built with.
    #[error("Embedding model mismatch: index built with '{index_model}', queried with '{query_model}'")]
    EmbeddingModelMismatch {
        index_model: String,
        query_model: String,
    },

    /// The completion call failed or produced no usable answer.
    #[error("Answer generation failed: {0}")]
    AnswerGeneration(String),

    /// A prediction could not be matched to a labeled record.
    #[error("Cannot score '{0}': no label available")]
    AccuracyComputation(String),
}

impl RagError {
    /// Create an I/O error with path context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Whether the error should stop the whole run rather than a single record.
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            RagError::Chunking { .. }
                | RagError::AnswerGeneration(_)
                | RagError::AccuracyComputation(_)
        )
    }
}

fn join_ordinals(ordinals: &[usize]) -> String {
    ordinals
        .iter()
        .map(|o| o.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

impl From<reqwest::Error> for RagError {
    fn from(err: reqwest::Error) -> Self {
        RagError::Http(err.to_string())
    }
}

impl From<serde_json::Error> for RagError {
    fn from(err: serde_json::Error) -> Self {
        RagError::Parse(err.to_string())
    }
}
