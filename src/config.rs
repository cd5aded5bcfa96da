//! Configuration for the pipeline.
//!
//! Supports both environment variables and YAML config file.
//! Environment variables take precedence over config file values.

use crate::error::{RagError, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Completion (chat) model configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// Base URL for the API (e.g., "https://api.openai.com")
    pub api_base: String,

    /// API key for authentication
    pub api_key: String,

    /// Model name (e.g., "gpt-4o-mini")
    pub model: String,

    /// Maximum tokens for response; one token is enough for a choice letter
    pub max_tokens: u32,

    /// Temperature for generation
    pub temperature: f32,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_base: "https://api.openai.com".to_string(),
            api_key: String::new(),
            model: "gpt-4o-mini".to_string(),
            max_tokens: 1,
            temperature: 0.0,
        }
    }
}

/// Embedding model configuration. Shares base URL and key with [`LlmConfig`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    pub model: String,
    /// Optional dimension override when supported by the model.
    pub dimensions: Option<usize>,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            model: "text-embedding-3-small".to_string(),
            dimensions: None,
        }
    }
}

/// Bulk job settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    /// Maximum request lines per submitted job.
    pub max_batch_size: usize,
    /// Seconds between status checks.
    pub poll_interval_secs: u64,
    /// Completion window requested from the service.
    pub completion_window: String,
}

impl BatchConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            max_batch_size: 50_000,
            poll_interval_secs: 60,
            completion_window: "24h".to_string(),
        }
    }
}

/// Chunking parameters, in characters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkingConfig {
    pub max_chars: usize,
    pub overlap_chars: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            max_chars: 1000,
            overlap_chars: 100,
        }
    }
}

/// Query-time retrieval settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    pub top_k: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self { top_k: 3 }
    }
}

/// On-disk layout root.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    pub data_dir: PathBuf,
}

impl PathsConfig {
    /// Directory holding `index.bin` and `chunks.json`.
    pub fn index_dir(&self) -> PathBuf {
        self.data_dir.join("embeddings")
    }

    /// Directory holding one sub-directory per bulk run.
    pub fn batch_dir(&self) -> PathBuf {
        self.data_dir.join("batch")
    }

    /// Plain-text score summary.
    pub fn score_file(&self) -> PathBuf {
        self.data_dir.join("score.txt")
    }
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
        }
    }
}

/// Full application configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    /// Completion settings
    pub llm: LlmConfig,
    /// Embedding settings
    pub embedding: EmbeddingConfig,
    /// Bulk job settings
    pub batch: BatchConfig,
    /// Chunker settings
    pub chunking: ChunkingConfig,
    /// Retriever settings
    pub retrieval: RetrievalConfig,
    /// Artifact locations
    pub paths: PathsConfig,
}

impl Config {
    /// Load configuration from environment variables and optional config file.
    ///
    /// Priority (highest to lowest):
    /// 1. Environment variables (LLM_API_BASE, LLM_API_KEY, LLM_MODEL, ...)
    /// 2. Config file (`explicit` if given, else ~/.config/legal-qa-rag/config.yaml)
    /// 3. Default values
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let mut config = match explicit {
            Some(path) => Self::load_from_file(path)?,
            None => match Self::config_file_path() {
                Some(path) if path.exists() => Self::load_from_file(&path)?,
                _ => Config::default(),
            },
        };

        config.apply_env(|key| env::var(key).ok());
        Ok(config)
    }

    /// Load configuration from a specific file path.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| RagError::io(path, e))?;
        serde_yaml::from_str(&content)
            .map_err(|e| RagError::Config(format!("Failed to parse config file: {}", e)))
    }

    /// Override fields from environment-style lookups.
    fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(api_base) = lookup("LLM_API_BASE") {
            self.llm.api_base = api_base;
        }

        if let Some(api_key) = lookup("LLM_API_KEY").or_else(|| lookup("OPENAI_API_KEY")) {
            self.llm.api_key = api_key;
        }

        if let Some(model) = lookup("LLM_MODEL") {
            self.llm.model = model;
        }

        if let Some(tokens) = lookup("LLM_MAX_TOKENS").and_then(|v| v.parse().ok()) {
            self.llm.max_tokens = tokens;
        }

        if let Some(temp) = lookup("LLM_TEMPERATURE").and_then(|v| v.parse().ok()) {
            self.llm.temperature = temp;
        }

        if let Some(model) = lookup("EMBEDDING_MODEL") {
            self.embedding.model = model;
        }

        if let Some(dims) = lookup("EMBEDDING_DIMENSIONS").and_then(|v| v.parse().ok()) {
            self.embedding.dimensions = Some(dims);
        }

        if let Some(size) = lookup("BATCH_MAX_SIZE").and_then(|v| v.parse().ok()) {
            self.batch.max_batch_size = size;
        }

        if let Some(secs) = lookup("BATCH_POLL_INTERVAL_SECS").and_then(|v| v.parse().ok()) {
            self.batch.poll_interval_secs = secs;
        }

        if let Some(dir) = lookup("RAG_DATA_DIR") {
            self.paths.data_dir = PathBuf::from(dir);
        }

        if let Some(k) = lookup("RAG_TOP_K").and_then(|v| v.parse().ok()) {
            self.retrieval.top_k = k;
        }
    }

    /// Get the default config file path.
    pub fn config_file_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("", "", "legal-qa-rag")
            .map(|dirs| dirs.config_dir().join("config.yaml"))
    }

    /// Validate that required configuration is present and consistent.
    pub fn validate(&self) -> Result<()> {
        if self.llm.api_base.is_empty() {
            return Err(RagError::Config(
                "API base URL is required. Set LLM_API_BASE environment variable or add to config file.".to_string()
            ));
        }

        if self.llm.api_key.is_empty() {
            return Err(RagError::Config(
                "API key is required. Set LLM_API_KEY or OPENAI_API_KEY environment variable or add to config file.".to_string()
            ));
        }

        if self.llm.model.is_empty() || self.embedding.model.is_empty() {
            return Err(RagError::Config(
                "Completion and embedding model names are required.".to_string(),
            ));
        }

        if self.batch.max_batch_size == 0 {
            return Err(RagError::Config("batch.max_batch_size must be > 0".to_string()));
        }

        if self.chunking.max_chars == 0 || self.chunking.overlap_chars >= self.chunking.max_chars {
            return Err(RagError::Config(format!(
                "chunking.overlap_chars ({}) must be smaller than a non-zero chunking.max_chars ({})",
                self.chunking.overlap_chars, self.chunking.max_chars
            )));
        }

        if self.retrieval.top_k == 0 {
            return Err(RagError::Config("retrieval.top_k must be > 0".to_string()));
        }

        Ok(())
    }

    /// Create a config from explicit values (useful for testing).
    pub fn with_llm(
        api_base: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            llm: LlmConfig {
                api_base: api_base.into(),
                api_key: api_key.into(),
                model: model.into(),
                ..Default::default()
            },
            ..Default::default()
        }
    }
}
