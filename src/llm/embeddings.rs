//! OpenAI-compatible embeddings client.

use crate::config::{EmbeddingConfig, LlmConfig};
use crate::error::{RagError, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Anything that maps texts to vectors with a fixed model.
#[async_trait]
pub trait EmbeddingService: Send + Sync {
    /// Embed texts; the result has one vector per input, in input order.
    async fn embed(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>>;

    /// Model identifier, recorded in the index for consistency checks.
    fn model(&self) -> &str;

    /// Embed a single query string.
    async fn embed_query(&self, query: &str) -> Result<Vec<f32>> {
        self.embed(&[query.to_string()])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| RagError::Api("embedding response contained no vectors".to_string()))
    }
}

/// Request body for `/v1/embeddings`. Also used as a bulk request body.
#[derive(Debug, Serialize)]
pub struct EmbeddingRequest<'a, I: Serialize> {
    pub model: &'a str,
    pub input: I,
    pub encoding_format: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dimensions: Option<usize>,
}

impl<'a> EmbeddingRequest<'a, &'a str> {
    /// Bulk body for one chunk.
    pub fn single(config: &'a EmbeddingConfig, text: &'a str) -> Self {
        Self {
            model: &config.model,
            input: text,
            encoding_format: "float",
            dimensions: config.dimensions,
        }
    }
}

impl<I: Serialize> EmbeddingRequest<'_, I> {
    pub fn to_value(&self) -> Result<Value> {
        serde_json::to_value(self).map_err(|e| RagError::Serialization(e.to_string()))
    }
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
    #[serde(default)]
    index: usize,
}

/// Embeddings client for OpenAI-compatible endpoints.
#[derive(Clone)]
pub struct OpenAiEmbedder {
    client: Client,
    api_base: String,
    api_key: String,
    config: EmbeddingConfig,
}

impl OpenAiEmbedder {
    pub fn new(llm: &LlmConfig, config: EmbeddingConfig) -> Self {
        Self {
            client: Client::new(),
            api_base: llm.api_base.trim_end_matches('/').to_string(),
            api_key: llm.api_key.clone(),
            config,
        }
    }

    fn endpoint(&self) -> String {
        format!("{}/v1/embeddings", self.api_base)
    }
}

#[async_trait]
impl EmbeddingService for OpenAiEmbedder {
    async fn embed(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>> {
        if inputs.is_empty() {
            return Ok(Vec::new());
        }

        let request = EmbeddingRequest {
            model: &self.config.model,
            input: inputs,
            encoding_format: "float",
            dimensions: self.config.dimensions,
        };

        let response = self
            .client
            .post(self.endpoint())
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(RagError::Api(format!(
                "embeddings request failed ({}): {}",
                status, body
            )));
        }

        let mut parsed: EmbeddingResponse = serde_json::from_str(&body)?;
        parsed.data.sort_by_key(|entry| entry.index);
        if parsed.data.len() != inputs.len() {
            return Err(RagError::Api(format!(
                "service returned {} embeddings for {} inputs",
                parsed.data.len(),
                inputs.len()
            )));
        }

        Ok(parsed.data.into_iter().map(|d| d.embedding).collect())
    }

    fn model(&self) -> &str {
        &self.config.model
    }
}
