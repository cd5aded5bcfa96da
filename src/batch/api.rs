//! Bulk job service interface and an OpenAI-compatible HTTP implementation.

use super::types::{BatchEndpoint, BatchJob, JobState};
use crate::config::LlmConfig;
use crate::error::{RagError, Result};
use async_trait::async_trait;
use reqwest::Client;
use reqwest::multipart::{Form, Part};
use serde::{Deserialize, Serialize};

/// Operations the orchestrator needs from a bulk service.
#[async_trait]
pub trait BatchApi: Send + Sync {
    /// Upload a JSON-lines input file and return its file id.
    async fn upload(&self, file_name: &str, content: Vec<u8>) -> Result<String>;

    /// Create a job over an uploaded file.
    async fn create(&self, input_file_id: &str, endpoint: BatchEndpoint) -> Result<BatchJob>;

    /// Fetch the current state of a job.
    async fn status(&self, job_id: &str) -> Result<BatchJob>;

    /// Download the raw content of an output file.
    async fn download(&self, file_id: &str) -> Result<String>;

    /// Request cancellation of a job.
    async fn cancel(&self, job_id: &str) -> Result<BatchJob>;
}

#[derive(Debug, Serialize)]
struct CreateBatchRequest<'a> {
    input_file_id: &'a str,
    endpoint: &'a str,
    completion_window: &'a str,
}

#[derive(Debug, Deserialize)]
struct FileObject {
    id: String,
}

#[derive(Debug, Deserialize)]
struct BatchObject {
    id: String,
    status: String,
    #[serde(default)]
    output_file_id: Option<String>,
}

impl TryFrom<BatchObject> for BatchJob {
    type Error = RagError;

    fn try_from(obj: BatchObject) -> Result<Self> {
        Ok(BatchJob {
            state: JobState::from_service_status(&obj.status)?,
            job_id: obj.id,
            output_ref: obj.output_file_id,
        })
    }
}

#[derive(Debug, Deserialize)]
struct ApiError {
    error: ApiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    message: String,
}

/// OpenAI-compatible `/v1/files` + `/v1/batches` client.
#[derive(Clone)]
pub struct OpenAiBatchApi {
    client: Client,
    api_base: String,
    api_key: String,
    completion_window: String,
}

impl OpenAiBatchApi {
    pub fn new(config: &LlmConfig, completion_window: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            api_base: config.api_base.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            completion_window: completion_window.into(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/v1/{}", self.api_base, path)
    }

    /// Read the body, turning non-2xx responses into [`RagError::Api`].
    async fn checked_body(response: reqwest::Response) -> Result<String> {
        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            if let Ok(api_error) = serde_json::from_str::<ApiError>(&body) {
                return Err(RagError::Api(format!(
                    "API error ({}): {}",
                    status, api_error.error.message
                )));
            }
            return Err(RagError::Api(format!("Request failed ({}): {}", status, body)));
        }

        Ok(body)
    }

    async fn batch_object(response: reqwest::Response) -> Result<BatchJob> {
        let body = Self::checked_body(response).await?;
        let obj: BatchObject = serde_json::from_str(&body)?;
        obj.try_into()
    }
}

#[async_trait]
impl BatchApi for OpenAiBatchApi {
    async fn upload(&self, file_name: &str, content: Vec<u8>) -> Result<String> {
        let part = Part::bytes(content)
            .file_name(file_name.to_string())
            .mime_str("application/jsonl")?;
        let form = Form::new().text("purpose", "batch").part("file", part);

        let response = self
            .client
            .post(self.url("files"))
            .bearer_auth(&self.api_key)
            .multipart(form)
            .send()
            .await?;

        let body = Self::checked_body(response).await?;
        let file: FileObject = serde_json::from_str(&body)?;
        Ok(file.id)
    }

    async fn create(&self, input_file_id: &str, endpoint: BatchEndpoint) -> Result<BatchJob> {
        let request = CreateBatchRequest {
            input_file_id,
            endpoint: endpoint.path(),
            completion_window: &self.completion_window,
        };

        let response = self
            .client
            .post(self.url("batches"))
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await?;

        Self::batch_object(response).await
    }

    async fn status(&self, job_id: &str) -> Result<BatchJob> {
        let response = self
            .client
            .get(self.url(&format!("batches/{}", job_id)))
            .bearer_auth(&self.api_key)
            .send()
            .await?;

        Self::batch_object(response).await
    }

    async fn download(&self, file_id: &str) -> Result<String> {
        let response = self
            .client
            .get(self.url(&format!("files/{}/content", file_id)))
            .bearer_auth(&self.api_key)
            .send()
            .await?;

        Self::checked_body(response).await
    }

    async fn cancel(&self, job_id: &str) -> Result<BatchJob> {
        let response = self
            .client
            .post(self.url(&format!("batches/{}/cancel", job_id)))
            .bearer_auth(&self.api_key)
            .send()
            .await?;

        Self::batch_object(response).await
    }
}
