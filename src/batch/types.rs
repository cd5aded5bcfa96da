//! Records exchanged with the bulk service and the job state machine.

use crate::error::{RagError, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Zero-padded ordinal identifiers, e.g. `chunk-000042` or `q0007`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IdScheme {
    prefix: &'static str,
    width: usize,
    /// Number shown for ordinal 0.
    base: usize,
}

/// Chunk ids: 0-based, six digits.
pub const CHUNK_IDS: IdScheme = IdScheme::new("chunk-", 6, 0);

/// Question ids: 1-based position in the test set, four digits.
pub const QUESTION_IDS: IdScheme = IdScheme::new("q", 4, 1);

impl IdScheme {
    pub const fn new(prefix: &'static str, width: usize, base: usize) -> Self {
        Self {
            prefix,
            width,
            base,
        }
    }

    /// Render the id for a 0-based ordinal.
    pub fn format(&self, ordinal: usize) -> String {
        format!(
            "{}{:0width$}",
            self.prefix,
            ordinal + self.base,
            width = self.width
        )
    }

    /// Recover the 0-based ordinal. More digits than `width` are accepted.
    pub fn parse(&self, id: &str) -> Result<usize> {
        let digits = id
            .strip_prefix(self.prefix)
            .filter(|d| d.len() >= self.width && d.bytes().all(|b| b.is_ascii_digit()))
            .ok_or_else(|| RagError::MalformedIdentifier(id.to_string()))?;

        digits
            .parse::<usize>()
            .ok()
            .and_then(|n| n.checked_sub(self.base))
            .ok_or_else(|| RagError::MalformedIdentifier(id.to_string()))
    }
}

/// Which endpoint a bulk job targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BatchEndpoint {
    Embeddings,
    ChatCompletions,
}

impl BatchEndpoint {
    pub fn path(&self) -> &'static str {
        match self {
            BatchEndpoint::Embeddings => "/v1/embeddings",
            BatchEndpoint::ChatCompletions => "/v1/chat/completions",
        }
    }
}

/// One line of a bulk input file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchRequestItem {
    pub custom_id: String,
    pub method: String,
    pub url: String,
    pub body: Value,
}

impl BatchRequestItem {
    pub fn new(custom_id: impl Into<String>, endpoint: BatchEndpoint, body: Value) -> Self {
        Self {
            custom_id: custom_id.into(),
            method: "POST".to_string(),
            url: endpoint.path().to_string(),
            body,
        }
    }
}

/// Response envelope inside an output line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchResponse {
    pub status_code: u16,
    #[serde(default)]
    pub body: Value,
}

/// One line of a bulk output file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchOutputLine {
    pub custom_id: String,
    #[serde(default)]
    pub response: Option<BatchResponse>,
    #[serde(default)]
    pub error: Option<Value>,
}

impl BatchOutputLine {
    /// Response body of a successful request, `None` for per-item failures.
    pub fn success_body(&self) -> Option<&Value> {
        if self.error.as_ref().is_some_and(|e| !e.is_null()) {
            return None;
        }
        self.response
            .as_ref()
            .filter(|r| (200..300).contains(&r.status_code))
            .map(|r| &r.body)
    }
}

/// An embedding recovered from a bulk output line.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchResultItem {
    pub custom_id: String,
    pub vector: Vec<f32>,
}

impl BatchResultItem {
    /// Extract `response.body.data[0].embedding`.
    pub fn from_output(line: &BatchOutputLine) -> Result<Self> {
        let body = line.success_body().ok_or_else(|| {
            RagError::Api(format!("request '{}' failed in batch", line.custom_id))
        })?;

        let embedding = body
            .pointer("/data/0/embedding")
            .and_then(Value::as_array)
            .ok_or_else(|| {
                RagError::Parse(format!("no embedding in output for '{}'", line.custom_id))
            })?;

        let vector = embedding
            .iter()
            .map(|v| v.as_f64().map(|f| f as f32))
            .collect::<Option<Vec<f32>>>()
            .ok_or_else(|| {
                RagError::Parse(format!("non-numeric embedding for '{}'", line.custom_id))
            })?;

        Ok(Self {
            custom_id: line.custom_id.clone(),
            vector,
        })
    }
}

/// Lifecycle of a bulk job. States only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobState {
    Submitted,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl JobState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobState::Completed | JobState::Failed | JobState::Cancelled
        )
    }

    fn rank(&self) -> u8 {
        match self {
            JobState::Submitted => 0,
            JobState::Running => 1,
            JobState::Completed | JobState::Failed | JobState::Cancelled => 2,
        }
    }

    /// Map the service's status vocabulary onto our states.
    ///
    /// `completed` is the only success spelling accepted; anything outside
    /// the list below is reported rather than guessed.
    pub fn from_service_status(status: &str) -> Result<Self> {
        match status {
            "validating" => Ok(JobState::Submitted),
            "in_progress" | "finalizing" | "cancelling" => Ok(JobState::Running),
            "completed" => Ok(JobState::Completed),
            "failed" | "expired" => Ok(JobState::Failed),
            "cancelled" => Ok(JobState::Cancelled),
            other => Err(RagError::UnknownJobStatus(other.to_string())),
        }
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            JobState::Submitted => "Submitted",
            JobState::Running => "Running",
            JobState::Completed => "Completed",
            JobState::Failed => "Failed",
            JobState::Cancelled => "Cancelled",
        };
        f.write_str(s)
    }
}

/// A submitted bulk job as last observed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchJob {
    pub job_id: String,
    pub state: JobState,
    #[serde(default)]
    pub output_ref: Option<String>,
}

impl BatchJob {
    pub fn new(job_id: impl Into<String>, state: JobState) -> Self {
        Self {
            job_id: job_id.into(),
            state,
            output_ref: None,
        }
    }

    /// Apply a fresh status snapshot, rejecting backward transitions.
    pub fn observe(&mut self, snapshot: BatchJob) -> Result<()> {
        let backwards = snapshot.state.rank() < self.state.rank();
        let terminal_changed = self.state.is_terminal() && snapshot.state != self.state;
        if backwards || terminal_changed {
            return Err(RagError::InvalidJobTransition {
                job_id: self.job_id.clone(),
                from: self.state,
                to: snapshot.state,
            });
        }

        self.state = snapshot.state;
        if snapshot.output_ref.is_some() {
            self.output_ref = snapshot.output_ref;
        }
        Ok(())
    }
}
