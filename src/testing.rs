//! In-memory doubles for the external services, shared by unit tests.

use crate::batch::{
    BatchApi, BatchEndpoint, BatchJob, BatchOutputLine, BatchRequestItem, BatchResponse,
    CHUNK_IDS, JobState, Sleeper,
};
use crate::error::{RagError, Result};
use crate::llm::{CompletionService, EmbeddingService};
use crate::persistence::{parse_jsonl, to_jsonl};
use async_trait::async_trait;
use serde_json::{Value, json};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

type Responder = Box<dyn Fn(&BatchRequestItem) -> Value + Send + Sync>;

/// Embedding for chunk ordinal `i` is `[i, 1.0]`.
fn ordinal_embedding(item: &BatchRequestItem) -> Value {
    let ordinal = CHUNK_IDS.parse(&item.custom_id).unwrap_or(0);
    json!({"object": "list", "data": [{"index": 0, "embedding": [ordinal as f32, 1.0]}]})
}

/// Embedding request items for chunks `0..n`.
pub fn embedding_items(n: usize) -> Vec<BatchRequestItem> {
    (0..n)
        .map(|i| {
            BatchRequestItem::new(
                CHUNK_IDS.format(i),
                BatchEndpoint::Embeddings,
                json!({"model": "fake-embed", "input": format!("chunk {i}")}),
            )
        })
        .collect()
}

struct MockJob {
    seq: usize,
    input_file_id: String,
    polls: usize,
    cancelled: bool,
}

#[derive(Default)]
struct MockState {
    files: HashMap<String, String>,
    jobs: HashMap<String, MockJob>,
    uploads: usize,
    creates: usize,
    calls: usize,
}

/// How a scripted job behaves on its second status check.
#[derive(Clone, Copy)]
enum Ending {
    Fail,
    Cancel,
    /// Reports `Submitted` after having been `Running`.
    Regress,
    /// Reports a status string outside the service vocabulary.
    Unknown,
}

/// Bulk service that completes each job on its second status check.
pub struct MockBatchApi {
    state: Mutex<MockState>,
    respond: Responder,
    endings: HashMap<usize, Ending>,
    failing_items: HashSet<String>,
    reverse: bool,
}

impl MockBatchApi {
    pub fn new() -> Self {
        Self::with_responder(ordinal_embedding)
    }

    pub fn with_responder(
        respond: impl Fn(&BatchRequestItem) -> Value + Send + Sync + 'static,
    ) -> Self {
        Self {
            state: Mutex::new(MockState::default()),
            respond: Box::new(respond),
            endings: HashMap::new(),
            failing_items: HashSet::new(),
            reverse: false,
        }
    }

    /// Emit output lines in reverse submission order.
    pub fn reverse_output(mut self) -> Self {
        self.reverse = true;
        self
    }

    /// The `seq`-th created job (0-based) ends Failed.
    pub fn fail_job(mut self, seq: usize) -> Self {
        self.endings.insert(seq, Ending::Fail);
        self
    }

    /// The `seq`-th created job ends Cancelled on the service side.
    pub fn cancel_job(mut self, seq: usize) -> Self {
        self.endings.insert(seq, Ending::Cancel);
        self
    }

    /// The `seq`-th created job moves backwards to Submitted.
    pub fn regress_job(mut self, seq: usize) -> Self {
        self.endings.insert(seq, Ending::Regress);
        self
    }

    /// The `seq`-th created job reports the status `succeeded`.
    pub fn unknown_status(mut self, seq: usize) -> Self {
        self.endings.insert(seq, Ending::Unknown);
        self
    }

    /// The request with this custom id gets an error response line.
    pub fn fail_item(mut self, custom_id: &str) -> Self {
        self.failing_items.insert(custom_id.to_string());
        self
    }

    pub fn created_jobs(&self) -> usize {
        self.state.lock().unwrap().creates
    }

    pub fn uploads(&self) -> usize {
        self.state.lock().unwrap().uploads
    }

    pub fn total_calls(&self) -> usize {
        self.state.lock().unwrap().calls
    }

    fn render_output(&self, input: &str) -> Result<String> {
        let requests: Vec<BatchRequestItem> = parse_jsonl(input)?;
        let mut lines: Vec<BatchOutputLine> = requests
            .iter()
            .map(|req| {
                let (status_code, body) = if self.failing_items.contains(&req.custom_id) {
                    (400, json!({"error": {"message": "rejected"}}))
                } else {
                    (200, (self.respond)(req))
                };
                BatchOutputLine {
                    custom_id: req.custom_id.clone(),
                    response: Some(BatchResponse { status_code, body }),
                    error: None,
                }
            })
            .collect();
        if self.reverse {
            lines.reverse();
        }
        to_jsonl(&lines)
    }
}

#[async_trait]
impl BatchApi for MockBatchApi {
    async fn upload(&self, _file_name: &str, content: Vec<u8>) -> Result<String> {
        let mut state = self.state.lock().unwrap();
        state.calls += 1;
        let id = format!("file_in_{}", state.uploads);
        state.uploads += 1;
        let text = String::from_utf8(content).map_err(|e| RagError::Parse(e.to_string()))?;
        state.files.insert(id.clone(), text);
        Ok(id)
    }

    async fn create(&self, input_file_id: &str, _endpoint: BatchEndpoint) -> Result<BatchJob> {
        let mut state = self.state.lock().unwrap();
        state.calls += 1;
        let seq = state.creates;
        state.creates += 1;
        let job_id = format!("batch_{}", seq);
        state.jobs.insert(
            job_id.clone(),
            MockJob {
                seq,
                input_file_id: input_file_id.to_string(),
                polls: 0,
                cancelled: false,
            },
        );
        Ok(BatchJob::new(job_id, JobState::Submitted))
    }

    async fn status(&self, job_id: &str) -> Result<BatchJob> {
        let mut state = self.state.lock().unwrap();
        state.calls += 1;
        let job = state
            .jobs
            .get_mut(job_id)
            .ok_or_else(|| RagError::Api(format!("no such job {}", job_id)))?;
        job.polls += 1;

        let (seq, polls, cancelled) = (job.seq, job.polls, job.cancelled);
        let input_file_id = job.input_file_id.clone();

        let snapshot = if cancelled {
            BatchJob::new(job_id, JobState::Cancelled)
        } else if polls < 2 {
            BatchJob::new(job_id, JobState::Running)
        } else if let Some(ending) = self.endings.get(&seq) {
            match ending {
                Ending::Fail => BatchJob::new(job_id, JobState::Failed),
                Ending::Cancel => BatchJob::new(job_id, JobState::Cancelled),
                Ending::Regress => BatchJob::new(job_id, JobState::Submitted),
                Ending::Unknown => {
                    BatchJob::new(job_id, JobState::from_service_status("succeeded")?)
                }
            }
        } else {
            let output_id = format!("file_out_{}", seq);
            if !state.files.contains_key(&output_id) {
                let input = state.files.get(&input_file_id).cloned().unwrap_or_default();
                let output = self.render_output(&input)?;
                state.files.insert(output_id.clone(), output);
            }
            BatchJob {
                output_ref: Some(output_id),
                ..BatchJob::new(job_id, JobState::Completed)
            }
        };
        Ok(snapshot)
    }

    async fn download(&self, file_id: &str) -> Result<String> {
        let mut state = self.state.lock().unwrap();
        state.calls += 1;
        state
            .files
            .get(file_id)
            .cloned()
            .ok_or_else(|| RagError::Api(format!("no such file {}", file_id)))
    }

    async fn cancel(&self, job_id: &str) -> Result<BatchJob> {
        let mut state = self.state.lock().unwrap();
        state.calls += 1;
        let job = state
            .jobs
            .get_mut(job_id)
            .ok_or_else(|| RagError::Api(format!("no such job {}", job_id)))?;
        job.cancelled = true;
        Ok(BatchJob::new(job_id, JobState::Cancelled))
    }
}

/// Sleeper that records requested durations and returns at once.
#[derive(Default)]
pub struct InstantSleeper {
    slept: Mutex<Vec<Duration>>,
}

impl InstantSleeper {
    pub fn slept(&self) -> Vec<Duration> {
        self.slept.lock().unwrap().clone()
    }
}

#[async_trait]
impl Sleeper for InstantSleeper {
    async fn sleep(&self, duration: Duration) {
        self.slept.lock().unwrap().push(duration);
    }
}

/// Embedder with fixed vectors per text; unknown texts get `fallback`.
pub struct FakeEmbedder {
    model: String,
    vectors: HashMap<String, Vec<f32>>,
    fallback: Vec<f32>,
}

impl FakeEmbedder {
    pub fn new(model: &str, fallback: Vec<f32>) -> Self {
        Self {
            model: model.to_string(),
            vectors: HashMap::new(),
            fallback,
        }
    }

    pub fn with(mut self, text: &str, vector: Vec<f32>) -> Self {
        self.vectors.insert(text.to_string(), vector);
        self
    }
}

#[async_trait]
impl EmbeddingService for FakeEmbedder {
    async fn embed(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(inputs
            .iter()
            .map(|t| self.vectors.get(t).cloned().unwrap_or_else(|| self.fallback.clone()))
            .collect())
    }

    fn model(&self) -> &str {
        &self.model
    }
}

/// Completion service replaying scripted replies; `None` simulates a failed call.
pub struct ScriptedCompletion {
    replies: Mutex<VecDeque<Option<String>>>,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedCompletion {
    pub fn new(replies: &[Option<&str>]) -> Self {
        Self {
            replies: Mutex::new(replies.iter().map(|r| r.map(str::to_string)).collect()),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl CompletionService for ScriptedCompletion {
    async fn complete(&self, prompt: &str) -> Result<String> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        match self.replies.lock().unwrap().pop_front() {
            Some(Some(reply)) => Ok(reply),
            Some(None) => Err(RagError::Api("service unavailable".to_string())),
            None => Err(RagError::Api("no scripted reply left".to_string())),
        }
    }
}
