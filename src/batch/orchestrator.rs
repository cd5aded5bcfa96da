//! Partitioned submission, polling and download of bulk jobs.
//!
//! Each run lives in its own directory:
//!
//! ```text
//! <work_dir>/<run>/manifest.json
//! <work_dir>/<run>/part-0000.input.jsonl
//! <work_dir>/<run>/part-0000.output.jsonl
//! ```
//!
//! The manifest is rewritten after every step, so an interrupted run picks
//! up where it stopped: downloaded parts are read from disk, submitted jobs
//! are polled again instead of resubmitted.

use super::api::BatchApi;
use super::types::{BatchEndpoint, BatchJob, BatchOutputLine, BatchRequestItem, JobState};
use crate::config::BatchConfig;
use crate::error::{RagError, Result};
use crate::persistence::{atomic_write, read_json, read_jsonl, to_jsonl, write_json};
use async_trait::async_trait;
use crc32fast::Hasher as Crc32;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

const MANIFEST_FILE: &str = "manifest.json";

/// Suspension between status checks.
#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

/// Real-time sleeper backed by the tokio timer.
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Options for a bulk run.
#[derive(Debug, Clone)]
pub struct BatchOptions {
    /// Maximum request lines per job.
    pub max_batch_size: usize,
    /// Delay between status checks of a running job.
    pub poll_interval: Duration,
    /// Clear parts recorded as Failed/Cancelled so they are submitted again.
    pub retry_failed: bool,
}

impl From<&BatchConfig> for BatchOptions {
    fn from(config: &BatchConfig) -> Self {
        Self {
            max_batch_size: config.max_batch_size,
            poll_interval: config.poll_interval(),
            retry_failed: false,
        }
    }
}

/// Split items into contiguous groups of at most `max_batch_size`.
pub fn partition<T>(items: &[T], max_batch_size: usize) -> Result<Vec<&[T]>> {
    if max_batch_size == 0 {
        return Err(RagError::Config("max_batch_size must be > 0".to_string()));
    }
    Ok(items.chunks(max_batch_size).collect())
}

/// Progress of one sub-batch, as recorded in the manifest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PartRecord {
    pub index: usize,
    /// First item of the part (inclusive).
    pub start: usize,
    /// End of the part (exclusive).
    pub end: usize,
    /// CRC32 of the part's serialized input lines.
    #[serde(default)]
    pub checksum: u32,
    #[serde(default)]
    pub input_file_id: Option<String>,
    #[serde(default)]
    pub job: Option<BatchJob>,
    /// Output file name relative to the run directory.
    #[serde(default)]
    pub output_file: Option<String>,
}

/// Where a part stands; derived from its record and the files on disk.
#[derive(Debug)]
enum PartPhase {
    Pending,
    Uploaded(String),
    Polling(BatchJob),
    Completed(BatchJob),
    Downloaded(PathBuf),
    Failed(BatchJob),
}

impl PartRecord {
    fn phase(&self, run_dir: &Path) -> PartPhase {
        if let Some(file) = &self.output_file {
            let path = run_dir.join(file);
            if path.exists() {
                return PartPhase::Downloaded(path);
            }
        }

        match &self.job {
            Some(job) if job.state == JobState::Completed => PartPhase::Completed(job.clone()),
            Some(job) if job.state.is_terminal() => PartPhase::Failed(job.clone()),
            Some(job) => PartPhase::Polling(job.clone()),
            None => match &self.input_file_id {
                Some(id) => PartPhase::Uploaded(id.clone()),
                None => PartPhase::Pending,
            },
        }
    }
}

/// Persistent record of a bulk run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunManifest {
    pub endpoint: BatchEndpoint,
    pub total_items: usize,
    pub max_batch_size: usize,
    pub first_id: Option<String>,
    pub last_id: Option<String>,
    pub parts: Vec<PartRecord>,
}

fn checksum(content: &str) -> u32 {
    let mut hasher = Crc32::new();
    hasher.update(content.as_bytes());
    hasher.finalize()
}

impl RunManifest {
    fn new(endpoint: BatchEndpoint, items: &[BatchRequestItem], max_batch_size: usize) -> Result<Self> {
        let mut parts = Vec::new();
        for (index, group) in items.chunks(max_batch_size).enumerate() {
            parts.push(PartRecord {
                index,
                start: index * max_batch_size,
                end: index * max_batch_size + group.len(),
                checksum: checksum(&to_jsonl(group)?),
                input_file_id: None,
                job: None,
                output_file: None,
            });
        }

        Ok(Self {
            endpoint,
            total_items: items.len(),
            max_batch_size,
            first_id: items.first().map(|i| i.custom_id.clone()),
            last_id: items.last().map(|i| i.custom_id.clone()),
            parts,
        })
    }

    /// Ensure a stored manifest describes the same request set.
    ///
    /// Ids are positional, so part contents are compared by checksum too.
    fn check_matches(&self, other: &RunManifest) -> Result<()> {
        let same = self.endpoint == other.endpoint
            && self.total_items == other.total_items
            && self.max_batch_size == other.max_batch_size
            && self.first_id == other.first_id
            && self.last_id == other.last_id;

        if !same {
            return Err(RagError::ManifestMismatch(format!(
                "stored run has {} items in groups of {} ({:?}..{:?}), request has {} in groups of {} ({:?}..{:?})",
                self.total_items,
                self.max_batch_size,
                self.first_id,
                self.last_id,
                other.total_items,
                other.max_batch_size,
                other.first_id,
                other.last_id
            )));
        }

        for (stored, requested) in self.parts.iter().zip(&other.parts) {
            if stored.checksum != requested.checksum {
                return Err(RagError::ManifestMismatch(format!(
                    "input of part {} changed since the run started (checksum {:08x}, now {:08x}); use a new run name",
                    stored.index, stored.checksum, requested.checksum
                )));
            }
        }
        Ok(())
    }

    fn clear_failed(&mut self) -> usize {
        let mut cleared = 0;
        for part in &mut self.parts {
            let failed = part
                .job
                .as_ref()
                .is_some_and(|j| j.state.is_terminal() && j.state != JobState::Completed);
            if failed {
                part.job = None;
                part.input_file_id = None;
                cleared += 1;
            }
        }
        cleared
    }
}

enum PartOutcome {
    Completed(Vec<BatchOutputLine>),
    Failed(BatchJob),
}

fn part_file_name(index: usize, kind: &str) -> String {
    format!("part-{:04}.{}.jsonl", index, kind)
}

/// Drives bulk runs against a [`BatchApi`].
pub struct BatchOrchestrator {
    api: Arc<dyn BatchApi>,
    sleeper: Arc<dyn Sleeper>,
    work_dir: PathBuf,
    options: BatchOptions,
}

impl BatchOrchestrator {
    pub fn new(api: Arc<dyn BatchApi>, work_dir: impl Into<PathBuf>, options: BatchOptions) -> Self {
        Self {
            api,
            sleeper: Arc::new(TokioSleeper),
            work_dir: work_dir.into(),
            options,
        }
    }

    /// Replace the sleeper (tests use one that returns immediately).
    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    pub fn run_dir(&self, run: &str) -> PathBuf {
        self.work_dir.join(run)
    }

    fn manifest_path(&self, run: &str) -> PathBuf {
        self.run_dir(run).join(MANIFEST_FILE)
    }

    /// Load the manifest of a run, if one was started.
    pub fn manifest(&self, run: &str) -> Result<Option<RunManifest>> {
        let path = self.manifest_path(run);
        if path.exists() {
            Ok(Some(read_json(&path)?))
        } else {
            Ok(None)
        }
    }

    fn save_manifest(&self, run: &str, manifest: &RunManifest) -> Result<()> {
        write_json(&self.manifest_path(run), manifest)
    }

    /// Submit `items` in groups, wait for every job and return all output lines.
    ///
    /// Output order is whatever the service produced; callers align by
    /// `custom_id`. Every group is attempted even if another fails; the
    /// first failed job is then returned as [`RagError::BatchJobFailed`].
    pub async fn submit_and_wait(
        &self,
        run: &str,
        endpoint: BatchEndpoint,
        items: &[BatchRequestItem],
    ) -> Result<Vec<BatchOutputLine>> {
        if items.is_empty() {
            return Ok(Vec::new());
        }
        partition(items, self.options.max_batch_size)?;

        let requested = RunManifest::new(endpoint, items, self.options.max_batch_size)?;
        let mut manifest = match self.manifest(run)? {
            Some(stored) => {
                stored.check_matches(&requested)?;
                info!("Resuming batch run '{}' ({} parts)", run, stored.parts.len());
                stored
            }
            None => requested,
        };

        if self.options.retry_failed {
            let cleared = manifest.clear_failed();
            if cleared > 0 {
                info!("Resubmitting {} failed part(s) of '{}'", cleared, run);
            }
        }
        self.save_manifest(run, &manifest)?;

        let mut outputs = Vec::new();
        let mut failures = Vec::new();

        for index in 0..manifest.parts.len() {
            let (start, end) = (manifest.parts[index].start, manifest.parts[index].end);
            match self
                .run_part(run, &mut manifest, index, endpoint, &items[start..end])
                .await?
            {
                PartOutcome::Completed(lines) => outputs.extend(lines),
                PartOutcome::Failed(job) => {
                    warn!(
                        "Batch part {} of '{}' ended as {} (job {})",
                        index, run, job.state, job.job_id
                    );
                    failures.push(job);
                }
            }
        }

        if let Some(job) = failures.into_iter().next() {
            return Err(RagError::BatchJobFailed {
                job_id: job.job_id,
                state: job.state,
            });
        }

        info!("Batch run '{}' complete: {} output lines", run, outputs.len());
        Ok(outputs)
    }

    /// Advance one part until it is downloaded or has failed.
    async fn run_part(
        &self,
        run: &str,
        manifest: &mut RunManifest,
        index: usize,
        endpoint: BatchEndpoint,
        items: &[BatchRequestItem],
    ) -> Result<PartOutcome> {
        let run_dir = self.run_dir(run);
        let mut polls = 0usize;

        loop {
            match manifest.parts[index].phase(&run_dir) {
                PartPhase::Pending => {
                    let name = part_file_name(index, "input");
                    let content = to_jsonl(items)?;
                    atomic_write(&run_dir.join(&name), content.as_bytes())?;

                    let file_id = self.api.upload(&name, content.into_bytes()).await?;
                    info!("Uploaded {} ({} requests) as {}", name, items.len(), file_id);
                    manifest.parts[index].input_file_id = Some(file_id);
                }
                PartPhase::Uploaded(file_id) => {
                    let job = self.api.create(&file_id, endpoint).await?;
                    info!("Created batch job {} for part {}", job.job_id, index);
                    manifest.parts[index].job = Some(job);
                }
                PartPhase::Polling(mut job) => {
                    if polls > 0 {
                        self.sleeper.sleep(self.options.poll_interval).await;
                    }
                    polls += 1;

                    let snapshot = self.api.status(&job.job_id).await?;
                    job.observe(snapshot)?;
                    debug!("Batch job {} status: {}", job.job_id, job.state);
                    manifest.parts[index].job = Some(job);
                }
                PartPhase::Completed(job) => {
                    let output_ref = job
                        .output_ref
                        .clone()
                        .ok_or_else(|| RagError::BatchOutputMissing(job.job_id.clone()))?;
                    let content = self.api.download(&output_ref).await?;

                    let name = part_file_name(index, "output");
                    atomic_write(&run_dir.join(&name), content.as_bytes())?;
                    info!("Downloaded output of {} to {}", job.job_id, name);
                    manifest.parts[index].output_file = Some(name);
                }
                PartPhase::Downloaded(path) => {
                    return Ok(PartOutcome::Completed(read_jsonl(&path)?));
                }
                PartPhase::Failed(job) => return Ok(PartOutcome::Failed(job)),
            }

            self.save_manifest(run, manifest)?;
        }
    }

    /// Read every downloaded output of a finished run without contacting the service.
    pub fn load_outputs(&self, run: &str) -> Result<Vec<BatchOutputLine>> {
        let manifest = self.manifest(run)?.ok_or_else(|| {
            RagError::ManifestMismatch(format!("no batch run named '{}'", run))
        })?;
        let run_dir = self.run_dir(run);

        let mut outputs = Vec::new();
        for part in &manifest.parts {
            match part.phase(&run_dir) {
                PartPhase::Downloaded(path) => outputs.extend(read_jsonl::<BatchOutputLine>(&path)?),
                _ => {
                    let job_id = part
                        .job
                        .as_ref()
                        .map(|j| j.job_id.clone())
                        .unwrap_or_else(|| part_file_name(part.index, "input"));
                    return Err(RagError::BatchOutputMissing(job_id));
                }
            }
        }
        Ok(outputs)
    }

    /// Cancel every job of a run that has not reached a terminal state.
    ///
    /// Already downloaded parts stay on disk for a later resumed run.
    pub async fn cancel(&self, run: &str) -> Result<usize> {
        let Some(mut manifest) = self.manifest(run)? else {
            return Ok(0);
        };

        let mut cancelled = 0;
        for part in &mut manifest.parts {
            let Some(job) = part.job.as_mut().filter(|j| !j.state.is_terminal()) else {
                continue;
            };
            let snapshot = self.api.cancel(&job.job_id).await?;
            job.observe(snapshot)?;
            info!("Cancellation requested for {} (now {})", job.job_id, job.state);
            cancelled += 1;
        }

        self.save_manifest(run, &manifest)?;
        Ok(cancelled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::batch::types::CHUNK_IDS;
    use crate::testing::{InstantSleeper, MockBatchApi, embedding_items};
    use std::collections::BTreeSet;
    use tempfile::TempDir;

    fn orchestrator(
        api: Arc<MockBatchApi>,
        dir: &TempDir,
        max: usize,
        sleeper: Arc<InstantSleeper>,
    ) -> BatchOrchestrator {
        let options = BatchOptions {
            max_batch_size: max,
            poll_interval: Duration::from_secs(60),
            retry_failed: false,
        };
        BatchOrchestrator::new(api, dir.path(), options).with_sleeper(sleeper)
    }

    #[test]
    fn test_partition_sizes() {
        let items: Vec<usize> = (0..10).collect();
        let parts = partition(&items, 4).unwrap();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[2], &[8, 9]);
        assert!(partition(&items, 0).is_err());
    }

    #[tokio::test]
    async fn test_issues_ceil_n_over_m_jobs_and_covers_all_ordinals() {
        let dir = TempDir::new().unwrap();
        let api = Arc::new(MockBatchApi::new().reverse_output());
        let sleeper = Arc::new(InstantSleeper::default());
        let orch = orchestrator(api.clone(), &dir, 3, sleeper.clone());

        let items = embedding_items(10);
        let lines = orch
            .submit_and_wait("emb", BatchEndpoint::Embeddings, &items)
            .await
            .unwrap();

        assert_eq!(api.created_jobs(), 4);
        let ordinals: BTreeSet<usize> = lines
            .iter()
            .map(|l| CHUNK_IDS.parse(&l.custom_id).unwrap())
            .collect();
        assert_eq!(lines.len(), 10);
        assert_eq!(ordinals, (0..10).collect());

        // Every job was polled more than once with the configured cadence.
        assert!(sleeper.slept().iter().all(|d| *d == Duration::from_secs(60)));
        assert_eq!(sleeper.slept().len(), 4);
    }

    #[tokio::test]
    async fn test_persists_inputs_outputs_and_manifest() {
        let dir = TempDir::new().unwrap();
        let api = Arc::new(MockBatchApi::new());
        let orch = orchestrator(api, &dir, 2, Arc::new(InstantSleeper::default()));

        orch.submit_and_wait("emb", BatchEndpoint::Embeddings, &embedding_items(3))
            .await
            .unwrap();

        let run_dir = dir.path().join("emb");
        for name in [
            "manifest.json",
            "part-0000.input.jsonl",
            "part-0000.output.jsonl",
            "part-0001.input.jsonl",
            "part-0001.output.jsonl",
        ] {
            assert!(run_dir.join(name).exists(), "{name}");
        }

        let manifest = orch.manifest("emb").unwrap().unwrap();
        assert_eq!(manifest.parts.len(), 2);
        assert!(manifest
            .parts
            .iter()
            .all(|p| p.job.as_ref().unwrap().state == JobState::Completed));
    }

    #[tokio::test]
    async fn test_rerun_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let api = Arc::new(MockBatchApi::new());
        let orch = orchestrator(api.clone(), &dir, 4, Arc::new(InstantSleeper::default()));
        let items = embedding_items(6);

        let first = orch
            .submit_and_wait("emb", BatchEndpoint::Embeddings, &items)
            .await
            .unwrap();
        let calls_after_first = api.total_calls();

        let second = orch
            .submit_and_wait("emb", BatchEndpoint::Embeddings, &items)
            .await
            .unwrap();

        assert_eq!(first, second);
        assert_eq!(api.total_calls(), calls_after_first);
        assert_eq!(orch.load_outputs("emb").unwrap().len(), 6);
    }

    #[tokio::test]
    async fn test_resume_polls_existing_job_without_resubmitting() {
        let dir = TempDir::new().unwrap();
        let api = Arc::new(MockBatchApi::new());
        let orch = orchestrator(api.clone(), &dir, 10, Arc::new(InstantSleeper::default()));
        let items = embedding_items(2);

        // Simulate a run that was interrupted right after submission.
        let file_id = api.upload("part-0000.input.jsonl", to_jsonl(&items).unwrap().into_bytes()).await.unwrap();
        let job = api.create(&file_id, BatchEndpoint::Embeddings).await.unwrap();
        let mut manifest = RunManifest::new(BatchEndpoint::Embeddings, &items, 10).unwrap();
        manifest.parts[0].input_file_id = Some(file_id);
        manifest.parts[0].job = Some(job);
        write_json(&dir.path().join("emb").join(MANIFEST_FILE), &manifest).unwrap();

        let lines = orch
            .submit_and_wait("emb", BatchEndpoint::Embeddings, &items)
            .await
            .unwrap();

        assert_eq!(lines.len(), 2);
        assert_eq!(api.created_jobs(), 1);
        assert_eq!(api.uploads(), 1);
    }

    #[tokio::test]
    async fn test_failed_part_reported_after_other_parts_complete() {
        let dir = TempDir::new().unwrap();
        let api = Arc::new(MockBatchApi::new().fail_job(0));
        let orch = orchestrator(api.clone(), &dir, 2, Arc::new(InstantSleeper::default()));
        let items = embedding_items(4);

        let err = orch
            .submit_and_wait("emb", BatchEndpoint::Embeddings, &items)
            .await
            .unwrap_err();

        match err {
            RagError::BatchJobFailed { job_id, state } => {
                assert_eq!(job_id, "batch_0");
                assert_eq!(state, JobState::Failed);
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(api.created_jobs(), 2);
        assert!(dir.path().join("emb/part-0001.output.jsonl").exists());

        // No automatic retry: a plain rerun reports the same failure.
        assert!(orch
            .submit_and_wait("emb", BatchEndpoint::Embeddings, &items)
            .await
            .is_err());
        assert_eq!(api.created_jobs(), 2);
    }

    #[tokio::test]
    async fn test_retry_failed_resubmits_only_failed_parts() {
        let dir = TempDir::new().unwrap();
        let api = Arc::new(MockBatchApi::new().fail_job(0));
        let items = embedding_items(4);

        let orch = orchestrator(api.clone(), &dir, 2, Arc::new(InstantSleeper::default()));
        assert!(orch
            .submit_and_wait("emb", BatchEndpoint::Embeddings, &items)
            .await
            .is_err());

        let retry = BatchOrchestrator::new(
            api.clone(),
            dir.path(),
            BatchOptions {
                max_batch_size: 2,
                poll_interval: Duration::from_secs(1),
                retry_failed: true,
            },
        )
        .with_sleeper(Arc::new(InstantSleeper::default()));

        let lines = retry
            .submit_and_wait("emb", BatchEndpoint::Embeddings, &items)
            .await
            .unwrap();
        assert_eq!(lines.len(), 4);
        assert_eq!(api.created_jobs(), 3);
    }

    #[tokio::test]
    async fn test_manifest_mismatch_rejected() {
        let dir = TempDir::new().unwrap();
        let api = Arc::new(MockBatchApi::new());
        let orch = orchestrator(api, &dir, 2, Arc::new(InstantSleeper::default()));

        orch.submit_and_wait("emb", BatchEndpoint::Embeddings, &embedding_items(3))
            .await
            .unwrap();
        let err = orch
            .submit_and_wait("emb", BatchEndpoint::Embeddings, &embedding_items(5))
            .await
            .unwrap_err();
        assert!(matches!(err, RagError::ManifestMismatch(_)));
    }

    #[tokio::test]
    async fn test_cancel_live_jobs() {
        let dir = TempDir::new().unwrap();
        let api = Arc::new(MockBatchApi::new());
        let orch = orchestrator(api.clone(), &dir, 10, Arc::new(InstantSleeper::default()));
        let items = embedding_items(2);

        let file_id = api.upload("in.jsonl", to_jsonl(&items).unwrap().into_bytes()).await.unwrap();
        let job = api.create(&file_id, BatchEndpoint::Embeddings).await.unwrap();
        let mut manifest = RunManifest::new(BatchEndpoint::Embeddings, &items, 10).unwrap();
        manifest.parts[0].job = Some(job);
        write_json(&dir.path().join("emb").join(MANIFEST_FILE), &manifest).unwrap();

        assert_eq!(orch.cancel("emb").await.unwrap(), 1);
        let stored = orch.manifest("emb").unwrap().unwrap();
        assert_eq!(stored.parts[0].job.as_ref().unwrap().state, JobState::Cancelled);

        assert_eq!(orch.cancel("missing").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_empty_request_set_submits_nothing() {
        let dir = TempDir::new().unwrap();
        let api = Arc::new(MockBatchApi::new());
        let orch = orchestrator(api.clone(), &dir, 10, Arc::new(InstantSleeper::default()));

        let lines = orch
            .submit_and_wait("emb", BatchEndpoint::Embeddings, &[])
            .await
            .unwrap();
        assert!(lines.is_empty());
        assert_eq!(api.total_calls(), 0);
    }

    fn run_with(api: MockBatchApi, dir: &TempDir) -> (Arc<MockBatchApi>, BatchOrchestrator) {
        let api = Arc::new(api);
        let orch = orchestrator(api.clone(), dir, 10, Arc::new(InstantSleeper::default()));
        (api, orch)
    }

    #[tokio::test]
    async fn test_changed_inputs_with_same_ids_are_rejected() {
        let dir = TempDir::new().unwrap();
        let (api, orch) = run_with(MockBatchApi::new(), &dir);

        let first = embedding_items(3);
        orch.submit_and_wait("emb", BatchEndpoint::Embeddings, &first)
            .await
            .unwrap();
        let calls = api.total_calls();

        let mut edited = embedding_items(3);
        edited[1].body["input"] = serde_json::json!("a different chunk text");
        let err = orch
            .submit_and_wait("emb", BatchEndpoint::Embeddings, &edited)
            .await
            .unwrap_err();

        match err {
            RagError::ManifestMismatch(msg) => assert!(msg.contains("part 0"), "{msg}"),
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(api.total_calls(), calls);
    }

    #[tokio::test]
    async fn test_service_cancelled_part_is_reported_as_failed_job() {
        let dir = TempDir::new().unwrap();
        let (_, orch) = run_with(MockBatchApi::new().cancel_job(0), &dir);

        let err = orch
            .submit_and_wait("emb", BatchEndpoint::Embeddings, &embedding_items(2))
            .await
            .unwrap_err();
        match err {
            RagError::BatchJobFailed { job_id, state } => {
                assert_eq!(job_id, "batch_0");
                assert_eq!(state, JobState::Cancelled);
            }
            other => panic!("unexpected error: {other}"),
        }

        let stored = orch.manifest("emb").unwrap().unwrap();
        assert_eq!(stored.parts[0].job.as_ref().unwrap().state, JobState::Cancelled);
        assert!(stored.parts[0].output_file.is_none());
    }

    #[tokio::test]
    async fn test_backward_status_aborts_polling() {
        let dir = TempDir::new().unwrap();
        let (_, orch) = run_with(MockBatchApi::new().regress_job(0), &dir);

        let err = orch
            .submit_and_wait("emb", BatchEndpoint::Embeddings, &embedding_items(2))
            .await
            .unwrap_err();
        match err {
            RagError::InvalidJobTransition { job_id, from, to } => {
                assert_eq!(job_id, "batch_0");
                assert_eq!(from, JobState::Running);
                assert_eq!(to, JobState::Submitted);
            }
            other => panic!("unexpected error: {other}"),
        }

        // The last good state is what the manifest keeps.
        let stored = orch.manifest("emb").unwrap().unwrap();
        assert_eq!(stored.parts[0].job.as_ref().unwrap().state, JobState::Running);
    }

    #[tokio::test]
    async fn test_unknown_status_aborts_polling() {
        let dir = TempDir::new().unwrap();
        let (_, orch) = run_with(MockBatchApi::new().unknown_status(0), &dir);

        let err = orch
            .submit_and_wait("emb", BatchEndpoint::Embeddings, &embedding_items(2))
            .await
            .unwrap_err();
        assert!(matches!(err, RagError::UnknownJobStatus(ref s) if s == "succeeded"), "{err}");
    }
}
