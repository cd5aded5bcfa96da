//! Asynchronous bulk jobs: request records, the service interface and the
//! orchestrator that partitions, submits, polls and downloads them.

mod api;
mod orchestrator;
mod types;

pub use api::{BatchApi, OpenAiBatchApi};
pub use orchestrator::{
    BatchOptions, BatchOrchestrator, PartRecord, RunManifest, Sleeper, TokioSleeper, partition,
};
pub use types::{
    BatchEndpoint, BatchJob, BatchOutputLine, BatchRequestItem, BatchResponse, BatchResultItem,
    CHUNK_IDS, IdScheme, JobState, QUESTION_IDS,
};
