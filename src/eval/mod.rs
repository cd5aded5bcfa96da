//! Evaluation of the answering agents against a labeled test set.
//!
//! This module provides:
//! - Test set loading (KMMLU-style JSON or JSON lines)
//! - A synchronous harness driving any [`crate::agent::Answerer`]
//! - Batch-mode request building and output scoring
//! - The accuracy report written to the score file

pub mod dataset;
pub mod harness;
pub mod report;

pub use dataset::{Choice, Options, QARecord, load_test_set};
pub use harness::{EVAL_RUN, build_batch_requests, evaluate, score_batch_output};
pub use report::{EvalReport, Outcome};
