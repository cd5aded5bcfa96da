//! Evaluation drivers.
//!
//! The synchronous harness answers records one by one through an
//! [`Answerer`]. The batch harness turns the test set into chat-completion
//! requests keyed by question id, and scores the downloaded output.

use super::dataset::{Choice, QARecord};
use super::report::{EvalReport, Outcome};
use crate::agent::{Answerer, grounded_prompt, normalize_answer};
use crate::batch::{BatchEndpoint, BatchOutputLine, BatchRequestItem, QUESTION_IDS};
use crate::config::LlmConfig;
use crate::error::{RagError, Result};
use crate::llm::{ChatCompletionRequest, Prompts, completion_text};
use crate::retriever::Retriever;
use std::collections::HashMap;
use tracing::{debug, info, warn};

/// Default bulk run name for batch-mode evaluation.
pub const EVAL_RUN: &str = "eval";

fn outcome(expected: Choice, predicted: char) -> Outcome {
    if predicted == expected.letter() {
        Outcome::Correct
    } else {
        Outcome::Incorrect
    }
}

/// Answer every record and tally the results.
///
/// Answer generation failures count as incorrect and the run continues.
/// Any other error (retrieval, dimension mismatch) aborts the evaluation.
pub async fn evaluate(records: &[QARecord], answerer: &dyn Answerer) -> Result<EvalReport> {
    let mut report = EvalReport::new();
    info!("Evaluating {} records", records.len());

    for (i, record) in records.iter().enumerate() {
        let Some(expected) = record.expected() else {
            warn!("{}", RagError::AccuracyComputation(format!("record {} has no valid label", i + 1)));
            report.record(Outcome::Skipped);
            continue;
        };

        let scored = match answerer.answer_record(record).await {
            Ok(predicted) => {
                debug!("[{}/{}] predicted {}, expected {}", i + 1, records.len(), predicted, expected);
                outcome(expected, predicted)
            }
            Err(e) if !e.is_fatal() => {
                warn!("Record {}: {}", i + 1, e);
                Outcome::Failed
            }
            Err(e) => return Err(e),
        };
        report.record(scored);
    }

    info!("{}", report.summary_line());
    Ok(report)
}

/// One chat-completion request per record, keyed `q0001`, `q0002`, ...
///
/// With a retriever the prompt is grounded on the top-`top_k` passages;
/// without one the closed-book prompt is used.
pub async fn build_batch_requests(
    records: &[QARecord],
    retriever: Option<&Retriever>,
    top_k: usize,
    llm: &LlmConfig,
) -> Result<Vec<BatchRequestItem>> {
    let mut requests = Vec::with_capacity(records.len());

    for (i, record) in records.iter().enumerate() {
        let prompt = match retriever {
            Some(retriever) => {
                let context = retriever.retrieve(&record.question, top_k).await?;
                grounded_prompt(&record.question, &record.options, &context)
            }
            None => Prompts::render(Prompts::closed_book(), &record.question, &record.options, ""),
        };

        let body = ChatCompletionRequest::user_prompt(llm, &prompt).to_value()?;
        requests.push(BatchRequestItem::new(
            QUESTION_IDS.format(i),
            BatchEndpoint::ChatCompletions,
            body,
        ));
    }

    info!("Prepared {} completion requests", requests.len());
    Ok(requests)
}

/// Score downloaded completion output against the test set.
///
/// Lines are joined to records by question id, so output order does not
/// matter. Lines that cannot be attributed to a labeled record are skipped;
/// records whose line is an error, or that have no line at all, count as
/// failed.
pub fn score_batch_output(records: &[QARecord], lines: &[BatchOutputLine]) -> EvalReport {
    let mut predictions: HashMap<usize, Option<char>> = HashMap::new();
    let mut report = EvalReport::new();

    for line in lines {
        let position = match QUESTION_IDS.parse(&line.custom_id) {
            Ok(p) if p < records.len() => p,
            Ok(_) => {
                warn!("Skipping output for unknown question {}", line.custom_id);
                report.record(Outcome::Skipped);
                continue;
            }
            Err(e) => {
                warn!("Skipping output line: {}", e);
                report.record(Outcome::Skipped);
                continue;
            }
        };

        let predicted = line
            .success_body()
            .and_then(completion_text)
            .and_then(normalize_answer);
        if predictions.insert(position, predicted).is_some() {
            warn!("Duplicate output for {}; keeping the last one", line.custom_id);
        }
    }

    for (position, record) in records.iter().enumerate() {
        let Some(expected) = record.expected() else {
            warn!(
                "{}",
                RagError::AccuracyComputation(format!(
                    "no label for {}",
                    QUESTION_IDS.format(position)
                ))
            );
            report.record(Outcome::Skipped);
            continue;
        };

        match predictions.get(&position) {
            Some(Some(predicted)) => report.record(outcome(expected, *predicted)),
            Some(None) => {
                warn!("No usable answer for {}", QUESTION_IDS.format(position));
                report.record(Outcome::Failed);
            }
            None => {
                warn!("No output line for {}", QUESTION_IDS.format(position));
                report.record(Outcome::Failed);
            }
        }
    }

    info!("{}", report.summary_line());
    report
}
