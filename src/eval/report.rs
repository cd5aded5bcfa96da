//! Accuracy report.

use crate::error::Result;
use crate::persistence::atomic_write;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

/// How a single record was scored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Correct,
    Incorrect,
    /// No answer could be produced; counts as incorrect.
    Failed,
    /// Not scorable (no valid label); excluded from the total.
    Skipped,
}

/// Aggregated evaluation counts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvalReport {
    /// Scored records.
    pub total: usize,
    /// Records whose prediction matched the label.
    pub correct: usize,
    /// Scored records with no usable answer.
    pub failed: usize,
    /// Records left out of the total.
    pub skipped: usize,
}

impl EvalReport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, outcome: Outcome) {
        match outcome {
            Outcome::Correct => {
                self.total += 1;
                self.correct += 1;
            }
            Outcome::Incorrect => self.total += 1,
            Outcome::Failed => {
                self.total += 1;
                self.failed += 1;
            }
            Outcome::Skipped => self.skipped += 1,
        }
    }

    /// Percentage of correct answers; `0.0` for an empty evaluation.
    pub fn accuracy(&self) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        self.correct as f64 / self.total as f64 * 100.0
    }

    pub fn summary_line(&self) -> String {
        format!(
            "Total: {}, Correct: {}, Accuracy: {:.2}%",
            self.total,
            self.correct,
            self.accuracy()
        )
    }

    /// Write the report text to `path`, replacing any previous score.
    pub fn write_score(&self, path: &Path) -> Result<()> {
        atomic_write(path, format!("{}\n", self).as_bytes())
    }

    pub fn print_summary(&self) {
        println!("\n========== Evaluation Results ==========");
        println!("{}", self);
        println!("========================================\n");
    }
}

impl fmt::Display for EvalReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.summary_line())?;
        if self.failed > 0 || self.skipped > 0 {
            write!(f, "\nFailed: {}, Skipped: {}", self.failed, self.skipped)?;
        }
        Ok(())
    }
}
