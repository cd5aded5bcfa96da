//! Multiple-choice test set loading.
//!
//! Records follow the KMMLU layout: `{question, A, B, C, D, answer}` with
//! `answer` a 1-based label. Files may be a JSON array or JSON lines.

use crate::error::{RagError, Result};
use crate::persistence::parse_jsonl;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::Path;

/// One of the four answer options.
///
/// Labels map as 1→A, 2→B, 3→C, 4→D.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Choice {
    A,
    B,
    C,
    D,
}

impl Choice {
    pub const ALL: [Choice; 4] = [Choice::A, Choice::B, Choice::C, Choice::D];

    /// Map a 1-based numeric label.
    pub fn from_label(label: u8) -> Option<Self> {
        match label {
            1 => Some(Choice::A),
            2 => Some(Choice::B),
            3 => Some(Choice::C),
            4 => Some(Choice::D),
            _ => None,
        }
    }

    pub fn label(self) -> u8 {
        self as u8 + 1
    }

    pub fn letter(self) -> char {
        (b'A' + self as u8) as char
    }

    pub fn from_letter(letter: char) -> Option<Self> {
        match letter {
            'A' => Some(Choice::A),
            'B' => Some(Choice::B),
            'C' => Some(Choice::C),
            'D' => Some(Choice::D),
            _ => None,
        }
    }
}

impl fmt::Display for Choice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.letter())
    }
}

/// The four option texts of a question.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Options {
    #[serde(rename = "A")]
    pub a: String,
    #[serde(rename = "B")]
    pub b: String,
    #[serde(rename = "C")]
    pub c: String,
    #[serde(rename = "D")]
    pub d: String,
}

/// A question with options and, when scoring, its label.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QARecord {
    pub question: String,
    #[serde(flatten)]
    pub options: Options,
    /// 1-based label; absent at inference time.
    #[serde(rename = "answer", default)]
    pub label: Option<u8>,
}

impl QARecord {
    pub fn new(question: impl Into<String>, options: [&str; 4], label: Option<u8>) -> Self {
        let [a, b, c, d] = options.map(str::to_string);
        Self {
            question: question.into(),
            options: Options { a, b, c, d },
            label,
        }
    }

    /// Expected choice, if the record carries a valid label.
    pub fn expected(&self) -> Option<Choice> {
        self.label.and_then(Choice::from_label)
    }
}

/// Load a test set from a JSON array or JSON-lines file.
pub fn load_test_set(path: &Path) -> Result<Vec<QARecord>> {
    let content = fs::read_to_string(path).map_err(|e| RagError::io(path, e))?;
    parse_test_set(&content)
        .map_err(|e| RagError::Serialization(format!("{}: {}", path.display(), e)))
}

fn parse_test_set(content: &str) -> Result<Vec<QARecord>> {
    if content.trim_start().starts_with('[') {
        serde_json::from_str(content).map_err(|e| RagError::Serialization(e.to_string()))
    } else {
        parse_jsonl(content)
    }
}
