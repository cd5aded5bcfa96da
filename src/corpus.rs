//! Raw reference corpus loading and chunking.
//!
//! A corpus is a `.jsonl` file of `{id, text}` records, a `.txt` file, or a
//! directory walked recursively for both kinds of file.

use crate::chunker::{Chunk, Chunker};
use crate::error::{RagError, Result};
use serde::Deserialize;
use serde_json::Value;
use std::fs;
use std::path::Path;
use tracing::{info, warn};
use walkdir::WalkDir;

/// One source document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CorpusDocument {
    pub id: String,
    pub text: String,
}

#[derive(Debug, Deserialize)]
struct RawRecord {
    #[serde(default)]
    id: Value,
    #[serde(default)]
    text: String,
}

impl RawRecord {
    fn into_document(self, fallback_id: String) -> CorpusDocument {
        let id = match self.id {
            Value::String(s) => s,
            Value::Null => fallback_id,
            other => other.to_string(),
        };
        CorpusDocument {
            id,
            text: self.text,
        }
    }
}

/// Load every document under `path`, in a stable (sorted) file order.
pub fn load_corpus(path: &Path) -> Result<Vec<CorpusDocument>> {
    if !path.exists() {
        return Err(RagError::InvalidCorpusPath(path.to_path_buf()));
    }

    let mut documents = Vec::new();
    for entry in WalkDir::new(path).sort_by_file_name() {
        let entry = entry.map_err(|e| RagError::Io {
            path: path.to_path_buf(),
            source: e.into(),
        })?;
        if !entry.file_type().is_file() {
            continue;
        }

        let file = entry.path();
        match file.extension().and_then(|e| e.to_str()) {
            Some("jsonl") => documents.extend(load_jsonl_file(file)?),
            Some("txt") => {
                let text = fs::read_to_string(file).map_err(|e| RagError::io(file, e))?;
                let id = file
                    .file_stem()
                    .and_then(|s| s.to_str())
                    .unwrap_or("untitled")
                    .to_string();
                documents.push(CorpusDocument { id, text });
            }
            _ => {}
        }
    }

    if documents.is_empty() {
        return Err(RagError::EmptyCorpus(path.to_path_buf()));
    }
    info!("Loaded {} documents from {}", documents.len(), path.display());
    Ok(documents)
}

fn load_jsonl_file(path: &Path) -> Result<Vec<CorpusDocument>> {
    let content = fs::read_to_string(path).map_err(|e| RagError::io(path, e))?;
    let mut documents = Vec::new();

    for (line_num, line) in content.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let fallback = format!("{}:{}", path.display(), line_num + 1);
        match serde_json::from_str::<RawRecord>(line) {
            Ok(raw) => documents.push(raw.into_document(fallback)),
            Err(e) => warn!("Skipping malformed corpus record {}: {}", fallback, e),
        }
    }

    Ok(documents)
}

/// Chunk every document, numbering chunks globally from 0.
///
/// Documents that cannot be chunked are skipped with a warning.
pub fn chunk_corpus(documents: &[CorpusDocument], chunker: &Chunker) -> Vec<Chunk> {
    let mut chunks = Vec::new();
    let mut skipped = 0;

    for doc in documents {
        match chunker.chunk_document(&doc.id, &doc.text) {
            Ok(texts) => {
                for text in texts {
                    chunks.push(Chunk::new(chunks.len(), text));
                }
            }
            Err(e) => {
                warn!("{}", e);
                skipped += 1;
            }
        }
    }

    info!(
        "Chunked {} documents into {} chunks ({} skipped)",
        documents.len() - skipped,
        chunks.len(),
        skipped
    );
    chunks
}
