//! File helpers shared by the index, batch and evaluation stages.
//!
//! Every artifact is published with write-then-rename so readers never
//! observe a half-written file.

use crate::error::{RagError, Result};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::fs;
use std::path::{Path, PathBuf};

/// Ensure the parent directory of `path` exists.
pub fn ensure_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            fs::create_dir_all(parent).map_err(|e| RagError::io(parent, e))?;
        }
    }
    Ok(())
}

/// Sibling of `path` with `suffix` appended to its file name.
fn sibling_path(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(suffix);
    path.with_file_name(name)
}

/// Temporary sibling used while writing `path`.
pub fn staging_path(path: &Path) -> PathBuf {
    sibling_path(path, ".tmp")
}

/// Write `data` to a staging file; call [`publish`] to move it into place.
pub fn stage(path: &Path, data: &[u8]) -> Result<PathBuf> {
    ensure_parent(path)?;
    let staging = staging_path(path);
    fs::write(&staging, data).map_err(|e| RagError::io(&staging, e))?;
    Ok(staging)
}

/// Rename a staged file onto its final path. The staged file is removed if
/// the rename fails.
pub fn publish(staging: &Path, path: &Path) -> Result<()> {
    if let Err(e) = fs::rename(staging, path) {
        fs::remove_file(staging).ok();
        return Err(RagError::io(path, e));
    }
    Ok(())
}

/// Create an empty staging directory for `dir`, clearing any leftover one.
pub fn stage_dir(dir: &Path) -> Result<PathBuf> {
    ensure_parent(dir)?;
    let staging = staging_path(dir);
    if staging.exists() {
        fs::remove_dir_all(&staging).map_err(|e| RagError::io(&staging, e))?;
    }
    fs::create_dir(&staging).map_err(|e| RagError::io(&staging, e))?;
    Ok(staging)
}

/// Swap a fully written staging directory into place as `dir`.
///
/// Files inside are published together: a reader sees either the old set
/// or the new one, or briefly no directory at all, never a mix.
pub fn publish_dir(staging: &Path, dir: &Path) -> Result<()> {
    let retired = sibling_path(dir, ".old");
    if retired.exists() {
        fs::remove_dir_all(&retired).map_err(|e| RagError::io(&retired, e))?;
    }
    if dir.exists() {
        fs::rename(dir, &retired).map_err(|e| RagError::io(dir, e))?;
    }

    if let Err(e) = fs::rename(staging, dir) {
        if retired.exists() {
            fs::rename(&retired, dir).ok();
        }
        fs::remove_dir_all(staging).ok();
        return Err(RagError::io(dir, e));
    }

    if retired.exists() {
        fs::remove_dir_all(&retired).map_err(|e| RagError::io(&retired, e))?;
    }
    Ok(())
}

/// Write a file atomically.
pub fn atomic_write(path: &Path, data: &[u8]) -> Result<()> {
    let staging = stage(path, data)?;
    publish(&staging, path)
}

/// Serialize a value as pretty JSON and write it atomically.
pub fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    let data = serde_json::to_vec_pretty(value)
        .map_err(|e| RagError::Serialization(e.to_string()))?;
    atomic_write(path, &data)
}

/// Read a JSON file.
pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let data = fs::read(path).map_err(|e| RagError::io(path, e))?;
    serde_json::from_slice(&data)
        .map_err(|e| RagError::Serialization(format!("{}: {}", path.display(), e)))
}

/// Encode records as JSON lines (one object per line, trailing newline).
pub fn to_jsonl<T: Serialize>(records: &[T]) -> Result<String> {
    let mut out = String::new();
    for record in records {
        let line =
            serde_json::to_string(record).map_err(|e| RagError::Serialization(e.to_string()))?;
        out.push_str(&line);
        out.push('\n');
    }
    Ok(out)
}

/// Decode JSON lines, skipping blank lines. Errors name the 1-based line.
pub fn parse_jsonl<T: DeserializeOwned>(content: &str) -> Result<Vec<T>> {
    content
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(i, line)| {
            serde_json::from_str(line)
                .map_err(|e| RagError::Serialization(format!("line {}: {}", i + 1, e)))
        })
        .collect()
}

/// Read and decode a JSON-lines file.
pub fn read_jsonl<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>> {
    let content = fs::read_to_string(path).map_err(|e| RagError::io(path, e))?;
    parse_jsonl(&content)
        .map_err(|e| RagError::Serialization(format!("{}: {}", path.display(), e)))
}
