//! Flat inner-product vector index and its on-disk artifacts.
//!
//! Scores are raw dot products: larger means more similar. Vectors are not
//! normalized here; OpenAI embeddings are unit length, which makes the
//! score equal to cosine similarity for them.
//!
//! Position `i` of the index corresponds to entry `i` of the chunk-text list
//! stored next to it. Nothing but array order links the two.

use crate::align::AlignedEmbeddingSet;
use crate::error::{RagError, Result};
use crate::persistence::{publish_dir, read_json, stage_dir};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fs;
use std::path::{Path, PathBuf};

pub const INDEX_FILENAME: &str = "index.bin";
pub const CHUNKS_FILENAME: &str = "chunks.json";

/// One search result.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SearchHit {
    pub position: usize,
    pub score: f32,
}

/// Immutable set of equal-length vectors searched by inner product.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorIndex {
    /// Embedding model the vectors came from.
    model: String,
    dimension: usize,
    /// Row-major `len * dimension` values.
    data: Vec<f32>,
}

impl VectorIndex {
    /// Build from aligned embeddings.
    pub fn build(model: impl Into<String>, embeddings: AlignedEmbeddingSet) -> Self {
        let dimension = embeddings.dimension();
        let data = embeddings.into_vectors().into_iter().flatten().collect();
        Self {
            model: model.into(),
            dimension,
            data,
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn len(&self) -> usize {
        if self.dimension == 0 {
            0
        } else {
            self.data.len() / self.dimension
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn vector(&self, position: usize) -> Option<&[f32]> {
        let start = position.checked_mul(self.dimension)?;
        self.data.get(start..start + self.dimension)
    }

    /// Top-`k` positions by inner product, best first.
    ///
    /// `k` larger than the index returns every position. Equal scores are
    /// ordered by position so results are reproducible.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<SearchHit>> {
        if self.is_empty() || k == 0 {
            return Ok(Vec::new());
        }
        if query.len() != self.dimension {
            return Err(RagError::EmbeddingDimensionMismatch {
                expected: self.dimension,
                actual: query.len(),
            });
        }

        let mut hits: Vec<SearchHit> = self
            .data
            .chunks_exact(self.dimension)
            .enumerate()
            .map(|(position, row)| SearchHit {
                position,
                score: dot(row, query),
            })
            .collect();

        hits.sort_by(|a, b| match b.score.total_cmp(&a.score) {
            Ordering::Equal => a.position.cmp(&b.position),
            other => other,
        });
        hits.truncate(k);

        Ok(hits)
    }
}

fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

/// The index together with its parallel chunk-text list.
#[derive(Debug, Clone)]
pub struct IndexArtifacts {
    pub index: VectorIndex,
    pub chunks: Vec<String>,
}

impl IndexArtifacts {
    pub fn new(index: VectorIndex, chunks: Vec<String>) -> Result<Self> {
        if index.len() != chunks.len() {
            return Err(RagError::AlignmentMismatch {
                expected: chunks.len(),
                missing: (index.len()..chunks.len()).collect(),
                duplicated: Vec::new(),
                unexpected: (chunks.len()..index.len()).collect(),
            });
        }
        Ok(Self { index, chunks })
    }

    pub fn index_path(dir: &Path) -> PathBuf {
        dir.join(INDEX_FILENAME)
    }

    pub fn chunks_path(dir: &Path) -> PathBuf {
        dir.join(CHUNKS_FILENAME)
    }

    pub fn exist(dir: &Path) -> bool {
        Self::index_path(dir).is_file() && Self::chunks_path(dir).is_file()
    }

    /// Write both files into a staging directory, then swap it in as `dir`.
    pub fn save(&self, dir: &Path) -> Result<()> {
        let index_bytes = bincode::serde::encode_to_vec(&self.index, bincode::config::standard())
            .map_err(|e| RagError::Serialization(e.to_string()))?;
        let chunk_bytes = serde_json::to_vec(&self.chunks)
            .map_err(|e| RagError::Serialization(e.to_string()))?;

        let staging = stage_dir(dir)?;
        for (path, bytes) in [
            (Self::index_path(&staging), index_bytes),
            (Self::chunks_path(&staging), chunk_bytes),
        ] {
            fs::write(&path, bytes).map_err(|e| RagError::io(&path, e))?;
        }

        publish_dir(&staging, dir)
    }

    /// Load both files and check they describe the same number of chunks.
    pub fn load(dir: &Path) -> Result<Self> {
        if !Self::exist(dir) {
            return Err(RagError::IndexNotFound(dir.to_path_buf()));
        }

        let index_path = Self::index_path(dir);
        let data = fs::read(&index_path).map_err(|e| RagError::io(&index_path, e))?;
        let (index, _): (VectorIndex, usize) =
            bincode::serde::decode_from_slice(&data, bincode::config::standard())
                .map_err(|e| RagError::Serialization(e.to_string()))?;

        let chunks: Vec<String> = read_json(&Self::chunks_path(dir))?;
        Self::new(index, chunks)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::align::align;
    use crate::batch::{BatchResultItem, CHUNK_IDS};
    use tempfile::TempDir;

    fn index(vectors: Vec<Vec<f32>>) -> VectorIndex {
        let n = vectors.len();
        let items = vectors
            .into_iter()
            .enumerate()
            .map(|(i, vector)| BatchResultItem {
                custom_id: CHUNK_IDS.format(i),
                vector,
            })
            .collect();
        VectorIndex::build("test-model", align(&CHUNK_IDS, items, n).unwrap())
    }

    fn sample() -> VectorIndex {
        index(vec![
            vec![1.0, 0.0],
            vec![0.0, 1.0],
            vec![0.7, 0.7],
            vec![-1.0, 0.0],
        ])
    }

    #[test]
    fn test_search_orders_by_inner_product() {
        let hits = sample().search(&[1.0, 1.0], 3).unwrap();
        let positions: Vec<usize> = hits.iter().map(|h| h.position).collect();
        assert_eq!(positions, vec![2, 0, 1]);
        assert!(hits[0].score >= hits[1].score && hits[1].score >= hits[2].score);
    }

    #[test]
    fn test_k_larger_than_index_returns_all() {
        let hits = sample().search(&[1.0, 0.0], 10).unwrap();
        assert_eq!(hits.len(), 4);
        assert_eq!(hits.last().unwrap().position, 3);
    }

    #[test]
    fn test_ties_broken_by_position() {
        let idx = index(vec![vec![1.0, 0.0], vec![1.0, 0.0], vec![1.0, 0.0]]);
        let hits = idx.search(&[1.0, 0.0], 2).unwrap();
        assert_eq!(hits[0].position, 0);
        assert_eq!(hits[1].position, 1);
    }

    #[test]
    fn test_search_is_deterministic() {
        let idx = sample();
        let query = [0.3, -0.2];
        assert_eq!(idx.search(&query, 3).unwrap(), idx.search(&query, 3).unwrap());
    }

    #[test]
    fn test_dimension_mismatch() {
        let err = sample().search(&[1.0, 0.0, 0.0], 1).unwrap_err();
        assert!(matches!(
            err,
            RagError::EmbeddingDimensionMismatch { expected: 2, actual: 3 }
        ));
    }

    #[test]
    fn test_vector_access() {
        let idx = sample();
        assert_eq!(idx.len(), 4);
        assert_eq!(idx.vector(2), Some(&[0.7, 0.7][..]));
        assert_eq!(idx.vector(4), None);
    }

    #[test]
    fn test_save_and_load_keep_position_text_correspondence() {
        let root = TempDir::new().unwrap();
        let dir = root.path().join("embeddings");
        let chunks = vec!["east".to_string(), "north".into(), "northeast".into(), "west".into()];
        IndexArtifacts::new(sample(), chunks.clone())
            .unwrap()
            .save(&dir)
            .unwrap();

        assert!(!root.path().join("embeddings.tmp").exists());

        let loaded = IndexArtifacts::load(&dir).unwrap();
        assert_eq!(loaded.index, sample());
        assert_eq!(loaded.chunks, chunks);
        assert_eq!(loaded.index.model(), "test-model");

        let best = loaded.index.search(&[0.0, 1.0], 1).unwrap()[0];
        assert_eq!(loaded.chunks[best.position], "north");
    }

    #[test]
    fn test_rebuild_replaces_texts_and_vectors_together() {
        let root = TempDir::new().unwrap();
        let dir = root.path().join("embeddings");
        let old_texts = vec!["a".to_string(), "b".into(), "c".into(), "d".into()];
        IndexArtifacts::new(sample(), old_texts).unwrap().save(&dir).unwrap();

        // Same chunk count, different texts and model.
        let rebuilt = VectorIndex {
            model: "other-model".to_string(),
            ..sample()
        };
        let new_texts = vec!["w".to_string(), "x".into(), "y".into(), "z".into()];
        IndexArtifacts::new(rebuilt, new_texts.clone())
            .unwrap()
            .save(&dir)
            .unwrap();

        let loaded = IndexArtifacts::load(&dir).unwrap();
        assert_eq!(loaded.index.model(), "other-model");
        assert_eq!(loaded.chunks, new_texts);
        assert!(!root.path().join("embeddings.old").exists());
    }

    #[test]
    fn test_length_mismatch_rejected() {
        assert!(IndexArtifacts::new(sample(), vec!["only one".to_string()]).is_err());
    }

    #[test]
    fn test_load_missing() {
        let dir = TempDir::new().unwrap();
        assert!(matches!(
            IndexArtifacts::load(dir.path()),
            Err(RagError::IndexNotFound(_))
        ));
    }
}
