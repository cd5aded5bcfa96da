//! Reordering bulk results back into chunk order.
//!
//! Bulk services do not keep submission order. Every result carries a
//! `custom_id` encoding its chunk ordinal; alignment parses that ordinal,
//! sorts by it and insists the ordinals are exactly `0..expected`.

use crate::batch::{BatchResultItem, IdScheme};
use crate::error::{RagError, Result};

/// Embeddings where position `i` belongs to chunk ordinal `i`.
#[derive(Debug, Clone, PartialEq)]
pub struct AlignedEmbeddingSet {
    vectors: Vec<Vec<f32>>,
}

impl AlignedEmbeddingSet {
    pub fn len(&self) -> usize {
        self.vectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vectors.is_empty()
    }

    /// Dimensionality shared by every vector (0 when empty).
    pub fn dimension(&self) -> usize {
        self.vectors.first().map_or(0, Vec::len)
    }

    pub fn vectors(&self) -> &[Vec<f32>] {
        &self.vectors
    }

    pub fn into_vectors(self) -> Vec<Vec<f32>> {
        self.vectors
    }
}

/// Align embedding results to chunk ordinals `0..expected_count`.
pub fn align(
    scheme: &IdScheme,
    items: Vec<BatchResultItem>,
    expected_count: usize,
) -> Result<AlignedEmbeddingSet> {
    let keyed = items
        .into_iter()
        .map(|item| Ok((scheme.parse(&item.custom_id)?, item.vector)))
        .collect::<Result<Vec<_>>>()?;

    let vectors = align_by_ordinal(keyed, expected_count)?;

    if let Some(first) = vectors.first() {
        let dimension = first.len();
        if let Some(bad) = vectors.iter().find(|v| v.len() != dimension) {
            return Err(RagError::EmbeddingDimensionMismatch {
                expected: dimension,
                actual: bad.len(),
            });
        }
    }

    Ok(AlignedEmbeddingSet { vectors })
}

/// Sort `(ordinal, value)` pairs and check they cover `0..expected` exactly once.
pub fn align_by_ordinal<T>(mut keyed: Vec<(usize, T)>, expected: usize) -> Result<Vec<T>> {
    keyed.sort_by_key(|(ordinal, _)| *ordinal);

    let mut seen = vec![0usize; expected];
    let mut unexpected = Vec::new();
    for (ordinal, _) in &keyed {
        match seen.get_mut(*ordinal) {
            Some(count) => *count += 1,
            None => unexpected.push(*ordinal),
        }
    }

    let missing: Vec<usize> = (0..expected).filter(|&i| seen[i] == 0).collect();
    let duplicated: Vec<usize> = (0..expected).filter(|&i| seen[i] > 1).collect();
    unexpected.dedup();

    if !missing.is_empty() || !duplicated.is_empty() || !unexpected.is_empty() {
        return Err(RagError::AlignmentMismatch {
            expected,
            missing,
            duplicated,
            unexpected,
        });
    }

    Ok(keyed.into_iter().map(|(_, value)| value).collect())
}
