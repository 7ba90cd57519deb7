use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

use caselaw_core::error::{Error, Result};
use caselaw_core::types::Partition;

use crate::vectorizer::{SparseVector, VectorIndex};

/// A retrieved document: corpus index and cosine similarity.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Hit {
    pub doc: usize,
    pub score: f32,
}

/// Top-`k` documents of `partition` by cosine similarity to `query`.
///
/// Only documents inside the partition are scored. Results are ordered by
/// descending score, ties by ascending index, and documents scoring zero are
/// never returned.
pub fn search(index: &VectorIndex, query: &SparseVector, partition: &Partition, k: usize) -> Result<Vec<Hit>> {
    if partition.start > partition.end || partition.end > index.len() {
        return Err(Error::InvalidPartition { start: partition.start, end: partition.end, len: index.len() });
    }
    if k == 0 || query.is_zero() { return Ok(Vec::new()); }
    let mut hits: Vec<Hit> = index.docs[partition.range()]
        .iter()
        .enumerate()
        .filter_map(|(offset, doc)| {
            let score = doc.dot(query);
            (score > 0.0).then_some(Hit { doc: partition.start + offset, score })
        })
        .collect();
    hits.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal).then(a.doc.cmp(&b.doc)));
    hits.truncate(k);
    Ok(hits)
}
