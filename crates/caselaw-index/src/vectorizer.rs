//! Character n-gram vector space over the unified corpus.
//!
//! Weights follow the usual sublinear tf-idf recipe: `1 + ln(tf)` times the
//! smoothed idf `ln((1 + n) / (1 + df)) + 1`, then L2-normalized per document.
//! Features present in more than `max_df` of all documents are dropped, and
//! the space is capped at `max_features` by corpus-wide frequency.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Instant;
use tracing::{info, warn};

use caselaw_core::types::Corpus;

use crate::cache::Fingerprint;
use crate::ngram::{count_ngrams, normalize, AnalyzerParams};

/// Sparse vector with strictly ascending feature ids.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct SparseVector {
    pub indices: Vec<u32>,
    pub values: Vec<f32>,
}

impl SparseVector {
    fn from_weights(mut entries: Vec<(u32, f32)>) -> Self {
        entries.sort_unstable_by_key(|(i, _)| *i);
        let norm = entries.iter().map(|(_, w)| w * w).sum::<f32>().sqrt();
        if norm > 0.0 { for (_, w) in &mut entries { *w /= norm; } }
        let (indices, values) = entries.into_iter().unzip();
        Self { indices, values }
    }

    pub fn nnz(&self) -> usize { self.indices.len() }

    pub fn is_zero(&self) -> bool { self.indices.is_empty() }

    pub fn dot(&self, other: &SparseVector) -> f32 {
        let (mut i, mut j, mut acc) = (0usize, 0usize, 0f32);
        while i < self.indices.len() && j < other.indices.len() {
            match self.indices[i].cmp(&other.indices[j]) {
                std::cmp::Ordering::Less => i += 1,
                std::cmp::Ordering::Greater => j += 1,
                std::cmp::Ordering::Equal => { acc += self.values[i] * other.values[j]; i += 1; j += 1; }
            }
        }
        acc
    }
}

/// Fitted feature space plus one normalized vector per corpus record.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VectorIndex {
    pub fingerprint: Fingerprint,
    pub params: AnalyzerParams,
    pub vocabulary: HashMap<String, u32>,
    pub idf: Vec<f32>,
    pub docs: Vec<SparseVector>,
}

impl VectorIndex {
    /// Number of indexed documents.
    pub fn len(&self) -> usize { self.docs.len() }

    pub fn is_empty(&self) -> bool { self.docs.is_empty() }

    pub fn n_features(&self) -> usize { self.vocabulary.len() }

    pub fn doc(&self, index: usize) -> Option<&SparseVector> { self.docs.get(index) }

    /// Project `text` into the fitted space. Unknown n-grams are ignored; the
    /// vocabulary never grows after `fit`.
    pub fn transform(&self, text: &str) -> SparseVector {
        let normalized = normalize(text);
        let counts = count_ngrams(&normalized, self.params.ngram_min, self.params.ngram_max);
        weigh(&counts, &self.vocabulary, &self.idf)
    }
}

fn weigh(counts: &HashMap<&str, u32>, vocabulary: &HashMap<String, u32>, idf: &[f32]) -> SparseVector {
    let entries = counts
        .iter()
        .filter_map(|(term, &tf)| {
            vocabulary.get(*term).map(|&id| (id, (1.0 + (tf as f32).ln()) * idf[id as usize]))
        })
        .collect();
    SparseVector::from_weights(entries)
}

/// Fit the vector space over every record of `corpus` (both sources share it).
pub fn fit(corpus: &Corpus, params: &AnalyzerParams, fingerprint: Fingerprint) -> VectorIndex {
    let started = Instant::now();
    let normalized: Vec<String> = corpus.texts().map(normalize).collect();
    let per_doc: Vec<HashMap<&str, u32>> = normalized
        .iter()
        .map(|t| count_ngrams(t, params.ngram_min, params.ngram_max))
        .collect();

    let n_docs = per_doc.len();
    let mut df: HashMap<&str, usize> = HashMap::new();
    let mut total: HashMap<&str, u64> = HashMap::new();
    for counts in &per_doc {
        for (&term, &tf) in counts {
            *df.entry(term).or_insert(0) += 1;
            *total.entry(term).or_insert(0) += u64::from(tf);
        }
    }

    let max_doc_count = params.max_df * n_docs as f64;
    let mut kept: Vec<&str> = df
        .iter()
        .filter(|(_, &d)| d >= params.min_df && (d as f64) <= max_doc_count)
        .map(|(&t, _)| t)
        .collect();
    if kept.len() > params.max_features {
        kept.sort_unstable_by(|a, b| total[b].cmp(&total[a]).then_with(|| a.cmp(b)));
        kept.truncate(params.max_features);
    }
    kept.sort_unstable();

    let vocabulary: HashMap<String, u32> = kept.iter().enumerate().map(|(i, t)| ((*t).to_string(), i as u32)).collect();
    let n = n_docs as f32;
    let idf: Vec<f32> = kept.iter().map(|t| ((1.0 + n) / (1.0 + df[t] as f32)).ln() + 1.0).collect();
    let docs: Vec<SparseVector> = per_doc.iter().map(|counts| weigh(counts, &vocabulary, &idf)).collect();

    if vocabulary.is_empty() && n_docs > 0 {
        warn!(docs = n_docs, "no n-gram survived document-frequency pruning; every score will be zero");
    }
    info!(docs = n_docs, features = vocabulary.len(), candidates = df.len(), elapsed_ms = started.elapsed().as_millis() as u64, "vector space fitted");
    VectorIndex { fingerprint, params: params.clone(), vocabulary, idf, docs }
}
