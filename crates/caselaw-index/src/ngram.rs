use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use caselaw_core::config::IndexSettings;
use caselaw_core::store::normalize_whitespace;

/// Parameters that shape the feature space. Persisted with the index so a
/// config change invalidates a cached artifact.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AnalyzerParams {
    pub ngram_min: usize,
    pub ngram_max: usize,
    pub max_features: usize,
    pub max_df: f64,
    pub min_df: usize,
}

impl Default for AnalyzerParams {
    fn default() -> Self { Self::from(&IndexSettings::default()) }
}

impl From<&IndexSettings> for AnalyzerParams {
    fn from(s: &IndexSettings) -> Self {
        Self { ngram_min: s.ngram_min, ngram_max: s.ngram_max, max_features: s.max_features, max_df: s.max_df, min_df: s.min_df }
    }
}

/// Lowercase and collapse whitespace; the only normalization applied before
/// slicing, so fit and transform see identical character streams.
pub fn normalize(text: &str) -> String {
    normalize_whitespace(&text.to_lowercase())
}

/// Count every contiguous character slice of length `min..=max` in `text`.
///
/// Slices are taken over Unicode scalar values, so Hangul syllables count as
/// one character each. `text` is expected to be normalized already.
pub fn count_ngrams<'a>(text: &'a str, min: usize, max: usize) -> HashMap<&'a str, u32> {
    let bounds: Vec<usize> = text.char_indices().map(|(i, _)| i).chain(std::iter::once(text.len())).collect();
    let n_chars = bounds.len() - 1;
    let mut counts = HashMap::new();
    for n in min..=max {
        if n == 0 || n > n_chars { continue; }
        for start in 0..=(n_chars - n) {
            *counts.entry(&text[bounds[start]..bounds[start + n]]).or_insert(0) += 1;
        }
    }
    counts
}
