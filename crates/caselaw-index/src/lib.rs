//! caselaw-index
//!
//! Character n-gram vector space (`vectorizer`), its fingerprinted on-disk
//! cache (`cache`), partition-bounded cosine retrieval (`search`) and
//! identifier lookup by case number, date, court or customs office (`lookup`).

pub mod cache;
pub mod lookup;
pub mod ngram;
pub mod search;
pub mod vectorizer;

use std::path::Path;
use tracing::{info, warn};

use caselaw_core::config::FingerprintMode;
use caselaw_core::error::Result;
use caselaw_core::types::Corpus;

pub use cache::{CacheMiss, Fingerprint};
pub use lookup::{LookupHit, MatchedField, PrecedentLookup};
pub use ngram::AnalyzerParams;
pub use search::{search, Hit};
pub use vectorizer::{fit, SparseVector, VectorIndex};

/// Where a served index came from.
#[derive(Debug, PartialEq)]
pub enum Provenance {
    Cache,
    Built(CacheMiss),
    /// Rebuilt on request, cache not consulted.
    Forced,
}

/// Reuse the cached index when the sources are unchanged, otherwise fit a new
/// one and try to persist it. A failed save only logs: the fresh index is
/// still served.
pub fn load_or_build(
    corpus: &Corpus,
    sources: &[&Path],
    cache_path: &Path,
    mode: FingerprintMode,
    params: &AnalyzerParams,
) -> Result<(VectorIndex, Provenance)> {
    let fp = cache::fingerprint(sources, mode)?;
    let miss = match cache::load(cache_path, &fp, params) {
        Ok(index) if index.len() == corpus.len() => {
            info!(fingerprint = %fp, docs = index.len(), features = index.n_features(), "index loaded from cache");
            return Ok((index, Provenance::Cache));
        }
        Ok(index) => CacheMiss::Stale(format!("cached {} docs, corpus has {}", index.len(), corpus.len())),
        Err(miss) => miss,
    };
    info!(reason = %miss, "rebuilding vector index");
    Ok((build_and_save(corpus, cache_path, params, fp), Provenance::Built(miss)))
}

/// Fit a fresh index regardless of any cached artifact, then persist it.
pub fn rebuild(
    corpus: &Corpus,
    sources: &[&Path],
    cache_path: &Path,
    mode: FingerprintMode,
    params: &AnalyzerParams,
) -> Result<VectorIndex> {
    let fp = cache::fingerprint(sources, mode)?;
    info!(fingerprint = %fp, "forced rebuild of vector index");
    Ok(build_and_save(corpus, cache_path, params, fp))
}

fn build_and_save(corpus: &Corpus, cache_path: &Path, params: &AnalyzerParams, fp: Fingerprint) -> VectorIndex {
    let index = fit(corpus, params, fp);
    if let Err(e) = cache::save(cache_path, &index) {
        warn!(path = %cache_path.display(), error = %e, "could not save index cache; continuing without it");
    }
    index
}
