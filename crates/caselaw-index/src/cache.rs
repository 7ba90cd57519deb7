//! On-disk cache of the fitted vector space, keyed by a source fingerprint.
//!
//! Layout: 4-byte magic, little-endian `u32` format version, then a
//! zstd-compressed bincode `Artifact`. Raw documents are never stored; they
//! are reloaded from the source files on every start.
//!
//! Every failure on the load path is a `CacheMiss`: the caller rebuilds.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::io::Write;
use std::path::Path;
use std::time::UNIX_EPOCH;
use thiserror::Error;
use tracing::{debug, info};

use caselaw_core::config::FingerprintMode;
use caselaw_core::error::{Error, Result};

use crate::ngram::AnalyzerParams;
use crate::vectorizer::VectorIndex;

const MAGIC: &[u8; 4] = b"CLIX";
const FORMAT_VERSION: u32 = 2;
const HEADER_LEN: usize = 8;
const ZSTD_LEVEL: i32 = 9;

/// Hex blake3 digest summarizing the identity of the source files.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Fingerprint(pub String);

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(&self.0) }
}

/// Identity signal of one source file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileSignal {
    pub size: u64,
    pub mtime_nanos: u128,
}

/// Combine per-file signals, in order, into one fingerprint.
pub fn fingerprint_from_signals(signals: &[FileSignal]) -> Fingerprint {
    let mut hasher = blake3::Hasher::new();
    hasher.update(b"metadata");
    for (i, s) in signals.iter().enumerate() {
        hasher.update(&(i as u64).to_le_bytes());
        hasher.update(&s.size.to_le_bytes());
        hasher.update(&s.mtime_nanos.to_le_bytes());
    }
    Fingerprint(hasher.finalize().to_hex().to_string())
}

pub fn file_signal(path: &Path) -> Result<FileSignal> {
    let meta = fs::metadata(path).map_err(|_| Error::DataFileMissing(path.to_path_buf()))?;
    let mtime_nanos = meta.modified()?.duration_since(UNIX_EPOCH).map(|d| d.as_nanos()).unwrap_or(0);
    Ok(FileSignal { size: meta.len(), mtime_nanos })
}

/// Fingerprint the given source files. Missing files are `DataFileMissing`.
pub fn fingerprint(sources: &[&Path], mode: FingerprintMode) -> Result<Fingerprint> {
    match mode {
        FingerprintMode::Metadata => {
            let signals = sources.iter().map(|p| file_signal(p)).collect::<Result<Vec<_>>>()?;
            Ok(fingerprint_from_signals(&signals))
        }
        FingerprintMode::Content => {
            let mut hasher = blake3::Hasher::new();
            hasher.update(b"content");
            for (i, path) in sources.iter().enumerate() {
                let bytes = fs::read(path).map_err(|_| Error::DataFileMissing(path.to_path_buf()))?;
                hasher.update(&(i as u64).to_le_bytes());
                hasher.update(&(bytes.len() as u64).to_le_bytes());
                hasher.update(&bytes);
            }
            Ok(Fingerprint(hasher.finalize().to_hex().to_string()))
        }
    }
}

/// Why a cached artifact could not be used.
#[derive(Debug, Error, PartialEq)]
pub enum CacheMiss {
    #[error("no cache artifact")]
    Absent,
    #[error("cache artifact is stale ({0})")]
    Stale(String),
    #[error("cache artifact is unreadable: {0}")]
    Corrupt(String),
}

#[derive(Serialize, Deserialize)]
struct Artifact {
    built_at_ms: i64,
    index: VectorIndex,
}

/// Load the index at `path` if it was built from `expected` with `params`.
pub fn load(path: &Path, expected: &Fingerprint, params: &AnalyzerParams) -> std::result::Result<VectorIndex, CacheMiss> {
    if !path.exists() { return Err(CacheMiss::Absent); }
    let bytes = fs::read(path).map_err(|e| CacheMiss::Corrupt(e.to_string()))?;
    if bytes.len() < HEADER_LEN || &bytes[..4] != MAGIC {
        return Err(CacheMiss::Corrupt("bad header".into()));
    }
    let mut version = [0u8; 4];
    version.copy_from_slice(&bytes[4..HEADER_LEN]);
    let version = u32::from_le_bytes(version);
    if version != FORMAT_VERSION {
        return Err(CacheMiss::Stale(format!("format version {version}, expected {FORMAT_VERSION}")));
    }
    let raw = zstd::decode_all(&bytes[HEADER_LEN..]).map_err(|e| CacheMiss::Corrupt(format!("decompress: {e}")))?;
    let artifact: Artifact = bincode::deserialize(&raw).map_err(|e| CacheMiss::Corrupt(format!("decode: {e}")))?;
    let index = artifact.index;
    if &index.fingerprint != expected {
        return Err(CacheMiss::Stale(format!("fingerprint {} != {}", index.fingerprint, expected)));
    }
    if &index.params != params {
        return Err(CacheMiss::Stale("analyzer parameters changed".into()));
    }
    if index.idf.len() != index.vocabulary.len() {
        return Err(CacheMiss::Corrupt("idf and vocabulary lengths differ".into()));
    }
    debug!(path = %path.display(), built_at_ms = artifact.built_at_ms, "cache artifact accepted");
    Ok(index)
}

/// Persist `index` at `path`, replacing any previous artifact atomically.
pub fn save(path: &Path, index: &VectorIndex) -> Result<()> {
    let artifact = ArtifactRef { built_at_ms: Utc::now().timestamp_millis(), index };
    let raw = bincode::serialize(&artifact).map_err(|e| Error::Operation(format!("encode index: {e}")))?;
    let compressed = zstd::encode_all(&raw[..], ZSTD_LEVEL)?;

    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    fs::create_dir_all(dir)?;
    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    tmp.write_all(MAGIC)?;
    tmp.write_all(&FORMAT_VERSION.to_le_bytes())?;
    tmp.write_all(&compressed)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| Error::Io(e.error))?;
    info!(path = %path.display(), bytes = compressed.len() + HEADER_LEN, docs = index.len(), "index cache saved");
    Ok(())
}

// Borrowing twin of `Artifact` so saving does not clone the index.
#[derive(Serialize)]
struct ArtifactRef<'a> {
    built_at_ms: i64,
    index: &'a VectorIndex,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signals_are_order_sensitive() {
        let a = FileSignal { size: 10, mtime_nanos: 1 };
        let b = FileSignal { size: 20, mtime_nanos: 2 };
        assert_ne!(fingerprint_from_signals(&[a, b]), fingerprint_from_signals(&[b, a]));
    }

    #[test]
    fn each_signal_changes_the_fingerprint() {
        let base = FileSignal { size: 10, mtime_nanos: 1_000 };
        let touched = FileSignal { mtime_nanos: 2_000, ..base };
        let grown = FileSignal { size: 11, ..base };
        let other = FileSignal { size: 5, mtime_nanos: 7 };
        let fp = fingerprint_from_signals(&[base, other]);
        assert_ne!(fp, fingerprint_from_signals(&[touched, other]));
        assert_ne!(fp, fingerprint_from_signals(&[grown, other]));
        assert_ne!(fp, fingerprint_from_signals(&[other, base]));
        assert_eq!(fp, fingerprint_from_signals(&[base, other]));
    }
}
