//! Domain types shared by the index and the agent orchestration layers.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Range;
use std::time::Duration;

/// 1-based identifier of a worker; equal to its partition's position.
pub type WorkerId = usize;

/// Which source file a record came from.
///
/// `Rulings` is source A (customs service litigation records: case number,
/// date, disposition, reasoning). `Precedents` is source B (law portal
/// precedents: title, summary, body).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum SourceTag {
    Rulings,
    Precedents,
}

impl SourceTag {
    pub fn label(self) -> &'static str {
        match self {
            SourceTag::Rulings => "rulings",
            SourceTag::Precedents => "precedents",
        }
    }
}

impl fmt::Display for SourceTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// One legal case as loaded from a source file.
///
/// - `id`: native case/precedent number when the source carries one
/// - `fields`: every non-empty field of the source object, in file order
/// - `raw_text`: weighted, whitespace-normalized concatenation of the
///   indexing fields; this is what the vectorizer sees
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    pub id: Option<String>,
    pub source: SourceTag,
    pub fields: Vec<(String, String)>,
    pub raw_text: String,
}

impl Record {
    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields.iter().find(|(k, _)| k == name).map(|(_, v)| v.as_str())
    }

    /// Short label for prompts and CLI output.
    pub fn display_id(&self, index: usize) -> String {
        match &self.id {
            Some(id) => id.clone(),
            None => format!("{}#{}", self.source, index),
        }
    }
}

/// Source A records followed by source B records.
///
/// Indices are stable for as long as the corpus is alive; partitions and
/// index rows refer to records by position.
#[derive(Debug, Clone, Default)]
pub struct Corpus {
    records: Vec<Record>,
    boundary: usize,
}

impl Corpus {
    pub fn new(rulings: Vec<Record>, precedents: Vec<Record>) -> Self {
        let boundary = rulings.len();
        let mut records = rulings;
        records.extend(precedents);
        Self { records, boundary }
    }

    pub fn len(&self) -> usize { self.records.len() }

    pub fn is_empty(&self) -> bool { self.records.is_empty() }

    /// Index of the first source-B record.
    pub fn boundary(&self) -> usize { self.boundary }

    pub fn get(&self, index: usize) -> Option<&Record> { self.records.get(index) }

    pub fn records(&self) -> &[Record] { &self.records }

    pub fn source_range(&self, source: SourceTag) -> Range<usize> {
        match source {
            SourceTag::Rulings => 0..self.boundary,
            SourceTag::Precedents => self.boundary..self.records.len(),
        }
    }

    pub fn texts(&self) -> impl Iterator<Item = &str> {
        self.records.iter().map(|r| r.raw_text.as_str())
    }
}

/// A contiguous `[start, end)` slice of the corpus owned by one worker.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct Partition {
    pub worker_id: WorkerId,
    pub source: SourceTag,
    pub start: usize,
    pub end: usize,
}

impl Partition {
    pub fn len(&self) -> usize { self.end - self.start }

    pub fn is_empty(&self) -> bool { self.start == self.end }

    pub fn range(&self) -> Range<usize> { self.start..self.end }
}

/// One prior exchange of the conversation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Turn {
    pub user: String,
    pub assistant: String,
}

/// User question plus bounded conversation context (most recent last).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Query {
    pub text: String,
    pub context: Vec<Turn>,
}

impl Query {
    /// Keeps only the `max_turns` most recent turns of `context`.
    pub fn new(text: impl Into<String>, mut context: Vec<Turn>, max_turns: usize) -> Self {
        if context.len() > max_turns {
            context.drain(..context.len() - max_turns);
        }
        Self { text: text.into(), context }
    }

    pub fn without_context(text: impl Into<String>) -> Self {
        Self { text: text.into(), context: Vec::new() }
    }

    /// Context rendered as alternating `User:` / `Assistant:` paragraphs.
    pub fn history(&self) -> String {
        let mut out = String::new();
        for turn in &self.context {
            out.push_str(&format!("User: {}\n\nAssistant: {}\n\n", turn.user, turn.assistant));
        }
        out
    }
}

/// Why a worker did not produce text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum WorkerFailure {
    Timeout,
    RateLimited,
    ServiceError(String),
    Cancelled,
}

impl fmt::Display for WorkerFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WorkerFailure::Timeout => f.write_str("timed out"),
            WorkerFailure::RateLimited => f.write_str("rate limited"),
            WorkerFailure::ServiceError(msg) => write!(f, "service error: {msg}"),
            WorkerFailure::Cancelled => f.write_str("cancelled"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerStatus {
    Ok(String),
    Failed(WorkerFailure),
}

/// Terminal outcome of one worker.
#[derive(Debug, Clone)]
pub struct WorkerResult {
    pub worker_id: WorkerId,
    pub status: WorkerStatus,
    pub elapsed: Duration,
    /// Corpus indices the worker retrieved, best first.
    pub hits: Vec<usize>,
}

impl WorkerResult {
    pub fn text(&self) -> Option<&str> {
        match &self.status {
            WorkerStatus::Ok(text) => Some(text),
            WorkerStatus::Failed(_) => None,
        }
    }

    pub fn failure(&self) -> Option<&WorkerFailure> {
        match &self.status {
            WorkerStatus::Ok(_) => None,
            WorkerStatus::Failed(reason) => Some(reason),
        }
    }

    pub fn is_ok(&self) -> bool { matches!(self.status, WorkerStatus::Ok(_)) }

    pub fn timed_out(&self) -> bool { self.failure() == Some(&WorkerFailure::Timeout) }
}

/// Synthesized answer plus which workers fed into it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FinalAnswer {
    pub text: String,
    pub contributors: Vec<WorkerId>,
    pub omitted: Vec<(WorkerId, WorkerFailure)>,
}
