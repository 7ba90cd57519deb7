use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use caselaw_core::traits::Generator;
use caselaw_core::types::{Corpus, Partition, Query, WorkerFailure, WorkerResult, WorkerStatus};
use caselaw_index::{search, SparseVector, VectorIndex};

use crate::prompt::worker_prompt;

/// Answer reported by a worker whose partition has nothing relevant.
pub const NO_DOCUMENTS_NOTE: &str = "No relevant documents were found in this partition.";

/// Lifecycle of one worker within a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    Pending,
    Retrieving,
    Generating,
    Completed,
    Failed,
    TimedOut,
}

impl fmt::Display for WorkerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            WorkerState::Pending => "pending",
            WorkerState::Retrieving => "retrieving",
            WorkerState::Generating => "generating",
            WorkerState::Completed => "completed",
            WorkerState::Failed => "failed",
            WorkerState::TimedOut => "timed_out",
        };
        f.write_str(s)
    }
}

/// Everything the workers of one request share.
pub struct WorkerContext {
    pub query: Query,
    pub query_vector: SparseVector,
    pub index: Arc<VectorIndex>,
    pub corpus: Arc<Corpus>,
    pub generator: Arc<dyn Generator>,
    pub top_k: usize,
    pub temperature: f32,
    pub timeout: Duration,
}

/// Run one worker to a terminal state. Never panics on generator failures;
/// every outcome is folded into the returned `WorkerResult`.
pub async fn run_worker(ctx: Arc<WorkerContext>, partition: Partition, cancel: CancellationToken) -> WorkerResult {
    let started = Instant::now();
    let worker_id = partition.worker_id;
    let finish = |status: WorkerStatus, hits: Vec<usize>| {
        let state = match &status {
            WorkerStatus::Ok(_) => WorkerState::Completed,
            WorkerStatus::Failed(WorkerFailure::Timeout) => WorkerState::TimedOut,
            WorkerStatus::Failed(_) => WorkerState::Failed,
        };
        let elapsed = started.elapsed();
        match &status {
            WorkerStatus::Ok(_) => info!(worker_id, %state, elapsed_ms = elapsed.as_millis() as u64, "worker finished"),
            WorkerStatus::Failed(reason) => warn!(worker_id, %state, %reason, elapsed_ms = elapsed.as_millis() as u64, "worker finished"),
        }
        WorkerResult { worker_id, status, elapsed, hits }
    };

    debug!(worker_id, state = %WorkerState::Pending, start = partition.start, end = partition.end, "worker spawned");
    if cancel.is_cancelled() {
        return finish(WorkerStatus::Failed(WorkerFailure::Cancelled), Vec::new());
    }

    debug!(worker_id, state = %WorkerState::Retrieving, "worker state");
    let hits = match search(&ctx.index, &ctx.query_vector, &partition, ctx.top_k) {
        Ok(hits) => hits,
        Err(e) => return finish(WorkerStatus::Failed(WorkerFailure::ServiceError(e.to_string())), Vec::new()),
    };
    let hit_ids: Vec<usize> = hits.iter().map(|h| h.doc).collect();
    if hits.is_empty() {
        return finish(WorkerStatus::Ok(NO_DOCUMENTS_NOTE.to_string()), hit_ids);
    }

    let documents: Vec<_> = hits
        .iter()
        .filter_map(|h| ctx.corpus.get(h.doc).map(|record| (h.doc, record, h.score)))
        .collect();
    let prompt = worker_prompt(&ctx.query, &partition, &documents);

    debug!(worker_id, state = %WorkerState::Generating, documents = documents.len(), prompt_chars = prompt.chars().count(), "worker state");
    let status = tokio::select! {
        biased;
        () = cancel.cancelled() => WorkerStatus::Failed(WorkerFailure::Cancelled),
        outcome = tokio::time::timeout(ctx.timeout, ctx.generator.generate(&prompt, ctx.temperature)) => match outcome {
            Err(_) => WorkerStatus::Failed(WorkerFailure::Timeout),
            Ok(Ok(text)) => WorkerStatus::Ok(text),
            Ok(Err(e)) => WorkerStatus::Failed(e.into()),
        },
    };
    finish(status, hit_ids)
}
