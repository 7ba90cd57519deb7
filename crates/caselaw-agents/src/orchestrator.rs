//! Fan-out of one request over all partitions.
//!
//! One task per partition on a `JoinSet`. Results are pushed to the caller's
//! channel as each worker finishes, and the full set is returned sorted by
//! worker id once every task has terminated. The channel is unbounded so a
//! slow or absent reader never holds up the join.

use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use caselaw_core::config::OrchestratorSettings;
use caselaw_core::store::normalize_whitespace;
use caselaw_core::traits::Generator;
use caselaw_core::types::{Corpus, Partition, Query, WorkerFailure, WorkerResult, WorkerStatus};
use caselaw_index::VectorIndex;

use crate::worker::{run_worker, WorkerContext};

pub struct Orchestrator {
    generator: Arc<dyn Generator>,
    settings: OrchestratorSettings,
    top_k: usize,
}

impl Orchestrator {
    pub fn new(generator: Arc<dyn Generator>, settings: OrchestratorSettings, top_k: usize) -> Self {
        Self { generator, settings, top_k }
    }

    /// Query text plus rendered conversation context; this is what gets
    /// vectorized for retrieval.
    pub fn enriched_text(query: &Query) -> String {
        normalize_whitespace(&format!("{} {}", query.text, query.history()))
    }

    pub async fn run(
        &self,
        query: &Query,
        index: Arc<VectorIndex>,
        corpus: Arc<Corpus>,
        partitions: &[Partition],
        events: mpsc::UnboundedSender<WorkerResult>,
        cancel: CancellationToken,
    ) -> Vec<WorkerResult> {
        let started = Instant::now();
        let query_vector = index.transform(&Self::enriched_text(query));
        let ctx = Arc::new(WorkerContext {
            query: query.clone(),
            query_vector,
            index,
            corpus,
            generator: Arc::clone(&self.generator),
            top_k: self.top_k,
            temperature: self.settings.temperature,
            timeout: Duration::from_secs(self.settings.worker_timeout_secs),
        });

        let mut tasks = JoinSet::new();
        for partition in partitions.iter().copied() {
            let ctx = Arc::clone(&ctx);
            let token = cancel.clone();
            let events = events.clone();
            tasks.spawn(async move {
                let spawned = Instant::now();
                let result = AssertUnwindSafe(run_worker(ctx, partition, token))
                    .catch_unwind()
                    .await
                    .unwrap_or_else(|_| {
                        error!(worker_id = partition.worker_id, "worker task panicked");
                        WorkerResult {
                            worker_id: partition.worker_id,
                            status: WorkerStatus::Failed(WorkerFailure::ServiceError("worker task panicked".into())),
                            elapsed: spawned.elapsed(),
                            hits: Vec::new(),
                        }
                    });
                // A dropped receiver only means nobody is listening for progress.
                let _ = events.send(result.clone());
                result
            });
        }
        drop(events);

        let mut results = Vec::with_capacity(partitions.len());
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(result) => results.push(result),
                Err(e) => error!(error = %e, "worker task did not complete"),
            }
        }
        results.sort_by_key(|r| r.worker_id);

        let ok = results.iter().filter(|r| r.is_ok()).count();
        info!(workers = results.len(), ok, failed = results.len() - ok, elapsed_ms = started.elapsed().as_millis() as u64, "all workers terminated");
        results
    }
}
