//! Query engine: owns the served snapshot and drives one request end to end.
//!
//! The snapshot (corpus, index, partitions) is built once behind a startup
//! barrier. `invalidate` builds a replacement and swaps it in; requests
//! already running keep the snapshot they started with.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::{mpsc, Mutex, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use caselaw_core::config::Settings;
use caselaw_core::error::{Error, Result};
use caselaw_core::store::DocumentStore;
use caselaw_core::traits::Generator;
use caselaw_core::types::{Corpus, FinalAnswer, Partition, Query, WorkerFailure, WorkerId, WorkerResult, WorkerStatus};
use caselaw_index::{load_or_build, rebuild, search, AnalyzerParams, Hit, Provenance, VectorIndex};

use crate::aggregator::Aggregator;
use crate::orchestrator::Orchestrator;
use crate::partition::{plan, WorkerSplit};

const EVENT_BUFFER: usize = 32;

/// Everything a request reads, immutable once built.
#[derive(Debug)]
pub struct Snapshot {
    pub corpus: Arc<Corpus>,
    pub index: Arc<VectorIndex>,
    pub partitions: Vec<Partition>,
    pub provenance: Provenance,
}

impl Snapshot {
    /// Retrieval only: the top `k` hits of every partition.
    pub fn retrieve(&self, text: &str, k: usize) -> Result<Vec<(Partition, Vec<Hit>)>> {
        let query = self.index.transform(text);
        self.partitions
            .iter()
            .map(|p| search(&self.index, &query, p, k).map(|hits| (*p, hits)))
            .collect()
    }
}

/// Progress of one request, in the order the caller should see it.
/// The last event is always `Final` or `Error`.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryEvent {
    WorkerDone { worker_id: WorkerId, text: String },
    WorkerFailed { worker_id: WorkerId, reason: WorkerFailure },
    Final { text: String, omitted: Vec<(WorkerId, WorkerFailure)> },
    Error { detail: String },
}

impl QueryEvent {
    pub fn is_terminal(&self) -> bool { matches!(self, QueryEvent::Final { .. } | QueryEvent::Error { .. }) }
}

impl From<&WorkerResult> for QueryEvent {
    fn from(r: &WorkerResult) -> Self {
        match &r.status {
            WorkerStatus::Ok(text) => QueryEvent::WorkerDone { worker_id: r.worker_id, text: text.clone() },
            WorkerStatus::Failed(reason) => QueryEvent::WorkerFailed { worker_id: r.worker_id, reason: reason.clone() },
        }
    }
}

/// Caller side of a running request. Dropping the handle cancels it.
pub struct QueryHandle {
    events: mpsc::Receiver<QueryEvent>,
    cancel: CancellationToken,
}

impl QueryHandle {
    pub async fn next_event(&mut self) -> Option<QueryEvent> { self.events.recv().await }

    pub fn cancel(&self) { self.cancel.cancel(); }

    pub fn cancellation_token(&self) -> CancellationToken { self.cancel.clone() }

    /// Drain every remaining event.
    pub async fn collect(mut self) -> Vec<QueryEvent> {
        let mut out = Vec::new();
        while let Some(event) = self.events.recv().await { out.push(event); }
        out
    }
}

impl Drop for QueryHandle {
    fn drop(&mut self) { self.cancel.cancel(); }
}

pub struct Engine {
    settings: Settings,
    base_dir: PathBuf,
    orchestrator: Orchestrator,
    aggregator: Aggregator,
    current: RwLock<Option<Arc<Snapshot>>>,
    build_lock: Mutex<()>,
}

impl Engine {
    /// Relative data paths in `settings` resolve against `base_dir`.
    pub fn new(settings: Settings, base_dir: &Path, generator: Arc<dyn Generator>) -> Self {
        let orchestrator = Orchestrator::new(Arc::clone(&generator), settings.orchestrator.clone(), settings.retrieval.top_k);
        let aggregator = Aggregator::new(generator, settings.aggregator.clone());
        Self {
            settings,
            base_dir: base_dir.to_path_buf(),
            orchestrator,
            aggregator,
            current: RwLock::new(None),
            build_lock: Mutex::new(()),
        }
    }

    pub fn settings(&self) -> &Settings { &self.settings }

    /// The served snapshot, building it on first use. Concurrent first
    /// callers wait for a single build.
    pub async fn snapshot(&self) -> Result<Arc<Snapshot>> {
        if let Some(snapshot) = self.current.read().await.as_ref() {
            return Ok(Arc::clone(snapshot));
        }
        let _guard = self.build_lock.lock().await;
        if let Some(snapshot) = self.current.read().await.as_ref() {
            return Ok(Arc::clone(snapshot));
        }
        let snapshot = Arc::new(self.build(false).await?);
        *self.current.write().await = Some(Arc::clone(&snapshot));
        Ok(snapshot)
    }

    /// Rebuild from the source files, ignoring the cache, and swap the result in.
    pub async fn invalidate(&self) -> Result<Arc<Snapshot>> {
        let _guard = self.build_lock.lock().await;
        let snapshot = Arc::new(self.build(true).await?);
        *self.current.write().await = Some(Arc::clone(&snapshot));
        Ok(snapshot)
    }

    async fn build(&self, force: bool) -> Result<Snapshot> {
        let settings = self.settings.clone();
        let base_dir = self.base_dir.clone();
        tokio::task::spawn_blocking(move || build_snapshot(&settings, &base_dir, force))
            .await
            .map_err(|e| Error::Operation(format!("index build task failed: {e}")))?
    }

    /// Start answering `query` in the background and return its event stream.
    pub fn query(self: &Arc<Self>, query: Query) -> QueryHandle {
        let (tx, rx) = mpsc::channel(EVENT_BUFFER);
        let cancel = CancellationToken::new();
        let engine = Arc::clone(self);
        let token = cancel.clone();
        tokio::spawn(async move {
            let last = match engine.answer(query, &tx, token).await {
                Ok(answer) => QueryEvent::Final { text: answer.text, omitted: answer.omitted },
                Err(e) => {
                    warn!(error = %e, "request failed");
                    QueryEvent::Error { detail: e.to_string() }
                }
            };
            let _ = tx.send(last).await;
        });
        QueryHandle { events: rx, cancel }
    }

    async fn answer(&self, query: Query, events: &mpsc::Sender<QueryEvent>, cancel: CancellationToken) -> Result<FinalAnswer> {
        let started = Instant::now();
        let snapshot = self.snapshot().await?;
        let query = Query::new(query.text, query.context, self.settings.orchestrator.max_context_turns);

        let (worker_tx, mut worker_rx) = mpsc::unbounded_channel();
        let run = self.orchestrator.run(
            &query,
            Arc::clone(&snapshot.index),
            Arc::clone(&snapshot.corpus),
            &snapshot.partitions,
            worker_tx,
            cancel.clone(),
        );
        let forward = async {
            while let Some(result) = worker_rx.recv().await {
                let _ = events.send(QueryEvent::from(&result)).await;
            }
        };
        let (results, ()) = tokio::join!(run, forward);

        if cancel.is_cancelled() { return Err(Error::Cancelled); }
        let answer = self.aggregator.aggregate(&query, &results, cancel).await?;
        info!(contributors = ?answer.contributors, omitted = answer.omitted.len(), elapsed_ms = started.elapsed().as_millis() as u64, "request answered");
        Ok(answer)
    }
}

/// Load both sources, load or fit the index and plan partitions.
pub fn build_snapshot(settings: &Settings, base_dir: &Path, force: bool) -> Result<Snapshot> {
    let started = Instant::now();
    let rulings = settings.data.rulings(base_dir);
    let precedents = settings.data.precedents(base_dir);
    let cache_path = settings.data.cache(base_dir);

    let corpus = DocumentStore::new().load(&rulings, &precedents)?;
    let params = AnalyzerParams::from(&settings.index);
    let sources = [rulings.as_path(), precedents.as_path()];
    let (index, provenance) = if force {
        (rebuild(&corpus, &sources, &cache_path, settings.index.fingerprint, &params)?, Provenance::Forced)
    } else {
        load_or_build(&corpus, &sources, &cache_path, settings.index.fingerprint, &params)?
    };
    let partitions = plan(corpus.len(), corpus.boundary(), WorkerSplit::from(&settings.planner))?;

    info!(
        docs = corpus.len(),
        boundary = corpus.boundary(),
        features = index.n_features(),
        partitions = partitions.len(),
        provenance = ?provenance,
        elapsed_ms = started.elapsed().as_millis() as u64,
        "snapshot ready"
    );
    Ok(Snapshot { corpus: Arc::new(corpus), index: Arc::new(index), partitions, provenance })
}
