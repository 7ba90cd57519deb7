//! caselaw-agents
//!
//! Partition planning, the per-partition worker fan-out, head aggregation
//! and the `Engine` that ties them to a served index snapshot.

pub mod aggregator;
pub mod engine;
pub mod orchestrator;
pub mod partition;
pub mod prompt;
pub mod worker;

pub use aggregator::Aggregator;
pub use engine::{Engine, QueryEvent, QueryHandle, Snapshot};
pub use orchestrator::Orchestrator;
pub use partition::{plan, WorkerSplit};
pub use worker::{WorkerState, NO_DOCUMENTS_NOTE};
