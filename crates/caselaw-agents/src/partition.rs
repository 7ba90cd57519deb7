use tracing::debug;

use caselaw_core::config::PlannerSettings;
use caselaw_core::error::{Error, Result};
use caselaw_core::types::{Partition, SourceTag, WorkerId};

/// Worker counts per source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkerSplit {
    pub source_a: usize,
    pub source_b: usize,
}

impl Default for WorkerSplit {
    fn default() -> Self { Self::from(&PlannerSettings::default()) }
}

impl From<&PlannerSettings> for WorkerSplit {
    fn from(s: &PlannerSettings) -> Self { Self { source_a: s.source_a_workers, source_b: s.source_b_workers } }
}

/// Split `[0, boundary)` and `[boundary, corpus_size)` into balanced
/// contiguous partitions. Worker ids start at 1 and follow `start`.
pub fn plan(corpus_size: usize, boundary: usize, split: WorkerSplit) -> Result<Vec<Partition>> {
    if boundary > corpus_size {
        return Err(Error::InvalidConfig(format!("source boundary {boundary} exceeds corpus size {corpus_size}")));
    }
    let mut partitions = Vec::with_capacity(split.source_a + split.source_b);
    split_range(SourceTag::Rulings, 0, boundary, split.source_a, &mut partitions)?;
    split_range(SourceTag::Precedents, boundary, corpus_size, split.source_b, &mut partitions)?;
    debug!(partitions = ?partitions.iter().map(|p| (p.worker_id, p.start, p.end)).collect::<Vec<_>>(), "partitions planned");
    Ok(partitions)
}

fn split_range(source: SourceTag, start: usize, end: usize, workers: usize, out: &mut Vec<Partition>) -> Result<()> {
    let len = end - start;
    if workers == 0 {
        if len > 0 {
            return Err(Error::InvalidConfig(format!("{len} {source} records but no workers assigned")));
        }
        return Ok(());
    }
    let (base, extra) = (len / workers, len % workers);
    let mut cursor = start;
    for i in 0..workers {
        let size = base + usize::from(i < extra);
        let worker_id: WorkerId = out.len() + 1;
        out.push(Partition { worker_id, source, start: cursor, end: cursor + size });
        cursor += size;
    }
    Ok(())
}
