use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use caselaw_core::config::AggregatorSettings;
use caselaw_core::error::{Error, Result};
use caselaw_core::traits::Generator;
use caselaw_core::types::{FinalAnswer, Query, WorkerFailure, WorkerId, WorkerResult};

use crate::prompt::head_prompt;

/// Rough tokens-per-character ratio used for the input budget.
const TOKENS_PER_CHAR: f64 = 2.5;
/// A truncated worker output is never cut below this many characters.
const MIN_TRUNCATED_CHARS: usize = 1000;

pub struct Aggregator {
    generator: Arc<dyn Generator>,
    settings: AggregatorSettings,
}

impl Aggregator {
    pub fn new(generator: Arc<dyn Generator>, settings: AggregatorSettings) -> Self {
        Self { generator, settings }
    }

    /// Synthesize the final answer from the successful worker outputs.
    pub async fn aggregate(&self, query: &Query, results: &[WorkerResult], cancel: CancellationToken) -> Result<FinalAnswer> {
        let mut outputs: Vec<(WorkerId, String)> = results
            .iter()
            .filter_map(|r| r.text().map(|t| (r.worker_id, t.to_string())))
            .collect();
        outputs.sort_by_key(|(id, _)| *id);
        let mut omitted: Vec<(WorkerId, WorkerFailure)> = results
            .iter()
            .filter_map(|r| r.failure().map(|f| (r.worker_id, f.clone())))
            .collect();
        omitted.sort_by_key(|(id, _)| *id);

        if outputs.is_empty() {
            return Err(Error::AggregationFailed(format!("no worker produced an answer ({} failed)", omitted.len())));
        }
        for (id, reason) in &omitted {
            warn!(worker_id = id, %reason, "worker omitted from aggregation");
        }

        if let Some((before, after)) = fit_to_budget(&mut outputs, self.settings.max_input_tokens) {
            warn!(before, after, "last worker output truncated to fit the head input budget");
        }

        if self.settings.cooldown_ms > 0 {
            info!(cooldown_ms = self.settings.cooldown_ms, "waiting before the head call");
            tokio::select! {
                biased;
                () = cancel.cancelled() => return Err(Error::Cancelled),
                () = tokio::time::sleep(Duration::from_millis(self.settings.cooldown_ms)) => {}
            }
        }
        if cancel.is_cancelled() { return Err(Error::Cancelled); }

        let prompt = head_prompt(query, &outputs);
        let contributors: Vec<WorkerId> = outputs.iter().map(|(id, _)| *id).collect();
        info!(contributors = ?contributors, prompt_chars = prompt.chars().count(), "head generation started");
        let text = tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(Error::Cancelled),
            outcome = self.generator.generate(&prompt, self.settings.temperature) => {
                outcome.map_err(|e| Error::AggregationFailed(e.to_string()))?
            }
        };
        info!(chars = text.chars().count(), "head generation finished");
        Ok(FinalAnswer { text, contributors, omitted })
    }
}

/// Truncate the last output when the estimated input exceeds `max_tokens`.
/// Returns the char lengths before and after when a cut was made.
pub fn fit_to_budget(outputs: &mut [(WorkerId, String)], max_tokens: usize) -> Option<(usize, usize)> {
    let total_chars: usize = outputs.iter().map(|(_, t)| t.chars().count()).sum();
    let estimated = total_chars as f64 * TOKENS_PER_CHAR;
    let budget = max_tokens as f64;
    if estimated <= budget { return None; }

    let (_, last) = outputs.last_mut()?;
    let before = last.chars().count();
    let reduction = ((estimated - budget) / TOKENS_PER_CHAR) as usize;
    let after = before.saturating_sub(reduction).max(MIN_TRUNCATED_CHARS);
    if after >= before { return None; }
    if let Some((byte, _)) = last.char_indices().nth(after) {
        last.truncate(byte);
    }
    Some((before, after))
}
