/*!
 * Progress events emitted by a translation run.
 *
 * The orchestrator pushes events into an unbounded channel; the receiving side
 * (a progress bar, a log, a test) consumes them at its own pace. Sending never
 * blocks and a dropped receiver is ignored.
 */

use std::path::PathBuf;
use tokio::sync::mpsc;

use crate::cost::{CostEstimate, UsageTotals};

/// Sending half of a progress channel
pub type ProgressSender = mpsc::UnboundedSender<ProgressEvent>;

/// Receiving half of a progress channel
pub type ProgressReceiver = mpsc::UnboundedReceiver<ProgressEvent>;

/// Create a progress channel
pub fn progress_channel() -> (ProgressSender, ProgressReceiver) {
    mpsc::unbounded_channel()
}

/// Figures shown before a run starts
#[derive(Debug, Clone, PartialEq)]
pub struct RunEstimate {
    /// Number of chunks the document splits into
    pub chunk_count: usize,
    /// Document length in characters
    pub char_count: usize,
    /// Heuristic cost; `None` when the model has no known price list
    pub cost: Option<CostEstimate>,
}

impl RunEstimate {
    /// Human-readable rendering for prompts and logs
    pub fn summary(&self) -> String {
        let cost = match &self.cost {
            Some(cost) if cost.pricing.is_free() => "no cost (local backend)".to_string(),
            Some(cost) => cost.summary(),
            None => "cost unknown (no price list for this model)".to_string(),
        };
        format!(
            "{} characters in {} chunk{}, {}",
            self.char_count,
            self.chunk_count,
            if self.chunk_count == 1 { "" } else { "s" },
            cost
        )
    }
}

/// One step of observable progress
#[derive(Debug, Clone)]
pub enum ProgressEvent {
    /// A named stage with overall percent
    Stage { message: String, percent: u8 },
    /// Pre-run estimate, emitted before the confirmation gate
    Estimate(RunEstimate),
    /// A chunk request is about to be issued
    ChunkStarted { index: usize, total: usize },
    /// A chunk was translated; `percent` counts completed chunks
    ChunkCompleted { index: usize, total: usize, percent: u8 },
    /// A transient failure will be retried after `delay_ms`
    ChunkRetrying { index: usize, attempt: usize, delay_ms: u64, reason: String },
    /// The output was written
    Finished { output_path: PathBuf, usage: UsageTotals },
    /// The run ended with an error
    Failed { message: String, hint: String },
}

/// Share of the overall percent covered by chunk translation
pub const TRANSLATION_SPAN: usize = 90;

/// Overall percent after `completed` of `total` chunks
///
/// Chunks fill 0..=90 so that saving (95) and finishing (100) stay ahead.
pub fn chunk_percent(completed: usize, total: usize) -> u8 {
    if total == 0 {
        return TRANSLATION_SPAN as u8;
    }
    (completed.min(total) * TRANSLATION_SPAN / total) as u8
}
