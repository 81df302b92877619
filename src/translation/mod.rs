/*!
 * Document translation pipeline.
 *
 * This module drives a document through the translation backends. It is split
 * into several submodules:
 *
 * - `orchestrator`: Run state machine, preflight, sequential chunk translation
 * - `job`: Per-chunk work records
 * - `events`: Progress events and the pre-run estimate
 */

// Re-export main types for easier usage
pub use self::events::{progress_channel, ProgressEvent, ProgressReceiver, ProgressSender, RunEstimate};
pub use self::job::{ChunkJob, ChunkStatus};
pub use self::orchestrator::{
    ConfirmationGate, Orchestrator, PipelineOptions, RunState, TranslationOutcome, TranslationReport,
};

// Submodules
pub mod events;
pub mod job;
pub mod orchestrator;
