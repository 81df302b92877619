/*!
 * Translation run orchestration.
 *
 * The orchestrator drives one document through
 * `Estimating -> AwaitingConfirmation? -> Preflight -> Translating(i) -> Assembling -> Completed`.
 * Chunks are translated strictly in order; the first chunk that cannot be
 * translated aborts the whole run and nothing is written. Transient failures
 * may be retried a bounded number of times with exponential backoff.
 */

use async_trait::async_trait;
use log::{debug, error, info, warn};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::app_config::PipelineSettings;
use crate::backends::{Backend, HealthStatus, ModelReadiness};
use crate::cost::{estimate_pre_run, pricing_for, CostEstimate, Pricing, UsageTotals};
use crate::document::Document;
use crate::errors::{BackendError, ConfigError, InputError, PipelineError, PreflightError};
use crate::file_utils::{assemble, FileManager};
use crate::language_utils::TargetLanguage;
use crate::sanitizer::sanitize;
use crate::segmenter::{chunk_count, segment, Chunk, DEFAULT_CHUNK_SIZE};

use super::events::{chunk_percent, ProgressEvent, ProgressSender, RunEstimate};
use super::job::ChunkJob;

/// Percent reported while the output is written
const SAVING_PERCENT: u8 = 95;

/// Upper bound on the backoff exponent
const MAX_BACKOFF_SHIFT: usize = 16;

/// Where a run currently stands
#[derive(Debug, Clone, PartialEq)]
pub enum RunState {
    NotStarted,
    Estimating,
    AwaitingConfirmation,
    Preflight,
    /// Translating the chunk with this index
    Translating(usize),
    Assembling,
    Completed,
    /// The confirmation gate refused the run
    Declined,
    Failed(String),
}

impl RunState {
    /// Whether the run can no longer progress
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Declined | Self::Failed(_))
    }
}

/// Asks whether a run should go ahead once its estimate is known
#[async_trait]
pub trait ConfirmationGate: Send + Sync {
    /// Return `true` to proceed with the run
    async fn confirm(&self, estimate: &RunEstimate) -> bool;
}

#[async_trait]
impl<F> ConfirmationGate for F
where
    F: Fn(&RunEstimate) -> bool + Send + Sync,
{
    async fn confirm(&self, estimate: &RunEstimate) -> bool {
        self(estimate)
    }
}

/// Per-run pipeline options
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineOptions {
    /// Maximum characters per chunk
    pub chunk_size: usize,
    /// Retries per chunk for transient failures
    pub max_retries: u32,
    /// Base backoff in milliseconds, doubled on each retry
    pub retry_backoff_ms: u64,
    /// Directory for the output file; defaults to the source's directory
    pub output_dir: Option<PathBuf>,
    /// Exact output path, overriding the generated name
    pub output_path: Option<PathBuf>,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            max_retries: 0,
            retry_backoff_ms: 1000,
            output_dir: None,
            output_path: None,
        }
    }
}

impl From<&PipelineSettings> for PipelineOptions {
    fn from(settings: &PipelineSettings) -> Self {
        Self {
            chunk_size: settings.chunk_size,
            max_retries: settings.max_retries,
            retry_backoff_ms: settings.retry_backoff_ms,
            ..Self::default()
        }
    }
}

/// Result of a successful run
#[derive(Debug, Clone)]
pub struct TranslationReport {
    /// Where the translation was written
    pub output_path: PathBuf,
    pub chunk_count: usize,
    /// Usage summed over every chunk
    pub usage: UsageTotals,
    /// Actual cost, when the model has a price list
    pub cost: Option<CostEstimate>,
    /// The assembled translation
    pub translation: String,
}

/// How a run ended when it did not fail
#[derive(Debug, Clone)]
pub enum TranslationOutcome {
    Completed(TranslationReport),
    /// The confirmation gate refused; no request was sent
    Declined(RunEstimate),
}

/// Delay before retry number `attempt` (1-based)
pub fn backoff_delay(base_ms: u64, attempt: usize) -> Duration {
    let shift = attempt.saturating_sub(1).min(MAX_BACKOFF_SHIFT);
    Duration::from_millis(base_ms.saturating_mul(1u64 << shift))
}

/// Drives a document through the translation pipeline
pub struct Orchestrator {
    // @field: Backend client used for every request of the run
    backend: Box<dyn Backend>,

    // @field: Model name sent with each request
    model: String,

    // @field: Language to translate into
    language: TargetLanguage,

    options: PipelineOptions,

    // @field: Optional gate consulted before any network call
    gate: Option<Arc<dyn ConfirmationGate>>,

    // @field: Progress channel, if anyone listens
    events: Option<ProgressSender>,

    state: RunState,
}

impl Orchestrator {
    /// Create an orchestrator with default options and no gate
    pub fn new(backend: Box<dyn Backend>, model: impl Into<String>, language: TargetLanguage) -> Self {
        Self {
            backend,
            model: model.into(),
            language,
            options: PipelineOptions::default(),
            gate: None,
            events: None,
            state: RunState::NotStarted,
        }
    }

    pub fn with_options(mut self, options: PipelineOptions) -> Self {
        self.options = options;
        self
    }

    /// Ask `gate` before starting; without a gate the run starts unconditionally
    pub fn with_gate(mut self, gate: impl ConfirmationGate + 'static) -> Self {
        self.gate = Some(Arc::new(gate));
        self
    }

    /// Ask a gate shared with other runs
    pub fn with_shared_gate(mut self, gate: Arc<dyn ConfirmationGate>) -> Self {
        self.gate = Some(gate);
        self
    }

    /// Send progress events to `sender`
    pub fn with_events(mut self, sender: ProgressSender) -> Self {
        self.events = Some(sender);
        self
    }

    pub fn state(&self) -> &RunState {
        &self.state
    }

    pub fn options(&self) -> &PipelineOptions {
        &self.options
    }

    pub fn language(&self) -> &TargetLanguage {
        &self.language
    }

    /// Price list for the configured backend and model
    pub fn pricing(&self) -> Result<Pricing, ConfigError> {
        pricing_for(&self.backend.kind(), &self.model)
    }

    /// Pre-run estimate without any network call
    pub fn estimate(&self, document: &Document) -> Result<RunEstimate, PipelineError> {
        if self.options.chunk_size == 0 {
            return Err(ConfigError::InvalidChunkSize(0).into());
        }
        let char_count = document.char_count();
        Ok(self.estimate_for(char_count, chunk_count(char_count, self.options.chunk_size)))
    }

    /// Where the output for `document` will be written
    pub fn output_path_for(&self, document: &Document) -> PathBuf {
        self.options.output_path.clone().unwrap_or_else(|| {
            FileManager::generate_output_path(
                document.source_path(),
                &self.language.file_label(),
                self.options.output_dir.as_deref(),
            )
        })
    }

    /// Translate a document and write the result
    ///
    /// Every failure is also reported as a `ProgressEvent::Failed` and leaves
    /// the orchestrator in `RunState::Failed`.
    pub async fn run(&mut self, document: &Document) -> Result<TranslationOutcome, PipelineError> {
        match self.execute(document).await {
            Ok(outcome) => Ok(outcome),
            Err(e) => {
                error!("Translation failed: {}", e);
                self.transition(RunState::Failed(e.to_string()));
                self.emit(ProgressEvent::Failed {
                    message: e.to_string(),
                    hint: e.hint(),
                });
                Err(e)
            }
        }
    }

    async fn execute(&mut self, document: &Document) -> Result<TranslationOutcome, PipelineError> {
        self.transition(RunState::Estimating);

        if document.is_blank() {
            let name = document
                .source_path()
                .map(|p| p.display().to_string())
                .unwrap_or_else(|| "inline text".to_string());
            return Err(InputError::EmptyDocument(name).into());
        }

        let chunks = segment(document.text(), self.options.chunk_size)?;
        let estimate = self.estimate_for(document.char_count(), chunks.len());
        info!("Document: {}", estimate.summary());
        self.emit(ProgressEvent::Estimate(estimate.clone()));

        if self.gate.is_some() {
            self.transition(RunState::AwaitingConfirmation);
            let confirmed = match &self.gate {
                Some(gate) => gate.confirm(&estimate).await,
                None => true,
            };
            if !confirmed {
                info!("Translation declined after estimate");
                self.transition(RunState::Declined);
                return Ok(TranslationOutcome::Declined(estimate));
            }
        }

        self.transition(RunState::Preflight);
        self.preflight().await?;

        let total = chunks.len();
        let mut usage = UsageTotals::new(self.backend.kind().display_name(), &self.model);
        let mut results = Vec::with_capacity(total);

        for chunk in &chunks {
            self.transition(RunState::Translating(chunk.index));
            self.emit(ProgressEvent::ChunkStarted { index: chunk.index, total });
            info!("Translating chunk {}/{} ({} characters)", chunk.index + 1, total, chunk.len());

            let mut job = ChunkJob::new(chunk.index);
            if let Err(source) = self.translate_with_retry(chunk, &mut job, &mut usage).await {
                job.fail(source.to_string());
                return Err(PipelineError::ChunkTranslation {
                    index: chunk.index,
                    total,
                    source,
                });
            }

            if let Some(text) = job.take_result() {
                results.push(text);
            }
            self.emit(ProgressEvent::ChunkCompleted {
                index: chunk.index,
                total,
                percent: chunk_percent(chunk.index + 1, total),
            });
        }

        self.transition(RunState::Assembling);
        self.emit_stage("Saving translated text...", SAVING_PERCENT);

        let translation = assemble(&results);
        let output_path = self.output_path_for(document);
        if let Err(e) = FileManager::write_to_file(&output_path, &translation) {
            return Err(PipelineError::Persistence {
                path: output_path,
                message: e.to_string(),
                translation,
            });
        }
        info!("Translation saved to {}", output_path.display());
        debug!("{}", usage.summary());

        let cost = self.pricing().ok().map(|pricing| usage.cost(pricing));
        self.transition(RunState::Completed);
        self.emit(ProgressEvent::Finished {
            output_path: output_path.clone(),
            usage: usage.clone(),
        });

        Ok(TranslationOutcome::Completed(TranslationReport {
            output_path,
            chunk_count: total,
            usage,
            cost,
            translation,
        }))
    }

    async fn preflight(&self) -> Result<(), PreflightError> {
        let kind = self.backend.kind();
        self.emit_stage(format!("Checking if {} is running...", kind.display_name()), 0);

        if let HealthStatus::Degraded(detail) = self.backend.check_health(&self.model).await? {
            return Err(PreflightError::Degraded(detail));
        }

        self.emit_stage(format!("Testing model {}...", self.model), 0);
        match self.backend.check_model_ready(&self.model).await? {
            ModelReadiness::Ready => {
                debug!("Model {} is ready", self.model);
                Ok(())
            }
            ModelReadiness::NotFound(detail) => Err(PreflightError::ModelNotReady {
                model: self.model.clone(),
                detail,
            }),
        }
    }

    async fn translate_with_retry(
        &self,
        chunk: &Chunk,
        job: &mut ChunkJob,
        totals: &mut UsageTotals,
    ) -> Result<(), BackendError> {
        loop {
            job.start_attempt();
            let started = Instant::now();

            let outcome = self
                .backend
                .translate_chunk(chunk, &self.language, &self.model)
                .await
                .and_then(|completion| {
                    let clean = sanitize(&completion.text, &self.language);
                    if clean.trim().is_empty() {
                        Err(BackendError::EmptyResult)
                    } else {
                        Ok((clean, completion.usage))
                    }
                });

            match outcome {
                Ok((text, usage)) => {
                    totals.record(usage, started.elapsed());
                    job.complete(text, usage);
                    return Ok(());
                }
                Err(e) => {
                    totals.record(None, started.elapsed());
                    let retries_used = job.attempts() - 1;
                    if !e.is_transient() || retries_used >= self.options.max_retries as usize {
                        return Err(e);
                    }

                    let delay = backoff_delay(self.options.retry_backoff_ms, job.attempts());
                    warn!(
                        "Chunk {} attempt {} failed: {}. Retrying in {}ms",
                        chunk.index + 1,
                        job.attempts(),
                        e,
                        delay.as_millis()
                    );
                    self.emit(ProgressEvent::ChunkRetrying {
                        index: chunk.index,
                        attempt: job.attempts(),
                        delay_ms: delay.as_millis() as u64,
                        reason: e.to_string(),
                    });
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    fn estimate_for(&self, char_count: usize, chunk_count: usize) -> RunEstimate {
        let cost = match self.pricing() {
            Ok(pricing) => Some(estimate_pre_run(char_count, pricing)),
            Err(e) => {
                warn!("{}", e);
                None
            }
        };
        RunEstimate { chunk_count, char_count, cost }
    }

    fn transition(&mut self, next: RunState) {
        debug!("Run state: {:?} -> {:?}", self.state, next);
        self.state = next;
    }

    fn emit_stage(&self, message: impl Into<String>, percent: u8) {
        self.emit(ProgressEvent::Stage {
            message: message.into(),
            percent,
        });
    }

    fn emit(&self, event: ProgressEvent) {
        if let Some(sender) = &self.events {
            // Nobody listening is fine
            let _ = sender.send(event);
        }
    }
}
