use anyhow::{anyhow, Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use log::{error, info, warn};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::app_config::Config;
use crate::backends::{create_backend, Backend};
use crate::document::Document;
use crate::errors::PipelineError;
use crate::file_utils::FileManager;
use crate::language_utils::TargetLanguage;
use crate::translation::{
    progress_channel, ConfirmationGate, Orchestrator, PipelineOptions, ProgressEvent,
    ProgressReceiver, RunEstimate, TranslationOutcome,
};

// @module: Application controller for document translation

/// Name of the log written next to a translated folder
pub const ISSUES_LOG_NAME: &str = "doctran.issues.log";

/// Extension of the documents picked up in folder mode
pub const DOCUMENT_EXTENSION: &str = "txt";

/// Counts reported after a folder run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FolderSummary {
    pub processed: usize,
    pub skipped: usize,
    pub declined: usize,
    pub failed: usize,
}

/// Main application controller for document translation
pub struct Controller {
    // @field: App configuration
    config: Config,

    // @field: Output directory override; defaults to the source's directory
    output_dir: Option<PathBuf>,

    // @field: Asked before each run when set
    gate: Option<Arc<dyn ConfirmationGate>>,

    // @field: Whether to draw progress bars
    show_progress: bool,
}

impl Controller {
    // @method: Create a new controller with the given configuration
    pub fn with_config(config: Config) -> Result<Self> {
        config.validate().context("Invalid configuration")?;
        TargetLanguage::parse(&config.target_language).context("Invalid target language")?;

        Ok(Self {
            config,
            output_dir: None,
            gate: None,
            show_progress: true,
        })
    }

    /// Write outputs to `dir` instead of next to each source
    pub fn with_output_dir(mut self, dir: Option<PathBuf>) -> Self {
        self.output_dir = dir;
        self
    }

    /// Ask `gate` before each run
    pub fn with_gate(mut self, gate: Arc<dyn ConfirmationGate>) -> Self {
        self.gate = Some(gate);
        self
    }

    /// Disable progress bars, e.g. for tests or piped output
    pub fn without_progress(mut self) -> Self {
        self.show_progress = false;
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Estimate a document without contacting the backend
    pub fn estimate(&self, input_file: &Path) -> Result<RunEstimate> {
        let document = Document::from_path(input_file).map_err(PipelineError::from)?;
        let backend = create_backend(&self.config.descriptor())?;
        let orchestrator = self.build_orchestrator(backend)?;
        Ok(orchestrator.estimate(&document)?)
    }

    /// Translate one document with the configured backend
    pub async fn run(&self, input_file: &Path) -> Result<TranslationOutcome> {
        let backend = create_backend(&self.config.descriptor())?;
        self.run_with_backend(backend, input_file).await
    }

    /// Translate one document with an explicit backend
    pub async fn run_with_backend(&self, backend: Box<dyn Backend>, input_file: &Path) -> Result<TranslationOutcome> {
        let start_time = Instant::now();
        let document = Document::from_path(input_file).map_err(PipelineError::from)?;

        let descriptor = self.config.descriptor();
        info!("doctran: {} - {}", descriptor.kind.display_name(), descriptor.model);

        let (sender, receiver) = progress_channel();
        let mut orchestrator = self.build_orchestrator(backend)?.with_events(sender);

        // The orchestrator owns the sender; the channel closes when the task ends
        let task = tokio::spawn(async move { orchestrator.run(&document).await });
        self.render_progress(receiver).await;

        let outcome = task.await.context("Translation task panicked")??;

        match &outcome {
            TranslationOutcome::Completed(report) => {
                info!(
                    "Success: {} ({} chunks in {})",
                    report.output_path.display(),
                    report.chunk_count,
                    Self::format_duration(start_time.elapsed())
                );
                if let Some(cost) = &report.cost {
                    if !cost.pricing.is_free() {
                        info!("Actual cost: ${:.4}", cost.total_cost);
                    }
                }
            }
            TranslationOutcome::Declined(_) => info!("Translation cancelled"),
        }

        Ok(outcome)
    }

    /// Translate every text document in a directory
    ///
    /// Documents whose output already exists are skipped unless
    /// `force_overwrite` is set. Failures are logged and counted; the
    /// remaining documents are still processed.
    pub async fn run_folder(&self, input_dir: &Path, force_overwrite: bool) -> Result<FolderSummary> {
        self.run_folder_with(input_dir, force_overwrite, || Ok(create_backend(&self.config.descriptor())?))
            .await
    }

    /// Folder run with a backend factory, called once per document
    pub async fn run_folder_with<F>(&self, input_dir: &Path, force_overwrite: bool, make_backend: F) -> Result<FolderSummary>
    where
        F: Fn() -> Result<Box<dyn Backend>>,
    {
        let start_time = Instant::now();

        if !FileManager::dir_exists(input_dir) {
            return Err(anyhow!("Input directory does not exist: {:?}", input_dir));
        }

        let language = TargetLanguage::parse(&self.config.target_language)?;
        let label = language.file_label();

        // Outputs of earlier runs live next to their sources
        let documents: Vec<PathBuf> = FileManager::find_files(input_dir, DOCUMENT_EXTENSION)?
            .into_iter()
            .filter(|path| !FileManager::is_translation_output(path, &label))
            .collect();

        if documents.is_empty() {
            return Err(anyhow!("No .{} documents found in directory: {:?}", DOCUMENT_EXTENSION, input_dir));
        }

        let folder_pb = self.create_bar(documents.len() as u64, "{pos}/{len} files");
        folder_pb.set_message("Processing files");

        let mut summary = FolderSummary::default();
        let mut issues = Vec::new();

        for document in &documents {
            let file_name = document
                .file_name()
                .map(|f| f.to_string_lossy().to_string())
                .unwrap_or_else(|| "unknown".to_string());
            folder_pb.set_message(format!("Processing: {}", file_name));

            let output_path = FileManager::generate_output_path(Some(document), &label, self.output_dir.as_deref());
            if FileManager::file_exists(&output_path) && !force_overwrite {
                warn!("Skipping {}, translation already exists (use -f to force overwrite)", file_name);
                summary.skipped += 1;
                folder_pb.inc(1);
                continue;
            }

            let result = match make_backend() {
                Ok(backend) => self.run_with_backend(backend, document).await,
                Err(e) => Err(e),
            };

            match result {
                Ok(TranslationOutcome::Completed(_)) => summary.processed += 1,
                Ok(TranslationOutcome::Declined(_)) => summary.declined += 1,
                Err(e) => {
                    error!("Error processing file {}: {:#}", file_name, e);
                    issues.push(format!("{}: {:#}", document.display(), e));
                    summary.failed += 1;
                }
            }

            folder_pb.inc(1);
        }

        folder_pb.finish_with_message("Folder processing complete");

        let summary_message = format!(
            "Folder processing completed: {} processed, {} skipped, {} declined, {} errors",
            summary.processed, summary.skipped, summary.declined, summary.failed
        );
        info!("{}", summary_message);

        let log_file_path = input_dir.join(ISSUES_LOG_NAME);
        issues.push(format!(
            "{} - Duration: {}",
            summary_message,
            Self::format_duration(start_time.elapsed())
        ));
        for issue in &issues {
            if let Err(e) = FileManager::append_to_log_file(&log_file_path, issue) {
                warn!("Failed to write folder log to file: {}", e);
                break;
            }
        }

        Ok(summary)
    }

    fn build_orchestrator(&self, backend: Box<dyn Backend>) -> Result<Orchestrator> {
        let language = TargetLanguage::parse(&self.config.target_language)?;
        let mut options = PipelineOptions::from(&self.config.pipeline);
        options.output_dir = self.output_dir.clone();

        let mut orchestrator = Orchestrator::new(backend, self.config.get_model(), language).with_options(options);
        if let Some(gate) = &self.gate {
            orchestrator = orchestrator.with_shared_gate(Arc::clone(gate));
        }
        Ok(orchestrator)
    }

    // Consume events until the orchestrator drops its sender
    async fn render_progress(&self, mut receiver: ProgressReceiver) {
        // Created lazily so a confirmation prompt is not drawn over
        let mut bar: Option<ProgressBar> = None;

        while let Some(event) = receiver.recv().await {
            match event {
                ProgressEvent::Estimate(estimate) => {
                    if let Some(line) = self.estimate_line(&estimate) {
                        info!("{}", line);
                    }
                }
                ProgressEvent::Stage { message, percent } => {
                    let pb = bar.get_or_insert_with(|| self.create_bar(100, "{percent}%"));
                    pb.set_position(u64::from(percent));
                    pb.set_message(message);
                }
                ProgressEvent::ChunkStarted { index, total } => {
                    let pb = bar.get_or_insert_with(|| self.create_bar(100, "{percent}%"));
                    pb.set_message(format!("Translating chunk {}/{}", index + 1, total));
                }
                ProgressEvent::ChunkRetrying { index, attempt, delay_ms, .. } => {
                    let pb = bar.get_or_insert_with(|| self.create_bar(100, "{percent}%"));
                    pb.set_message(format!(
                        "Chunk {} failed (attempt {}), retrying in {}ms",
                        index + 1,
                        attempt,
                        delay_ms
                    ));
                }
                ProgressEvent::ChunkCompleted { percent, .. } => {
                    if let Some(pb) = &bar {
                        pb.set_position(u64::from(percent));
                    }
                }
                ProgressEvent::Finished { .. } => {
                    if let Some(pb) = bar.take() {
                        pb.finish_and_clear();
                    }
                }
                ProgressEvent::Failed { message, .. } => {
                    if let Some(pb) = bar.take() {
                        pb.abandon_with_message(message);
                    }
                }
            }
        }
    }

    // A gate renders the estimate itself, synchronously with its prompt
    fn estimate_line(&self, estimate: &RunEstimate) -> Option<String> {
        match self.gate {
            Some(_) => None,
            None => Some(format!("Estimate: {}", estimate.summary())),
        }
    }

    fn create_bar(&self, len: u64, counter: &str) -> ProgressBar {
        if !self.show_progress {
            return ProgressBar::hidden();
        }

        let pb = ProgressBar::new(len);
        let style = ProgressStyle::default_bar()
            .template(&format!(
                "{{spinner:.green}} [{{elapsed_precise}}] [{{bar:40.cyan/blue}}] {} {{msg}}",
                counter
            ))
            .or_else(|_| ProgressStyle::default_bar().template("{spinner} [{elapsed_precise}] [{bar:40}] {msg}"))
            .unwrap_or_else(|_| ProgressStyle::default_bar());
        pb.set_style(style.progress_chars("█▓▒░"));
        pb.enable_steady_tick(Duration::from_millis(120));
        pb
    }

    // Format duration in a human-readable format
    pub fn format_duration(duration: Duration) -> String {
        let total_seconds = duration.as_secs();
        let hours = total_seconds / 3600;
        let minutes = (total_seconds % 3600) / 60;
        let seconds = total_seconds % 60;

        if hours > 0 {
            format!("{}h {}m {}s", hours, minutes, seconds)
        } else if minutes > 0 {
            format!("{}m {}s", minutes, seconds)
        } else {
            format!("{}.{:03}s", seconds, duration.subsec_millis())
        }
    }
}
