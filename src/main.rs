// Module-specific lints configuration
#![allow(clippy::uninlined_format_args)]

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use clap::{CommandFactory, Parser, Subcommand, ValueEnum};
use clap_complete::{generate, Shell};
use log::{error, info, warn, Level, LevelFilter, Log, Metadata, Record, SetLoggerError};
use std::io::{BufRead, Write};
use std::path::PathBuf;
use std::sync::Arc;

use doctran::app_config::{self, BackendKind, Config};
use doctran::app_controller::Controller;
use doctran::errors::PipelineError;
use doctran::translation::{ConfirmationGate, RunEstimate, TranslationOutcome};

/// CLI wrapper for BackendKind to implement ValueEnum
#[derive(Debug, Clone, ValueEnum)]
enum CliBackend {
    Ollama,
    #[value(name = "openai")]
    OpenAI,
}

impl From<CliBackend> for BackendKind {
    fn from(cli_backend: CliBackend) -> Self {
        match cli_backend {
            CliBackend::Ollama => BackendKind::Ollama,
            CliBackend::OpenAI => BackendKind::OpenAI,
        }
    }
}

/// CLI wrapper for LogLevel to implement ValueEnum
#[derive(Debug, Clone, ValueEnum)]
enum CliLogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl From<CliLogLevel> for app_config::LogLevel {
    fn from(cli_level: CliLogLevel) -> Self {
        match cli_level {
            CliLogLevel::Error => app_config::LogLevel::Error,
            CliLogLevel::Warn => app_config::LogLevel::Warn,
            CliLogLevel::Info => app_config::LogLevel::Info,
            CliLogLevel::Debug => app_config::LogLevel::Debug,
            CliLogLevel::Trace => app_config::LogLevel::Trace,
        }
    }
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Translate a text document or every .txt document in a directory (default command)
    Translate(TranslateArgs),

    /// Generate shell completions for doctran
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(clap::Args, Debug, Clone)]
struct TranslateArgs {
    /// Input text file or directory to process
    #[arg(value_name = "INPUT_PATH")]
    input_path: Option<PathBuf>,

    /// Target language, as a name ("Spanish") or ISO code ("es")
    #[arg(short, long)]
    target_language: Option<String>,

    /// Model name to use for translation
    #[arg(short, long)]
    model: Option<String>,

    /// Translation backend to use
    #[arg(short, long, value_enum)]
    backend: Option<CliBackend>,

    /// Maximum characters per chunk
    #[arg(long)]
    chunk_size: Option<usize>,

    /// Directory for translated files (default: next to each source)
    #[arg(short, long)]
    output_dir: Option<PathBuf>,

    /// Skip the cost confirmation prompt
    #[arg(short = 'y', long)]
    yes: bool,

    /// Print the cost estimate and exit without translating
    #[arg(long)]
    estimate_only: bool,

    /// Retries per chunk for transient failures
    #[arg(long)]
    retries: Option<u32>,

    /// Force overwrite of existing output files in directory mode
    #[arg(short, long)]
    force_overwrite: bool,

    /// Configuration file path
    #[arg(short, long, default_value = "conf.json")]
    config_path: PathBuf,

    /// Set logging level
    #[arg(short, long, value_enum)]
    log_level: Option<CliLogLevel>,
}

/// doctran - chunked document translation with local or hosted LLMs
#[derive(Parser, Debug)]
#[command(name = "doctran")]
#[command(version)]
#[command(about = "Translate long text documents chunk by chunk with an LLM backend")]
#[command(args_conflicts_with_subcommands = true)]
#[command(long_about = "doctran splits a document into chunks, translates each chunk in order with \
a local Ollama server or an OpenAI-compatible API, and writes the assembled translation next to the source.

EXAMPLES:
    doctran book.txt -t spanish                 # Translate with the default backend (Ollama)
    doctran book.txt -t de -m qwen2.5:7b        # Use an ISO code and a specific model
    doctran book.txt -t fr -b openai -y         # Hosted backend, skip the cost prompt
    doctran book.txt -t fr -b openai --estimate-only
    doctran /texts/ -t italian -o /out/         # Translate every .txt file in a directory
    doctran completions bash > doctran.bash     # Generate bash completions

CONFIGURATION:
    Configuration is stored in conf.json by default. You can specify a different
    config file with --config-path. If the config file doesn't exist, a default one
    will be created automatically. The OpenAI key is read from the config file or
    the OPENAI_API_KEY environment variable.")]
struct CommandLineOptions {
    #[command(subcommand)]
    command: Option<Commands>,

    #[command(flatten)]
    args: TranslateArgs,
}

// @struct: Custom logger implementation
struct CustomLogger {
    level: LevelFilter,
}

impl CustomLogger {
    // @creates: New logger with specified level
    fn new(level: LevelFilter) -> Self {
        CustomLogger { level }
    }

    // @initializes: Global logger
    fn init(level: LevelFilter) -> Result<(), SetLoggerError> {
        // The logger itself lets everything through; the global max level filters
        let logger = Box::new(CustomLogger::new(LevelFilter::Trace));
        log::set_boxed_logger(logger)?;
        log::set_max_level(level);
        Ok(())
    }

    // @returns: Emoji for log level
    fn get_emoji_for_level(level: Level) -> &'static str {
        match level {
            Level::Error => "❌",
            Level::Warn => "🚧",
            Level::Info => " ",
            Level::Debug => "🔍",
            Level::Trace => "📋",
        }
    }

    // @returns: ANSI color for log level
    fn get_color_for_level(level: Level) -> &'static str {
        match level {
            Level::Error => "\x1B[1;31m",
            Level::Warn => "\x1B[1;33m",
            Level::Info => "\x1B[1;32m",
            Level::Debug => "\x1B[1;36m",
            Level::Trace => "\x1B[1;35m",
        }
    }
}

impl Log for CustomLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.level
    }

    fn log(&self, record: &Record) {
        if self.enabled(record.metadata()) {
            let now = chrono::Local::now().format("%H:%M:%S.%3f");
            let mut stderr = std::io::stderr();
            let _ = writeln!(
                stderr,
                "{}{} {} {}\x1B[0m",
                Self::get_color_for_level(record.level()),
                now,
                Self::get_emoji_for_level(record.level()),
                record.args()
            );
        }
    }

    fn flush(&self) {
        let _ = std::io::stderr().flush();
    }
}

// @struct: Asks on the terminal before a billed run
struct StdinGate;

#[async_trait]
impl ConfirmationGate for StdinGate {
    async fn confirm(&self, estimate: &RunEstimate) -> bool {
        // Local inference costs nothing; no need to ask
        if estimate.cost.as_ref().is_some_and(|cost| cost.pricing.is_free()) {
            info!("Estimate: {}", estimate.summary());
            return true;
        }

        let summary = estimate.summary();
        let answer = tokio::task::spawn_blocking(move || {
            let mut stderr = std::io::stderr();
            let _ = write!(stderr, "{}\nProceed with translation? [y/N] ", summary);
            let _ = stderr.flush();

            let mut line = String::new();
            match std::io::stdin().lock().read_line(&mut line) {
                Ok(_) => line,
                Err(_) => String::new(),
            }
        })
        .await
        .unwrap_or_default();

        matches!(answer.trim().to_lowercase().as_str(), "y" | "yes")
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize the logger once with info level by default
    // We'll update the level after loading the config if needed
    CustomLogger::init(LevelFilter::Info)?;

    let cli = CommandLineOptions::parse();

    match cli.command {
        Some(Commands::Completions { shell }) => {
            let mut cmd = CommandLineOptions::command();
            generate(shell, &mut cmd, "doctran", &mut std::io::stdout());
            Ok(())
        }
        Some(Commands::Translate(args)) => run_translate(args).await,
        None => run_translate(cli.args).await,
    }
}

async fn run_translate(options: TranslateArgs) -> Result<()> {
    if let Some(cmd_log_level) = &options.log_level {
        let level: app_config::LogLevel = cmd_log_level.clone().into();
        log::set_max_level(LevelFilter::from(&level));
    }

    let input_path = options
        .input_path
        .clone()
        .ok_or_else(|| anyhow!("INPUT_PATH is required when no subcommand is specified"))?;

    let (mut config, created) = Config::load_or_create(&options.config_path)?;
    if created {
        warn!(
            "Config file not found at '{}', creating default config.",
            options.config_path.display()
        );
    }
    apply_overrides(&mut config, &options);

    // If log level was not set via command line, update it from config now
    if options.log_level.is_none() {
        log::set_max_level(LevelFilter::from(&config.log_level));
    }

    let mut controller = Controller::with_config(config)?.with_output_dir(options.output_dir.clone());
    if !options.yes {
        controller = controller.with_gate(Arc::new(StdinGate));
    }

    if input_path.is_dir() {
        if options.estimate_only {
            return Err(anyhow!("--estimate-only expects a single file, not a directory"));
        }
        let summary = controller.run_folder(&input_path, options.force_overwrite).await?;
        if summary.failed > 0 {
            return Err(anyhow!("{} document(s) failed to translate", summary.failed));
        }
        return Ok(());
    }

    if options.estimate_only {
        let estimate = controller.estimate(&input_path)?;
        println!("{}", estimate.summary());
        return Ok(());
    }

    match controller.run(&input_path).await {
        Ok(TranslationOutcome::Completed(_)) | Ok(TranslationOutcome::Declined(_)) => Ok(()),
        Err(e) => {
            if let Some(pipeline_error) = e.downcast_ref::<PipelineError>() {
                error!("{}", pipeline_error);
                info!("Hint: {}", pipeline_error.hint());
                if let Some(translation) = pipeline_error.recovered_translation() {
                    warn!("The translation could not be saved; printing it to stdout instead");
                    println!("{}", translation);
                }
            }
            Err(e)
        }
    }
}

// Command line values win over the config file
fn apply_overrides(config: &mut Config, options: &TranslateArgs) {
    if let Some(backend) = &options.backend {
        config.backend = backend.clone().into();
    }

    if let Some(model) = &options.model {
        config.set_model(model.clone());
    }

    if let Some(target_language) = &options.target_language {
        config.target_language = target_language.clone();
    }

    if let Some(chunk_size) = options.chunk_size {
        config.pipeline.chunk_size = chunk_size;
    }

    if let Some(retries) = options.retries {
        config.pipeline.max_retries = retries;
    }

    if let Some(log_level) = &options.log_level {
        config.log_level = log_level.clone().into();
    }
}
