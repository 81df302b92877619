use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::default::Default;
use std::path::Path;
use url::Url;

use crate::errors::ConfigError;

/// Application configuration module
/// This module handles the application configuration including loading,
/// validating and saving configuration settings.
/// Represents the application configuration
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Config {
    /// Target language, free text ("Spanish") or an ISO code ("es")
    #[serde(default)]
    pub target_language: String,

    /// Backend selected for translation
    #[serde(default)]
    pub backend: BackendKind,

    /// Connection settings for every known backend
    #[serde(default = "default_backends")]
    pub available_backends: Vec<BackendConfig>,

    /// Chunking and retry settings
    #[serde(default)]
    pub pipeline: PipelineSettings,

    /// Log level
    #[serde(default)]
    pub log_level: LogLevel,
}

/// Backend variant
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    // @backend: Ollama local inference server
    #[default]
    Ollama,
    // @backend: OpenAI-compatible hosted API, billed per token
    OpenAI,
}

impl BackendKind {
    // @returns: Capitalized backend name
    pub fn display_name(&self) -> &str {
        match self {
            Self::Ollama => "Ollama",
            Self::OpenAI => "OpenAI",
        }
    }

    // @returns: Lowercase backend identifier
    pub fn to_lowercase_string(&self) -> String {
        match self {
            Self::Ollama => "ollama".to_string(),
            Self::OpenAI => "openai".to_string(),
        }
    }

    /// Whether this backend runs on the local machine
    pub fn is_local(&self) -> bool {
        matches!(self, Self::Ollama)
    }
}

impl std::fmt::Display for BackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_lowercase_string())
    }
}

impl std::str::FromStr for BackendKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "ollama" => Ok(Self::Ollama),
            "openai" => Ok(Self::OpenAI),
            _ => Err(anyhow!("Invalid backend type: {}", s)),
        }
    }
}

/// Connection settings for one backend
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct BackendConfig {
    // @field: Backend type identifier
    #[serde(rename = "type")]
    pub backend_type: String,

    // @field: Model name
    #[serde(default = "String::new")]
    pub model: String,

    // @field: API key (hosted backends only)
    #[serde(default = "String::new")]
    pub api_key: String,

    // @field: Service URL
    #[serde(default = "String::new")]
    pub endpoint: String,

    // @field: Connect timeout seconds
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,

    // @field: Health check timeout seconds
    #[serde(default = "default_health_timeout_secs")]
    pub health_timeout_secs: u64,

    // @field: Model warm-up timeout seconds
    #[serde(default = "default_warmup_timeout_secs")]
    pub warmup_timeout_secs: u64,

    // @field: Per-chunk request timeout seconds
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl BackendConfig {
    // @param backend: Backend enum
    // @returns: Backend config with defaults
    pub fn new(backend: BackendKind) -> Self {
        let (model, endpoint) = match backend {
            BackendKind::Ollama => (default_ollama_model(), default_ollama_endpoint()),
            BackendKind::OpenAI => (default_openai_model(), default_openai_endpoint()),
        };
        Self {
            backend_type: backend.to_lowercase_string(),
            model,
            api_key: String::new(),
            endpoint,
            connect_timeout_secs: default_connect_timeout_secs(),
            health_timeout_secs: default_health_timeout_secs(),
            warmup_timeout_secs: default_warmup_timeout_secs(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

/// Chunking and retry settings shared by every backend
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct PipelineSettings {
    /// Maximum characters per chunk
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    /// Retries per chunk for transient failures; 0 aborts on the first failure
    #[serde(default)]
    pub max_retries: u32,

    /// Base backoff between retries in milliseconds, doubled on each retry
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,

    /// Generation bound per chunk
    #[serde(default = "default_max_output_tokens")]
    pub max_output_tokens: u32,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            max_retries: 0,
            retry_backoff_ms: default_retry_backoff_ms(),
            max_output_tokens: default_max_output_tokens(),
        }
    }
}

/// Everything needed to build a backend client for one run
#[derive(Debug, Clone, PartialEq)]
pub struct BackendDescriptor {
    pub kind: BackendKind,
    pub model: String,
    pub endpoint: String,
    pub api_key: String,
    pub connect_timeout_secs: u64,
    pub health_timeout_secs: u64,
    pub warmup_timeout_secs: u64,
    pub request_timeout_secs: u64,
    pub max_output_tokens: u32,
}

impl BackendDescriptor {
    /// Descriptor with default connection parameters for a backend
    pub fn new(kind: BackendKind, model: impl Into<String>) -> Self {
        let defaults = BackendConfig::new(kind.clone());
        Self {
            kind,
            model: model.into(),
            endpoint: defaults.endpoint,
            api_key: String::new(),
            connect_timeout_secs: defaults.connect_timeout_secs,
            health_timeout_secs: defaults.health_timeout_secs,
            warmup_timeout_secs: defaults.warmup_timeout_secs,
            request_timeout_secs: defaults.request_timeout_secs,
            max_output_tokens: default_max_output_tokens(),
        }
    }

    /// Override the endpoint
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    /// Override the API key
    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = api_key.into();
        self
    }
}

/// Log verbosity level
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    Warn,
    #[default]
    Info,
    Debug,
    Trace,
}

impl From<&LogLevel> for log::LevelFilter {
    fn from(level: &LogLevel) -> Self {
        match level {
            LogLevel::Error => log::LevelFilter::Error,
            LogLevel::Warn => log::LevelFilter::Warn,
            LogLevel::Info => log::LevelFilter::Info,
            LogLevel::Debug => log::LevelFilter::Debug,
            LogLevel::Trace => log::LevelFilter::Trace,
        }
    }
}

fn default_chunk_size() -> usize {
    crate::segmenter::DEFAULT_CHUNK_SIZE
}

fn default_retry_backoff_ms() -> u64 {
    1000 // 1 second base backoff time, doubled on each retry
}

fn default_max_output_tokens() -> u32 {
    4096
}

fn default_connect_timeout_secs() -> u64 {
    10
}

fn default_health_timeout_secs() -> u64 {
    5
}

fn default_warmup_timeout_secs() -> u64 {
    // Cold starts load the whole model into memory
    300
}

fn default_request_timeout_secs() -> u64 {
    180
}

fn default_ollama_endpoint() -> String {
    "http://localhost:11434".to_string()
}

fn default_openai_endpoint() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_ollama_model() -> String {
    "llama3.2".to_string()
}

fn default_openai_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_backends() -> Vec<BackendConfig> {
    vec![
        BackendConfig::new(BackendKind::Ollama),
        BackendConfig::new(BackendKind::OpenAI),
    ]
}

/// Environment variable consulted when the hosted backend has no configured key
pub const API_KEY_ENV: &str = "OPENAI_API_KEY";

impl Config {
    /// Load a configuration file, or write and return the defaults if it does not exist
    pub fn load_or_create<P: AsRef<Path>>(path: P) -> Result<(Self, bool)> {
        let path = path.as_ref();
        if path.exists() {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to open config file: {}", path.display()))?;
            let config: Config = serde_json::from_str(&content)
                .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
            return Ok((config, false));
        }

        let config = Config::default();
        let config_json = serde_json::to_string_pretty(&config)
            .context("Failed to serialize default config to JSON")?;
        std::fs::write(path, config_json)
            .with_context(|| format!("Failed to write default config to file: {}", path.display()))?;
        Ok((config, true))
    }

    /// Validate the configuration for consistency and required values
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.target_language.trim().is_empty() {
            return Err(ConfigError::MissingTargetLanguage);
        }

        if self.pipeline.chunk_size == 0 {
            return Err(ConfigError::InvalidChunkSize(self.pipeline.chunk_size));
        }

        let descriptor = self.descriptor();
        if descriptor.model.trim().is_empty() {
            return Err(ConfigError::MissingModel);
        }

        Url::parse(&descriptor.endpoint).map_err(|e| ConfigError::InvalidEndpoint {
            endpoint: descriptor.endpoint.clone(),
            reason: e.to_string(),
        })?;

        if !self.backend.is_local() && descriptor.api_key.is_empty() {
            return Err(ConfigError::MissingApiKey(self.backend.display_name().to_string()));
        }

        Ok(())
    }

    /// Get the configuration entry for the active backend
    pub fn get_active_backend_config(&self) -> Option<&BackendConfig> {
        self.get_backend_config(&self.backend)
    }

    /// Get a specific backend configuration by type
    pub fn get_backend_config(&self, backend: &BackendKind) -> Option<&BackendConfig> {
        let backend_str = backend.to_lowercase_string();
        self.available_backends
            .iter()
            .find(|b| b.backend_type == backend_str)
    }

    /// Set the model of the active backend, adding an entry if none exists
    pub fn set_model(&mut self, model: impl Into<String>) {
        let backend_str = self.backend.to_lowercase_string();
        match self
            .available_backends
            .iter_mut()
            .find(|b| b.backend_type == backend_str)
        {
            Some(entry) => entry.model = model.into(),
            None => {
                let mut entry = BackendConfig::new(self.backend.clone());
                entry.model = model.into();
                self.available_backends.push(entry);
            }
        }
    }

    /// Get the model for the active backend
    pub fn get_model(&self) -> String {
        self.descriptor().model
    }

    /// Resolve the active backend into a run descriptor, filling gaps with defaults
    pub fn descriptor(&self) -> BackendDescriptor {
        let defaults = BackendConfig::new(self.backend.clone());
        let entry = self.get_active_backend_config().unwrap_or(&defaults);

        let pick = |value: &str, fallback: &str| {
            if value.is_empty() { fallback.to_string() } else { value.to_string() }
        };

        let api_key = if entry.api_key.is_empty() && !self.backend.is_local() {
            std::env::var(API_KEY_ENV).unwrap_or_default()
        } else {
            entry.api_key.clone()
        };

        BackendDescriptor {
            kind: self.backend.clone(),
            model: pick(&entry.model, &defaults.model),
            endpoint: pick(&entry.endpoint, &defaults.endpoint),
            api_key,
            connect_timeout_secs: entry.connect_timeout_secs,
            health_timeout_secs: entry.health_timeout_secs,
            warmup_timeout_secs: entry.warmup_timeout_secs,
            request_timeout_secs: entry.request_timeout_secs,
            max_output_tokens: self.pipeline.max_output_tokens,
        }
    }
}

/// Default implementation for Config
impl Default for Config {
    fn default() -> Self {
        Config {
            target_language: "spanish".to_string(),
            backend: BackendKind::default(),
            available_backends: default_backends(),
            pipeline: PipelineSettings::default(),
            log_level: LogLevel::default(),
        }
    }
}
