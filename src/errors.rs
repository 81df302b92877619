/*!
 * Error types for the doctran application.
 *
 * This module contains custom error types for the different stages of a
 * translation run, using the thiserror crate for ergonomic error definitions.
 * Every error can describe a remediation hint so that callers can tell
 * "not running" apart from "wrong model", "timed out" and "bad response".
 */

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur when talking to a translation backend
#[derive(Error, Debug, Clone, PartialEq)]
pub enum BackendError {
    /// The backend actively refused the connection
    #[error("Connection refused by {endpoint}: {detail}")]
    ConnectionRefused {
        /// Endpoint that was contacted
        endpoint: String,
        /// Underlying transport message
        detail: String,
    },

    /// The request did not complete within its deadline
    #[error("Request timed out after {seconds} seconds: {detail}")]
    Timeout {
        /// Deadline that was exceeded
        seconds: u64,
        /// Underlying transport message
        detail: String,
    },

    /// The backend could not be reached at all (DNS, routing, TLS)
    #[error("Backend unreachable at {endpoint}: {detail}")]
    Unreachable {
        /// Endpoint that was contacted
        endpoint: String,
        /// Underlying transport message
        detail: String,
    },

    /// The requested model is not installed on the backend
    #[error("Model '{model}' not found. Available models: {}", format_models(.available))]
    ModelNotFound {
        /// Requested model
        model: String,
        /// Models the backend reported as installed
        available: Vec<String>,
    },

    /// The backend answered with a non-success HTTP status
    #[error("Backend responded with status {status}: {body_excerpt}")]
    NonSuccessStatus {
        /// HTTP status code
        status: u16,
        /// First characters of the response body
        body_excerpt: String,
    },

    /// The response body did not contain the expected fields
    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    /// The response parsed but contained nothing to translate
    #[error("Empty result returned by the backend")]
    EmptyResult,
}

fn format_models(models: &[String]) -> String {
    if models.is_empty() {
        "none".to_string()
    } else {
        models.join(", ")
    }
}

impl BackendError {
    /// Whether retrying the same request could plausibly succeed
    pub fn is_transient(&self) -> bool {
        match self {
            Self::ConnectionRefused { .. } | Self::Timeout { .. } | Self::Unreachable { .. } => true,
            Self::NonSuccessStatus { status, .. } => *status >= 500 || *status == 429,
            _ => false,
        }
    }

    /// Remediation text for this failure
    pub fn hint(&self) -> String {
        match self {
            Self::ConnectionRefused { endpoint, .. } | Self::Unreachable { endpoint, .. } => {
                format!("Make sure the backend is running and reachable at {}.", endpoint)
            }
            Self::Timeout { .. } => "The model might still be loading, the request might be too large, \
                 or the backend is not responding. Try again in a moment or use a smaller chunk size."
                .to_string(),
            Self::ModelNotFound { model, .. } => {
                format!("Use 'ollama pull {}' to download the model.", model)
            }
            Self::NonSuccessStatus { .. } => "Check the backend logs for more details.".to_string(),
            Self::MalformedResponse(_) | Self::EmptyResult => {
                "The backend returned an unexpected response shape. Check that the endpoint \
                 speaks the expected API and that the model produces text output."
                    .to_string()
            }
        }
    }
}

/// Errors raised while acquiring the input document
#[derive(Error, Debug)]
pub enum InputError {
    /// The input path does not exist
    #[error("Input file not found: {0}")]
    FileNotFound(PathBuf),

    /// The input holds no text to translate
    #[error("Document is empty: {0}")]
    EmptyDocument(String),

    /// The input exists but could not be read as UTF-8 text
    #[error("Unreadable document {path}: {reason}")]
    UnreadableDocument {
        /// Path of the document
        path: PathBuf,
        /// Why it could not be read
        reason: String,
    },
}

/// Errors in caller-supplied configuration, detected before any network activity
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    /// No target language was given
    #[error("A target language is required")]
    MissingTargetLanguage,

    /// No model was selected for the backend
    #[error("A model name is required")]
    MissingModel,

    /// No pricing table exists for the model
    #[error("Unsupported model for pricing: {0}")]
    UnsupportedModel(String),

    /// The chunk size must be positive
    #[error("Invalid chunk size: {0}")]
    InvalidChunkSize(usize),

    /// The hosted backend needs an API key
    #[error("An API key is required for the {0} backend")]
    MissingApiKey(String),

    /// The endpoint could not be parsed as a URL
    #[error("Invalid endpoint '{endpoint}': {reason}")]
    InvalidEndpoint {
        /// The endpoint as configured
        endpoint: String,
        /// Parser message
        reason: String,
    },
}

/// Readiness failures detected before any chunk is sent
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PreflightError {
    /// The backend could not be reached or does not have the model
    #[error(transparent)]
    Backend(#[from] BackendError),

    /// The backend answered the health check, but not successfully
    #[error("Backend health check degraded: {0}")]
    Degraded(String),

    /// The model did not answer the warm-up prompt
    #[error("Model '{model}' is not ready: {detail}")]
    ModelNotReady {
        /// Model that was warmed up
        model: String,
        /// Backend answer and manual test command
        detail: String,
    },
}

impl PreflightError {
    /// Remediation text for this failure
    pub fn hint(&self) -> String {
        match self {
            Self::Backend(source) => source.hint(),
            Self::Degraded(_) => "Make sure the backend is running and healthy.".to_string(),
            Self::ModelNotReady { model, .. } => {
                format!("Try loading the model manually: ollama run {}", model)
            }
        }
    }
}

/// Errors that terminate a translation run
#[derive(Error, Debug)]
pub enum PipelineError {
    /// The document could not be read
    #[error("Input error: {0}")]
    Input(#[from] InputError),

    /// The run was misconfigured
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Readiness checks failed before any chunk was sent
    #[error("Preflight failed: {0}")]
    Preflight(#[from] PreflightError),

    /// A chunk could not be translated; the whole run was aborted
    #[error("Translation of chunk {}/{total} failed: {source}", .index + 1)]
    ChunkTranslation {
        /// Zero-based index of the failing chunk
        index: usize,
        /// Number of chunks in the run
        total: usize,
        /// Backend failure
        #[source]
        source: BackendError,
    },

    /// The translation succeeded but could not be written
    #[error("Failed to write output to {path}: {message}")]
    Persistence {
        /// Destination that could not be written
        path: PathBuf,
        /// I/O message
        message: String,
        /// The assembled translation, kept so the caller can retry the write
        translation: String,
    },
}

impl PipelineError {
    /// Remediation text for this failure
    pub fn hint(&self) -> String {
        match self {
            Self::Input(InputError::FileNotFound(_)) => "Check the input path.".to_string(),
            Self::Input(InputError::EmptyDocument(_)) => {
                "The extracted text is empty; check that the source document contains text.".to_string()
            }
            Self::Input(InputError::UnreadableDocument { .. }) => {
                "The input must be UTF-8 plain text extracted from the source document.".to_string()
            }
            Self::Config(ConfigError::UnsupportedModel(_)) => {
                "Pick a model with a known price list or run without a cost estimate.".to_string()
            }
            Self::Config(ConfigError::MissingApiKey(_)) => {
                "Set api_key in the config file or the OPENAI_API_KEY environment variable.".to_string()
            }
            Self::Config(_) => "Fix the configuration and run again.".to_string(),
            Self::Preflight(source) => source.hint(),
            Self::ChunkTranslation { source, .. } => source.hint(),
            Self::Persistence { .. } => {
                "Check that the output directory exists and is writable.".to_string()
            }
        }
    }

    /// The translation recovered from a persistence failure, if any
    pub fn recovered_translation(&self) -> Option<&str> {
        match self {
            Self::Persistence { translation, .. } => Some(translation),
            _ => None,
        }
    }
}
