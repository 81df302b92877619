/*!
 * Backend implementations for the different text-generation services.
 *
 * This module contains client implementations for:
 * - Ollama: local inference server
 * - OpenAI: hosted, token-billed chat completions API
 * - Mock: scripted backend for tests and dry runs
 */

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt::Debug;
use std::time::Duration;

use crate::app_config::{BackendDescriptor, BackendKind};
use crate::cost::TokenUsage;
use crate::errors::{BackendError, ConfigError};
use crate::language_utils::TargetLanguage;
use crate::segmenter::Chunk;

/// Longest slice of an error body carried in a `NonSuccessStatus`
const BODY_EXCERPT_CHARS: usize = 200;

/// Outcome of a liveness check
#[derive(Debug, Clone, PartialEq)]
pub enum HealthStatus {
    /// The backend is up and the model is available
    Ready,
    /// The backend answered but not as expected
    Degraded(String),
}

/// Outcome of a model warm-up
#[derive(Debug, Clone, PartialEq)]
pub enum ModelReadiness {
    /// The model answered the warm-up prompt
    Ready,
    /// The model could not be loaded; carries remediation text
    NotFound(String),
}

/// Raw completion returned for one chunk
#[derive(Debug, Clone, PartialEq)]
pub struct Completion {
    /// Completion text before sanitization
    pub text: String,
    /// Token usage, when the backend meters it
    pub usage: Option<TokenUsage>,
}

/// Chat message object
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Role of the message sender (system, user or assistant)
    pub role: String,
    /// Content of the message
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: "system".to_string(), content: content.into() }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self { role: "user".to_string(), content: content.into() }
    }
}

/// Common trait for all translation backends
///
/// Each chunk is an independent request: no history is shared between
/// chunks, which bounds request size at the cost of cross-chunk context.
#[async_trait]
pub trait Backend: Send + Sync + Debug {
    /// Which variant this is
    fn kind(&self) -> BackendKind;

    /// Check that the service is alive and `model` is installed
    async fn check_health(&self, model: &str) -> Result<HealthStatus, BackendError>;

    /// Make sure the model is loaded and answering
    async fn check_model_ready(&self, model: &str) -> Result<ModelReadiness, BackendError>;

    /// Translate one chunk
    async fn translate_chunk(
        &self,
        chunk: &Chunk,
        language: &TargetLanguage,
        model: &str,
    ) -> Result<Completion, BackendError>;
}

/// Build the system/user instruction pair for one chunk
pub fn build_messages(text: &str, language: &TargetLanguage) -> Vec<ChatMessage> {
    let label = language.label();
    vec![
        ChatMessage::system(format!(
            "CRITICAL INSTRUCTION: You are a translator. You MUST translate text to {label}. \
             Output ONLY in {label}."
        )),
        ChatMessage::user(format!(
            "Translate this text from its original language to {label} ONLY. \
             Output the translation ONLY in {label}:\n\n{text}"
        )),
    ]
}

/// Create the backend client selected by a descriptor
pub fn create_backend(descriptor: &BackendDescriptor) -> Result<Box<dyn Backend>, ConfigError> {
    if descriptor.model.trim().is_empty() {
        return Err(ConfigError::MissingModel);
    }

    match descriptor.kind {
        BackendKind::Ollama => Ok(Box::new(ollama::Ollama::from_descriptor(descriptor)?)),
        BackendKind::OpenAI => {
            if descriptor.api_key.is_empty() {
                return Err(ConfigError::MissingApiKey(descriptor.kind.display_name().to_string()));
            }
            Ok(Box::new(openai::OpenAI::from_descriptor(descriptor)?))
        }
    }
}

/// Map a transport failure onto the backend failure taxonomy
pub(crate) fn classify_transport_error(
    error: &reqwest::Error,
    endpoint: &str,
    timeout: Duration,
) -> BackendError {
    let detail = error.to_string();
    if error.is_timeout() {
        BackendError::Timeout { seconds: timeout.as_secs(), detail }
    } else if error.is_connect() && is_refusal(error) {
        BackendError::ConnectionRefused { endpoint: endpoint.to_string(), detail }
    } else {
        BackendError::Unreachable { endpoint: endpoint.to_string(), detail }
    }
}

// Walk the source chain looking for an io::ErrorKind::ConnectionRefused
fn is_refusal(error: &reqwest::Error) -> bool {
    let mut source = std::error::Error::source(error);
    while let Some(err) = source {
        if let Some(io) = err.downcast_ref::<std::io::Error>() {
            return io.kind() == std::io::ErrorKind::ConnectionRefused;
        }
        source = err.source();
    }
    // hyper does not always expose the io error; a failed connect is almost always a refusal
    true
}

/// First characters of an error body, or a placeholder when empty
pub(crate) fn body_excerpt(body: &str) -> String {
    if body.trim().is_empty() {
        return "No error details".to_string();
    }
    body.chars().take(BODY_EXCERPT_CHARS).collect()
}

pub mod mock;
pub mod ollama;
pub mod openai;
