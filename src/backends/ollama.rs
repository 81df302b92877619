use async_trait::async_trait;
use log::{debug, error};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use url::Url;

use super::{
    body_excerpt, build_messages, classify_transport_error, Backend, ChatMessage, Completion,
    HealthStatus, ModelReadiness,
};
use crate::app_config::{BackendDescriptor, BackendKind};
use crate::cost::TokenUsage;
use crate::errors::{BackendError, ConfigError};
use crate::language_utils::TargetLanguage;
use crate::segmenter::Chunk;

/// Prompt used to warm a model up before the first chunk
const WARMUP_PROMPT: &str = "Say 'test'";

/// Ollama client for interacting with the Ollama API
#[derive(Debug)]
pub struct Ollama {
    /// Base URL of the Ollama API, without trailing slash
    base_url: String,
    /// HTTP client for making requests
    client: Client,
    health_timeout: Duration,
    warmup_timeout: Duration,
    request_timeout: Duration,
    /// Generation bound per chunk
    max_output_tokens: u32,
}

/// Generation options for the Ollama API
#[derive(Debug, Serialize, Deserialize)]
pub struct GenerationOptions {
    /// Maximum number of tokens to generate
    #[serde(skip_serializing_if = "Option::is_none")]
    pub num_predict: Option<u32>,
}

/// Chat request for the Ollama API
#[derive(Debug, Serialize, Deserialize)]
pub struct ChatRequest {
    /// Model name to use for generation
    pub model: String,
    /// Messages of the conversation
    pub messages: Vec<ChatMessage>,
    /// Whether to stream the response
    pub stream: bool,
    /// Additional model parameters
    #[serde(skip_serializing_if = "Option::is_none")]
    pub options: Option<GenerationOptions>,
}

impl ChatRequest {
    /// Create a new non-streaming chat request
    pub fn new(model: impl Into<String>, messages: Vec<ChatMessage>) -> Self {
        Self {
            model: model.into(),
            messages,
            stream: false,
            options: None,
        }
    }

    /// Bound the number of generated tokens
    pub fn num_predict(mut self, num_predict: u32) -> Self {
        self.options = Some(GenerationOptions { num_predict: Some(num_predict) });
        self
    }
}

/// Chat response from the Ollama API
#[derive(Debug, Serialize, Deserialize)]
pub struct ChatResponse {
    /// Model name
    #[serde(default)]
    pub model: String,
    /// Response message
    pub message: ChatMessage,
    /// Whether the generation is complete
    #[serde(default)]
    pub done: bool,
    /// Number of prompt tokens
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub prompt_eval_count: Option<u64>,
    /// Number of generated tokens
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub eval_count: Option<u64>,
}

impl ChatResponse {
    /// Token usage, when both counters were reported
    pub fn usage(&self) -> Option<TokenUsage> {
        match (self.prompt_eval_count, self.eval_count) {
            (Some(prompt), Some(completion)) => Some(TokenUsage::new(prompt, completion)),
            _ => None,
        }
    }
}

/// Installed-model listing from `/api/tags`
#[derive(Debug, Serialize, Deserialize)]
pub struct TagsResponse {
    #[serde(default)]
    pub models: Vec<ModelInfo>,
}

/// One installed model
#[derive(Debug, Serialize, Deserialize)]
pub struct ModelInfo {
    #[serde(default)]
    pub name: String,
}

impl TagsResponse {
    /// Names of every installed model
    pub fn model_names(&self) -> Vec<String> {
        self.models
            .iter()
            .map(|m| m.name.clone())
            .filter(|name| !name.is_empty())
            .collect()
    }
}

/// Verify that `model` is among the installed models
///
/// A bare name matches its `:latest` tag, so "llama3.2" is found when
/// "llama3.2:latest" is installed.
pub fn verify_model_installed(model: &str, tags: &TagsResponse) -> Result<(), BackendError> {
    let available = tags.model_names();
    let found = available
        .iter()
        .any(|name| name == model || (!model.contains(':') && *name == format!("{}:latest", model)));

    if found {
        Ok(())
    } else {
        Err(BackendError::ModelNotFound {
            model: model.to_string(),
            available,
        })
    }
}

/// Parse a chat body, tolerating JSONL streaming output
///
/// Some Ollama versions stream even when asked not to; in that case every line
/// is a JSON object carrying a piece of `message.content`, and the line with
/// `done: true` carries the token counters.
pub fn parse_chat_response(body: &str) -> Result<ChatResponse, BackendError> {
    match serde_json::from_str::<ChatResponse>(body) {
        Ok(response) => Ok(response),
        Err(e) => {
            debug!(
                "Strict parse of Ollama chat response failed: {}. Raw response (first 500 chars): {}",
                e,
                body.chars().take(500).collect::<String>()
            );

            let values: Vec<serde_json::Value> = body
                .lines()
                .filter(|line| !line.trim().is_empty())
                .filter_map(|line| serde_json::from_str(line).ok())
                .collect();

            let pieces: Vec<&str> = values
                .iter()
                .filter_map(|v| v.get("message")?.get("content")?.as_str())
                .collect();

            if pieces.is_empty() {
                return Err(BackendError::MalformedResponse(format!(
                    "missing message.content in Ollama response: {}",
                    body_excerpt(body)
                )));
            }

            let last = values
                .iter()
                .rev()
                .find(|v| v.get("done").and_then(|d| d.as_bool()).unwrap_or(false))
                .or(values.last());

            Ok(ChatResponse {
                model: last
                    .and_then(|v| v.get("model"))
                    .and_then(|v| v.as_str())
                    .unwrap_or("unknown")
                    .to_string(),
                message: ChatMessage {
                    role: "assistant".to_string(),
                    content: pieces.concat(),
                },
                done: true,
                prompt_eval_count: last.and_then(|v| v.get("prompt_eval_count")).and_then(|v| v.as_u64()),
                eval_count: last.and_then(|v| v.get("eval_count")).and_then(|v| v.as_u64()),
            })
        }
    }
}

impl Ollama {
    /// Create a new Ollama client from a run descriptor
    ///
    /// Ollama uses HTTP/1.1, so the client is pinned to it.
    pub fn from_descriptor(descriptor: &BackendDescriptor) -> Result<Self, ConfigError> {
        let url = Url::parse(&descriptor.endpoint).map_err(|e| ConfigError::InvalidEndpoint {
            endpoint: descriptor.endpoint.clone(),
            reason: e.to_string(),
        })?;

        let client = Client::builder()
            .connect_timeout(Duration::from_secs(descriptor.connect_timeout_secs))
            .http1_only()
            .pool_idle_timeout(Duration::from_secs(90))
            .tcp_keepalive(Duration::from_secs(60))
            .build()
            .unwrap_or_default();

        Ok(Self {
            base_url: url.as_str().trim_end_matches('/').to_string(),
            client,
            health_timeout: Duration::from_secs(descriptor.health_timeout_secs),
            warmup_timeout: Duration::from_secs(descriptor.warmup_timeout_secs),
            request_timeout: Duration::from_secs(descriptor.request_timeout_secs),
            max_output_tokens: descriptor.max_output_tokens,
        })
    }

    /// List the installed models
    pub async fn list_models(&self) -> Result<TagsResponse, BackendError> {
        let url = format!("{}/api/tags", self.base_url);
        let response = self
            .client
            .get(&url)
            .timeout(self.health_timeout)
            .send()
            .await
            .map_err(|e| classify_transport_error(&e, &self.base_url, self.health_timeout))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| classify_transport_error(&e, &self.base_url, self.health_timeout))?;

        if !status.is_success() {
            return Err(BackendError::NonSuccessStatus {
                status: status.as_u16(),
                body_excerpt: body_excerpt(&body),
            });
        }

        serde_json::from_str::<TagsResponse>(&body).map_err(|e| {
            BackendError::MalformedResponse(format!("Failed to parse Ollama model list: {}", e))
        })
    }

    /// Chat with the Ollama API
    pub async fn chat(&self, request: &ChatRequest, timeout: Duration) -> Result<ChatResponse, BackendError> {
        let url = format!("{}/api/chat", self.base_url);

        let response = self
            .client
            .post(&url)
            .json(request)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| classify_transport_error(&e, &self.base_url, timeout))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| classify_transport_error(&e, &self.base_url, timeout))?;

        if !status.is_success() {
            error!("Ollama API error ({}): {}", status, body_excerpt(&body));
            return Err(BackendError::NonSuccessStatus {
                status: status.as_u16(),
                body_excerpt: body_excerpt(&body),
            });
        }

        parse_chat_response(&body)
    }
}

#[async_trait]
impl Backend for Ollama {
    fn kind(&self) -> BackendKind {
        BackendKind::Ollama
    }

    async fn check_health(&self, model: &str) -> Result<HealthStatus, BackendError> {
        let tags = match self.list_models().await {
            Ok(tags) => tags,
            Err(BackendError::NonSuccessStatus { status, .. }) => {
                return Ok(HealthStatus::Degraded(format!(
                    "Ollama health check failed. Status: {}. Make sure Ollama is running on {}",
                    status, self.base_url
                )));
            }
            Err(e) => return Err(e),
        };

        verify_model_installed(model, &tags)?;
        Ok(HealthStatus::Ready)
    }

    async fn check_model_ready(&self, model: &str) -> Result<ModelReadiness, BackendError> {
        let request = ChatRequest::new(model, vec![ChatMessage::user(WARMUP_PROMPT)]);

        match self.chat(&request, self.warmup_timeout).await {
            Ok(_) => Ok(ModelReadiness::Ready),
            Err(BackendError::NonSuccessStatus { status, body_excerpt }) => {
                let curl = format!(
                    "curl {}/api/generate -d '{{\"model\":\"{}\",\"prompt\":\"test\"}}'",
                    self.base_url, model
                );
                Ok(ModelReadiness::NotFound(format!(
                    "Model test failed: Status {}\nResponse: {}\n\nTry testing Ollama manually: {}",
                    status, body_excerpt, curl
                )))
            }
            Err(BackendError::Timeout { seconds, .. }) => Err(BackendError::Timeout {
                seconds,
                detail: format!(
                    "Model '{}' did not answer the warm-up prompt. It might be still loading into GPU memory, \
                     too large for this system, or not compatible. Try testing manually: ollama run {}",
                    model, model
                ),
            }),
            Err(e) => Err(e),
        }
    }

    async fn translate_chunk(
        &self,
        chunk: &Chunk,
        language: &TargetLanguage,
        model: &str,
    ) -> Result<Completion, BackendError> {
        let request = ChatRequest::new(model, build_messages(&chunk.text, language))
            .num_predict(self.max_output_tokens);

        let response = self.chat(&request, self.request_timeout).await?;
        let usage = response.usage();
        let text = response.message.content;
        if text.trim().is_empty() {
            return Err(BackendError::EmptyResult);
        }

        Ok(Completion { text, usage })
    }
}
