use async_trait::async_trait;
use log::error;
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

/// OpenAI-compatible client for the hosted chat completions API
pub struct OpenAI {
    /// HTTP client for API requests
    client: Client,
    /// API key for authentication
    api_key: String,
    /// API base URL, e.g. https://api.openai.com/v1
    endpoint: String,
    request_timeout: Duration,
    /// Generation bound per chunk
    max_output_tokens: u32,
}

// Keep the key out of logs
impl std::fmt::Debug for OpenAI {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAI")
            .field("endpoint", &self.endpoint)
            .field("request_timeout", &self.request_timeout)
            .field("max_output_tokens", &self.max_output_tokens)
            .finish()
    }
}

/// Chat completions request
#[derive(Debug, Serialize)]
pub struct OpenAIRequest {
    /// The model to use
    model: String,
    /// The messages for the conversation
    messages: Vec<ChatMessage>,
    /// Maximum number of tokens to generate
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
}

impl OpenAIRequest {
    /// Create a new request
    pub fn new(model: impl Into<String>, messages: Vec<ChatMessage>) -> Self {
        Self {
            model: model.into(),
            messages,
            max_tokens: None,
        }
    }

    /// Set the maximum number of tokens to generate
    pub fn max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }
}

/// Token usage information
#[derive(Debug, Deserialize)]
pub struct OpenAIUsage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
}

/// One choice in a completions response
#[derive(Debug, Deserialize)]
pub struct OpenAIChoice {
    pub message: ChatMessage,
}

/// Chat completions response
#[derive(Debug, Deserialize)]
pub struct OpenAIResponse {
    pub choices: Vec<OpenAIChoice>,
    #[serde(default)]
    pub usage: Option<OpenAIUsage>,
}

impl OpenAIResponse {
    /// Extract the first choice's text
    pub fn extract_text(&self) -> Option<&str> {
        self.choices.first().map(|c| c.message.content.as_str())
    }

    pub fn token_usage(&self) -> Option<TokenUsage> {
        self.usage
            .as_ref()
            .map(|u| TokenUsage::new(u.prompt_tokens, u.completion_tokens))
    }
}

impl OpenAI {
    /// Create a new client from a run descriptor
    pub fn from_descriptor(descriptor: &BackendDescriptor) -> Result<Self, ConfigError> {
        Url::parse(&descriptor.endpoint).map_err(|e| ConfigError::InvalidEndpoint {
            endpoint: descriptor.endpoint.clone(),
            reason: e.to_string(),
        })?;

        Ok(Self {
            client: Client::builder()
                .connect_timeout(Duration::from_secs(descriptor.connect_timeout_secs))
                .build()
                .unwrap_or_default(),
            api_key: descriptor.api_key.clone(),
            endpoint: descriptor.endpoint.trim_end_matches('/').to_string(),
            request_timeout: Duration::from_secs(descriptor.request_timeout_secs),
            max_output_tokens: descriptor.max_output_tokens,
        })
    }

    /// Complete a chat request
    pub async fn complete(&self, request: &OpenAIRequest) -> Result<OpenAIResponse, BackendError> {
        let url = format!("{}/chat/completions", self.endpoint);

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(request)
            .timeout(self.request_timeout)
            .send()
            .await
            .map_err(|e| classify_transport_error(&e, &self.endpoint, self.request_timeout))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| classify_transport_error(&e, &self.endpoint, self.request_timeout))?;

        if !status.is_success() {
            error!("OpenAI API error ({}): {}", status, body_excerpt(&body));
            return Err(BackendError::NonSuccessStatus {
                status: status.as_u16(),
                body_excerpt: body_excerpt(&body),
            });
        }

        serde_json::from_str::<OpenAIResponse>(&body).map_err(|e| {
            BackendError::MalformedResponse(format!("Failed to parse OpenAI API response: {}", e))
        })
    }
}

#[async_trait]
impl Backend for OpenAI {
    fn kind(&self) -> BackendKind {
        BackendKind::OpenAI
    }

    // Authentication alone gates access to the hosted API
    async fn check_health(&self, _model: &str) -> Result<HealthStatus, BackendError> {
        Ok(HealthStatus::Ready)
    }

    async fn check_model_ready(&self, _model: &str) -> Result<ModelReadiness, BackendError> {
        Ok(ModelReadiness::Ready)
    }

    async fn translate_chunk(
        &self,
        chunk: &Chunk,
        language: &TargetLanguage,
        model: &str,
    ) -> Result<Completion, BackendError> {
        let request = OpenAIRequest::new(model, build_messages(&chunk.text, language))
            .max_tokens(self.max_output_tokens);

        let response = self.complete(&request).await?;
        let text = response
            .extract_text()
            .ok_or_else(|| BackendError::MalformedResponse("response contained no choices".to_string()))?;
        if text.trim().is_empty() {
            return Err(BackendError::EmptyResult);
        }

        Ok(Completion {
            text: text.to_string(),
            usage: response.token_usage(),
        })
    }
}
