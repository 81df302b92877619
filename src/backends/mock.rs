/*!
 * Mock backend for testing.
 *
 * Simulates the behaviors the pipeline has to cope with without any network:
 * - `MockBackend::working()` - every check passes and every chunk translates
 * - `MockBackend::missing_model(..)` - health check reports an absent model
 * - `MockBackend::unreachable()` - nothing is listening
 * - `fail_chunk(..)` / `fail_chunk_times(..)` - scripted per-chunk failures
 */

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use super::{Backend, Completion, HealthStatus, ModelReadiness};
use crate::app_config::BackendKind;
use crate::cost::TokenUsage;
use crate::errors::BackendError;
use crate::language_utils::TargetLanguage;
use crate::segmenter::Chunk;

/// Scripted health check behavior
#[derive(Debug, Clone, PartialEq)]
pub enum MockHealth {
    Ready,
    Degraded(String),
    Unreachable,
    MissingModel { available: Vec<String> },
}

/// Scripted warm-up behavior
#[derive(Debug, Clone, PartialEq)]
pub enum MockReadiness {
    Ready,
    NotFound(String),
    TimedOut,
}

/// Counters shared between a mock and the test that created it
#[derive(Debug, Default)]
pub struct MockStats {
    health_calls: AtomicUsize,
    ready_calls: AtomicUsize,
    translate_calls: AtomicUsize,
    /// Chunk indices in the order they were requested
    requested: Mutex<Vec<usize>>,
}

impl MockStats {
    pub fn health_calls(&self) -> usize {
        self.health_calls.load(Ordering::SeqCst)
    }

    pub fn ready_calls(&self) -> usize {
        self.ready_calls.load(Ordering::SeqCst)
    }

    pub fn translate_calls(&self) -> usize {
        self.translate_calls.load(Ordering::SeqCst)
    }

    /// Chunk indices in request order, retries included
    pub fn requested_chunks(&self) -> Vec<usize> {
        self.requested.lock().clone()
    }
}

/// A scripted failure for one chunk
#[derive(Debug, Clone)]
struct ScriptedFailure {
    error: BackendError,
    /// How many attempts fail before the chunk succeeds; `None` fails forever
    remaining: Option<usize>,
}

/// Mock backend for testing pipeline behavior
#[derive(Debug)]
pub struct MockBackend {
    kind: BackendKind,
    health: MockHealth,
    readiness: MockReadiness,
    failures: Mutex<HashMap<usize, ScriptedFailure>>,
    usage: Option<TokenUsage>,
    delay: Option<Duration>,
    /// Custom completion generator (optional)
    custom_response: Option<fn(&Chunk, &TargetLanguage) -> String>,
    stats: Arc<MockStats>,
}

impl MockBackend {
    /// Create a mock where every check and chunk succeeds
    pub fn working() -> Self {
        Self {
            kind: BackendKind::Ollama,
            health: MockHealth::Ready,
            readiness: MockReadiness::Ready,
            failures: Mutex::new(HashMap::new()),
            usage: None,
            delay: None,
            custom_response: None,
            stats: Arc::new(MockStats::default()),
        }
    }

    /// Create a mock whose health check does not find the requested model
    pub fn missing_model(available: Vec<String>) -> Self {
        Self::working().with_health(MockHealth::MissingModel { available })
    }

    /// Create a mock with nothing listening
    pub fn unreachable() -> Self {
        Self::working().with_health(MockHealth::Unreachable)
    }

    /// Pretend to be a different backend variant
    pub fn with_kind(mut self, kind: BackendKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn with_health(mut self, health: MockHealth) -> Self {
        self.health = health;
        self
    }

    pub fn with_readiness(mut self, readiness: MockReadiness) -> Self {
        self.readiness = readiness;
        self
    }

    /// Report this usage for every translated chunk
    pub fn with_usage(mut self, prompt_tokens: u64, completion_tokens: u64) -> Self {
        self.usage = Some(TokenUsage::new(prompt_tokens, completion_tokens));
        self
    }

    /// Sleep before answering each chunk
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Set a custom completion generator
    pub fn with_custom_response(mut self, generator: fn(&Chunk, &TargetLanguage) -> String) -> Self {
        self.custom_response = Some(generator);
        self
    }

    /// Fail every attempt at a chunk
    pub fn fail_chunk(self, index: usize, error: BackendError) -> Self {
        self.failures.lock().insert(index, ScriptedFailure { error, remaining: None });
        self
    }

    /// Fail the first `times` attempts at a chunk, then succeed
    pub fn fail_chunk_times(self, index: usize, times: usize, error: BackendError) -> Self {
        self.failures
            .lock()
            .insert(index, ScriptedFailure { error, remaining: Some(times) });
        self
    }

    /// Get the shared call counters
    pub fn stats(&self) -> Arc<MockStats> {
        Arc::clone(&self.stats)
    }

    /// The completion a working mock returns for a chunk
    pub fn default_completion(chunk: &Chunk, language: &TargetLanguage) -> String {
        format!("[{}] {}", language.name(), chunk.text)
    }

    fn scripted_failure(&self, index: usize) -> Option<BackendError> {
        let mut failures = self.failures.lock();
        let failure = failures.get_mut(&index)?;
        match failure.remaining {
            None => Some(failure.error.clone()),
            Some(0) => None,
            Some(ref mut remaining) => {
                *remaining -= 1;
                Some(failure.error.clone())
            }
        }
    }
}

#[async_trait]
impl Backend for MockBackend {
    fn kind(&self) -> BackendKind {
        self.kind.clone()
    }

    async fn check_health(&self, model: &str) -> Result<HealthStatus, BackendError> {
        self.stats.health_calls.fetch_add(1, Ordering::SeqCst);
        match &self.health {
            MockHealth::Ready => Ok(HealthStatus::Ready),
            MockHealth::Degraded(detail) => Ok(HealthStatus::Degraded(detail.clone())),
            MockHealth::Unreachable => Err(BackendError::ConnectionRefused {
                endpoint: "http://localhost:11434".to_string(),
                detail: "connection refused".to_string(),
            }),
            MockHealth::MissingModel { available } => Err(BackendError::ModelNotFound {
                model: model.to_string(),
                available: available.clone(),
            }),
        }
    }

    async fn check_model_ready(&self, model: &str) -> Result<ModelReadiness, BackendError> {
        self.stats.ready_calls.fetch_add(1, Ordering::SeqCst);
        match &self.readiness {
            MockReadiness::Ready => Ok(ModelReadiness::Ready),
            MockReadiness::NotFound(detail) => Ok(ModelReadiness::NotFound(detail.clone())),
            MockReadiness::TimedOut => Err(BackendError::Timeout {
                seconds: 300,
                detail: format!("Try testing manually: ollama run {}", model),
            }),
        }
    }

    async fn translate_chunk(
        &self,
        chunk: &Chunk,
        language: &TargetLanguage,
        _model: &str,
    ) -> Result<Completion, BackendError> {
        self.stats.translate_calls.fetch_add(1, Ordering::SeqCst);
        self.stats.requested.lock().push(chunk.index);

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        if let Some(error) = self.scripted_failure(chunk.index) {
            return Err(error);
        }

        let text = match self.custom_response {
            Some(generator) => generator(chunk, language),
            None => Self::default_completion(chunk, language),
        };

        Ok(Completion { text, usage: self.usage })
    }
}
