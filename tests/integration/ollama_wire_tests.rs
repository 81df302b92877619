/*!
 * Ollama client tests against a local fake server
 */

use std::time::Duration;

use doctran::app_config::{BackendDescriptor, BackendKind};
use doctran::backends::ollama::Ollama;
use doctran::backends::{Backend, HealthStatus, ModelReadiness};
use doctran::cost::TokenUsage;
use doctran::errors::BackendError;
use doctran::segmenter::segment;

use crate::common;
use crate::common::fake_ollama::{chat_body, tags_body, FakeOllama, FakeResponse};

fn client(endpoint: &str, model: &str) -> Ollama {
    let descriptor = BackendDescriptor::new(BackendKind::Ollama, model).with_endpoint(endpoint);
    Ollama::from_descriptor(&descriptor).unwrap()
}

/// An installed model passes the health check
#[tokio::test]
async fn test_check_health_withInstalledModel_shouldBeReady() {
    let server = FakeOllama::translating(&["llama3.2:latest", "mistral:7b"]).await;
    let ollama = client(&server.endpoint(), "llama3.2");

    let status = ollama.check_health("llama3.2").await.unwrap();

    assert_eq!(status, HealthStatus::Ready);
    let requests = server.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].method, "GET");
    assert_eq!(requests[0].path, "/api/tags");
}

/// A missing model is reported along with what is installed
#[tokio::test]
async fn test_check_health_withMissingModel_shouldListAvailable() {
    let server = FakeOllama::translating(&["mistral:latest"]).await;
    let ollama = client(&server.endpoint(), "llama3");

    let error = ollama.check_health("llama3").await.unwrap_err();

    match &error {
        BackendError::ModelNotFound { model, available } => {
            assert_eq!(model, "llama3");
            assert_eq!(available, &vec!["mistral:latest".to_string()]);
        }
        other => panic!("unexpected error {:?}", other),
    }
    assert!(error.to_string().contains("mistral:latest"));
}

/// A failing tags endpoint degrades the health check
#[tokio::test]
async fn test_check_health_withServerError_shouldBeDegraded() {
    let server = FakeOllama::start(|_| FakeResponse::status(500, "boom")).await;
    let ollama = client(&server.endpoint(), "llama3.2");

    let status = ollama.check_health("llama3.2").await.unwrap();

    match status {
        HealthStatus::Degraded(detail) => assert!(detail.contains("500")),
        HealthStatus::Ready => panic!("expected a degraded health check"),
    }
}

/// The warm-up prompt is a tiny chat request
#[tokio::test]
async fn test_check_model_ready_shouldSendWarmupPrompt() {
    let server = FakeOllama::translating(&["llama3.2:latest"]).await;
    let ollama = client(&server.endpoint(), "llama3.2");

    let readiness = ollama.check_model_ready("llama3.2").await.unwrap();

    assert_eq!(readiness, ModelReadiness::Ready);
    let requests = server.requests();
    assert_eq!(requests.len(), 1);
    assert!(requests[0].is_warmup());
    assert!(requests[0].body.contains("\"stream\":false"));
}

/// A warm-up answered with an error status means the model is not ready
#[tokio::test]
async fn test_check_model_ready_withErrorStatus_shouldBeNotFound() {
    let server = FakeOllama::start(|_| FakeResponse::status(500, "model failed to load")).await;
    let ollama = client(&server.endpoint(), "llama3.2");

    let readiness = ollama.check_model_ready("llama3.2").await.unwrap();

    match readiness {
        ModelReadiness::NotFound(detail) => {
            assert!(detail.contains("Status 500"));
            assert!(detail.contains("model failed to load"));
            assert!(detail.contains("/api/generate"));
        }
        ModelReadiness::Ready => panic!("expected the model not to be ready"),
    }
}

/// A chunk request carries the chunk and returns the completion with usage
#[tokio::test]
async fn test_translate_chunk_shouldReturnCompletionAndUsage() {
    let server = FakeOllama::translating(&["llama3.2:latest"]).await;
    let ollama = client(&server.endpoint(), "llama3.2");
    let chunks = segment("Hello world", 5000).unwrap();

    let completion = ollama
        .translate_chunk(&chunks[0], &common::spanish(), "llama3.2")
        .await
        .unwrap();

    assert_eq!(completion.text, "Here is the translation: HELLO WORLD");
    assert_eq!(completion.usage, Some(TokenUsage::new(12, 8)));

    let requests = server.chunk_requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].chunk_text().as_deref(), Some("Hello world"));
    assert!(requests[0].body.contains("\"num_predict\""));
}

/// Non-success statuses carry the status and a body excerpt
#[tokio::test]
async fn test_translate_chunk_withErrorStatus_shouldFailWithStatus() {
    let server = FakeOllama::start(|_| FakeResponse::status(503, "overloaded")).await;
    let ollama = client(&server.endpoint(), "llama3.2");
    let chunks = segment("Hello world", 5000).unwrap();

    let error = ollama
        .translate_chunk(&chunks[0], &common::spanish(), "llama3.2")
        .await
        .unwrap_err();

    assert_eq!(
        error,
        BackendError::NonSuccessStatus {
            status: 503,
            body_excerpt: "overloaded".to_string()
        }
    );
    assert!(error.is_transient());
}

/// A body without message content is malformed
#[tokio::test]
async fn test_translate_chunk_withUnexpectedBody_shouldBeMalformed() {
    let server = FakeOllama::start(|_| FakeResponse::json(serde_json::json!({ "unexpected": true }))).await;
    let ollama = client(&server.endpoint(), "llama3.2");
    let chunks = segment("Hello world", 5000).unwrap();

    let error = ollama
        .translate_chunk(&chunks[0], &common::spanish(), "llama3.2")
        .await
        .unwrap_err();

    assert!(matches!(error, BackendError::MalformedResponse(_)));
}

/// An empty completion is an empty result
#[tokio::test]
async fn test_translate_chunk_withEmptyContent_shouldBeEmptyResult() {
    let server = FakeOllama::start(|_| FakeResponse::json(chat_body("  "))).await;
    let ollama = client(&server.endpoint(), "llama3.2");
    let chunks = segment("Hello world", 5000).unwrap();

    let error = ollama
        .translate_chunk(&chunks[0], &common::spanish(), "llama3.2")
        .await
        .unwrap_err();

    assert_eq!(error, BackendError::EmptyResult);
}

/// A request slower than its deadline times out
#[tokio::test]
async fn test_translate_chunk_withSlowServer_shouldTimeOut() {
    let server = FakeOllama::slow_on_chunk(&["llama3.2:latest"], 0, Duration::from_secs(3)).await;
    let mut descriptor = BackendDescriptor::new(BackendKind::Ollama, "llama3.2").with_endpoint(server.endpoint());
    descriptor.request_timeout_secs = 1;
    let ollama = Ollama::from_descriptor(&descriptor).unwrap();
    let chunks = segment("Hello world", 5000).unwrap();

    let error = ollama
        .translate_chunk(&chunks[0], &common::spanish(), "llama3.2")
        .await
        .unwrap_err();

    assert!(matches!(error, BackendError::Timeout { seconds: 1, .. }));
    assert!(error.is_transient());
}

/// Nothing listening on the port is a connection failure, not a timeout
#[tokio::test]
async fn test_check_health_withNothingListening_shouldFailToConnect() {
    // Bind and release a port so nothing listens on it
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let ollama = client(&format!("http://{}", addr), "llama3.2");
    let error = ollama.check_health("llama3.2").await.unwrap_err();

    assert!(
        matches!(error, BackendError::ConnectionRefused { .. } | BackendError::Unreachable { .. }),
        "unexpected error {:?}",
        error
    );
    assert!(error.hint().contains("running"));
}

/// The tags listing helper parses a real answer shape
#[test]
fn test_tags_body_shouldParseIntoModelNames() {
    let tags: doctran::backends::ollama::TagsResponse =
        serde_json::from_value(tags_body(&["a:latest", "b:7b"])).unwrap();
    assert_eq!(tags.model_names(), vec!["a:latest".to_string(), "b:7b".to_string()]);
}
