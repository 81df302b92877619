/*!
 * Tests for error types, messages and remediation hints
 */

use std::path::PathBuf;

use doctran::errors::{BackendError, ConfigError, InputError, PipelineError, PreflightError};

/// A missing model names the model and lists what is installed
#[test]
fn test_model_not_found_display_shouldListAvailableModels() {
    let error = BackendError::ModelNotFound {
        model: "llama3.2".to_string(),
        available: vec!["mistral:latest".to_string(), "qwen2.5:7b".to_string()],
    };
    let message = error.to_string();
    assert!(message.contains("llama3.2"));
    assert!(message.contains("mistral:latest, qwen2.5:7b"));
    assert!(error.hint().contains("ollama pull llama3.2"));

    let none = BackendError::ModelNotFound { model: "x".to_string(), available: vec![] };
    assert!(none.to_string().contains("Available models: none"));
}

/// Only failures that may go away on their own are transient
#[test]
fn test_is_transient_shouldSeparateRetryableFailures() {
    let transient = [
        BackendError::Timeout { seconds: 180, detail: String::new() },
        BackendError::ConnectionRefused { endpoint: "e".into(), detail: String::new() },
        BackendError::Unreachable { endpoint: "e".into(), detail: String::new() },
        BackendError::NonSuccessStatus { status: 503, body_excerpt: String::new() },
        BackendError::NonSuccessStatus { status: 429, body_excerpt: String::new() },
    ];
    for error in &transient {
        assert!(error.is_transient(), "{:?}", error);
    }

    let permanent = [
        BackendError::NonSuccessStatus { status: 401, body_excerpt: String::new() },
        BackendError::NonSuccessStatus { status: 404, body_excerpt: String::new() },
        BackendError::MalformedResponse("x".into()),
        BackendError::EmptyResult,
        BackendError::ModelNotFound { model: "m".into(), available: vec![] },
    ];
    for error in &permanent {
        assert!(!error.is_transient(), "{:?}", error);
    }
}

/// Hints tell "not running", "wrong model", "timed out" and "bad response" apart
#[test]
fn test_hints_shouldDistinguishFailureClasses() {
    let not_running = BackendError::ConnectionRefused {
        endpoint: "http://localhost:11434".into(),
        detail: String::new(),
    }
    .hint();
    let wrong_model = BackendError::ModelNotFound { model: "m".into(), available: vec![] }.hint();
    let timed_out = BackendError::Timeout { seconds: 180, detail: String::new() }.hint();
    let bad_shape = BackendError::MalformedResponse("x".into()).hint();

    assert!(not_running.contains("running"));
    assert!(wrong_model.contains("ollama pull"));
    assert!(timed_out.contains("smaller chunk size"));
    assert!(bad_shape.contains("unexpected response"));

    let hints = [&not_running, &wrong_model, &timed_out, &bad_shape];
    for (i, a) in hints.iter().enumerate() {
        for b in hints.iter().skip(i + 1) {
            assert_ne!(a, b);
        }
    }
}

/// Chunk failures report a one-based position
#[test]
fn test_chunk_translation_display_shouldUseOneBasedIndex() {
    let error = PipelineError::ChunkTranslation {
        index: 1,
        total: 3,
        source: BackendError::Timeout { seconds: 180, detail: "deadline".into() },
    };
    let message = error.to_string();
    assert!(message.contains("chunk 2/3"), "{}", message);
    assert!(message.contains("timed out"));
    assert!(error.hint().contains("smaller chunk size"));
}

/// Preflight and input failures carry their own hints
#[test]
fn test_pipeline_error_hint_shouldDelegateToCause() {
    let preflight: PipelineError = PreflightError::from(BackendError::ModelNotFound {
        model: "llama3.2".into(),
        available: vec![],
    })
    .into();
    assert!(preflight.hint().contains("ollama pull llama3.2"));

    let warmup: PipelineError = PreflightError::ModelNotReady {
        model: "llama3.2".into(),
        detail: "Status 500".into(),
    }
    .into();
    assert!(warmup.hint().contains("ollama run llama3.2"));

    let input: PipelineError = InputError::FileNotFound(PathBuf::from("missing.txt")).into();
    assert!(input.to_string().contains("missing.txt"));

    let config: PipelineError = ConfigError::MissingApiKey("OpenAI".into()).into();
    assert!(config.hint().contains("OPENAI_API_KEY"));
}

/// Persistence failures keep the translation for a manual retry
#[test]
fn test_persistence_error_shouldCarryTranslation() {
    let error = PipelineError::Persistence {
        path: PathBuf::from("/read-only/out.txt"),
        message: "permission denied".into(),
        translation: "Hola mundo".into(),
    };
    assert_eq!(error.recovered_translation(), Some("Hola mundo"));
    assert!(error.to_string().contains("/read-only/out.txt"));

    let other: PipelineError = ConfigError::MissingModel.into();
    assert_eq!(other.recovered_translation(), None);
}
