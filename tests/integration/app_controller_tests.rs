/*!
 * Tests for single-file and folder runs through the controller
 */

use std::sync::Arc;
use std::time::Duration;

use doctran::app_config::{BackendKind, Config};
use doctran::app_controller::{Controller, FolderSummary, ISSUES_LOG_NAME};
use doctran::backends::mock::MockBackend;
use doctran::backends::Backend;
use doctran::translation::{RunEstimate, TranslationOutcome};

use crate::common;
use crate::common::fake_ollama::FakeOllama;

fn mock() -> anyhow::Result<Box<dyn Backend>> {
    Ok(Box::new(MockBackend::working()) as Box<dyn Backend>)
}

fn config_with_endpoint(endpoint: &str) -> Config {
    let mut config = Config::default();
    for backend in config.available_backends.iter_mut() {
        if backend.backend_type == "ollama" {
            backend.endpoint = endpoint.to_string();
        }
    }
    config
}

#[test]
fn test_with_config_withDefaults_shouldSucceed() {
    let controller = Controller::with_config(Config::default()).unwrap();
    assert_eq!(controller.config().backend, BackendKind::Ollama);
}

#[test]
fn test_with_config_withoutTargetLanguage_shouldFail() {
    let config = Config {
        target_language: "  ".to_string(),
        ..Config::default()
    };
    assert!(Controller::with_config(config).is_err());
}

#[test]
fn test_with_config_withZeroChunkSize_shouldFail() {
    let mut config = Config::default();
    config.pipeline.chunk_size = 0;
    assert!(Controller::with_config(config).is_err());
}

#[test]
fn test_with_config_withInvalidEndpoint_shouldFail() {
    let config = config_with_endpoint("not a url");
    let error = Controller::with_config(config).err().unwrap();
    assert!(format!("{:#}", error).contains("Invalid endpoint"));
}

/// Estimating reads the file but never contacts the backend
#[test]
fn test_estimate_shouldCountChunks() {
    let temp_dir = common::create_temp_dir().unwrap();
    let source = common::create_test_file(temp_dir.path(), "book.txt", &common::sample_text(12000)).unwrap();
    let controller = Controller::with_config(config_with_endpoint("http://127.0.0.1:9")).unwrap();

    let estimate = controller.estimate(&source).unwrap();

    assert_eq!(estimate.chunk_count, 3);
    assert_eq!(estimate.char_count, 12000);
    assert!(estimate.cost.unwrap().pricing.is_free());
    assert!(estimate.summary().contains("no cost"));
}

#[test]
fn test_estimate_withMissingFile_shouldFail() {
    let temp_dir = common::create_temp_dir().unwrap();
    let controller = Controller::with_config(Config::default()).unwrap();

    let error = controller.estimate(&temp_dir.path().join("missing.txt")).err().unwrap();
    assert!(format!("{:#}", error).contains("not found"));
}

#[tokio::test]
async fn test_run_with_backend_shouldWriteNextToSource() {
    let temp_dir = common::create_temp_dir().unwrap();
    let source = common::create_test_file(temp_dir.path(), "book.txt", "Hello world").unwrap();
    let controller = Controller::with_config(Config::default()).unwrap().without_progress();

    let outcome = controller
        .run_with_backend(Box::new(MockBackend::working()), &source)
        .await
        .unwrap();

    assert!(matches!(outcome, TranslationOutcome::Completed(_)));
    let written = std::fs::read_to_string(temp_dir.path().join("book_spanish.txt")).unwrap();
    assert_eq!(written, "[spanish] Hello world");
}

#[tokio::test]
async fn test_run_with_backend_withOutputDir_shouldWriteThere() {
    let temp_dir = common::create_temp_dir().unwrap();
    let out_dir = common::create_temp_dir().unwrap();
    let source = common::create_test_file(temp_dir.path(), "book.txt", "Hello world").unwrap();
    let controller = Controller::with_config(Config::default())
        .unwrap()
        .with_output_dir(Some(out_dir.path().join("nested")))
        .without_progress();

    controller
        .run_with_backend(Box::new(MockBackend::working()), &source)
        .await
        .unwrap();

    assert!(out_dir.path().join("nested").join("book_spanish.txt").exists());
    assert!(!temp_dir.path().join("book_spanish.txt").exists());
}

#[tokio::test]
async fn test_run_with_backend_withDecliningGate_shouldWriteNothing() {
    let temp_dir = common::create_temp_dir().unwrap();
    let source = common::create_test_file(temp_dir.path(), "book.txt", "Hello world").unwrap();
    let backend = MockBackend::working();
    let stats = backend.stats();
    let controller = Controller::with_config(Config::default())
        .unwrap()
        .with_gate(Arc::new(|_: &RunEstimate| false))
        .without_progress();

    let outcome = controller.run_with_backend(Box::new(backend), &source).await.unwrap();

    assert!(matches!(outcome, TranslationOutcome::Declined(_)));
    assert_eq!(stats.translate_calls(), 0);
    assert_eq!(common::file_count(temp_dir.path()), 1);
}

#[tokio::test]
async fn test_run_with_backend_withUnreachableBackend_shouldFail() {
    let temp_dir = common::create_temp_dir().unwrap();
    let source = common::create_test_file(temp_dir.path(), "book.txt", "Hello world").unwrap();
    let controller = Controller::with_config(Config::default()).unwrap().without_progress();

    let error = controller
        .run_with_backend(Box::new(MockBackend::unreachable()), &source)
        .await
        .err()
        .unwrap();

    let pipeline_error = error.downcast_ref::<doctran::errors::PipelineError>().unwrap();
    assert!(pipeline_error.hint().contains("running"));
    assert_eq!(common::file_count(temp_dir.path()), 1);
}

/// The configured backend is built from the config and used end to end
#[tokio::test]
async fn test_run_withConfiguredOllama_shouldTranslate() {
    let temp_dir = common::create_temp_dir().unwrap();
    let source = common::create_test_file(temp_dir.path(), "book.txt", "Hello world").unwrap();
    let server = FakeOllama::translating(&["llama3.2:latest"]).await;
    let controller = Controller::with_config(config_with_endpoint(&server.endpoint()))
        .unwrap()
        .without_progress();

    let outcome = controller.run(&source).await.unwrap();

    let TranslationOutcome::Completed(report) = outcome else {
        panic!("expected a completed run");
    };
    assert_eq!(report.translation, "HELLO WORLD");
    assert_eq!(server.chunk_requests().len(), 1);
}

#[tokio::test]
async fn test_run_folder_with_shouldSkipExistingOutputs() {
    let temp_dir = common::create_temp_dir().unwrap();
    common::create_test_file(temp_dir.path(), "a.txt", "First document").unwrap();
    common::create_test_file(temp_dir.path(), "b.txt", "Second document").unwrap();
    common::create_test_file(temp_dir.path(), "b_spanish.txt", "earlier translation").unwrap();
    common::create_test_file(temp_dir.path(), "notes.md", "not a document").unwrap();
    let controller = Controller::with_config(Config::default()).unwrap().without_progress();

    let summary = controller.run_folder_with(temp_dir.path(), false, mock).await.unwrap();

    assert_eq!(
        summary,
        FolderSummary {
            processed: 1,
            skipped: 1,
            declined: 0,
            failed: 0
        }
    );
    assert_eq!(
        std::fs::read_to_string(temp_dir.path().join("a_spanish.txt")).unwrap(),
        "[spanish] First document"
    );
    assert_eq!(
        std::fs::read_to_string(temp_dir.path().join("b_spanish.txt")).unwrap(),
        "earlier translation"
    );

    let log = std::fs::read_to_string(temp_dir.path().join(ISSUES_LOG_NAME)).unwrap();
    assert!(log.contains("1 processed, 1 skipped, 0 declined, 0 errors"));
}

#[tokio::test]
async fn test_run_folder_with_forceOverwrite_shouldRetranslate() {
    let temp_dir = common::create_temp_dir().unwrap();
    common::create_test_file(temp_dir.path(), "a.txt", "First document").unwrap();
    common::create_test_file(temp_dir.path(), "a_spanish.txt", "earlier translation").unwrap();
    let controller = Controller::with_config(Config::default()).unwrap().without_progress();

    let summary = controller.run_folder_with(temp_dir.path(), true, mock).await.unwrap();

    assert_eq!(summary.processed, 1);
    assert_eq!(summary.skipped, 0);
    assert_eq!(
        std::fs::read_to_string(temp_dir.path().join("a_spanish.txt")).unwrap(),
        "[spanish] First document"
    );
}

/// One failing document does not stop the others; failures land in the log
#[tokio::test]
async fn test_run_folder_with_failingDocument_shouldContinueAndLog() {
    let temp_dir = common::create_temp_dir().unwrap();
    common::create_test_file(temp_dir.path(), "a.txt", "First document").unwrap();
    common::create_test_file(temp_dir.path(), "b.txt", "   ").unwrap();
    common::create_test_file(temp_dir.path(), "c.txt", "Third document").unwrap();
    let controller = Controller::with_config(Config::default()).unwrap().without_progress();

    let summary = controller.run_folder_with(temp_dir.path(), false, mock).await.unwrap();

    assert_eq!(summary.processed, 2);
    assert_eq!(summary.failed, 1);
    assert!(temp_dir.path().join("c_spanish.txt").exists());
    assert!(!temp_dir.path().join("b_spanish.txt").exists());

    let log = std::fs::read_to_string(temp_dir.path().join(ISSUES_LOG_NAME)).unwrap();
    assert!(log.contains("b.txt"));
    assert!(log.contains("empty"));
}

#[tokio::test]
async fn test_run_folder_with_backendFactoryError_shouldCountFailures() {
    let temp_dir = common::create_temp_dir().unwrap();
    common::create_test_file(temp_dir.path(), "a.txt", "First document").unwrap();
    let controller = Controller::with_config(Config::default()).unwrap().without_progress();

    let summary = controller
        .run_folder_with(temp_dir.path(), false, || Err(anyhow::anyhow!("no backend")))
        .await
        .unwrap();

    assert_eq!(summary.failed, 1);
    assert_eq!(summary.processed, 0);
}

#[tokio::test]
async fn test_run_folder_with_noDocuments_shouldFail() {
    let temp_dir = common::create_temp_dir().unwrap();
    common::create_test_file(temp_dir.path(), "notes.md", "not a document").unwrap();
    let controller = Controller::with_config(Config::default()).unwrap().without_progress();

    let result = controller.run_folder_with(temp_dir.path(), false, mock).await;

    assert!(result.is_err());
}

#[tokio::test]
async fn test_run_folder_with_missingDirectory_shouldFail() {
    let temp_dir = common::create_temp_dir().unwrap();
    let controller = Controller::with_config(Config::default()).unwrap().without_progress();

    let result = controller
        .run_folder_with(&temp_dir.path().join("missing"), false, mock)
        .await;

    assert!(result.is_err());
}

#[test]
fn test_format_duration_shouldPickLargestUnit() {
    assert_eq!(Controller::format_duration(Duration::from_millis(1500)), "1.500s");
    assert_eq!(Controller::format_duration(Duration::from_secs(125)), "2m 5s");
    assert_eq!(Controller::format_duration(Duration::from_secs(3725)), "1h 2m 5s");
}
