//! Memory-mapped engine tests.
//!
//! Model files are small GGUF-looking fixtures written to a temp directory;
//! only the header magic is checked, so no real model is needed.

use std::sync::{Arc, Mutex};
use tempfile::TempDir;
use tokio_llm_lifecycle::core::traits::{EngineFactory, EngineHandle, ProgressCallback};
use tokio_llm_lifecycle::infrastructure::engine::{GGUF_MAGIC, MmapEngineFactory};
use tokio_llm_lifecycle::{InitProgressReport, LifecycleState, LifecycleStore};

fn models_dir_with(files: &[(&str, &[u8])]) -> TempDir {
    let dir = tempfile::tempdir().unwrap();
    for (name, contents) in files {
        std::fs::write(dir.path().join(name), contents).unwrap();
    }
    dir
}

fn gguf_bytes(len: usize) -> Vec<u8> {
    let mut bytes = GGUF_MAGIC.to_vec();
    bytes.resize(len, 7);
    bytes
}

fn collecting_callback() -> (Arc<Mutex<Vec<InitProgressReport>>>, ProgressCallback) {
    let reports = Arc::new(Mutex::new(Vec::new()));
    let sink = reports.clone();
    (
        reports,
        Arc::new(move |report: InitProgressReport| sink.lock().unwrap().push(report)),
    )
}

#[tokio::test]
async fn test_loads_model_with_gguf_extension() {
    let weights = gguf_bytes(10_000);
    let dir = models_dir_with(&[("tiny.gguf", weights.as_slice())]);
    let factory = MmapEngineFactory::new(dir.path()).with_chunk_size(4096);
    let (reports, on_progress) = collecting_callback();

    let model = factory.create_engine("tiny", on_progress).await.unwrap();

    assert_eq!(model.model_id(), "tiny");
    assert_eq!(model.len(), 10_000);
    assert_eq!(model.bytes(), &weights[..]);
    assert_eq!(model.path(), dir.path().join("tiny.gguf"));
    assert_eq!(model.info().model_id, "tiny");

    let reports = reports.lock().unwrap();
    assert!(reports[0].text.starts_with("Opening model file"));
    assert_eq!(reports[0].progress, 0.0);
    // open + three chunks + finish
    assert_eq!(reports.len(), 5);
    let last = reports.last().unwrap();
    assert_eq!(last.progress, 1.0);
    assert_eq!(last.text, "Finished loading model weights");
    assert!(
        reports
            .windows(2)
            .all(|pair| pair[0].progress <= pair[1].progress)
    );
}

#[tokio::test]
async fn test_loads_model_by_exact_file_name() {
    let dir = models_dir_with(&[("tiny-q4.bin", &gguf_bytes(64)[..])]);
    let factory = MmapEngineFactory::new(dir.path());
    let (_, on_progress) = collecting_callback();

    let model = factory.create_engine("tiny-q4.bin", on_progress).await.unwrap();
    assert_eq!(model.len(), 64);
}

#[tokio::test]
async fn test_missing_model_is_reported() {
    let dir = models_dir_with(&[]);
    let factory = MmapEngineFactory::new(dir.path());
    let (reports, on_progress) = collecting_callback();

    let error = factory.create_engine("absent", on_progress).await.unwrap_err();

    assert!(error.user_message().contains("model `absent` not found"));
    assert!(reports.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_directory_is_not_a_model_file() {
    let dir = models_dir_with(&[]);
    std::fs::create_dir(dir.path().join("shards.gguf")).unwrap();
    let factory = MmapEngineFactory::new(dir.path());

    assert!(factory.resolve("shards").await.is_err());

    let (reports, on_progress) = collecting_callback();
    let error = factory.create_engine("shards", on_progress).await.unwrap_err();
    assert!(error.user_message().contains("model `shards` not found"));
    assert!(reports.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_resolve_finds_both_file_name_forms() {
    let dir = models_dir_with(&[
        ("tiny.gguf", &gguf_bytes(8)[..]),
        ("raw.bin", &gguf_bytes(8)[..]),
    ]);
    let factory = MmapEngineFactory::new(dir.path());

    assert_eq!(factory.resolve("tiny").await.unwrap(), dir.path().join("tiny.gguf"));
    assert_eq!(factory.resolve(" raw.bin ").await.unwrap(), dir.path().join("raw.bin"));
}

#[tokio::test]
async fn test_non_gguf_file_is_rejected() {
    let dir = models_dir_with(&[("weights.gguf", &b"PK\x03\x04 definitely a zip"[..])]);
    let factory = MmapEngineFactory::new(dir.path());
    let (_, on_progress) = collecting_callback();

    let error = factory.create_engine("weights", on_progress).await.unwrap_err();
    assert!(error.user_message().contains("is not a GGUF model file"));
}

#[tokio::test]
async fn test_truncated_file_is_rejected() {
    let dir = models_dir_with(&[("short.gguf", &b"GG"[..])]);
    let factory = MmapEngineFactory::new(dir.path());
    let (_, on_progress) = collecting_callback();

    let error = factory.create_engine("short", on_progress).await.unwrap_err();
    assert!(error.user_message().contains("too small"));
}

#[tokio::test]
async fn test_store_over_mapped_engine_reaches_ready() {
    let dir = models_dir_with(&[("tiny.gguf", &gguf_bytes(20_000)[..])]);
    let factory = MmapEngineFactory::new(dir.path()).with_chunk_size(8192);
    let store = LifecycleStore::create("tiny", factory);
    let mut states = store.stream();

    store.start().await;

    let mut seen = Vec::new();
    while let Some(state) = states.try_recv() {
        seen.push(state.status());
    }

    assert_eq!(seen.first(), Some(&"pending"));
    assert_eq!(seen.last(), Some(&"ready"));
    assert!(seen[1..seen.len() - 1].iter().all(|s| *s == "loading"));
    match store.state() {
        LifecycleState::Ready { handle } => assert_eq!(handle.len(), 20_000),
        other => panic!("expected ready, got {}", other.status()),
    }
}

#[tokio::test]
async fn test_store_over_missing_model_reaches_error() {
    let dir = models_dir_with(&[]);
    let store = LifecycleStore::create("../escape", MmapEngineFactory::new(dir.path()));

    store.start().await;

    assert_eq!(
        store.state().map_handle(|_| ()),
        LifecycleState::Error {
            error: "invalid model id `../escape`".to_string()
        }
    );
}
