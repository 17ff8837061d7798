//! Shared test doubles for the lifecycle tests.

#![allow(dead_code)]

use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use tokio::sync::{mpsc, oneshot};
use tokio_llm_lifecycle::InitProgressReport;
use tokio_llm_lifecycle::core::error::EngineError;
use tokio_llm_lifecycle::core::traits::{
    EngineFactory, EngineHandle, EngineInfo, ProgressCallback,
};

#[derive(Debug, Clone, PartialEq)]
pub struct TestEngine {
    pub id: String,
}

impl TestEngine {
    pub fn new(id: &str) -> Self {
        Self { id: id.to_string() }
    }
}

impl EngineHandle for TestEngine {
    fn info(&self) -> EngineInfo {
        EngineInfo {
            model_id: "test-model".to_string(),
            summary: self.id.clone(),
        }
    }
}

/// One in-flight `create_engine` call, driven by the test.
pub struct PendingCall {
    pub model_id: String,
    on_progress: ProgressCallback,
    outcome: oneshot::Sender<Result<TestEngine, EngineError>>,
}

impl PendingCall {
    pub fn progress(&self, progress: f64, text: &str) {
        (self.on_progress)(InitProgressReport::new(progress, text));
    }

    pub fn progress_callback(&self) -> ProgressCallback {
        self.on_progress.clone()
    }

    pub fn resolve(self, engine: TestEngine) {
        let _ = self.outcome.send(Ok(engine));
    }

    pub fn reject(self, error: EngineError) {
        let _ = self.outcome.send(Err(error));
    }
}

/// Engine factory whose calls are handed to the test to settle.
pub struct ScriptedFactory {
    calls: mpsc::UnboundedSender<PendingCall>,
}

impl ScriptedFactory {
    pub fn new() -> (ScriptedFactory, mpsc::UnboundedReceiver<PendingCall>) {
        let (calls, receiver) = mpsc::unbounded_channel();
        (ScriptedFactory { calls }, receiver)
    }
}

#[async_trait]
impl EngineFactory for ScriptedFactory {
    type Engine = TestEngine;

    async fn create_engine(
        &self,
        model_id: &str,
        on_progress: ProgressCallback,
    ) -> Result<TestEngine, EngineError> {
        let (outcome, result) = oneshot::channel();
        self.calls
            .send(PendingCall {
                model_id: model_id.to_string(),
                on_progress,
                outcome,
            })
            .map_err(|_| EngineError::msg("test harness went away"))?;

        // A dropped call is a rejection without a reason.
        result.await.unwrap_or(Err(EngineError::Unexplained))
    }
}

/// Collects every state an observer is handed.
pub fn recorder<T: Clone + Send + 'static>()
-> (Arc<Mutex<Vec<T>>>, impl Fn(&T) + Send + Sync + 'static) {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    (seen, move |state: &T| sink.lock().unwrap().push(state.clone()))
}
