//! DI "Interfaces"

use crate::core::error::EngineError;
use crate::core::observable::StateStream;
use crate::core::state::{InitProgressReport, LifecycleState};
use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;

/// Called by the engine factory as loading advances. May be called from any thread.
pub type ProgressCallback = Arc<dyn Fn(InitProgressReport) + Send + Sync>;

/// Lifecycle state with the engine handle rendered for display.
pub type EngineStatus = LifecycleState<EngineInfo>;

/// Serializable description of a ready engine.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EngineInfo {
    pub model_id: String,
    pub summary: String,
}

/// An initialized engine, opaque to the lifecycle store.
pub trait EngineHandle: Send + Sync + 'static {
    fn info(&self) -> EngineInfo;
}

/// The external engine: builds a ready-to-use engine for a model identifier.
#[async_trait]
pub trait EngineFactory: Send + Sync + 'static {
    type Engine: EngineHandle;

    /// Creates and loads the engine for `model_id`.
    ///
    /// `on_progress` may be invoked any number of times before this resolves.
    /// The model identifier is passed through unvalidated; rejecting it is up
    /// to the implementation.
    async fn create_engine(
        &self,
        model_id: &str,
        on_progress: ProgressCallback,
    ) -> Result<Self::Engine, EngineError>;
}

/// What the UI layer sees of a model engine's lifecycle.
pub trait EngineLifecycle: Send + Sync {
    fn model_id(&self) -> &str;

    /// Current state.
    fn snapshot(&self) -> EngineStatus;

    /// Starts loading in the background.
    ///
    /// Callers are responsible for having obtained the user's consent to the
    /// download. Does nothing unless the engine is still pending.
    fn start(&self);

    /// Current state followed by every change.
    fn updates(&self) -> StateStream<EngineStatus>;
}
