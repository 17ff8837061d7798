//! Model engine lifecycle store.
//!

use crate::core::observable::{Observable, StateStream, Subscription};
use crate::core::state::{
    CREATING_ENGINE_MESSAGE, InitProgressReport, LifecycleState, ProgressPolicy,
};
use crate::core::traits::{EngineFactory, ProgressCallback};
use log::{debug, error, info};
use std::future::Future;
use std::sync::Arc;
use tokio::time::Instant;

/// State as held by a store over factory `F`.
pub type StoreState<F> = LifecycleState<Arc<<F as EngineFactory>::Engine>>;

struct Shared<F: EngineFactory> {
    model_id: String,
    factory: F,
    policy: ProgressPolicy,
    state: Observable<StoreState<F>>,
}

/// Tracks the lifecycle of one model engine.
///
/// Starts out `Pending`. Nothing happens until [`LifecycleStore::start`] is
/// called, after which the factory's progress and outcome are relayed as
/// `Loading`, then `Ready` or `Error`. Clones share the same state.
pub struct LifecycleStore<F: EngineFactory> {
    shared: Arc<Shared<F>>,
}

impl<F: EngineFactory> Clone for LifecycleStore<F> {
    fn clone(&self) -> Self {
        Self {
            shared: self.shared.clone(),
        }
    }
}

impl<F: EngineFactory> LifecycleStore<F> {
    pub fn create(model_id: impl Into<String>, factory: F) -> Self {
        Self::with_policy(model_id, factory, ProgressPolicy::default())
    }

    pub fn with_policy(model_id: impl Into<String>, factory: F, policy: ProgressPolicy) -> Self {
        Self {
            shared: Arc::new(Shared {
                model_id: model_id.into(),
                factory,
                policy,
                state: Observable::new(LifecycleState::Pending),
            }),
        }
    }

    pub fn model_id(&self) -> &str {
        &self.shared.model_id
    }

    pub fn policy(&self) -> ProgressPolicy {
        self.shared.policy
    }

    pub fn state(&self) -> StoreState<F> {
        self.shared.state.get()
    }

    /// See [`Observable::subscribe`].
    pub fn subscribe(
        &self,
        observer: impl Fn(&StoreState<F>) + Send + Sync + 'static,
    ) -> Subscription {
        self.shared.state.subscribe(observer)
    }

    pub fn stream(&self) -> StateStream<StoreState<F>> {
        self.shared.state.stream()
    }

    /// Begins engine creation.
    ///
    /// `Loading` is emitted before this returns; the returned future drives
    /// the factory call to completion and never fails, as failures end up in
    /// the `Error` state. Calling this in any state but `Pending` or
    /// `Uninitialized` is a no-op and the future completes immediately.
    pub fn start(&self) -> impl Future<Output = ()> + Send + use<F> {
        let shared = self.shared.clone();
        let launched = shared
            .state
            .update(|state| {
                state
                    .can_start()
                    .then(|| LifecycleState::loading(0.0, CREATING_ENGINE_MESSAGE))
            });

        if launched {
            info!("Creating engine for model {}", shared.model_id);
        } else {
            debug!(
                "Ignoring start for model {}: engine is already {}",
                shared.model_id,
                shared.state.get().status()
            );
        }

        async move {
            if launched {
                shared.load().await;
            }
        }
    }
}

impl<F: EngineFactory> Shared<F> {
    async fn load(self: Arc<Self>) {
        let started = Instant::now();
        let on_progress = self.progress_callback();

        match self.factory.create_engine(&self.model_id, on_progress).await {
            Ok(engine) => {
                info!(
                    "Engine for model {} ready in {:.2} seconds.",
                    self.model_id,
                    started.elapsed().as_secs_f32()
                );
                self.finish(LifecycleState::Ready {
                    handle: Arc::new(engine),
                });
            }
            Err(e) => {
                error!("Engine initialization for model {} failed: {e:#}", self.model_id);
                self.finish(LifecycleState::Error {
                    error: e.user_message(),
                });
            }
        }
    }

    fn progress_callback(self: &Arc<Self>) -> ProgressCallback {
        let shared = Arc::downgrade(self);
        Arc::new(move |report: InitProgressReport| {
            if let Some(shared) = shared.upgrade() {
                shared.report_progress(report);
            }
        })
    }

    fn report_progress(&self, report: InitProgressReport) {
        let policy = self.policy;
        let applied = self.state.update(|state| match state {
            LifecycleState::Loading { progress, .. } => Some(LifecycleState::Loading {
                progress: policy.apply(*progress, report.progress),
                message: report.text.clone(),
            }),
            _ => None,
        });

        if !applied {
            debug!(
                "Dropping progress report for model {} outside of loading: {:?}",
                self.model_id, report
            );
        }
    }

    fn finish(&self, outcome: StoreState<F>) {
        let applied = self
            .state
            .update(|state| state.is_loading().then(|| outcome));
        if !applied {
            debug!("Engine for model {} settled outside of loading", self.model_id);
        }
    }
}
