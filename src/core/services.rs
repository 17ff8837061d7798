//! Implementations for the service the app needs.
//!

use crate::core::observable::StateStream;
use crate::core::store::LifecycleStore;
use crate::core::traits::{EngineFactory, EngineHandle, EngineLifecycle, EngineStatus};
use tokio::sync::mpsc;

impl<F: EngineFactory> EngineLifecycle for LifecycleStore<F> {
    fn model_id(&self) -> &str {
        LifecycleStore::model_id(self)
    }

    fn snapshot(&self) -> EngineStatus {
        self.state().map_handle(|engine| engine.info())
    }

    fn start(&self) {
        tokio::spawn(LifecycleStore::start(self));
    }

    fn updates(&self) -> StateStream<EngineStatus> {
        let (sender, receiver) = mpsc::unbounded_channel();
        let subscription = self.subscribe(move |state| {
            let _ = sender.send(state.map_handle(|engine| engine.info()));
        });
        StateStream::new(receiver, subscription)
    }
}
