//! Engine lifecycle endpoints

use crate::api::ExtractConsent;
use crate::api::engine::schemas::EngineStatusResponse;
use crate::core::traits::EngineLifecycle;
use async_stream::stream;
use axum::http::StatusCode;
use axum::response::Sse;
use axum::response::sse::{Event, KeepAlive};
use axum::routing::{get, post};
use axum::{Json, Router};
use di_axum::Inject;
use futures_util::Stream;
use log::error;
use std::convert::Infallible;

pub fn router() -> Router {
    Router::new()
        .route("/", get(engine_status))
        .route("/start", post(start_engine))
        .route("/events", get(engine_events))
}

async fn engine_status(
    Inject(engine): Inject<dyn EngineLifecycle>,
) -> (StatusCode, Json<EngineStatusResponse>) {
    (StatusCode::OK, Json(EngineStatusResponse::of(&*engine)))
}

async fn start_engine(
    Inject(engine): Inject<dyn EngineLifecycle>,
    _: ExtractConsent,
) -> (StatusCode, Json<EngineStatusResponse>) {
    engine.start();

    (StatusCode::ACCEPTED, Json(EngineStatusResponse::of(&*engine)))
}

/// Streams the current state and every change as `state` events, ending after `ready` or `error`.
async fn engine_events(
    Inject(engine): Inject<dyn EngineLifecycle>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let mut updates = engine.updates();

    let stream = stream! {
        while let Some(state) = updates.recv().await {
            let terminal = state.is_terminal();

            match Event::default().event("state").json_data(&state) {
                Ok(event) => yield Ok(event),
                Err(e) => {
                    error!("failed to encode engine state: {e}");
                    break;
                }
            }

            if terminal {
                break;
            }
        }
    };

    Sse::new(stream).keep_alive(KeepAlive::default())
}

pub mod schemas {
    use crate::core::traits::{EngineLifecycle, EngineStatus};
    use serde::Serialize;

    #[derive(Serialize, Debug)]
    pub struct EngineStatusResponse {
        pub model_id: String,
        pub state: EngineStatus,
    }

    impl EngineStatusResponse {
        pub fn of(engine: &dyn EngineLifecycle) -> Self {
            EngineStatusResponse {
                model_id: engine.model_id().to_owned(),
                state: engine.snapshot(),
            }
        }
    }
}
