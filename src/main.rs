//! Model engine lifecycle service
//!
//! (c) Softlandia 2025

use tokio_llm_lifecycle::api;
use tokio_llm_lifecycle::core::traits::EngineLifecycle;
use tokio_llm_lifecycle::infrastructure::config::EngineConfig;
use tokio_llm_lifecycle::infrastructure::engine::MmapEngineFactory;
use tokio_llm_lifecycle::{LifecycleState, LifecycleStore};

use anyhow::anyhow;
use axum::Router;
use axum::http::{HeaderValue, Method};
use di::{Ref, ServiceCollection, singleton};
use di_axum::RouterServiceProviderExtensions;
use log::info;
use tokio::runtime::{Builder, Runtime};
use tower_http::cors::{Any, CorsLayer};

fn main() -> anyhow::Result<()> {
    // initialize tracing
    tracing_subscriber::fmt::init();

    let config = EngineConfig::from_env()?;
    let runtime: Runtime = Builder::new_multi_thread().enable_all().build()?;

    runtime.block_on(web_server_task(config))
}

async fn web_server_task(config: EngineConfig) -> anyhow::Result<()> {
    let store = LifecycleStore::with_policy(
        config.model_id.clone(),
        MmapEngineFactory::new(&config.models_dir),
        config.progress_policy,
    );
    info!(
        "Serving model {} from {} (progress policy: {:?})",
        store.model_id(),
        config.models_dir.display(),
        store.policy()
    );

    let _transitions = store.subscribe(|state| match state {
        LifecycleState::Loading { progress, message } => {
            info!("[{:>5.1}%] {message}", progress * 100.0)
        }
        other => info!("Engine is {}", other.status()),
    });

    let registered = store.clone();
    let provider = ServiceCollection::new()
        .add(
            singleton::<dyn EngineLifecycle, LifecycleStore<MmapEngineFactory>>()
                .from(move |_| Ref::new(registered.clone())),
        )
        .build_provider()
        .map_err(|e| anyhow!("invalid service registrations: {e:?}"))?;

    let app = Router::new()
        .nest("/engine", api::engine::router())
        .layer(
            CorsLayer::new()
                .allow_headers(Any)
                .allow_methods([Method::GET, Method::POST])
                .allow_origin([
                    "http://localhost:3000".parse::<HeaderValue>()?,
                    "http://localhost:5173".parse::<HeaderValue>()?,
                ]),
        )
        .with_provider(provider);

    let listener = tokio::net::TcpListener::bind(config.listen_addr).await?;
    info!("listening on {}", listener.local_addr()?);
    axum::serve(listener, app).await?;
    info!("Shutting down...");

    Ok(())
}
