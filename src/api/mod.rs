// src/api/mod.rs — HTTP API over the engine

pub mod auth;
pub mod handlers;
pub mod types;

use axum::http::HeaderValue;
use axum::routing::{get, post};
use axum::Router;
use std::sync::Arc;
use tower_http::cors::CorsLayer;

use crate::engine::Engine;
use crate::infra::config::{MiningConfig, ServerConfig};
use crate::source::HistorySource;

/// Shared state for API handlers.
#[derive(Clone)]
pub struct ApiState {
    pub engine: Arc<Engine>,
    pub mining: Arc<MiningConfig>,
    pub token: Option<String>,
    /// Used by `POST /train` when the request carries no records.
    pub source: Option<Arc<dyn HistorySource>>,
}

/// Build the axum router with all API routes.
pub fn build_router(state: ApiState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin([
            HeaderValue::from_static("http://localhost:8123"),
            HeaderValue::from_static("http://homeassistant.local:8123"),
            HeaderValue::from_static("http://127.0.0.1:8123"),
        ])
        .allow_methods(tower_http::cors::Any)
        .allow_headers(tower_http::cors::Any);

    Router::new()
        .route("/api/v1/health", get(handlers::health))
        .route("/api/v1/train", post(handlers::train))
        .route("/api/v1/predict", post(handlers::predict))
        .route("/api/v1/routines", get(handlers::routines))
        .route("/api/v1/sequences", get(handlers::sequences))
        .route("/api/v1/info", get(handlers::info))
        .route("/api/v1/config", get(handlers::config))
        .layer(cors)
        .with_state(state)
}

/// Serve the API until Ctrl+C.
pub async fn start_server(config: &ServerConfig, state: ApiState) -> anyhow::Result<()> {
    let addr = format!("{}:{}", config.host, config.port);
    let router = build_router(state);

    tracing::info!("API server listening on http://{addr}");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, router)
        .with_graceful_shutdown(async {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("Shutdown signal received");
            }
        })
        .await?;
    Ok(())
}
