//! Router assembly and server bring-up, grounded on
//! `knhk-sidecar/src/rest_api.rs` (`axum::serve` + `TcpListener`, `info!`
//! endpoint listing at startup).

use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::config::AppConfig;
use crate::error::MonumentResult;
use crate::store::NamespaceRegistry;

use super::handlers;

#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<NamespaceRegistry>,
}

pub fn build_router(registry: Arc<NamespaceRegistry>) -> Router {
    let state = AppState { registry };

    Router::new()
        .route("/", get(handlers::health))
        .route(
            "/sim/{namespace}/agent/{agent_id}/context",
            get(handlers::get_context),
        )
        .route(
            "/sim/{namespace}/agent/{agent_id}/action",
            post(handlers::post_action),
        )
        .fallback(handlers::not_found)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Bind and serve until the process is terminated.
pub async fn run(config: &AppConfig) -> MonumentResult<()> {
    let registry = Arc::new(NamespaceRegistry::new(&config.store.data_dir));
    let router = build_router(registry);

    let listener = tokio::net::TcpListener::bind(&config.service.bind_address)
        .await
        .map_err(|e| crate::error::MonumentError::StoreFailure(e.to_string()))?;

    info!(
        address = %config.service.bind_address,
        "monument listening: GET /, GET /sim/{{namespace}}/agent/{{agent_id}}/context, POST /sim/{{namespace}}/agent/{{agent_id}}/action"
    );

    axum::serve(listener, router)
        .await
        .map_err(|e| crate::error::MonumentError::StoreFailure(e.to_string()))?;

    Ok(())
}
