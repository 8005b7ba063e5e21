//! Endpoint handlers, grounded on
//! `knhk-workflow-engine/src/api/rest/handlers.rs`'s
//! `State`/`Path`/`Query` extractor shape.

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use tracing::info;

use crate::admission::{self, SubmissionRequest};
use crate::context;
use crate::error::MonumentError;
use crate::store::validate_namespace;

use super::models::{ActionRequest, ActionResponse, ApiError, ContextQuery, ContextResponse, HealthResponse};
use super::server::AppState;

pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        service: "monument",
    })
}

const SECRET_HEADER: &str = "x-agent-secret";

fn secret_from_headers(headers: &HeaderMap) -> Result<String, ApiError> {
    headers
        .get(SECRET_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .ok_or_else(|| MonumentError::AuthFailed.into())
}

pub async fn get_context(
    State(state): State<AppState>,
    Path((namespace, agent_id)): Path<(String, String)>,
    Query(query): Query<ContextQuery>,
    headers: HeaderMap,
) -> Result<Json<ContextResponse>, ApiError> {
    validate_namespace(&namespace)?;
    let secret = secret_from_headers(&headers)?;

    let handle = state.registry.get_or_open(&namespace)?;
    let store = handle.store.read().await;

    let actor = store
        .actor(&agent_id)?
        .filter(|a| a.is_live())
        .ok_or(MonumentError::AuthFailed)?;
    if !admission::constant_time_eq(actor.secret.as_bytes(), secret.as_bytes()) {
        return Err(MonumentError::AuthFailed.into());
    }

    let history_length = query.history_length.unwrap_or(10).clamp(1, 20);
    let chat_length = query.chat_length.unwrap_or(history_length).clamp(1, 50);

    let snapshot = context::build_context(&store, &namespace, &agent_id, history_length, chat_length)?;

    Ok(Json(ContextResponse {
        namespace: snapshot.namespace,
        supertick_id: snapshot.supertick_id,
        context_hash: snapshot.context_hash,
        phase: snapshot.phase.to_string(),
        hud: snapshot.hud_text,
    }))
}

pub async fn post_action(
    State(state): State<AppState>,
    Path((namespace, agent_id)): Path<(String, String)>,
    headers: HeaderMap,
    Json(body): Json<ActionRequest>,
) -> Result<Json<ActionResponse>, ApiError> {
    validate_namespace(&namespace)?;
    let secret = secret_from_headers(&headers)?;

    let handle = state.registry.get_or_open(&namespace)?;

    let req = SubmissionRequest {
        namespace: namespace.clone(),
        actor_id: agent_id,
        provided_secret: secret,
        body_namespace: body.namespace,
        supertick_id: body.supertick_id,
        context_hash: body.context_hash,
        action: body.action,
        llm_input: body.llm_input,
        llm_output: body.llm_output,
    };

    let outcome = admission::admit(&handle, &namespace, &req).await?;
    if let Some((from, to)) = outcome.tick_advanced {
        info!(namespace = %namespace, from, to, "tick advanced via inline merge");
    }

    Ok(Json(ActionResponse {
        success: true,
        message: outcome.message,
    }))
}

pub async fn not_found() -> (StatusCode, &'static str) {
    (StatusCode::NOT_FOUND, "not found")
}
