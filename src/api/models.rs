//! Wire models and the `MonumentError -> HTTP` adapter, grounded on
//! `knhk-workflow-engine/src/api/models/errors.rs`.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::error::MonumentError;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: &'static str,
}

#[derive(Debug, Deserialize)]
pub struct ContextQuery {
    pub history_length: Option<u32>,
    pub chat_length: Option<u32>,
}

#[derive(Debug, Serialize)]
pub struct ContextResponse {
    pub namespace: String,
    pub supertick_id: u64,
    pub context_hash: String,
    pub phase: String,
    pub hud: String,
}

#[derive(Debug, Deserialize)]
pub struct ActionRequest {
    pub namespace: String,
    pub supertick_id: u64,
    pub context_hash: String,
    pub action: String,
    pub llm_input: Option<String>,
    pub llm_output: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ActionResponse {
    pub success: bool,
    pub message: String,
}

/// Wire-visible error envelope. `{detail}` on every non-2xx response, per
/// the error-handling design's "native to the HTTP framework" clause.
#[derive(Debug, Serialize)]
pub struct ApiError {
    pub detail: String,
    #[serde(skip)]
    pub status: StatusCode,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status;
        (status, Json(self)).into_response()
    }
}

impl From<MonumentError> for ApiError {
    fn from(err: MonumentError) -> Self {
        let status = match &err {
            MonumentError::NamespaceInvalid { .. } => StatusCode::BAD_REQUEST,
            MonumentError::NamespaceMismatch { .. } => StatusCode::BAD_REQUEST,
            MonumentError::AuthFailed => StatusCode::UNAUTHORIZED,
            MonumentError::ActorNotFound { .. } => StatusCode::NOT_FOUND,
            MonumentError::ScopeDenied { .. } => StatusCode::FORBIDDEN,
            MonumentError::SnapshotStale { .. } => StatusCode::BAD_REQUEST,
            MonumentError::PhaseClosed => StatusCode::BAD_REQUEST,
            MonumentError::AlreadySubmitted => StatusCode::BAD_REQUEST,
            MonumentError::ParseError { .. } => StatusCode::BAD_REQUEST,
            MonumentError::StoreFailure(_) => StatusCode::INTERNAL_SERVER_ERROR,
            MonumentError::NamespaceNotFound(_) => StatusCode::NOT_FOUND,
            MonumentError::NamespaceExists(_) => StatusCode::BAD_REQUEST,
            MonumentError::SchemaVersionMismatch { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        };
        ApiError {
            detail: err.to_string(),
            status,
        }
    }
}
