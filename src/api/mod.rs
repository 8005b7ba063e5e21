//! HTTP Boundary: axum router, request/response models, and the
//! error-to-status mapping, grounded on
//! `knhk-workflow-engine/src/api/rest/{mod.rs,server.rs,handlers.rs}` and
//! `knhk-sidecar/src/rest_api.rs`.

mod handlers;
mod models;
mod server;

pub use models::{ActionRequest, ActionResponse, ApiError, ContextQuery, ContextResponse, HealthResponse};
pub use server::{build_router, run};
