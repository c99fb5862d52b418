pub mod documents;
pub mod filings;

use axum::extract::DefaultBodyLimit;
use axum::http::HeaderMap;
use axum::routing::{delete, get, patch, post};
use axum::{Json, Router};
use serde_json::json;
use tower_http::trace::TraceLayer;

use taxcase_core::domain::user::{UserId, UserRole};
use taxcase_core::errors::CoreError;

use crate::error::ApiError;
use crate::state::AppState;

/// Body cap for raw uploads, slightly above the document policy limit so
/// the core can report the policy violation itself.
const UPLOAD_BODY_LIMIT: usize = 11 * 1024 * 1024;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/filings", post(filings::create).get(filings::list_mine))
        .route("/api/filings/{id}", get(filings::get_one))
        .route("/api/filings/{id}/checklist", get(filings::checklist))
        .route("/api/staff/filings", get(filings::list_all))
        .route("/api/staff/filings/stats", get(filings::stats))
        .route("/api/staff/filings/{id}/status", patch(filings::update_status))
        .route("/api/staff/filings/{id}/advisor", patch(filings::assign_advisor))
        .route("/api/staff/filings/{id}/financials", patch(filings::update_financials))
        .route("/api/documents", post(documents::upload).get(documents::list_mine))
        .route("/api/documents/{id}", delete(documents::remove))
        .route("/api/documents/{id}/reupload", post(documents::reupload))
        .route("/api/documents/{id}/download", get(documents::download))
        .route("/api/staff/documents", get(documents::list_all))
        .route("/api/staff/documents/{id}/review", post(documents::review))
        .route("/api/staff/document-requests", post(documents::request_additional))
        .layer(DefaultBodyLimit::max(UPLOAD_BODY_LIMIT))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

/// Caller identity as asserted by the authenticating proxy in front of
/// this service. The core re-validates ownership regardless.
pub(crate) struct RequestContext {
    pub user_id: UserId,
    pub role: UserRole,
}

impl RequestContext {
    pub fn is_staff(&self) -> bool {
        self.role.is_staff()
    }
}

pub(crate) fn context(headers: &HeaderMap) -> Result<RequestContext, ApiError> {
    let user_id = headers
        .get("x-user-id")
        .and_then(|value| value.to_str().ok())
        .filter(|value| !value.trim().is_empty())
        .ok_or_else(|| ApiError::Unauthorized("missing x-user-id header".to_string()))?;
    let role = headers
        .get("x-user-role")
        .and_then(|value| value.to_str().ok())
        .and_then(UserRole::parse)
        .ok_or_else(|| {
            ApiError::Unauthorized("missing or unknown x-user-role header".to_string())
        })?;

    Ok(RequestContext { user_id: UserId(user_id.to_string()), role })
}

pub(crate) fn staff_context(headers: &HeaderMap) -> Result<RequestContext, ApiError> {
    let ctx = context(headers)?;
    if !ctx.is_staff() {
        return Err(ApiError::Core(CoreError::forbidden("staff role required")));
    }
    Ok(ctx)
}
