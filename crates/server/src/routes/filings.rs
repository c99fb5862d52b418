use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use chrono::Utc;
use serde::{Deserialize, Serialize};

use taxcase_core::checklist::Checklist;
use taxcase_core::domain::filing::{
    Filing, FilingId, FilingStatus, FinancialUpdate, ServiceType,
};
use taxcase_core::domain::user::UserId;
use taxcase_core::errors::CoreError;
use taxcase_db::repositories::{FilingFilter, FilingStats};
use taxcase_engine::{compute_progress, FilingProgress};

use crate::error::ApiError;
use crate::routes::{context, staff_context};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub(crate) struct CreateFilingRequest {
    assessment_year: String,
    service_type: String,
}

#[derive(Debug, Serialize)]
pub(crate) struct FilingDetail {
    #[serde(flatten)]
    filing: Filing,
    progress: FilingProgress,
}

pub(crate) async fn create(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<CreateFilingRequest>,
) -> Result<(StatusCode, Json<Filing>), ApiError> {
    let ctx = context(&headers)?;
    let service_type = ServiceType::parse(&body.service_type).ok_or_else(|| {
        CoreError::bad_request(format!("unknown service type `{}`", body.service_type))
    })?;

    let filing =
        state.lifecycle.initiate(ctx.user_id, &body.assessment_year, service_type).await?;
    Ok((StatusCode::CREATED, Json(filing)))
}

pub(crate) async fn list_mine(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Vec<Filing>>, ApiError> {
    let ctx = context(&headers)?;
    Ok(Json(state.lifecycle.list_for_owner(&ctx.user_id).await?))
}

pub(crate) async fn get_one(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<FilingDetail>, ApiError> {
    let ctx = context(&headers)?;
    let filing_id = FilingId(id);
    let filing = if ctx.is_staff() {
        state.lifecycle.get(&filing_id).await?
    } else {
        state.lifecycle.get_owned(&filing_id, &ctx.user_id).await?
    };

    let progress = compute_progress(&filing, Utc::now());
    Ok(Json(FilingDetail { filing, progress }))
}

pub(crate) async fn checklist(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<Checklist>, ApiError> {
    let ctx = context(&headers)?;
    let filing_id = FilingId(id);
    let owner = if ctx.is_staff() { None } else { Some(&ctx.user_id) };
    Ok(Json(state.checklist.compute_checklist(&filing_id, owner).await?))
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct StaffFilingQuery {
    status: Option<String>,
    assessment_year: Option<String>,
    service_type: Option<String>,
    advisor_id: Option<String>,
}

impl StaffFilingQuery {
    fn into_filter(self) -> Result<FilingFilter, CoreError> {
        let status = self
            .status
            .map(|raw| {
                FilingStatus::parse(&raw)
                    .ok_or_else(|| CoreError::bad_request(format!("unknown status `{raw}`")))
            })
            .transpose()?;
        let service_type = self
            .service_type
            .map(|raw| {
                ServiceType::parse(&raw)
                    .ok_or_else(|| CoreError::bad_request(format!("unknown service type `{raw}`")))
            })
            .transpose()?;

        Ok(FilingFilter {
            status,
            assessment_year: self.assessment_year,
            service_type,
            advisor_user_id: self.advisor_id.map(UserId),
        })
    }
}

pub(crate) async fn list_all(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<StaffFilingQuery>,
) -> Result<Json<Vec<Filing>>, ApiError> {
    staff_context(&headers)?;
    let filter = query.into_filter()?;
    Ok(Json(state.lifecycle.list_filtered(&filter).await?))
}

pub(crate) async fn stats(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<FilingStats>, ApiError> {
    staff_context(&headers)?;
    Ok(Json(state.lifecycle.stats().await?))
}

#[derive(Debug, Deserialize)]
pub(crate) struct UpdateStatusRequest {
    status: String,
    note: Option<String>,
}

pub(crate) async fn update_status(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(body): Json<UpdateStatusRequest>,
) -> Result<Json<Filing>, ApiError> {
    let ctx = staff_context(&headers)?;
    let to = FilingStatus::parse(&body.status)
        .ok_or_else(|| CoreError::bad_request(format!("unknown status `{}`", body.status)))?;

    let filing =
        state.lifecycle.transition(&FilingId(id), to, body.note, &ctx.user_id).await?;
    Ok(Json(filing))
}

#[derive(Debug, Deserialize)]
pub(crate) struct AssignAdvisorRequest {
    advisor_id: String,
}

pub(crate) async fn assign_advisor(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(body): Json<AssignAdvisorRequest>,
) -> Result<Json<Filing>, ApiError> {
    let ctx = staff_context(&headers)?;
    let filing = state
        .lifecycle
        .assign_advisor(&FilingId(id), UserId(body.advisor_id), &ctx.user_id)
        .await?;
    Ok(Json(filing))
}

pub(crate) async fn update_financials(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(body): Json<FinancialUpdate>,
) -> Result<Json<Filing>, ApiError> {
    let ctx = staff_context(&headers)?;
    let filing = state.lifecycle.update_financials(&FilingId(id), body, &ctx.user_id).await?;
    Ok(Json(filing))
}
