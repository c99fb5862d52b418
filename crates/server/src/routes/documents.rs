use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::Json;
use serde::Deserialize;
use serde_json::json;

use taxcase_core::domain::document::{
    Document, DocumentCategory, DocumentId, DocumentStatus, ReviewOutcome, UploadPolicy,
};
use taxcase_core::domain::filing::FilingId;
use taxcase_core::domain::user::UserId;
use taxcase_core::errors::CoreError;
use taxcase_db::repositories::{DocumentChainSummary, DocumentFilter};
use taxcase_engine::UploadRequest;

use crate::error::ApiError;
use crate::routes::{context, staff_context};
use crate::state::AppState;

fn mime_type(headers: &HeaderMap) -> String {
    headers
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .unwrap_or("application/octet-stream")
        .to_string()
}

fn parse_category(raw: &str) -> Result<DocumentCategory, CoreError> {
    DocumentCategory::parse(raw)
        .ok_or_else(|| CoreError::bad_request(format!("unknown document category `{raw}`")))
}

/// First line of defence for oversized bodies; the core re-validates
/// against the same policy.
fn guard_size(bytes: &Bytes) -> Result<(), CoreError> {
    let policy = UploadPolicy::default();
    if bytes.len() as u64 > policy.max_file_bytes {
        return Err(CoreError::bad_request(format!(
            "file exceeds the {} byte upload limit",
            policy.max_file_bytes
        )));
    }
    Ok(())
}

#[derive(Debug, Deserialize)]
pub(crate) struct UploadQuery {
    category: String,
    file_name: String,
    filing_id: Option<String>,
}

pub(crate) async fn upload(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<UploadQuery>,
    body: Bytes,
) -> Result<(StatusCode, Json<Document>), ApiError> {
    let ctx = context(&headers)?;
    let category = parse_category(&query.category)?;
    guard_size(&body)?;

    let document = state
        .documents
        .upload(
            &ctx.user_id,
            category,
            query.filing_id.map(FilingId),
            UploadRequest {
                file_name: query.file_name,
                mime_type: mime_type(&headers),
                bytes: body.to_vec(),
            },
        )
        .await?;
    Ok((StatusCode::CREATED, Json(document)))
}

pub(crate) async fn reupload(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    body: Bytes,
) -> Result<(StatusCode, Json<Document>), ApiError> {
    let ctx = context(&headers)?;
    guard_size(&body)?;

    let document = state
        .documents
        .reupload(&ctx.user_id, &DocumentId(id), &mime_type(&headers), body.to_vec())
        .await?;
    Ok((StatusCode::CREATED, Json(document)))
}

pub(crate) async fn remove(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let ctx = context(&headers)?;
    state.documents.delete(&ctx.user_id, &DocumentId(id)).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub(crate) async fn download(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let ctx = context(&headers)?;
    let url = state
        .documents
        .download_reference(&ctx.user_id, ctx.is_staff(), &DocumentId(id))
        .await?;
    Ok(Json(json!({ "url": url })))
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct DocumentQuery {
    category: Option<String>,
    status: Option<String>,
    filing_id: Option<String>,
}

impl DocumentQuery {
    fn into_filter(self) -> Result<DocumentFilter, CoreError> {
        let category = self.category.as_deref().map(parse_category).transpose()?;
        let status = self
            .status
            .map(|raw| {
                DocumentStatus::parse(&raw)
                    .ok_or_else(|| CoreError::bad_request(format!("unknown status `{raw}`")))
            })
            .transpose()?;

        Ok(DocumentFilter { category, status, filing_id: self.filing_id.map(FilingId) })
    }
}

pub(crate) async fn list_mine(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<DocumentQuery>,
) -> Result<Json<Vec<DocumentChainSummary>>, ApiError> {
    let ctx = context(&headers)?;
    let filter = query.into_filter()?;
    Ok(Json(state.documents.list_roots(&ctx.user_id, &filter).await?))
}

pub(crate) async fn list_all(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<DocumentQuery>,
) -> Result<Json<Vec<Document>>, ApiError> {
    staff_context(&headers)?;
    let filter = query.into_filter()?;
    Ok(Json(state.documents.list_all(&filter).await?))
}

#[derive(Debug, Deserialize)]
pub(crate) struct ReviewRequest {
    status: String,
    rejection_note: Option<String>,
}

fn parse_outcome(raw: &str) -> Result<ReviewOutcome, CoreError> {
    match DocumentStatus::parse(raw) {
        Some(DocumentStatus::Accepted) => Ok(ReviewOutcome::Accepted),
        Some(DocumentStatus::Rejected) => Ok(ReviewOutcome::Rejected),
        Some(DocumentStatus::NeedsReupload) => Ok(ReviewOutcome::NeedsReupload),
        _ => Err(CoreError::bad_request(format!(
            "review status must be accepted, rejected or needs_reupload (got `{raw}`)"
        ))),
    }
}

pub(crate) async fn review(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(body): Json<ReviewRequest>,
) -> Result<Json<Document>, ApiError> {
    let ctx = staff_context(&headers)?;
    let outcome = parse_outcome(&body.status)?;

    let document = state
        .pipeline
        .review(&DocumentId(id), outcome, body.rejection_note, &ctx.user_id)
        .await?;
    Ok(Json(document))
}

#[derive(Debug, Deserialize)]
pub(crate) struct DocumentRequestBody {
    user_id: String,
    category: String,
    filing_id: Option<String>,
    note: String,
}

pub(crate) async fn request_additional(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<DocumentRequestBody>,
) -> Result<StatusCode, ApiError> {
    let ctx = staff_context(&headers)?;
    let category = parse_category(&body.category)?;

    state
        .pipeline
        .request_additional(
            UserId(body.user_id),
            category,
            body.filing_id.map(FilingId),
            body.note,
            &ctx.user_id,
        )
        .await?;
    Ok(StatusCode::ACCEPTED)
}
