use crate::auth::AuthUser;
use crate::error::{ApiQuery, ErrorResponse, HttpAppError, ValidatedJson};
use crate::state::AppState;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use genstudio_core::constants::{DEFAULT_PAGE_LIMIT, MAX_PAGE_LIMIT};
use genstudio_core::models::{ContentType, HistoryItem, UpdateHistoryRequest};
use genstudio_core::AppError;
use serde::Deserialize;
use std::sync::Arc;
use utoipa::IntoParams;
use uuid::Uuid;

/// `?content_type=&limit=&offset=` for history and gallery listings.
#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
pub struct HistoryQuery {
    pub content_type: Option<ContentType>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

impl HistoryQuery {
    pub fn clamped(&self) -> (i64, i64) {
        (
            self.limit.unwrap_or(DEFAULT_PAGE_LIMIT).clamp(1, MAX_PAGE_LIMIT),
            self.offset.unwrap_or(0).max(0),
        )
    }
}

fn not_found() -> AppError {
    AppError::NotFound("History item not found".to_string())
}

#[utoipa::path(
    get,
    path = "/api/v1/history",
    tag = "history",
    params(HistoryQuery),
    responses(
        (status = 200, description = "Own generated content, newest first", body = Vec<HistoryItem>)
    ),
    security(("bearer" = []))
)]
#[tracing::instrument(skip(state, auth, query), fields(user_id = %auth.id(), content_type = ?query.content_type))]
pub async fn list_history(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    ApiQuery(query): ApiQuery<HistoryQuery>,
) -> Result<impl IntoResponse, HttpAppError> {
    let (limit, offset) = query.clamped();
    let items = state
        .db
        .history
        .list_for_user(auth.id(), query.content_type, limit, offset)
        .await?;
    Ok(Json(items))
}

#[utoipa::path(
    get,
    path = "/api/v1/history/{id}",
    tag = "history",
    params(("id" = Uuid, Path, description = "History item ID")),
    responses(
        (status = 200, description = "History item", body = HistoryItem),
        (status = 404, description = "Not found", body = ErrorResponse)
    ),
    security(("bearer" = []))
)]
#[tracing::instrument(skip(state, auth), fields(user_id = %auth.id(), history_id = %id))]
pub async fn get_history_item(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, HttpAppError> {
    let item = state
        .db
        .history
        .get_for_user(auth.id(), id)
        .await?
        .ok_or_else(not_found)?;
    Ok(Json(item))
}

#[utoipa::path(
    patch,
    path = "/api/v1/history/{id}",
    tag = "history",
    params(("id" = Uuid, Path, description = "History item ID")),
    request_body = UpdateHistoryRequest,
    responses(
        (status = 200, description = "Visibility updated", body = HistoryItem),
        (status = 404, description = "Not found", body = ErrorResponse)
    ),
    security(("bearer" = []))
)]
#[tracing::instrument(skip(state, auth, request), fields(user_id = %auth.id(), history_id = %id, is_public = request.is_public))]
pub async fn update_history_item(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
    ValidatedJson(request): ValidatedJson<UpdateHistoryRequest>,
) -> Result<impl IntoResponse, HttpAppError> {
    let item = state
        .db
        .history
        .set_visibility(auth.id(), id, request.is_public)
        .await?
        .ok_or_else(not_found)?;
    Ok(Json(item))
}

#[utoipa::path(
    delete,
    path = "/api/v1/history/{id}",
    tag = "history",
    params(("id" = Uuid, Path, description = "History item ID")),
    responses(
        (status = 204, description = "Deleted"),
        (status = 404, description = "Not found", body = ErrorResponse)
    ),
    security(("bearer" = []))
)]
#[tracing::instrument(skip(state, auth), fields(user_id = %auth.id(), history_id = %id))]
pub async fn delete_history_item(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, HttpAppError> {
    let item = state
        .db
        .history
        .delete(auth.id(), id)
        .await?
        .ok_or_else(not_found)?;

    // The row is gone either way; a leftover file is only logged.
    if let Some(key) = item.storage_key.as_deref() {
        if let Err(e) = state.media.storage.delete(key).await {
            tracing::warn!(error = %e, storage_key = %key, "Failed to delete stored artifact");
        }
    }

    Ok(StatusCode::NO_CONTENT)
}
