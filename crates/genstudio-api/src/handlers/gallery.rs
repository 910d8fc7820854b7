use crate::error::{ApiQuery, HttpAppError};
use crate::handlers::history::HistoryQuery;
use crate::state::AppState;
use axum::{extract::State, response::IntoResponse, Json};
use genstudio_core::models::HistoryItem;
use std::sync::Arc;

#[utoipa::path(
    get,
    path = "/api/v1/gallery",
    tag = "history",
    params(HistoryQuery),
    responses(
        (status = 200, description = "Items users chose to publish", body = Vec<HistoryItem>)
    )
)]
#[tracing::instrument(skip(state, query), fields(content_type = ?query.content_type))]
pub async fn list_gallery(
    State(state): State<Arc<AppState>>,
    ApiQuery(query): ApiQuery<HistoryQuery>,
) -> Result<impl IntoResponse, HttpAppError> {
    let (limit, offset) = query.clamped();
    let items = state
        .db
        .history
        .list_public(query.content_type, limit, offset)
        .await?;
    Ok(Json(items))
}
