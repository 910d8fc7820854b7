use crate::auth::AuthUser;
use crate::error::{ErrorResponse, HttpAppError};
use crate::state::AppState;
use axum::{extract::State, response::IntoResponse, Json};
use genstudio_core::models::UsageSummary;
use genstudio_core::AppError;
use std::sync::Arc;
use uuid::Uuid;

/// Counters for `user_id`, creating the default ones first if missing.
pub(crate) async fn usage_summaries(
    state: &AppState,
    user_id: Uuid,
) -> Result<Vec<UsageSummary>, AppError> {
    state
        .db
        .usage
        .ensure_defaults(
            user_id,
            state.config.default_image_limit(),
            state.config.default_video_limit(),
        )
        .await?;
    let counters = state.db.usage.list_for_user(user_id).await?;
    Ok(counters.iter().map(|c| c.summary()).collect())
}

#[utoipa::path(
    get,
    path = "/api/v1/usage",
    tag = "usage",
    responses(
        (status = 200, description = "Credit counters per kind", body = Vec<UsageSummary>),
        (status = 401, description = "Not signed in", body = ErrorResponse)
    ),
    security(("bearer" = []))
)]
#[tracing::instrument(skip(state, auth), fields(user_id = %auth.id()))]
pub async fn get_usage(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
) -> Result<impl IntoResponse, HttpAppError> {
    Ok(Json(usage_summaries(&state, auth.id()).await?))
}
