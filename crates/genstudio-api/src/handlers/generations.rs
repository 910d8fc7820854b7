use crate::auth::AuthUser;
use crate::error::{ApiQuery, ErrorResponse, HttpAppError, ValidatedJson};
use crate::locale::RequestLocale;
use crate::services::CancelOutcome;
use crate::state::AppState;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use genstudio_core::models::{
    CreateGenerationRequest, GenerationAccepted, GenerationJob, Pagination,
};
use genstudio_core::{AppError, Message};
use serde::Serialize;
use std::sync::Arc;
use utoipa::ToSchema;
use uuid::Uuid;

#[derive(Debug, Serialize, ToSchema)]
pub struct CancelGenerationResponse {
    pub job: GenerationJob,
    pub message: String,
}

async fn load_job(state: &AppState, user_id: Uuid, id: Uuid) -> Result<GenerationJob, AppError> {
    state
        .db
        .jobs
        .get_for_user(user_id, id)
        .await?
        .ok_or_else(|| AppError::NotFound("Generation not found".to_string()))
}

#[utoipa::path(
    post,
    path = "/api/v1/generations",
    tag = "generations",
    request_body = CreateGenerationRequest,
    responses(
        (status = 202, description = "Generation queued", body = GenerationAccepted),
        (status = 400, description = "Invalid request or vendor not configured", body = ErrorResponse),
        (status = 402, description = "Credits exhausted", body = ErrorResponse)
    ),
    security(("bearer" = []))
)]
#[tracing::instrument(skip(state, auth, locale, request), fields(user_id = %auth.id(), kind = %request.kind))]
pub async fn create_generation(
    State(state): State<Arc<AppState>>,
    locale: RequestLocale,
    auth: AuthUser,
    ValidatedJson(request): ValidatedJson<CreateGenerationRequest>,
) -> Result<impl IntoResponse, HttpAppError> {
    let job = state.generation.submit(auth.id(), request).await?;
    Ok((
        StatusCode::ACCEPTED,
        Json(GenerationAccepted {
            job,
            message: locale.text(Message::GenerationQueued),
        }),
    ))
}

#[utoipa::path(
    get,
    path = "/api/v1/generations",
    tag = "generations",
    params(Pagination),
    responses(
        (status = 200, description = "Own generations, newest first", body = Vec<GenerationJob>)
    ),
    security(("bearer" = []))
)]
#[tracing::instrument(skip(state, auth, pagination), fields(user_id = %auth.id()))]
pub async fn list_generations(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    ApiQuery(pagination): ApiQuery<Pagination>,
) -> Result<impl IntoResponse, HttpAppError> {
    let (limit, offset) = pagination.clamped();
    let jobs = state
        .db
        .jobs
        .list_for_user(auth.id(), limit, offset)
        .await?;
    Ok(Json(jobs))
}

#[utoipa::path(
    get,
    path = "/api/v1/generations/{id}",
    tag = "generations",
    params(("id" = Uuid, Path, description = "Generation ID")),
    responses(
        (status = 200, description = "Generation with its logs", body = GenerationJob),
        (status = 404, description = "Not found", body = ErrorResponse)
    ),
    security(("bearer" = []))
)]
#[tracing::instrument(skip(state, auth), fields(user_id = %auth.id(), job_id = %id))]
pub async fn get_generation(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, HttpAppError> {
    let mut job = load_job(&state, auth.id(), id).await?;
    if !job.status.is_terminal() {
        if let Some(logs) = state.generation.live_logs(id).await {
            job.logs = logs;
        }
    }
    Ok(Json(job))
}

#[utoipa::path(
    post,
    path = "/api/v1/generations/{id}/cancel",
    tag = "generations",
    params(("id" = Uuid, Path, description = "Generation ID")),
    responses(
        (status = 200, description = "Cancellation applied or requested", body = CancelGenerationResponse),
        (status = 404, description = "Not found", body = ErrorResponse),
        (status = 409, description = "Generation already finished", body = ErrorResponse)
    ),
    security(("bearer" = []))
)]
#[tracing::instrument(skip(state, auth, locale), fields(user_id = %auth.id(), job_id = %id))]
pub async fn cancel_generation(
    State(state): State<Arc<AppState>>,
    locale: RequestLocale,
    auth: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, HttpAppError> {
    let job = load_job(&state, auth.id(), id).await?;
    let outcome = state.generation.cancel(auth.id(), &job).await?;

    let job = match outcome {
        CancelOutcome::Cancelled => load_job(&state, auth.id(), id).await?,
        CancelOutcome::Signalled => {
            let mut job = job;
            if let Some(logs) = state.generation.live_logs(id).await {
                job.logs = logs;
            }
            job
        }
    };

    Ok(Json(CancelGenerationResponse {
        job,
        message: locale.text(Message::GenerationCancelled),
    }))
}
