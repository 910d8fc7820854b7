//! Admin user management. Mounted behind `require_admin`.

use crate::auth::password::hash_password_blocking;
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
use genstudio_core::models::{
    AdminUserView, CreateUserRequest, UpdateCreditsRequest, UpdateUserRequest, UsageKind, User,
};
use genstudio_core::AppError;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
pub struct UserListQuery {
    /// Matches email or name.
    pub search: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct AdminUserList {
    pub users: Vec<AdminUserView>,
    /// All accounts, ignoring `search`.
    pub total: i64,
}

async fn admin_view(state: &AppState, user: User) -> Result<AdminUserView, AppError> {
    let usage = state
        .db
        .usage
        .list_for_user(user.id)
        .await?
        .iter()
        .map(|c| c.summary())
        .collect();
    Ok(AdminUserView {
        user: user.into(),
        usage,
    })
}

#[utoipa::path(
    get,
    path = "/api/v1/admin/users",
    tag = "admin",
    params(UserListQuery),
    responses(
        (status = 200, description = "Users with their credit counters", body = AdminUserList),
        (status = 403, description = "Not an admin")
    ),
    security(("bearer" = []))
)]
#[tracing::instrument(skip(state, admin, query), fields(admin_id = %admin.id()))]
pub async fn list_users(
    State(state): State<Arc<AppState>>,
    admin: AuthUser,
    ApiQuery(query): ApiQuery<UserListQuery>,
) -> Result<impl IntoResponse, HttpAppError> {
    let limit = query.limit.unwrap_or(DEFAULT_PAGE_LIMIT).clamp(1, MAX_PAGE_LIMIT);
    let offset = query.offset.unwrap_or(0).max(0);

    let users = state
        .db
        .users
        .list_users(query.search.as_deref(), limit, offset)
        .await?;
    let total = state.db.users.count_users().await?;

    let mut views = Vec::with_capacity(users.len());
    for user in users {
        views.push(admin_view(&state, user).await?);
    }
    Ok(Json(AdminUserList {
        users: views,
        total,
    }))
}

#[utoipa::path(
    post,
    path = "/api/v1/admin/users",
    tag = "admin",
    request_body = CreateUserRequest,
    responses(
        (status = 201, description = "User created", body = AdminUserView),
        (status = 409, description = "Email already registered", body = ErrorResponse)
    ),
    security(("bearer" = []))
)]
#[tracing::instrument(skip(state, admin, request), fields(admin_id = %admin.id(), is_admin = request.is_admin))]
pub async fn create_user(
    State(state): State<Arc<AppState>>,
    admin: AuthUser,
    ValidatedJson(request): ValidatedJson<CreateUserRequest>,
) -> Result<impl IntoResponse, HttpAppError> {
    let password_hash = hash_password_blocking(request.password).await?;
    let user = state
        .db
        .users
        .create_user(
            &request.email,
            request.name.as_deref(),
            &password_hash,
            request.is_admin,
        )
        .await?;
    state
        .db
        .usage
        .ensure_defaults(
            user.id,
            state.config.default_image_limit(),
            state.config.default_video_limit(),
        )
        .await?;

    tracing::info!(user_id = %user.id, "User created by admin");
    Ok((StatusCode::CREATED, Json(admin_view(&state, user).await?)))
}

#[utoipa::path(
    patch,
    path = "/api/v1/admin/users/{id}",
    tag = "admin",
    params(("id" = Uuid, Path, description = "User ID")),
    request_body = UpdateUserRequest,
    responses(
        (status = 200, description = "User updated", body = AdminUserView),
        (status = 400, description = "Admins cannot demote or deactivate themselves", body = ErrorResponse),
        (status = 404, description = "Not found", body = ErrorResponse)
    ),
    security(("bearer" = []))
)]
#[tracing::instrument(skip(state, admin, request), fields(admin_id = %admin.id(), user_id = %id))]
pub async fn update_user(
    State(state): State<Arc<AppState>>,
    admin: AuthUser,
    Path(id): Path<Uuid>,
    ValidatedJson(request): ValidatedJson<UpdateUserRequest>,
) -> Result<impl IntoResponse, HttpAppError> {
    if id == admin.id() && (request.is_admin == Some(false) || request.is_active == Some(false)) {
        return Err(AppError::InvalidInput(
            "You cannot remove your own admin access or deactivate your own account".to_string(),
        )
        .into());
    }

    let user = state
        .db
        .users
        .update_user(
            id,
            request.name.as_deref(),
            request.is_admin,
            request.is_active,
        )
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".to_string()))?;

    if request.is_active == Some(false) {
        let revoked = state.db.sessions.revoke_all_for_user(id).await?;
        tracing::info!(user_id = %id, revoked, "Deactivated user signed out everywhere");
    }

    Ok(Json(admin_view(&state, user).await?))
}

#[utoipa::path(
    put,
    path = "/api/v1/admin/users/{id}/credits",
    tag = "admin",
    params(("id" = Uuid, Path, description = "User ID")),
    request_body = UpdateCreditsRequest,
    responses(
        (status = 200, description = "Limits updated", body = AdminUserView),
        (status = 400, description = "No limit given or negative limit", body = ErrorResponse),
        (status = 404, description = "Not found", body = ErrorResponse)
    ),
    security(("bearer" = []))
)]
#[tracing::instrument(skip(state, admin, request), fields(admin_id = %admin.id(), user_id = %id))]
pub async fn update_credits(
    State(state): State<Arc<AppState>>,
    admin: AuthUser,
    Path(id): Path<Uuid>,
    ValidatedJson(request): ValidatedJson<UpdateCreditsRequest>,
) -> Result<impl IntoResponse, HttpAppError> {
    if request.image_limit.is_none() && request.video_limit.is_none() {
        return Err(AppError::InvalidInput(
            "Provide image_limit and/or video_limit".to_string(),
        )
        .into());
    }

    let user = state
        .db
        .users
        .get_by_id(id)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".to_string()))?;

    let limits = [
        (UsageKind::Image, request.image_limit),
        (UsageKind::Video, request.video_limit),
    ];
    for (kind, limit) in limits {
        if let Some(limit) = limit {
            state.db.usage.set_limit(id, kind, limit).await?;
        }
    }

    Ok(Json(admin_view(&state, user).await?))
}
