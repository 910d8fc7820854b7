use crate::auth::password::{hash_password_blocking, verify_password_blocking};
use crate::auth::AuthUser;
use crate::error::{ErrorResponse, HttpAppError, ValidatedJson};
use crate::handlers::usage::usage_summaries;
use crate::handlers::MessageResponse;
use crate::locale::RequestLocale;
use crate::state::AppState;
use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use genstudio_core::models::{AuthResponse, MeResponse, SignInRequest, SignUpRequest, User};
use genstudio_core::{AppError, Message};
use std::sync::Arc;

/// Start a session for `user` and sign its token.
async fn start_session(state: &AppState, user: User) -> Result<AuthResponse, AppError> {
    let issued = state.auth.jwt.issue(user.id)?;
    state
        .db
        .sessions
        .create_session(issued.session_id, user.id, issued.expires_at)
        .await?;

    tracing::info!(user_id = %user.id, session_id = %issued.session_id, "Session started");
    Ok(AuthResponse {
        token: issued.token,
        expires_at: issued.expires_at,
        user: user.into(),
    })
}

#[utoipa::path(
    post,
    path = "/api/v1/auth/sign-up",
    tag = "auth",
    request_body = SignUpRequest,
    responses(
        (status = 201, description = "Account created and signed in", body = AuthResponse),
        (status = 400, description = "Invalid email or password", body = ErrorResponse),
        (status = 409, description = "Email already registered", body = ErrorResponse)
    )
)]
#[tracing::instrument(skip(state, request), fields(operation = "sign_up"))]
pub async fn sign_up(
    State(state): State<Arc<AppState>>,
    ValidatedJson(request): ValidatedJson<SignUpRequest>,
) -> Result<impl IntoResponse, HttpAppError> {
    let password_hash = hash_password_blocking(request.password).await?;
    let is_admin = state.config.is_admin_email(&request.email);

    let user = state
        .db
        .users
        .create_user(
            &request.email,
            request.name.as_deref(),
            &password_hash,
            is_admin,
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

    let response = start_session(&state, user).await?;
    Ok((StatusCode::CREATED, Json(response)))
}

#[utoipa::path(
    post,
    path = "/api/v1/auth/sign-in",
    tag = "auth",
    request_body = SignInRequest,
    responses(
        (status = 200, description = "Signed in", body = AuthResponse),
        (status = 401, description = "Wrong email or password", body = ErrorResponse),
        (status = 403, description = "Account deactivated")
    )
)]
#[tracing::instrument(skip(state, request), fields(operation = "sign_in"))]
pub async fn sign_in(
    State(state): State<Arc<AppState>>,
    ValidatedJson(request): ValidatedJson<SignInRequest>,
) -> Result<impl IntoResponse, HttpAppError> {
    let invalid = || AppError::Unauthorized("Invalid email or password".to_string());

    let user = state
        .db
        .users
        .get_by_email(&request.email)
        .await?
        .ok_or_else(invalid)?;

    if !verify_password_blocking(request.password, user.password_hash.clone()).await? {
        tracing::info!(user_id = %user.id, "Sign-in with wrong password");
        return Err(invalid().into());
    }
    if !user.is_active {
        return Err(AppError::Forbidden("Account is deactivated".to_string()).into());
    }

    Ok(Json(start_session(&state, user).await?))
}

#[utoipa::path(
    post,
    path = "/api/v1/auth/sign-out",
    tag = "auth",
    responses(
        (status = 200, description = "Session revoked", body = MessageResponse),
        (status = 401, description = "Not signed in", body = ErrorResponse)
    ),
    security(("bearer" = []))
)]
#[tracing::instrument(skip(state, auth, locale), fields(user_id = %auth.id()))]
pub async fn sign_out(
    State(state): State<Arc<AppState>>,
    locale: RequestLocale,
    auth: AuthUser,
) -> Result<impl IntoResponse, HttpAppError> {
    state.db.sessions.revoke(auth.session_id).await?;
    tracing::info!(session_id = %auth.session_id, "Session revoked");
    Ok(Json(MessageResponse {
        message: locale.text(Message::SignedOut),
    }))
}

#[utoipa::path(
    get,
    path = "/api/v1/auth/me",
    tag = "auth",
    responses(
        (status = 200, description = "Current user and credits", body = MeResponse),
        (status = 401, description = "Not signed in", body = ErrorResponse)
    ),
    security(("bearer" = []))
)]
#[tracing::instrument(skip(state, auth), fields(user_id = %auth.id()))]
pub async fn me(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
) -> Result<impl IntoResponse, HttpAppError> {
    let usage = usage_summaries(&state, auth.id()).await?;
    Ok(Json(MeResponse {
        user: auth.user.into(),
        usage,
    }))
}
