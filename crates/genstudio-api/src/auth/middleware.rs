//! Request guards: `auth_middleware` resolves the bearer token to an active
//! session and user; `require_admin` sits behind it on admin routes.

use crate::auth::jwt::JwtService;
use crate::auth::models::AuthUser;
use crate::error::HttpAppError;
use axum::{
    extract::{Request, State},
    http::{header, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use genstudio_core::AppError;
use genstudio_db::{SessionRepository, UserRepository};
use std::sync::Arc;

#[derive(Clone)]
pub struct AuthState {
    pub jwt: JwtService,
    pub sessions: SessionRepository,
    pub users: UserRepository,
}

fn unauthorized(message: &str) -> Response {
    HttpAppError(AppError::Unauthorized(message.to_string())).into_response()
}

/// Token from `Authorization: Bearer <token>`.
pub fn bearer_token(request: &Request) -> Option<&str> {
    request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

pub async fn auth_middleware(
    State(auth_state): State<Arc<AuthState>>,
    mut request: Request,
    next: Next,
) -> Response {
    let Some(token) = bearer_token(&request) else {
        return unauthorized("Missing or malformed authorization header");
    };

    let claims = match auth_state.jwt.verify(token) {
        Ok(claims) => claims,
        Err(e) => return HttpAppError(e).into_response(),
    };

    let session = match auth_state.sessions.get_active(claims.jti).await {
        Ok(Some(session)) if session.user_id == claims.sub => session,
        Ok(_) => {
            tracing::debug!(session_id = %claims.jti, "Session revoked, expired or mismatched");
            return unauthorized("Session is no longer valid");
        }
        Err(e) => return HttpAppError(e).into_response(),
    };

    let user = match auth_state.users.get_by_id(claims.sub).await {
        Ok(Some(user)) => user,
        Ok(None) => return unauthorized("Account no longer exists"),
        Err(e) => return HttpAppError(e).into_response(),
    };

    if !user.is_active {
        tracing::info!(user_id = %user.id, "Rejected request from deactivated account");
        return unauthorized("Account is deactivated");
    }

    request.extensions_mut().insert(AuthUser {
        user,
        session_id: session.id,
    });
    next.run(request).await
}

/// Admin-only routes. Non-admins get a bare 403.
pub async fn require_admin(request: Request, next: Next) -> Response {
    match request.extensions().get::<AuthUser>() {
        Some(auth) if auth.is_admin() => next.run(request).await,
        Some(auth) => {
            tracing::info!(user_id = %auth.id(), path = %request.uri().path(), "Admin route refused");
            StatusCode::FORBIDDEN.into_response()
        }
        None => unauthorized("Not signed in"),
    }
}
