//! Route configuration and setup

use crate::api_doc::ApiDoc;
use crate::auth::{auth_middleware, require_admin};
use crate::constants::API_PREFIX;
use crate::handlers;
use crate::middleware::request_id_middleware;
use crate::state::AppState;
use axum::{
    extract::DefaultBodyLimit,
    http::{HeaderValue, Method},
    routing::{get, patch, post, put},
    Json, Router,
};
use genstudio_core::Config;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;
use utoipa_rapidoc::RapiDoc;

/// Headroom over the upload limit for multipart framing.
const MULTIPART_OVERHEAD_BYTES: usize = 1024 * 1024;

/// Build the full application router.
pub fn setup_routes(state: Arc<AppState>) -> Result<Router, anyhow::Error> {
    let cors = setup_cors(&state.config)?;
    let body_limit = state.media.max_upload_size_bytes + MULTIPART_OVERHEAD_BYTES;

    let api = public_routes()
        .merge(protected_routes(state.clone()))
        .merge(upload_routes(state.clone()));

    let app = Router::new()
        .nest(API_PREFIX, api)
        .route("/api/openapi.json", get(|| async { Json(ApiDoc::openapi()) }))
        .merge(RapiDoc::new("/api/openapi.json").path("/docs"))
        .layer(RequestBodyLimitLayer::new(body_limit))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .layer(axum::middleware::from_fn(request_id_middleware))
        .with_state(state);

    Ok(app)
}

fn setup_cors(config: &Config) -> Result<CorsLayer, anyhow::Error> {
    let methods = [
        Method::GET,
        Method::POST,
        Method::PUT,
        Method::PATCH,
        Method::DELETE,
        Method::OPTIONS,
    ];

    let cors = if config.cors_origins().iter().any(|o| o == "*") {
        tracing::warn!("CORS configured to allow all origins - not recommended for production");
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(methods)
            .allow_headers(Any)
    } else {
        let origins = config
            .cors_origins()
            .iter()
            .map(|o| o.parse::<HeaderValue>())
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| anyhow::anyhow!("Invalid CORS origin: {}", e))?;

        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods(methods)
            .allow_headers(Any)
    };
    Ok(cors)
}

/// Routes reachable without a session.
fn public_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/health/live", get(handlers::health::liveness))
        .route("/health/ready", get(handlers::health::readiness))
        .route("/auth/sign-up", post(handlers::auth::sign_up))
        .route("/auth/sign-in", post(handlers::auth::sign_in))
        .route("/payments/packages", get(handlers::payments::list_packages))
        .route("/gallery", get(handlers::gallery::list_gallery))
        .route("/files/{*key}", get(handlers::files::get_file))
}

/// Routes for signed-in users, with the admin subtree nested behind the
/// admin check.
fn protected_routes(state: Arc<AppState>) -> Router<Arc<AppState>> {
    let user_routes = Router::new()
        .route("/auth/sign-out", post(handlers::auth::sign_out))
        .route("/auth/me", get(handlers::auth::me))
        .route(
            "/generations",
            post(handlers::generations::create_generation)
                .get(handlers::generations::list_generations),
        )
        .route("/generations/{id}", get(handlers::generations::get_generation))
        .route(
            "/generations/{id}/cancel",
            post(handlers::generations::cancel_generation),
        )
        .route("/history", get(handlers::history::list_history))
        .route(
            "/history/{id}",
            get(handlers::history::get_history_item)
                .patch(handlers::history::update_history_item)
                .delete(handlers::history::delete_history_item),
        )
        .route("/usage", get(handlers::usage::get_usage))
        .route(
            "/payments",
            post(handlers::payments::submit_payment).get(handlers::payments::list_my_payments),
        )
        .route(
            "/settings/vendor-keys",
            get(handlers::vendor_keys::list_vendor_keys),
        )
        .route(
            "/settings/vendor-keys/{vendor}",
            put(handlers::vendor_keys::save_vendor_key)
                .delete(handlers::vendor_keys::delete_vendor_key),
        );

    user_routes
        .merge(admin_routes())
        .route_layer(axum::middleware::from_fn_with_state(
            state.auth.clone(),
            auth_middleware,
        ))
}

fn admin_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route(
            "/admin/users",
            get(handlers::admin_users::list_users).post(handlers::admin_users::create_user),
        )
        .route("/admin/users/{id}", patch(handlers::admin_users::update_user))
        .route(
            "/admin/users/{id}/credits",
            put(handlers::admin_users::update_credits),
        )
        .route("/admin/payments", get(handlers::admin_payments::list_payments))
        .route(
            "/admin/payments/{id}/approve",
            post(handlers::admin_payments::approve_payment),
        )
        .route(
            "/admin/payments/{id}/reject",
            post(handlers::admin_payments::reject_payment),
        )
        .route_layer(axum::middleware::from_fn(require_admin))
}

/// Multipart extraction is capped at 2 MB unless the route lifts it.
fn upload_routes(state: Arc<AppState>) -> Router<Arc<AppState>> {
    Router::new()
        .route("/uploads", post(handlers::uploads::upload_file))
        .layer(DefaultBodyLimit::max(
            state.media.max_upload_size_bytes + MULTIPART_OVERHEAD_BYTES,
        ))
        .route_layer(axum::middleware::from_fn_with_state(
            state.auth.clone(),
            auth_middleware,
        ))
}
