//! Public file route for the local storage backend.
//!
//! S3 objects are served by the bucket itself; with local storage the
//! API is the only thing that can hand stored files to browsers and vendors.

use crate::error::HttpAppError;
use crate::state::AppState;
use axum::{
    body::Body,
    extract::{Path, State},
    http::{header, StatusCode},
    response::Response,
};
use genstudio_core::AppError;
use genstudio_storage::StorageBackend;
use std::sync::Arc;

fn content_type_for_key(key: &str) -> &'static str {
    let ext = key
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "webp" => "image/webp",
        "gif" => "image/gif",
        "mp4" => "video/mp4",
        "webm" => "video/webm",
        "mov" => "video/quicktime",
        "mp3" => "audio/mpeg",
        "wav" => "audio/wav",
        _ => "application/octet-stream",
    }
}

#[utoipa::path(
    get,
    path = "/api/v1/files/{key}",
    tag = "uploads",
    params(("key" = String, Path, description = "Storage key")),
    responses(
        (status = 200, description = "File contents"),
        (status = 404, description = "No such file", body = crate::error::ErrorResponse)
    )
)]
#[tracing::instrument(skip(state), fields(operation = "get_file"))]
pub async fn get_file(
    State(state): State<Arc<AppState>>,
    Path(key): Path<String>,
) -> Result<Response, HttpAppError> {
    if state.media.storage.backend_type() != StorageBackend::Local {
        return Err(AppError::NotFound("File not found".to_string()).into());
    }

    let data = state.media.storage.download(&key).await.map_err(|e| {
        tracing::debug!(error = %e, storage_key = %key, "Stored file unavailable");
        AppError::NotFound("File not found".to_string())
    })?;

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, content_type_for_key(&key))
        .header(header::CACHE_CONTROL, "public, max-age=3600")
        .body(Body::from(data))
        .map_err(|e| {
            tracing::error!(error = %e, "Failed to build response");
            HttpAppError::from(AppError::Internal(e.to_string()))
        })
}
