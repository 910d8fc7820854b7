use crate::auth::AuthUser;
use crate::constants::PRESIGNED_URL_TTL_SECS;
use crate::error::HttpAppError;
use crate::state::AppState;
use axum::{
    extract::{Multipart, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use genstudio_core::AppError;
use genstudio_storage::StorageArea;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use utoipa::ToSchema;
use uuid::Uuid;

#[derive(Debug, Serialize, ToSchema)]
pub struct UploadResponse {
    pub storage_key: String,
    /// Pass this as `input_url` when creating a generation.
    pub url: String,
    pub content_type: String,
    pub size: usize,
}

/// Read the single `file` field of a multipart body.
async fn read_file_field(mut multipart: Multipart) -> Result<(Vec<u8>, String), AppError> {
    let mut file: Option<(Vec<u8>, String)> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::InvalidInput(format!("Failed to read multipart: {}", e)))?
    {
        if field.name() != Some("file") {
            continue;
        }
        if file.is_some() {
            return Err(AppError::InvalidInput(
                "Send exactly one field named 'file'".to_string(),
            ));
        }

        let content_type = field
            .content_type()
            .unwrap_or("application/octet-stream")
            .to_string();
        let data = field
            .bytes()
            .await
            .map_err(|e| AppError::InvalidInput(format!("Failed to read file data: {}", e)))?;
        file = Some((data.to_vec(), content_type));
    }

    file.ok_or_else(|| AppError::InvalidInput("No file provided".to_string()))
}

fn extension_for_upload(content_type: &str) -> &'static str {
    match content_type {
        "image/png" => "png",
        "image/jpeg" => "jpg",
        "image/webp" => "webp",
        "image/gif" => "gif",
        "video/mp4" => "mp4",
        "video/webm" => "webm",
        "video/quicktime" => "mov",
        "audio/mpeg" => "mp3",
        "audio/wav" | "audio/x-wav" => "wav",
        _ => "bin",
    }
}

#[utoipa::path(
    post,
    path = "/api/v1/uploads",
    tag = "uploads",
    request_body(content_type = "multipart/form-data", description = "Single field named `file`"),
    responses(
        (status = 201, description = "File stored", body = UploadResponse),
        (status = 400, description = "Missing file or unsupported content type", body = crate::error::ErrorResponse),
        (status = 401, description = "Not signed in", body = crate::error::ErrorResponse),
        (status = 413, description = "File too large", body = crate::error::ErrorResponse)
    ),
    security(("bearer" = []))
)]
#[tracing::instrument(skip(state, auth, multipart), fields(user_id = %auth.id()))]
pub async fn upload_file(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    multipart: Multipart,
) -> Result<impl IntoResponse, HttpAppError> {
    let (data, content_type) = read_file_field(multipart).await?;
    let content_type = content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();

    if data.len() > state.media.max_upload_size_bytes {
        return Err(AppError::PayloadTooLarge(format!(
            "File size exceeds maximum allowed size of {} MB",
            state.media.max_upload_size_bytes / 1024 / 1024
        ))
        .into());
    }
    if !state.media.is_allowed_content_type(&content_type) {
        return Err(AppError::InvalidInput(format!(
            "Content type '{}' is not allowed",
            content_type
        ))
        .into());
    }

    let size = data.len();
    let filename = format!("{}.{}", Uuid::new_v4(), extension_for_upload(&content_type));
    let (storage_key, _) = state
        .media
        .storage
        .upload(auth.id(), StorageArea::Uploads, &filename, &content_type, data)
        .await?;
    let url = state
        .media
        .storage
        .get_presigned_url(&storage_key, Duration::from_secs(PRESIGNED_URL_TTL_SECS))
        .await?;

    tracing::info!(storage_key = %storage_key, size, content_type = %content_type, "File uploaded");

    Ok((
        StatusCode::CREATED,
        Json(UploadResponse {
            storage_key,
            url,
            content_type,
            size,
        }),
    ))
}
