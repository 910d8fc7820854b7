//! Per-user vendor API keys. Keys are write-only: listings show a hint.

use crate::auth::AuthUser;
use crate::error::{ErrorResponse, HttpAppError, ValidatedJson};
use crate::handlers::MessageResponse;
use crate::locale::RequestLocale;
use crate::state::AppState;
use axum::{
    extract::{Path, State},
    response::IntoResponse,
    Json,
};
use genstudio_core::models::{key_hint, SaveVendorKeyRequest, Vendor, VendorKeyView};
use genstudio_core::{AppError, Message};
use serde::Serialize;
use std::sync::Arc;
use utoipa::ToSchema;

#[derive(Debug, Serialize, ToSchema)]
pub struct VendorKeySavedResponse {
    pub key: VendorKeyView,
    pub message: String,
}

fn parse_vendor(vendor: &str) -> Result<Vendor, AppError> {
    vendor
        .parse::<Vendor>()
        .map_err(|_| AppError::InvalidInput(format!("Unknown vendor '{}'", vendor)))
}

#[utoipa::path(
    get,
    path = "/api/v1/settings/vendor-keys",
    tag = "settings",
    responses(
        (status = 200, description = "Saved keys, masked", body = Vec<VendorKeyView>)
    ),
    security(("bearer" = []))
)]
#[tracing::instrument(skip(state, auth), fields(user_id = %auth.id()))]
pub async fn list_vendor_keys(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
) -> Result<impl IntoResponse, HttpAppError> {
    let records = state.db.vendor_keys.list_for_user(auth.id()).await?;

    let mut views = Vec::with_capacity(records.len());
    for record in records {
        let Ok(vendor) = record.vendor.parse::<Vendor>() else {
            tracing::warn!(vendor = %record.vendor, "Skipping key for unknown vendor");
            continue;
        };
        let hint = match state.db.vendor_keys.decrypt(&record) {
            Ok(key) => key_hint(&key),
            Err(e) => {
                tracing::warn!(error = %e, vendor = %vendor, "Stored vendor key cannot be decrypted");
                key_hint("")
            }
        };
        views.push(VendorKeyView {
            vendor,
            hint,
            updated_at: record.updated_at,
        });
    }
    Ok(Json(views))
}

#[utoipa::path(
    put,
    path = "/api/v1/settings/vendor-keys/{vendor}",
    tag = "settings",
    params(("vendor" = String, Path, description = "fal, replicate or elevenlabs")),
    request_body = SaveVendorKeyRequest,
    responses(
        (status = 200, description = "Key saved", body = VendorKeySavedResponse),
        (status = 400, description = "Unknown vendor or empty key", body = ErrorResponse)
    ),
    security(("bearer" = []))
)]
#[tracing::instrument(skip(state, auth, locale, request), fields(user_id = %auth.id(), vendor = %vendor))]
pub async fn save_vendor_key(
    State(state): State<Arc<AppState>>,
    locale: RequestLocale,
    auth: AuthUser,
    Path(vendor): Path<String>,
    ValidatedJson(request): ValidatedJson<SaveVendorKeyRequest>,
) -> Result<impl IntoResponse, HttpAppError> {
    let vendor = parse_vendor(&vendor)?;
    let api_key = request.api_key.trim();
    if api_key.is_empty() {
        return Err(AppError::InvalidInput("API key must not be blank".to_string()).into());
    }

    let record = state
        .db
        .vendor_keys
        .save(auth.id(), vendor, api_key)
        .await?;

    Ok(Json(VendorKeySavedResponse {
        key: VendorKeyView {
            vendor,
            hint: key_hint(api_key),
            updated_at: record.updated_at,
        },
        message: locale.text(Message::VendorKeySaved),
    }))
}

#[utoipa::path(
    delete,
    path = "/api/v1/settings/vendor-keys/{vendor}",
    tag = "settings",
    params(("vendor" = String, Path, description = "fal, replicate or elevenlabs")),
    responses(
        (status = 200, description = "Key removed", body = MessageResponse),
        (status = 404, description = "No key saved for this vendor", body = ErrorResponse)
    ),
    security(("bearer" = []))
)]
#[tracing::instrument(skip(state, auth, locale), fields(user_id = %auth.id(), vendor = %vendor))]
pub async fn delete_vendor_key(
    State(state): State<Arc<AppState>>,
    locale: RequestLocale,
    auth: AuthUser,
    Path(vendor): Path<String>,
) -> Result<impl IntoResponse, HttpAppError> {
    let vendor = parse_vendor(&vendor)?;
    if !state.db.vendor_keys.delete(auth.id(), vendor).await? {
        return Err(AppError::NotFound(format!("No {} key saved", vendor)).into());
    }
    Ok(Json(MessageResponse {
        message: locale.text(Message::VendorKeyDeleted),
    }))
}
