//! OpenAPI documentation.

use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi};

use crate::error;
use crate::handlers;
use genstudio_core::{models, Locale};

/// Registers the `bearer` scheme referenced by protected paths.
struct BearerAuth;

impl Modify for BearerAuth {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "bearer",
            SecurityScheme::Http(
                HttpBuilder::new()
                    .scheme(HttpAuthScheme::Bearer)
                    .bearer_format("JWT")
                    .build(),
            ),
        );
    }
}

#[derive(OpenApi)]
#[openapi(
    info(
        title = "genstudio API",
        version = "0.1.0",
        description = "AI content generation: text-to-image, image/video transforms, speech and story videos, with per-user credits, history, offline payment approval and per-user vendor keys. All endpoints are versioned under /api/v1/."
    ),
    modifiers(&BearerAuth),
    paths(
        // Auth
        handlers::auth::sign_up,
        handlers::auth::sign_in,
        handlers::auth::sign_out,
        handlers::auth::me,
        // Generations
        handlers::generations::create_generation,
        handlers::generations::list_generations,
        handlers::generations::get_generation,
        handlers::generations::cancel_generation,
        // History
        handlers::history::list_history,
        handlers::history::get_history_item,
        handlers::history::update_history_item,
        handlers::history::delete_history_item,
        handlers::gallery::list_gallery,
        // Usage and payments
        handlers::usage::get_usage,
        handlers::payments::list_packages,
        handlers::payments::submit_payment,
        handlers::payments::list_my_payments,
        // Admin
        handlers::admin_users::list_users,
        handlers::admin_users::create_user,
        handlers::admin_users::update_user,
        handlers::admin_users::update_credits,
        handlers::admin_payments::list_payments,
        handlers::admin_payments::approve_payment,
        handlers::admin_payments::reject_payment,
        // Settings
        handlers::vendor_keys::list_vendor_keys,
        handlers::vendor_keys::save_vendor_key,
        handlers::vendor_keys::delete_vendor_key,
        // Files
        handlers::uploads::upload_file,
        handlers::files::get_file,
        // Health
        handlers::health::liveness,
        handlers::health::readiness,
    ),
    components(
        schemas(
            // Users and sessions
            models::UserProfile,
            models::SignUpRequest,
            models::SignInRequest,
            models::AuthResponse,
            models::MeResponse,
            models::CreateUserRequest,
            models::UpdateUserRequest,
            models::UpdateCreditsRequest,
            models::AdminUserView,
            // Generation
            models::GenerationKind,
            models::JobStatus,
            models::GenerationJob,
            models::CreateGenerationRequest,
            models::GenerationAccepted,
            // History
            models::ContentType,
            models::HistoryItem,
            models::UpdateHistoryRequest,
            // Usage and payments
            models::UsageKind,
            models::UsageSummary,
            models::PaymentStatus,
            models::CreditPackage,
            models::PaymentRequest,
            models::SubmitPaymentRequest,
            models::ReviewPaymentRequest,
            models::PaymentReviewResponse,
            models::PaymentSubmitted,
            // Vendor keys
            models::Vendor,
            models::SaveVendorKeyRequest,
            models::VendorKeyView,
            Locale,
            // Handler responses
            handlers::MessageResponse,
            handlers::admin_users::AdminUserList,
            handlers::generations::CancelGenerationResponse,
            handlers::vendor_keys::VendorKeySavedResponse,
            handlers::uploads::UploadResponse,
            handlers::health::ReadinessResponse,
            // Error
            error::ErrorResponse,
        )
    ),
    tags(
        (name = "auth", description = "Sign up, sign in, sessions"),
        (name = "generations", description = "Generation jobs against hosted AI vendors"),
        (name = "history", description = "Generated content history and the public gallery"),
        (name = "usage", description = "Per-user credit counters"),
        (name = "payments", description = "Credit packages and offline payment requests"),
        (name = "admin", description = "User and payment administration"),
        (name = "settings", description = "Per-user vendor API keys"),
        (name = "uploads", description = "Input uploads and locally stored files"),
        (name = "health", description = "Liveness and readiness probes")
    )
)]
pub struct ApiDoc;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_doc_lists_versioned_paths() {
        let doc = ApiDoc::openapi();
        assert!(doc.paths.paths.contains_key("/api/v1/generations"));
        assert!(doc.paths.paths.contains_key("/api/v1/admin/payments/{id}/approve"));
        assert!(doc.paths.paths.keys().all(|p| p.starts_with("/api/v1/")));
    }

    #[test]
    fn test_bearer_scheme_registered() {
        let doc = ApiDoc::openapi();
        let components = doc.components.expect("components");
        assert!(components.security_schemes.contains_key("bearer"));
    }
}
