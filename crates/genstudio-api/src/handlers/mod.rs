//! HTTP handlers, one module per resource.

pub mod admin_payments;
pub mod admin_users;
pub mod auth;
pub mod files;
pub mod gallery;
pub mod generations;
pub mod health;
pub mod history;
pub mod payments;
pub mod uploads;
pub mod usage;
pub mod vendor_keys;

use serde::Serialize;
use utoipa::ToSchema;

/// Localized acknowledgement for actions without a resource to return.
#[derive(Debug, Serialize, ToSchema)]
pub struct MessageResponse {
    pub message: String,
}
