//! Admin review of offline payment requests. Mounted behind `require_admin`.

use crate::auth::AuthUser;
use crate::error::{ApiQuery, ErrorResponse, HttpAppError};
use crate::locale::RequestLocale;
use crate::state::AppState;
use axum::{
    body::Bytes,
    extract::{Path, State},
    response::IntoResponse,
    Json,
};
use genstudio_core::constants::{DEFAULT_PAGE_LIMIT, MAX_PAGE_LIMIT};
use genstudio_core::models::{
    PaymentRequest, PaymentReviewResponse, PaymentStatus, ReviewDecision, ReviewPaymentRequest,
};
use genstudio_core::{AppError, Message};
use serde::Deserialize;
use std::sync::Arc;
use utoipa::IntoParams;
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
pub struct PaymentListQuery {
    pub status: Option<PaymentStatus>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

/// The review body is optional; an empty body means no note.
fn parse_review(body: &[u8]) -> Result<ReviewPaymentRequest, AppError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(ReviewPaymentRequest::default());
    }
    let review: ReviewPaymentRequest = serde_json::from_slice(body)?;
    review.validate()?;
    Ok(review)
}

async fn review(
    state: &AppState,
    locale: RequestLocale,
    admin: &AuthUser,
    id: Uuid,
    decision: ReviewDecision,
    body: &[u8],
) -> Result<PaymentReviewResponse, AppError> {
    let review = parse_review(body)?;
    let (payment, applied) = state
        .db
        .payments
        .resolve(id, decision, admin.id(), review.note.as_deref())
        .await?;

    let message = match (applied, decision) {
        (false, _) => Message::PaymentUnchanged,
        (true, ReviewDecision::Approve) => Message::PaymentApproved,
        (true, ReviewDecision::Reject) => Message::PaymentRejected,
    };
    Ok(PaymentReviewResponse {
        payment,
        applied,
        message: locale.text(message),
    })
}

#[utoipa::path(
    get,
    path = "/api/v1/admin/payments",
    tag = "admin",
    params(PaymentListQuery),
    responses(
        (status = 200, description = "Payment requests, oldest first", body = Vec<PaymentRequest>),
        (status = 403, description = "Not an admin")
    ),
    security(("bearer" = []))
)]
#[tracing::instrument(skip(state, admin, query), fields(admin_id = %admin.id(), status = ?query.status))]
pub async fn list_payments(
    State(state): State<Arc<AppState>>,
    admin: AuthUser,
    ApiQuery(query): ApiQuery<PaymentListQuery>,
) -> Result<impl IntoResponse, HttpAppError> {
    let limit = query.limit.unwrap_or(DEFAULT_PAGE_LIMIT).clamp(1, MAX_PAGE_LIMIT);
    let offset = query.offset.unwrap_or(0).max(0);
    let payments = state
        .db
        .payments
        .list_all(query.status, limit, offset)
        .await?;
    Ok(Json(payments))
}

#[utoipa::path(
    post,
    path = "/api/v1/admin/payments/{id}/approve",
    tag = "admin",
    params(("id" = Uuid, Path, description = "Payment request ID")),
    request_body(content = ReviewPaymentRequest, description = "Optional note; the body may be empty"),
    responses(
        (status = 200, description = "Approved and credited, or already approved", body = PaymentReviewResponse),
        (status = 404, description = "Not found", body = ErrorResponse),
        (status = 409, description = "Already rejected", body = ErrorResponse)
    ),
    security(("bearer" = []))
)]
#[tracing::instrument(skip(state, admin, locale, body), fields(admin_id = %admin.id(), payment_id = %id))]
pub async fn approve_payment(
    State(state): State<Arc<AppState>>,
    locale: RequestLocale,
    admin: AuthUser,
    Path(id): Path<Uuid>,
    body: Bytes,
) -> Result<impl IntoResponse, HttpAppError> {
    let response = review(&state, locale, &admin, id, ReviewDecision::Approve, &body).await?;
    Ok(Json(response))
}

#[utoipa::path(
    post,
    path = "/api/v1/admin/payments/{id}/reject",
    tag = "admin",
    params(("id" = Uuid, Path, description = "Payment request ID")),
    request_body(content = ReviewPaymentRequest, description = "Optional note; the body may be empty"),
    responses(
        (status = 200, description = "Rejected, or already rejected", body = PaymentReviewResponse),
        (status = 404, description = "Not found", body = ErrorResponse),
        (status = 409, description = "Already approved", body = ErrorResponse)
    ),
    security(("bearer" = []))
)]
#[tracing::instrument(skip(state, admin, locale, body), fields(admin_id = %admin.id(), payment_id = %id))]
pub async fn reject_payment(
    State(state): State<Arc<AppState>>,
    locale: RequestLocale,
    admin: AuthUser,
    Path(id): Path<Uuid>,
    body: Bytes,
) -> Result<impl IntoResponse, HttpAppError> {
    let response = review(&state, locale, &admin, id, ReviewDecision::Reject, &body).await?;
    Ok(Json(response))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_review_body_means_no_note() {
        assert!(parse_review(b"").unwrap().note.is_none());
        assert!(parse_review(b"  \n").unwrap().note.is_none());
    }

    #[test]
    fn test_review_note_parsed_and_validated() {
        let review = parse_review(br#"{"note":"receipt checked"}"#).unwrap();
        assert_eq!(review.note.as_deref(), Some("receipt checked"));

        let long = format!(r#"{{"note":"{}"}}"#, "x".repeat(600));
        assert!(matches!(
            parse_review(long.as_bytes()),
            Err(AppError::InvalidInput(_))
        ));
        assert!(parse_review(b"not json").is_err());
    }
}
