use crate::auth::AuthUser;
use crate::error::{ApiQuery, ErrorResponse, HttpAppError, ValidatedJson};
use crate::locale::RequestLocale;
use crate::state::AppState;
use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use genstudio_core::models::{
    CreditPackage, NewPaymentRequest, Pagination, PaymentRequest, PaymentSubmitted,
    SubmitPaymentRequest,
};
use genstudio_core::{AppError, Message};
use std::sync::Arc;

#[utoipa::path(
    get,
    path = "/api/v1/payments/packages",
    tag = "payments",
    responses(
        (status = 200, description = "Credit packages on offer", body = Vec<CreditPackage>)
    )
)]
pub async fn list_packages(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.config.credit_packages().to_vec())
}

#[utoipa::path(
    post,
    path = "/api/v1/payments",
    tag = "payments",
    request_body = SubmitPaymentRequest,
    responses(
        (status = 201, description = "Payment submitted for review", body = PaymentSubmitted),
        (status = 400, description = "Unknown package or invalid contact details", body = ErrorResponse)
    ),
    security(("bearer" = []))
)]
#[tracing::instrument(skip(state, auth, locale, request), fields(user_id = %auth.id(), package_id = %request.package_id))]
pub async fn submit_payment(
    State(state): State<Arc<AppState>>,
    locale: RequestLocale,
    auth: AuthUser,
    ValidatedJson(request): ValidatedJson<SubmitPaymentRequest>,
) -> Result<impl IntoResponse, HttpAppError> {
    let package = state
        .config
        .credit_package(&request.package_id)
        .cloned()
        .ok_or_else(|| {
            AppError::InvalidInput(format!("Unknown package '{}'", request.package_id))
        })?;

    let payment = state
        .db
        .payments
        .create(&NewPaymentRequest {
            user_id: auth.id(),
            package,
            contact_name: request.contact_name.trim().to_string(),
            contact_phone: request.contact_phone,
            contact_email: request.contact_email,
            payment_reference: request.payment_reference.trim().to_string(),
        })
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(PaymentSubmitted {
            payment,
            message: locale.text(Message::PaymentSubmitted),
        }),
    ))
}

#[utoipa::path(
    get,
    path = "/api/v1/payments",
    tag = "payments",
    params(Pagination),
    responses(
        (status = 200, description = "Own payment requests, newest first", body = Vec<PaymentRequest>)
    ),
    security(("bearer" = []))
)]
#[tracing::instrument(skip(state, auth, pagination), fields(user_id = %auth.id()))]
pub async fn list_my_payments(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    ApiQuery(pagination): ApiQuery<Pagination>,
) -> Result<impl IntoResponse, HttpAppError> {
    let (limit, offset) = pagination.clamped();
    let payments = state
        .db
        .payments
        .list_for_user(auth.id(), limit, offset)
        .await?;
    Ok(Json(payments))
}
