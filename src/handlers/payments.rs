use axum::{extract::State, routing::post, Json, Router};

use crate::auth::AuthUser;
use crate::entities::order;
use crate::handlers::common::ok;
use crate::services::payments::VerifyPaymentInput;
use crate::{ApiResponse, ApiResult, AppState};

pub fn payments_routes() -> Router<AppState> {
    Router::new().route("/verify", post(verify_payment))
}

/// Confirm a checkout payment from the browser callback
///
/// The gateway signature over `order_id|payment_id` is checked before the
/// order is looked up; a mismatch leaves the order untouched.
#[utoipa::path(
    post,
    path = "/api/payment/verify",
    request_body = VerifyPaymentInput,
    responses(
        (status = 200, description = "Payment confirmed", body = ApiResponse<order::Model>),
        (status = 400, description = "Invalid signature or payment not captured", body = crate::errors::ErrorResponse),
        (status = 404, description = "No order for this gateway order", body = crate::errors::ErrorResponse),
        (status = 500, description = "Payment gateway unavailable", body = crate::errors::ErrorResponse)
    ),
    security(("Bearer" = [])),
    tag = "Payments"
)]
pub async fn verify_payment(
    user: AuthUser,
    State(state): State<AppState>,
    Json(payload): Json<VerifyPaymentInput>,
) -> ApiResult<order::Model> {
    Ok(ok(state.services.payments.verify_payment(&user, payload).await?))
}
