use axum::{
    body::Bytes,
    extract::State,
    http::HeaderMap,
    routing::post,
    Json, Router,
};
use serde::Serialize;
use utoipa::ToSchema;

use crate::errors::ServiceError;
use crate::services::payments::WebhookOutcome;
use crate::AppState;

pub const SIGNATURE_HEADER: &str = "x-razorpay-signature";
pub const EVENT_ID_HEADER: &str = "x-razorpay-event-id";

#[derive(Debug, Serialize, ToSchema)]
pub struct WebhookAck {
    pub status: WebhookOutcome,
}

pub fn webhooks_routes() -> Router<AppState> {
    Router::new().route("/razorpay", post(razorpay_webhook))
}

fn header<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

// POST /api/webhooks/razorpay
#[utoipa::path(
    post,
    path = "/api/webhooks/razorpay",
    request_body = String,
    responses(
        (status = 200, description = "Webhook accepted", body = WebhookAck),
        (status = 400, description = "Invalid signature or payload", body = crate::errors::ErrorResponse)
    ),
    tag = "Payments"
)]
pub async fn razorpay_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<WebhookAck>, ServiceError> {
    let status = state
        .services
        .payments
        .handle_webhook(
            header(&headers, SIGNATURE_HEADER),
            header(&headers, EVENT_ID_HEADER),
            &body,
        )
        .await?;
    Ok(Json(WebhookAck { status }))
}
