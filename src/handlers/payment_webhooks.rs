use axum::{extract::State, http::HeaderMap, Json};
use bytes::Bytes;
use serde::Serialize;
use tracing::info;
use utoipa::ToSchema;

use crate::errors::ServiceError;
use crate::payments::webhook::SIGNATURE_HEADER;
use crate::services::reconciliation::WebhookOutcome;
use crate::{ApiResponse, AppState};

#[derive(Debug, Serialize, ToSchema)]
pub struct WebhookAck {
    pub outcome: WebhookOutcome,
}

// POST /api/v1/webhooks/payment
#[utoipa::path(
    post,
    path = "/api/v1/webhooks/payment",
    request_body(content = String, description = "Raw payment processor event", content_type = "application/json"),
    params(
        ("Stripe-Signature" = String, Header, description = "t=<unix>,v1=<hex hmac>")
    ),
    responses(
        (status = 200, description = "Event acknowledged", body = WebhookAck),
        (status = 400, description = "Missing or invalid signature, or unparseable event", body = crate::errors::ErrorResponse),
        (status = 500, description = "Processing failed; the processor should redeliver", body = crate::errors::ErrorResponse)
    ),
    tag = "Payments"
)]
pub async fn payment_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<ApiResponse<WebhookAck>>, ServiceError> {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|value| value.to_str().ok());

    let outcome = state
        .services
        .reconciliation
        .handle_webhook(signature, &body)
        .await?;

    info!(outcome = ?outcome, "payment webhook acknowledged");
    Ok(Json(ApiResponse::success(WebhookAck { outcome })))
}
