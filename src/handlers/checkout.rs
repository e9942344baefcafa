use axum::{
    extract::{rejection::JsonRejection, State},
    Json,
};

use super::common::json_body;
use crate::errors::ServiceError;
use crate::services::checkout::{CheckoutSessionResponse, CreateCheckoutSessionRequest};
use crate::{ApiResponse, AppState};

// POST /api/v1/checkout/session
#[utoipa::path(
    post,
    path = "/api/v1/checkout/session",
    request_body = CreateCheckoutSessionRequest,
    responses(
        (status = 200, description = "Embedded checkout session created", body = CheckoutSessionResponse),
        (status = 400, description = "Invalid input or card error", body = crate::errors::ErrorResponse),
        (status = 500, description = "Payment processor failure", body = crate::errors::ErrorResponse)
    ),
    tag = "Checkout"
)]
pub async fn create_checkout_session(
    State(state): State<AppState>,
    payload: Result<Json<CreateCheckoutSessionRequest>, JsonRejection>,
) -> Result<Json<ApiResponse<CheckoutSessionResponse>>, ServiceError> {
    let request = json_body(payload)?;
    let session = state.services.checkout.create_session(request).await?;
    Ok(Json(ApiResponse::success(session)))
}
