use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    Json,
};
use tracing::info;

use super::common::json_body;
use crate::errors::ServiceError;
use crate::services::bookings::{CreateBookingRequest, CreateBookingResponse};
use crate::{ApiResponse, AppState};

/// Create a booking and hand off to checkout
///
/// Resolves both contacts, guards against duplicate bookings and returns the
/// checkout URL. A pending booking for the same student and offering is reused.
#[utoipa::path(
    post,
    path = "/api/v1/bookings",
    request_body = CreateBookingRequest,
    responses(
        (status = 201, description = "Booking created", body = CreateBookingResponse),
        (status = 200, description = "Pending booking reused", body = CreateBookingResponse),
        (status = 400, description = "Invalid input, unavailable offering or duplicate booking", body = crate::errors::ErrorResponse),
        (status = 404, description = "Offering not found", body = crate::errors::ErrorResponse),
        (status = 500, description = "CRM failure", body = crate::errors::ErrorResponse)
    ),
    tag = "Bookings"
)]
pub async fn create_booking(
    State(state): State<AppState>,
    payload: Result<Json<CreateBookingRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<ApiResponse<CreateBookingResponse>>), ServiceError> {
    let request = json_body(payload)?;
    let response = state.services.bookings.create_booking(request).await?;

    let status = if response.reused {
        StatusCode::OK
    } else {
        StatusCode::CREATED
    };
    info!(booking_id = %response.booking_id, reused = response.reused, "booking handed off to checkout");
    Ok((status, Json(ApiResponse::success(response))))
}
