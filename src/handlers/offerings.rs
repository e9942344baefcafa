use axum::{
    extract::{rejection::QueryRejection, Query, State},
    Json,
};

use super::common::query_params;
use crate::errors::ServiceError;
use crate::services::offerings::{OfferingSummary, OfferingsQuery};
use crate::{ApiResponse, AppState};

/// List bookable offerings for a year group
#[utoipa::path(
    get,
    path = "/api/v1/offerings",
    params(OfferingsQuery),
    responses(
        (status = 200, description = "Available, upcoming offerings, least recently updated first", body = [OfferingSummary]),
        (status = 400, description = "Missing or unknown year group", body = crate::errors::ErrorResponse),
        (status = 500, description = "CRM failure", body = crate::errors::ErrorResponse)
    ),
    tag = "Offerings"
)]
pub async fn list_offerings(
    State(state): State<AppState>,
    query: Result<Query<OfferingsQuery>, QueryRejection>,
) -> Result<Json<ApiResponse<Vec<OfferingSummary>>>, ServiceError> {
    let query = query_params(query)?;
    let offerings = state.services.offerings.list_available(query).await?;
    Ok(Json(ApiResponse::success(offerings)))
}
