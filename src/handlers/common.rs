use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::Query;
use axum::http::Uri;
use axum::Json;

use crate::errors::ServiceError;

/// Unwraps a JSON body, turning extractor rejections into `VALIDATION_ERROR`.
pub fn json_body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, ServiceError> {
    payload
        .map(|Json(value)| value)
        .map_err(|rejection| ServiceError::ValidationError(rejection.body_text()))
}

/// Unwraps query parameters the same way as [`json_body`].
pub fn query_params<T>(query: Result<Query<T>, QueryRejection>) -> Result<T, ServiceError> {
    query
        .map(|Query(value)| value)
        .map_err(|rejection| ServiceError::ValidationError(rejection.body_text()))
}

/// Fallback for unknown routes
pub async fn not_found(uri: Uri) -> ServiceError {
    ServiceError::NotFound(format!("no route for {}", uri.path()))
}
