use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use utoipa::ToSchema;

use crate::crm::CrmError;
use crate::payments::webhook::SignatureError;
use crate::payments::PaymentError;

fn current_request_id() -> Option<String> {
    crate::tracing::current_request_id().map(|rid| rid.as_str().to_string())
}

/// Error envelope returned by every failing endpoint.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
#[schema(example = json!({
    "success": false,
    "error": {
        "code": "OFFERING_PAST",
        "message": "This workshop has already taken place"
    },
    "requestId": "1b4e28ba-2fa1-11d2-883f-0016d3cca427",
    "timestamp": "2025-01-01T10:30:00.000Z"
}))]
pub struct ErrorResponse {
    /// Always `false`
    pub success: bool,
    /// Machine-readable code plus human-readable message
    pub error: ErrorBody,
    /// Request identifier for support and debugging
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    /// RFC 3339 timestamp when the error occurred
    pub timestamp: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorBody {
    /// Stable code clients branch on, e.g. `DUPLICATE_BOOKING`
    #[schema(example = "DUPLICATE_BOOKING")]
    pub code: String,
    /// Human-readable description; not meant to be parsed
    pub message: String,
}

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Offering {0} not found")]
    OfferingNotFound(String),

    #[error("{0}")]
    OfferingUnavailable(String),

    #[error("This workshop has already taken place")]
    OfferingPast,

    #[error("Offering {0} has no payment product configured")]
    OfferingNoProduct(String),

    #[error("This student is already booked onto this workshop")]
    DuplicateBooking,

    #[error("Failed to fetch {context}: {source}")]
    FetchError {
        context: &'static str,
        #[source]
        source: CrmError,
    },

    #[error("Failed to create {context}: {source}")]
    CreateError {
        context: &'static str,
        #[source]
        source: CrmError,
    },

    #[error("{0}")]
    CardError(String),

    #[error("Failed to create checkout session: {0}")]
    SessionCreateFailed(String),

    #[error("Missing webhook signature")]
    WebhookSignatureMissing,

    #[error("Invalid webhook signature: {0}")]
    WebhookSignatureInvalid(String),

    #[error("Webhook processing failed: {0}")]
    WebhookProcessingFailed(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<validator::ValidationErrors> for ServiceError {
    fn from(err: validator::ValidationErrors) -> Self {
        ServiceError::ValidationError(err.to_string())
    }
}

impl From<PaymentError> for ServiceError {
    fn from(err: PaymentError) -> Self {
        match err {
            PaymentError::Card(message) => ServiceError::CardError(message),
            other => ServiceError::SessionCreateFailed(other.to_string()),
        }
    }
}

impl From<SignatureError> for ServiceError {
    fn from(err: SignatureError) -> Self {
        match err {
            SignatureError::Missing => ServiceError::WebhookSignatureMissing,
            other => ServiceError::WebhookSignatureInvalid(other.to_string()),
        }
    }
}

impl ServiceError {
    pub fn fetch(context: &'static str, source: CrmError) -> Self {
        ServiceError::FetchError { context, source }
    }

    pub fn create(context: &'static str, source: CrmError) -> Self {
        ServiceError::CreateError { context, source }
    }

    /// Stable machine-readable code for this error.
    pub fn code(&self) -> &'static str {
        match self {
            Self::ValidationError(_) => "VALIDATION_ERROR",
            Self::OfferingNotFound(_) => "OFFERING_NOT_FOUND",
            Self::OfferingUnavailable(_) => "OFFERING_UNAVAILABLE",
            Self::OfferingPast => "OFFERING_PAST",
            Self::OfferingNoProduct(_) => "OFFERING_NO_PRODUCT",
            Self::DuplicateBooking => "DUPLICATE_BOOKING",
            Self::FetchError { .. } => "FETCH_ERROR",
            Self::CreateError { .. } => "CREATE_ERROR",
            Self::CardError(_) => "CARD_ERROR",
            Self::SessionCreateFailed(_) => "SESSION_CREATE_FAILED",
            Self::WebhookSignatureMissing => "WEBHOOK_SIGNATURE_MISSING",
            Self::WebhookSignatureInvalid(_) => "WEBHOOK_SIGNATURE_INVALID",
            Self::WebhookProcessingFailed(_) => "WEBHOOK_PROCESSING_FAILED",
            Self::NotFound(_) => "NOT_FOUND",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Returns the HTTP status code for this error.
    /// This is the single source of truth for error-to-status mapping.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::ValidationError(_)
            | Self::OfferingUnavailable(_)
            | Self::OfferingPast
            | Self::DuplicateBooking
            | Self::CardError(_)
            | Self::WebhookSignatureMissing
            | Self::WebhookSignatureInvalid(_) => StatusCode::BAD_REQUEST,
            Self::OfferingNotFound(_) | Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::OfferingNoProduct(_)
            | Self::FetchError { .. }
            | Self::CreateError { .. }
            | Self::SessionCreateFailed(_)
            | Self::WebhookProcessingFailed(_)
            | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Returns the error message suitable for HTTP responses.
    /// Collaborator failures return generic messages to avoid leaking upstream details.
    pub fn response_message(&self) -> String {
        match self {
            Self::FetchError { context, .. } => format!("Failed to fetch {}", context),
            Self::CreateError { context, .. } => format!("Failed to create {}", context),
            Self::SessionCreateFailed(_) => "Failed to create checkout session".to_string(),
            Self::WebhookProcessingFailed(_) => "Webhook processing failed".to_string(),
            Self::OfferingNoProduct(_) => {
                "This workshop is not yet open for payment. Please contact us.".to_string()
            }
            Self::Internal(_) => "Internal server error".to_string(),
            _ => self.to_string(),
        }
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(code = self.code(), error = %self, "request failed");
        } else {
            tracing::warn!(code = self.code(), error = %self, "request rejected");
        }

        let body = ErrorResponse {
            success: false,
            error: ErrorBody {
                code: self.code().to_string(),
                message: self.response_message(),
            },
            request_id: current_request_id(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        };

        (status, Json(body)).into_response()
    }
}
