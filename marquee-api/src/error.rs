use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::Value;
use thiserror::Error;

use marquee_booking::BookingError;
use marquee_core::envelope::error_envelope;
use marquee_payment::PaymentError;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Booking(#[from] BookingError),
    #[error(transparent)]
    Payment(#[from] PaymentError),
    #[error("{0}")]
    Validation(String),
    #[error("authentication required")]
    Unauthorized,
    #[error("internal server error: {0}")]
    Internal(String),
}

impl ApiError {
    /// The `(status, body)` pair for this failure. Cached failure envelopes
    /// replay verbatim; domain errors render the same envelope the
    /// idempotency layer caches.
    fn response_parts(&self) -> (u16, Value) {
        match self {
            ApiError::Booking(BookingError::ReplayedFailure { status_code, body })
            | ApiError::Payment(PaymentError::ReplayedFailure { status_code, body }) => {
                (*status_code, body.clone())
            }
            ApiError::Booking(err) => (err.status_code(), err.envelope()),
            ApiError::Payment(err) => (err.status_code(), err.envelope()),
            ApiError::Validation(msg) => (400, error_envelope(400, "VALIDATION", msg)),
            ApiError::Unauthorized => {
                (401, error_envelope(401, "UNAUTHORIZED", &self.to_string()))
            }
            ApiError::Internal(_) => {
                (500, error_envelope(500, "INTERNAL_ERROR", "Internal Server Error"))
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = self.response_parts();
        if status >= 500 {
            tracing::error!("Internal Server Error: {}", self);
        }
        let status = StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(body)).into_response()
    }
}
