use thiserror::Error;

use marquee_core::idempotency::IdempotencyError;
use marquee_core::repository::StoreError;

#[derive(Debug, Error)]
pub enum PaymentError {
    #[error("{0}")]
    Validation(String),
    #[error("unsupported payment provider: {0}")]
    BadProvider(String),
    #[error("booking not found")]
    BookingNotFound,
    #[error("booking does not belong to the caller")]
    BookingNotOwned,
    #[error("booking is not awaiting payment")]
    BookingNotPending,
    #[error("booking hold has expired")]
    BookingHoldExpired,
    #[error("booking is already paid")]
    BookingAlreadyPaid,
    #[error("payment not found")]
    NotFound,
    #[error("payment does not belong to the caller")]
    NotOwned,
    /// A prior attempt with this idempotency key failed; the cached envelope
    /// is replayed verbatim.
    #[error("replayed cached failure")]
    ReplayedFailure { status_code: u16, body: serde_json::Value },
    #[error(transparent)]
    Idempotency(#[from] IdempotencyError),
    #[error("payment gateway failure: {0}")]
    Gateway(String),
    #[error("seat reconciliation failure: {0}")]
    Reconcile(String),
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl PaymentError {
    pub fn status_code(&self) -> u16 {
        match self {
            PaymentError::ReplayedFailure { status_code, .. } => *status_code,
            PaymentError::BookingNotFound | PaymentError::NotFound => 404,
            PaymentError::BookingNotOwned | PaymentError::NotOwned => 403,
            PaymentError::BookingAlreadyPaid => 409,
            PaymentError::Validation(_)
            | PaymentError::BadProvider(_)
            | PaymentError::BookingNotPending
            | PaymentError::BookingHoldExpired => 400,
            PaymentError::Idempotency(IdempotencyError::KeyReusedDifferentBody)
            | PaymentError::Idempotency(IdempotencyError::InvalidKey(_)) => 400,
            PaymentError::Idempotency(IdempotencyError::RequestInFlight) => 409,
            PaymentError::Idempotency(IdempotencyError::Store(_))
            | PaymentError::Gateway(_)
            | PaymentError::Reconcile(_)
            | PaymentError::Store(_) => 500,
        }
    }

    pub fn error_code(&self) -> &'static str {
        match self {
            PaymentError::ReplayedFailure { .. } => "REPLAYED_FAILURE",
            PaymentError::Validation(_) => "VALIDATION",
            PaymentError::BadProvider(_) => "BAD_PROVIDER",
            PaymentError::BookingNotFound => "BOOKING_NOT_FOUND",
            PaymentError::BookingNotOwned => "BOOKING_NOT_OWNED",
            PaymentError::BookingNotPending => "BOOKING_NOT_PENDING",
            PaymentError::BookingHoldExpired => "BOOKING_HOLD_EXPIRED",
            PaymentError::BookingAlreadyPaid => "BOOKING_ALREADY_PAID",
            PaymentError::NotFound => "PAYMENT_NOT_FOUND",
            PaymentError::NotOwned => "PAYMENT_NOT_OWNED",
            PaymentError::Idempotency(IdempotencyError::KeyReusedDifferentBody) => {
                "KEY_REUSED_DIFFERENT_BODY"
            }
            PaymentError::Idempotency(IdempotencyError::RequestInFlight) => "REQUEST_IN_FLIGHT",
            PaymentError::Idempotency(IdempotencyError::InvalidKey(_)) => "INVALID_IDEMPOTENCY_KEY",
            PaymentError::Gateway(_) => "GATEWAY_ERROR",
            PaymentError::Reconcile(_) => "RECONCILE_ERROR",
            PaymentError::Idempotency(IdempotencyError::Store(_)) | PaymentError::Store(_) => {
                "INTERNAL_ERROR"
            }
        }
    }

    /// The categorized envelope for this failure; cached by the idempotency
    /// layer so retries replay it byte for byte.
    pub fn envelope(&self) -> serde_json::Value {
        marquee_core::envelope::error_envelope(
            self.status_code(),
            self.error_code(),
            &self.to_string(),
        )
    }
}
