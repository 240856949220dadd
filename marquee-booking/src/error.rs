use thiserror::Error;

use marquee_core::engine::UnavailableSeat;
use marquee_core::envelope::error_envelope;
use marquee_core::idempotency::IdempotencyError;
use marquee_core::repository::StoreError;

#[derive(Debug, Error)]
pub enum BookingError {
    #[error("showtime not found")]
    ShowtimeNotFound,
    #[error("showtime is not open for booking")]
    ShowtimeNotAvailable,
    #[error("showtime has already started")]
    ShowtimeAlreadyStarted,
    #[error("unknown seat: {0}")]
    InvalidSeat(String),
    #[error("{0}")]
    Validation(String),
    #[error("requested seats are not available")]
    SeatsNotAvailable { unavailable: Vec<UnavailableSeat> },
    #[error("failed to persist booking")]
    PersistFailed,
    #[error("booking not found")]
    NotFound,
    #[error("booking does not belong to the caller")]
    NotOwned,
    #[error("booking can no longer be cancelled")]
    CannotCancel,
    /// A prior attempt with this idempotency key failed; the cached envelope
    /// is replayed verbatim.
    #[error("replayed cached failure")]
    ReplayedFailure { status_code: u16, body: serde_json::Value },
    #[error(transparent)]
    Idempotency(#[from] IdempotencyError),
    #[error("reservation engine failure: {0}")]
    Engine(String),
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl BookingError {
    pub fn status_code(&self) -> u16 {
        match self {
            BookingError::ReplayedFailure { status_code, .. } => *status_code,
            BookingError::ShowtimeNotFound | BookingError::NotFound => 404,
            BookingError::NotOwned => 403,
            BookingError::SeatsNotAvailable { .. } => 409,
            BookingError::ShowtimeNotAvailable
            | BookingError::ShowtimeAlreadyStarted
            | BookingError::InvalidSeat(_)
            | BookingError::Validation(_)
            | BookingError::CannotCancel => 400,
            BookingError::Idempotency(IdempotencyError::KeyReusedDifferentBody)
            | BookingError::Idempotency(IdempotencyError::InvalidKey(_)) => 400,
            BookingError::Idempotency(IdempotencyError::RequestInFlight) => 409,
            BookingError::PersistFailed
            | BookingError::Engine(_)
            | BookingError::Store(_)
            | BookingError::Idempotency(IdempotencyError::Store(_)) => 500,
        }
    }

    pub fn error_code(&self) -> &'static str {
        match self {
            BookingError::ReplayedFailure { .. } => "REPLAYED_FAILURE",
            BookingError::ShowtimeNotFound => "SHOWTIME_NOT_FOUND",
            BookingError::ShowtimeNotAvailable => "SHOWTIME_NOT_AVAILABLE",
            BookingError::ShowtimeAlreadyStarted => "SHOWTIME_ALREADY_STARTED",
            BookingError::InvalidSeat(_) => "INVALID_SEAT",
            BookingError::Validation(_) => "VALIDATION",
            BookingError::SeatsNotAvailable { .. } => "SEATS_NOT_AVAILABLE",
            BookingError::PersistFailed => "BOOKING_PERSIST_FAILED",
            BookingError::NotFound => "BOOKING_NOT_FOUND",
            BookingError::NotOwned => "BOOKING_NOT_OWNED",
            BookingError::CannotCancel => "BOOKING_CANNOT_BE_CANCELLED",
            BookingError::Idempotency(IdempotencyError::KeyReusedDifferentBody) => {
                "KEY_REUSED_DIFFERENT_BODY"
            }
            BookingError::Idempotency(IdempotencyError::RequestInFlight) => "REQUEST_IN_FLIGHT",
            BookingError::Idempotency(IdempotencyError::InvalidKey(_)) => "INVALID_IDEMPOTENCY_KEY",
            BookingError::Idempotency(IdempotencyError::Store(_))
            | BookingError::Store(_) => "INTERNAL_ERROR",
            BookingError::Engine(_) => "ENGINE_ERROR",
        }
    }

    /// The categorized envelope for this failure, exactly as the client sees
    /// it; the idempotency layer caches this same value so retries replay it
    /// byte for byte.
    pub fn envelope(&self) -> serde_json::Value {
        let mut envelope = error_envelope(self.status_code(), self.error_code(), &self.to_string());
        if let BookingError::SeatsNotAvailable { unavailable } = self {
            envelope["unavailable"] =
                serde_json::to_value(unavailable).unwrap_or(serde_json::Value::Null);
        }
        envelope
    }
}
