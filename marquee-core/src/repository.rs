use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use marquee_domain::booking::Booking;
use marquee_domain::idempotency::IdempotencyRecord;
use marquee_domain::payment::Payment;
use marquee_domain::showtime::Showtime;

/// Store failures the orchestrators care to distinguish. Unique-index
/// collisions are the only cross-process mutex in the design, so `Duplicate`
/// must be branchable; everything else is opaque.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("unique constraint violated: {constraint}")]
    Duplicate { constraint: String },
    #[error("store error: {0}")]
    Backend(String),
}

impl StoreError {
    pub fn duplicate(constraint: impl Into<String>) -> Self {
        StoreError::Duplicate { constraint: constraint.into() }
    }

    pub fn backend(err: impl std::fmt::Display) -> Self {
        StoreError::Backend(err.to_string())
    }

    pub fn is_duplicate_on(&self, constraint: &str) -> bool {
        matches!(self, StoreError::Duplicate { constraint: c } if c.contains(constraint))
    }
}

#[async_trait]
pub trait BookingRepository: Send + Sync {
    /// Insert a new pending booking. `Duplicate` carries the violated
    /// constraint name (`booking_code` or `idempotency_key`).
    async fn create(&self, booking: &Booking) -> Result<(), StoreError>;

    async fn get(&self, id: Uuid) -> Result<Option<Booking>, StoreError>;

    async fn get_by_idempotency_key(&self, key: &str) -> Result<Option<Booking>, StoreError>;

    /// `pending -> confirmed`, gated on the current status. Returns whether a
    /// row was updated.
    async fn mark_confirmed(&self, id: Uuid, at: DateTime<Utc>) -> Result<bool, StoreError>;

    /// `pending -> cancelled` with a reason, gated on the current status.
    async fn mark_cancelled(
        &self,
        id: Uuid,
        reason: &str,
        at: DateTime<Utc>,
    ) -> Result<bool, StoreError>;

    /// `pending -> expired`, gated on the current status.
    async fn mark_expired(&self, id: Uuid, at: DateTime<Utc>) -> Result<bool, StoreError>;

    async fn set_payment_id(&self, id: Uuid, payment_id: Uuid) -> Result<(), StoreError>;

    /// Pending bookings whose hold deadline has passed, oldest first.
    async fn find_expired_pending(
        &self,
        now: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<Booking>, StoreError>;
}

#[async_trait]
pub trait PaymentRepository: Send + Sync {
    /// Insert a pending payment. `Duplicate` on `idempotency_key` means a
    /// concurrent create won the race; read back and return the winner.
    async fn create(&self, payment: &Payment) -> Result<(), StoreError>;

    async fn get(&self, id: Uuid) -> Result<Option<Payment>, StoreError>;

    async fn get_by_idempotency_key(&self, key: &str) -> Result<Option<Payment>, StoreError>;

    async fn get_by_gateway_transaction_id(&self, txn: &str)
        -> Result<Option<Payment>, StoreError>;

    /// Latest payment on the booking that has not failed, if any.
    async fn find_current_by_booking(&self, booking_id: Uuid)
        -> Result<Option<Payment>, StoreError>;

    /// `pending -> processing` with gateway details, gated on `pending`.
    async fn mark_processing(
        &self,
        id: Uuid,
        gateway_transaction_id: &str,
        payment_url: &str,
    ) -> Result<bool, StoreError>;

    /// Atomic `status <> completed -> completed` keyed by the gateway
    /// transaction id; bumps `version`, sets `paid_at`. Returns the updated
    /// payment, or `None` when the guard lost (already completed).
    async fn mark_completed(
        &self,
        gateway_transaction_id: &str,
        paid_at: DateTime<Utc>,
    ) -> Result<Option<Payment>, StoreError>;

    /// Atomic `status <> completed -> failed`; bumps `version`. Returns the
    /// updated payment, or `None` when nothing matched the guard.
    async fn mark_failed(&self, gateway_transaction_id: &str)
        -> Result<Option<Payment>, StoreError>;
}

#[async_trait]
pub trait IdempotencyRepository: Send + Sync {
    /// Insert a record in `processing`. `Duplicate` means another request with
    /// the same `(key, user_id)` got there first.
    async fn insert_processing(&self, record: &IdempotencyRecord) -> Result<(), StoreError>;

    async fn get(&self, key: &str, user_id: Uuid) -> Result<Option<IdempotencyRecord>, StoreError>;

    /// `processing -> completed` with the response envelope. No-op (false) if
    /// the record already advanced.
    async fn complete(
        &self,
        key: &str,
        user_id: Uuid,
        response_status: i32,
        response_body: &serde_json::Value,
        resource_id: Option<&str>,
    ) -> Result<bool, StoreError>;

    /// `processing -> failed` with the captured error envelope, so a retry
    /// with the same key replays the same failure.
    async fn fail(
        &self,
        key: &str,
        user_id: Uuid,
        response_status: i32,
        response_body: &serde_json::Value,
        error_message: &str,
    ) -> Result<bool, StoreError>;

    /// Delete records past `expires_at`; the durable stand-in for a TTL index.
    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64, StoreError>;
}

#[async_trait]
pub trait ShowtimeRepository: Send + Sync {
    async fn get(&self, id: Uuid) -> Result<Option<Showtime>, StoreError>;
}
