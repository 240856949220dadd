use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use marquee_domain::seat::{SeatType, SeatView};
use marquee_domain::showtime::SeatInfo;

pub type EngineResult<T> = Result<T, Box<dyn std::error::Error + Send + Sync>>;

/// A seat requested for reservation, with the type the caller resolved from
/// showtime metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeatToReserve {
    pub seat_id: String,
    pub seat_type: SeatType,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnavailableReason {
    Booked,
    Held,
    NotFound,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnavailableSeat {
    pub seat_id: String,
    pub reason: UnavailableReason,
}

/// Result of the all-or-nothing batch reserve.
#[derive(Debug, Clone)]
pub enum ReserveOutcome {
    /// Every requested seat is now held under the booking.
    Reserved { count: u32, expires_at: i64 },
    /// Nothing was mutated; these seats were not reservable.
    Unavailable { seats: Vec<UnavailableSeat> },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfirmFailReason {
    NotFound,
    NotHeld,
    WrongBooking,
    HoldExpired,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfirmFailure {
    pub seat_id: String,
    pub reason: ConfirmFailReason,
}

/// Per-seat confirm result. Already-confirmed seats are never rolled back
/// within the call, so a partial outcome is an auditable state, not an error.
#[derive(Debug, Clone)]
pub struct ConfirmOutcome {
    pub confirmed: Vec<String>,
    pub failed: Vec<ConfirmFailure>,
}

impl ConfirmOutcome {
    pub fn is_full(&self) -> bool {
        self.failed.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReleaseFailReason {
    NotFound,
    WrongBooking,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReleaseFailure {
    pub seat_id: String,
    pub reason: ReleaseFailReason,
}

#[derive(Debug, Clone)]
pub struct ReleaseOutcome {
    pub released: Vec<String>,
    pub failed: Vec<ReleaseFailure>,
    /// Counter value after the release.
    pub available: i64,
}

#[derive(Debug, Clone)]
pub struct CleanupOutcome {
    pub released: Vec<String>,
    pub available: i64,
}

#[derive(Debug, Clone)]
pub struct SeatTableStatus {
    pub seats: Vec<SeatView>,
    pub available: i64,
}

#[derive(Debug, Clone)]
pub struct ExtendOutcome {
    pub extended: u32,
}

/// The atomic seat-state subsystem. Implementations serialize each operation
/// against the backing store; per-seat linearizability comes from nothing
/// else.
///
/// `confirm`, `release`, `cleanup` and `extend` are idempotent over
/// `(booking_id, seat_id)`. `batch_reserve` is not safe to retry blindly.
#[async_trait]
pub trait ReservationEngine: Send + Sync {
    /// All-or-nothing hold of `seats` under `booking_id`. The hold expiry is
    /// computed from the store's clock plus `hold_duration_seconds`.
    async fn batch_reserve(
        &self,
        showtime_id: Uuid,
        booking_id: Uuid,
        hold_duration_seconds: u64,
        seats: &[SeatToReserve],
    ) -> EngineResult<ReserveOutcome>;

    /// Flip held seats to booked where the booking matches and the hold is
    /// still live. Does not touch the available counter.
    async fn confirm_seats(
        &self,
        showtime_id: Uuid,
        booking_id: Uuid,
        seat_ids: &[String],
    ) -> EngineResult<ConfirmOutcome>;

    /// Return seats owned by `booking_id` (held or booked) to the pool.
    async fn release_seats(
        &self,
        showtime_id: Uuid,
        booking_id: Uuid,
        seat_ids: &[String],
    ) -> EngineResult<ReleaseOutcome>;

    /// Release every seat whose hold has lapsed.
    async fn cleanup_expired_holds(&self, showtime_id: Uuid) -> EngineResult<CleanupOutcome>;

    /// Read seat state, lazily reaping expired holds on the way.
    async fn seats_status(
        &self,
        showtime_id: Uuid,
        seat_ids: Option<&[String]>,
    ) -> EngineResult<SeatTableStatus>;

    /// Push `held_until` out by `additional_seconds` for live holds of this
    /// booking. Never revives an expired hold.
    async fn extend_hold(
        &self,
        showtime_id: Uuid,
        booking_id: Uuid,
        seat_ids: &[String],
        additional_seconds: u64,
    ) -> EngineResult<ExtendOutcome>;

    /// Seed the seat table and counter for a showtime and apply the TTL.
    async fn init_seat_table(
        &self,
        showtime_id: Uuid,
        seats: &[SeatInfo],
        ttl_seconds: u64,
    ) -> EngineResult<u32>;
}
