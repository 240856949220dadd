use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use marquee_core::engine::{ReservationEngine, ReserveOutcome, SeatToReserve};
use marquee_core::idempotency::{IdempotencyCheck, IdempotencyGuard};
use marquee_core::repository::{BookingRepository, ShowtimeRepository, StoreError};
use marquee_core::sink::SeatConfirmSink;
use marquee_domain::booking::{Booking, BookingSeat, BookingStatus};
use marquee_domain::idempotency::ResourceType;
use marquee_domain::showtime::ShowtimeStatus;

use crate::codes;
use crate::error::BookingError;

const HOLD_PATH: &str = "/v1/bookings/hold";

#[derive(Debug, Clone)]
pub struct BookingPolicy {
    pub hold_duration_seconds: u64,
    pub max_seats_per_booking: usize,
    pub reaper_batch_size: i64,
}

impl Default for BookingPolicy {
    fn default() -> Self {
        Self { hold_duration_seconds: 600, max_seats_per_booking: 10, reaper_batch_size: 100 }
    }
}

#[derive(Debug, Clone)]
pub struct HoldSeatsRequest {
    pub showtime_id: Uuid,
    pub seats: Vec<String>,
    pub user_id: Uuid,
    pub idempotency_key: String,
    /// Request body as received; hashed for the dedup record.
    pub raw_body: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HoldSeatsResponse {
    pub booking_id: Uuid,
    pub booking_code: String,
    pub showtime_id: Uuid,
    pub seats: Vec<BookingSeat>,
    pub total_amount: i64,
    pub discount_amount: i64,
    pub final_amount: i64,
    pub currency: String,
    pub status: BookingStatus,
    pub hold_expires_at: DateTime<Utc>,
}

impl HoldSeatsResponse {
    pub fn from_booking(booking: &Booking) -> Self {
        Self {
            booking_id: booking.id,
            booking_code: booking.booking_code.clone(),
            showtime_id: booking.showtime_id,
            seats: booking.seats.clone(),
            total_amount: booking.total_amount,
            discount_amount: booking.discount_amount,
            final_amount: booking.final_amount,
            currency: booking.currency.clone(),
            status: booking.status,
            hold_expires_at: booking.hold_expires_at,
        }
    }
}

/// Wraps the reservation engine with the durable booking record: engine
/// first, durable commit second, compensating release when the commit fails.
pub struct BookingOrchestrator {
    engine: Arc<dyn ReservationEngine>,
    bookings: Arc<dyn BookingRepository>,
    showtimes: Arc<dyn ShowtimeRepository>,
    guard: IdempotencyGuard,
    policy: BookingPolicy,
}

impl BookingOrchestrator {
    pub fn new(
        engine: Arc<dyn ReservationEngine>,
        bookings: Arc<dyn BookingRepository>,
        showtimes: Arc<dyn ShowtimeRepository>,
        guard: IdempotencyGuard,
        policy: BookingPolicy,
    ) -> Self {
        Self { engine, bookings, showtimes, guard, policy }
    }

    #[instrument(skip(self, request), fields(showtime_id = %request.showtime_id, user_id = %request.user_id))]
    pub async fn hold_seats(
        &self,
        request: HoldSeatsRequest,
    ) -> Result<HoldSeatsResponse, BookingError> {
        match self
            .guard
            .begin(
                &request.idempotency_key,
                request.user_id,
                HOLD_PATH,
                ResourceType::Booking,
                &request.raw_body,
            )
            .await
        {
            Ok(IdempotencyCheck::New) => {}
            Ok(IdempotencyCheck::Replay { status_code, body }) => {
                if status_code < 400 {
                    return serde_json::from_value(body)
                        .map_err(|e| StoreError::backend(format!("cached response: {e}")).into());
                }
                return Err(BookingError::ReplayedFailure {
                    status_code: status_code as u16,
                    body,
                });
            }
            Err(err) => return Err(err.into()),
        }

        // Durable belt: a crash after persist but before the dedup record
        // advanced leaves the booking behind. Rebuild the response from it.
        if let Some(existing) =
            self.bookings.get_by_idempotency_key(&request.idempotency_key).await?
        {
            let response = HoldSeatsResponse::from_booking(&existing);
            self.finish_completed(&request, &response).await?;
            return Ok(response);
        }

        match self.hold_seats_inner(&request).await {
            Ok(response) => {
                self.finish_completed(&request, &response).await?;
                Ok(response)
            }
            Err(err) => {
                let envelope = err.envelope();
                if let Err(record_err) = self
                    .guard
                    .fail(
                        &request.idempotency_key,
                        request.user_id,
                        err.status_code() as i32,
                        &envelope,
                        &err.to_string(),
                    )
                    .await
                {
                    warn!(error = %record_err, "failed to record idempotent failure");
                }
                Err(err)
            }
        }
    }

    async fn finish_completed(
        &self,
        request: &HoldSeatsRequest,
        response: &HoldSeatsResponse,
    ) -> Result<(), BookingError> {
        let body = serde_json::to_value(response)
            .map_err(|e| StoreError::backend(format!("encode response: {e}")))?;
        self.guard
            .complete(
                &request.idempotency_key,
                request.user_id,
                201,
                &body,
                Some(&response.booking_id.to_string()),
            )
            .await?;
        Ok(())
    }

    async fn hold_seats_inner(
        &self,
        request: &HoldSeatsRequest,
    ) -> Result<HoldSeatsResponse, BookingError> {
        if request.seats.is_empty() {
            return Err(BookingError::Validation("at least one seat is required".into()));
        }
        if request.seats.len() > self.policy.max_seats_per_booking {
            return Err(BookingError::Validation(format!(
                "at most {} seats per booking",
                self.policy.max_seats_per_booking
            )));
        }
        let mut seen = HashSet::new();
        for seat_id in &request.seats {
            if !seen.insert(seat_id) {
                return Err(BookingError::Validation(format!("seat {seat_id} requested twice")));
            }
        }

        let showtime = self
            .showtimes
            .get(request.showtime_id)
            .await?
            .ok_or(BookingError::ShowtimeNotFound)?;
        if showtime.status != ShowtimeStatus::Scheduled {
            return Err(BookingError::ShowtimeNotAvailable);
        }
        let now = Utc::now();
        if showtime.start_time <= now {
            return Err(BookingError::ShowtimeAlreadyStarted);
        }

        let mut seats = Vec::with_capacity(request.seats.len());
        let mut to_reserve = Vec::with_capacity(request.seats.len());
        for seat_id in &request.seats {
            let info = showtime
                .seat_info(seat_id)
                .ok_or_else(|| BookingError::InvalidSeat(seat_id.clone()))?;
            seats.push(BookingSeat {
                seat_id: info.seat_id.clone(),
                seat_type: info.seat_type,
                price: info.price,
            });
            to_reserve.push(SeatToReserve {
                seat_id: info.seat_id.clone(),
                seat_type: info.seat_type,
            });
        }

        // Mint the id first: the engine holds under it, and a failed durable
        // commit compensates under the same id.
        let booking_id = Uuid::new_v4();
        let outcome = self
            .engine
            .batch_reserve(
                request.showtime_id,
                booking_id,
                self.policy.hold_duration_seconds,
                &to_reserve,
            )
            .await
            .map_err(|e| BookingError::Engine(e.to_string()))?;
        match outcome {
            ReserveOutcome::Reserved { .. } => {}
            ReserveOutcome::Unavailable { seats } => {
                return Err(BookingError::SeatsNotAvailable { unavailable: seats });
            }
        }

        let total_amount: i64 = seats.iter().map(|s| s.price).sum();
        let mut booking = Booking {
            id: booking_id,
            booking_code: codes::booking_code(),
            user_id: request.user_id,
            showtime_id: request.showtime_id,
            seats,
            total_amount,
            discount_amount: 0,
            final_amount: total_amount,
            currency: showtime.currency.clone(),
            status: BookingStatus::Pending,
            held_at: now,
            hold_expires_at: now + Duration::seconds(self.policy.hold_duration_seconds as i64),
            idempotency_key: request.idempotency_key.clone(),
            confirmed_at: None,
            cancelled_at: None,
            cancellation_reason: None,
            payment_id: None,
            created_at: now,
            updated_at: now,
        };

        let mut code_retries = 0;
        loop {
            match self.bookings.create(&booking).await {
                Ok(()) => break,
                Err(err @ StoreError::Duplicate { .. })
                    if err.is_duplicate_on("booking_code") && code_retries == 0 =>
                {
                    // Birthday-bound collision on the short code; one fresh
                    // draw, then give up.
                    code_retries += 1;
                    booking.booking_code = codes::booking_code();
                }
                Err(err @ StoreError::Duplicate { .. })
                    if err.is_duplicate_on("idempotency_key") =>
                {
                    // A concurrent request with the same key won the durable
                    // race; drop our hold and serve the winner's booking.
                    self.compensate_release(&booking).await;
                    let winner = self
                        .bookings
                        .get_by_idempotency_key(&request.idempotency_key)
                        .await?
                        .ok_or(BookingError::PersistFailed)?;
                    return Ok(HoldSeatsResponse::from_booking(&winner));
                }
                Err(err) => {
                    error!(error = %err, %booking_id, "booking persist failed, releasing seats");
                    self.compensate_release(&booking).await;
                    return Err(BookingError::PersistFailed);
                }
            }
        }

        info!(%booking_id, code = %booking.booking_code, "seats held");
        Ok(HoldSeatsResponse::from_booking(&booking))
    }

    /// Once batch-reserve has succeeded the handler must either persist the
    /// booking or give the seats back; if even this fails the engine's lazy
    /// reap frees them at hold expiry.
    async fn compensate_release(&self, booking: &Booking) {
        if let Err(err) = self
            .engine
            .release_seats(booking.showtime_id, booking.id, &booking.seat_ids())
            .await
        {
            error!(
                error = %err,
                booking_id = %booking.id,
                "compensating release failed; holds will lapse on their own"
            );
        }
    }

    pub async fn get_booking(&self, id: Uuid, user_id: Uuid) -> Result<Booking, BookingError> {
        let booking = self.bookings.get(id).await?.ok_or(BookingError::NotFound)?;
        if booking.user_id != user_id {
            return Err(BookingError::NotOwned);
        }
        Ok(booking)
    }

    #[instrument(skip(self), fields(%id, %user_id))]
    pub async fn cancel_booking(&self, id: Uuid, user_id: Uuid) -> Result<Booking, BookingError> {
        let booking = self.bookings.get(id).await?.ok_or(BookingError::NotFound)?;
        if booking.user_id != user_id {
            return Err(BookingError::NotOwned);
        }
        if booking.status != BookingStatus::Pending {
            return Err(BookingError::CannotCancel);
        }

        self.engine
            .release_seats(booking.showtime_id, booking.id, &booking.seat_ids())
            .await
            .map_err(|e| BookingError::Engine(e.to_string()))?;

        let now = Utc::now();
        if !self.bookings.mark_cancelled(booking.id, "Cancelled by user", now).await? {
            return Err(BookingError::CannotCancel);
        }
        self.bookings.get(booking.id).await?.ok_or(BookingError::NotFound)
    }

    /// One reaper tick: page pending bookings past their hold deadline,
    /// release their seats, mark them expired. Per-booking failures are
    /// logged and skipped so one bad row cannot wedge the sweep.
    pub async fn run_expiry_pass(&self) -> Result<Vec<Booking>, BookingError> {
        let now = Utc::now();
        let lapsed =
            self.bookings.find_expired_pending(now, self.policy.reaper_batch_size).await?;
        let mut expired = Vec::new();
        for booking in lapsed {
            // The engine only releases seats still owned by this booking_id,
            // so a sweep can never free another booking's holds.
            if let Err(err) = self
                .engine
                .release_seats(booking.showtime_id, booking.id, &booking.seat_ids())
                .await
            {
                error!(error = %err, booking_id = %booking.id, "expiry release failed");
                continue;
            }
            match self.bookings.mark_expired(booking.id, now).await {
                Ok(true) => {
                    info!(booking_id = %booking.id, "booking expired");
                    expired.push(booking);
                }
                Ok(false) => {} // advanced underneath us; nothing to do
                Err(err) => {
                    error!(error = %err, booking_id = %booking.id, "expiry mark failed");
                }
            }
        }
        Ok(expired)
    }
}

#[async_trait]
impl SeatConfirmSink for BookingOrchestrator {
    async fn confirm_after_payment(
        &self,
        booking_id: Uuid,
    ) -> Result<bool, Box<dyn std::error::Error + Send + Sync>> {
        let Some(booking) = self.bookings.get(booking_id).await? else {
            return Ok(false);
        };
        let outcome = self
            .engine
            .confirm_seats(booking.showtime_id, booking.id, &booking.seat_ids())
            .await?;
        if outcome.is_full() {
            self.bookings.mark_confirmed(booking.id, Utc::now()).await?;
            info!(%booking_id, "booking confirmed after payment");
        } else {
            // Deliberately no rollback of the seats that did confirm: the
            // partial set stays visible for operators to resolve.
            warn!(
                %booking_id,
                confirmed = ?outcome.confirmed,
                failed = ?outcome.failed,
                "partial seat confirmation; booking left pending"
            );
        }
        Ok(true)
    }

    async fn release_after_payment_failure(
        &self,
        booking_id: Uuid,
    ) -> Result<bool, Box<dyn std::error::Error + Send + Sync>> {
        let Some(booking) = self.bookings.get(booking_id).await? else {
            return Ok(false);
        };
        self.engine
            .release_seats(booking.showtime_id, booking.id, &booking.seat_ids())
            .await?;
        self.bookings.mark_cancelled(booking.id, "Payment failed", Utc::now()).await?;
        info!(%booking_id, "booking cancelled after payment failure");
        Ok(true)
    }
}
