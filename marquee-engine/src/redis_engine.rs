use async_trait::async_trait;
use serde::Deserialize;
use tracing::instrument;
use uuid::Uuid;

use marquee_core::engine::{
    CleanupOutcome, ConfirmFailure, ConfirmOutcome, EngineResult, ExtendOutcome, ReleaseFailure,
    ReleaseOutcome, ReservationEngine, ReserveOutcome, SeatTableStatus, SeatToReserve,
    UnavailableSeat,
};
use marquee_domain::seat::{SeatRecord, SeatView};
use marquee_domain::showtime::SeatInfo;

use crate::error::EngineError;
use crate::runtime::ScriptRuntime;

pub fn seats_key(showtime_id: Uuid) -> String {
    format!("seats:{showtime_id}")
}

pub fn available_key(showtime_id: Uuid) -> String {
    format!("available:{showtime_id}")
}

/// Seat engine over the shared store's script runtime. Holds no state of its
/// own; per-seat linearizability comes entirely from one-script-at-a-time
/// execution on the store side.
pub struct RedisSeatEngine {
    runtime: ScriptRuntime,
}

impl RedisSeatEngine {
    pub fn new(runtime: ScriptRuntime) -> Self {
        Self { runtime }
    }

    fn keys(showtime_id: Uuid) -> [String; 2] {
        [seats_key(showtime_id), available_key(showtime_id)]
    }

    async fn invoke_json<T: serde::de::DeserializeOwned>(
        &self,
        script: &'static str,
        showtime_id: Uuid,
        args: &[String],
    ) -> Result<T, EngineError> {
        let raw: String = self.runtime.invoke(script, &Self::keys(showtime_id), args).await?;
        Ok(serde_json::from_str(&raw)?)
    }
}

#[derive(Debug, Deserialize)]
struct RawReserve {
    success: bool,
    #[serde(default)]
    reserved: u32,
    #[serde(default)]
    expires_at: i64,
    #[serde(default)]
    unavailable: Vec<UnavailableSeat>,
}

#[derive(Debug, Deserialize)]
struct RawConfirm {
    #[serde(default)]
    confirmed: Vec<String>,
    #[serde(default)]
    failed: Vec<ConfirmFailure>,
}

#[derive(Debug, Deserialize)]
struct RawRelease {
    #[serde(default)]
    released: Vec<String>,
    #[serde(default)]
    failed: Vec<ReleaseFailure>,
    available: i64,
}

#[derive(Debug, Deserialize)]
struct RawCleanup {
    #[serde(default)]
    released: Vec<String>,
    available: i64,
}

#[derive(Debug, Deserialize)]
struct RawStatus {
    #[serde(default)]
    seats: Vec<RawSeatView>,
    available: i64,
}

#[derive(Debug, Deserialize)]
struct RawSeatView {
    seat_id: String,
    #[serde(flatten)]
    record: SeatRecord,
    #[serde(default)]
    remaining_seconds: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct RawExtend {
    extended: u32,
}

#[async_trait]
impl ReservationEngine for RedisSeatEngine {
    #[instrument(skip(self, seats), fields(%showtime_id, %booking_id, count = seats.len()))]
    async fn batch_reserve(
        &self,
        showtime_id: Uuid,
        booking_id: Uuid,
        hold_duration_seconds: u64,
        seats: &[SeatToReserve],
    ) -> EngineResult<ReserveOutcome> {
        if seats.is_empty() {
            return Err(EngineError::InvalidInput("empty seat list".into()).into());
        }
        if hold_duration_seconds == 0 {
            return Err(EngineError::InvalidInput("non-positive hold duration".into()).into());
        }
        let raw: RawReserve = self
            .invoke_json(
                "batch_reserve",
                showtime_id,
                &[
                    booking_id.to_string(),
                    hold_duration_seconds.to_string(),
                    serde_json::to_string(seats).map_err(EngineError::from)?,
                ],
            )
            .await?;
        Ok(if raw.success {
            ReserveOutcome::Reserved { count: raw.reserved, expires_at: raw.expires_at }
        } else {
            ReserveOutcome::Unavailable { seats: raw.unavailable }
        })
    }

    #[instrument(skip(self, seat_ids), fields(%showtime_id, %booking_id))]
    async fn confirm_seats(
        &self,
        showtime_id: Uuid,
        booking_id: Uuid,
        seat_ids: &[String],
    ) -> EngineResult<ConfirmOutcome> {
        let raw: RawConfirm = self
            .invoke_json(
                "confirm_seats",
                showtime_id,
                &[
                    booking_id.to_string(),
                    serde_json::to_string(seat_ids).map_err(EngineError::from)?,
                ],
            )
            .await?;
        Ok(ConfirmOutcome { confirmed: raw.confirmed, failed: raw.failed })
    }

    #[instrument(skip(self, seat_ids), fields(%showtime_id, %booking_id))]
    async fn release_seats(
        &self,
        showtime_id: Uuid,
        booking_id: Uuid,
        seat_ids: &[String],
    ) -> EngineResult<ReleaseOutcome> {
        let raw: RawRelease = self
            .invoke_json(
                "release_seats",
                showtime_id,
                &[
                    booking_id.to_string(),
                    serde_json::to_string(seat_ids).map_err(EngineError::from)?,
                ],
            )
            .await?;
        Ok(ReleaseOutcome { released: raw.released, failed: raw.failed, available: raw.available })
    }

    #[instrument(skip(self), fields(%showtime_id))]
    async fn cleanup_expired_holds(&self, showtime_id: Uuid) -> EngineResult<CleanupOutcome> {
        let raw: RawCleanup =
            self.invoke_json("cleanup_expired_holds", showtime_id, &[]).await?;
        Ok(CleanupOutcome { released: raw.released, available: raw.available })
    }

    #[instrument(skip(self, seat_ids), fields(%showtime_id))]
    async fn seats_status(
        &self,
        showtime_id: Uuid,
        seat_ids: Option<&[String]>,
    ) -> EngineResult<SeatTableStatus> {
        let filter = match seat_ids {
            Some(ids) => serde_json::to_string(ids).map_err(EngineError::from)?,
            None => String::new(),
        };
        let raw: RawStatus = self.invoke_json("get_seats_status", showtime_id, &[filter]).await?;
        let seats = raw
            .seats
            .into_iter()
            .map(|s| SeatView {
                seat_id: s.seat_id,
                record: s.record,
                remaining_seconds: s.remaining_seconds,
            })
            .collect();
        Ok(SeatTableStatus { seats, available: raw.available })
    }

    #[instrument(skip(self, seat_ids), fields(%showtime_id, %booking_id))]
    async fn extend_hold(
        &self,
        showtime_id: Uuid,
        booking_id: Uuid,
        seat_ids: &[String],
        additional_seconds: u64,
    ) -> EngineResult<ExtendOutcome> {
        if additional_seconds == 0 {
            return Err(EngineError::InvalidInput("non-positive extension".into()).into());
        }
        let raw: RawExtend = self
            .invoke_json(
                "extend_hold",
                showtime_id,
                &[
                    booking_id.to_string(),
                    serde_json::to_string(seat_ids).map_err(EngineError::from)?,
                    additional_seconds.to_string(),
                ],
            )
            .await?;
        Ok(ExtendOutcome { extended: raw.extended })
    }

    #[instrument(skip(self, seats), fields(%showtime_id, count = seats.len()))]
    async fn init_seat_table(
        &self,
        showtime_id: Uuid,
        seats: &[SeatInfo],
        ttl_seconds: u64,
    ) -> EngineResult<u32> {
        if seats.is_empty() {
            return Err(EngineError::InvalidInput("empty seat layout".into()).into());
        }
        let mut fields = Vec::with_capacity(seats.len());
        for seat in seats {
            let record = SeatRecord::available(seat.seat_type);
            fields.push((
                seat.seat_id.clone(),
                serde_json::to_string(&record).map_err(EngineError::from)?,
            ));
        }
        self.runtime
            .init_table(
                &seats_key(showtime_id),
                &available_key(showtime_id),
                &fields,
                seats.len() as i64,
                ttl_seconds,
            )
            .await
            .map_err(EngineError::from)?;
        Ok(seats.len() as u32)
    }
}
