use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicI64, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Mutex;
use uuid::Uuid;

use marquee_core::engine::{
    CleanupOutcome, ConfirmFailReason, ConfirmFailure, ConfirmOutcome, EngineResult, ExtendOutcome,
    ReleaseFailReason, ReleaseFailure, ReleaseOutcome, ReservationEngine, ReserveOutcome,
    SeatTableStatus, SeatToReserve, UnavailableReason, UnavailableSeat,
};
use marquee_domain::seat::{SeatRecord, SeatStatus, SeatView};
use marquee_domain::showtime::SeatInfo;

use crate::error::EngineError;

struct SeatTable {
    seats: BTreeMap<String, SeatRecord>,
    available: i64,
}

/// Seat engine mirroring the script semantics behind one mutex, so every
/// operation is serialized exactly like one-script-at-a-time execution.
/// Backs the test suites and Redis-less local runs.
pub struct InMemorySeatEngine {
    tables: Mutex<HashMap<Uuid, SeatTable>>,
    clock_offset: AtomicI64,
}

impl InMemorySeatEngine {
    pub fn new() -> Self {
        Self { tables: Mutex::new(HashMap::new()), clock_offset: AtomicI64::new(0) }
    }

    /// Shift this engine's clock forward; lets tests cross hold deadlines
    /// without sleeping.
    pub fn advance_clock(&self, seconds: i64) {
        self.clock_offset.fetch_add(seconds, Ordering::SeqCst);
    }

    fn now(&self) -> i64 {
        Utc::now().timestamp() + self.clock_offset.load(Ordering::SeqCst)
    }
}

impl Default for InMemorySeatEngine {
    fn default() -> Self {
        Self::new()
    }
}

// A missing table behaves like the store's missing keys: an empty hash and a
// zero counter.
fn table_mut(tables: &mut HashMap<Uuid, SeatTable>, showtime_id: Uuid) -> &mut SeatTable {
    tables
        .entry(showtime_id)
        .or_insert_with(|| SeatTable { seats: BTreeMap::new(), available: 0 })
}

fn hold_live(record: &SeatRecord, now: i64) -> bool {
    record.status == SeatStatus::Held && record.held_until.map_or(0, |u| u) > now
}

fn reap(record: &mut SeatRecord, now: i64) {
    let previous = record.booking_id;
    *record = SeatRecord::available(record.seat_type);
    record.released_at = Some(now);
    record.released_reason = Some("HOLD_EXPIRED".to_string());
    record.previous_booking = previous;
}

#[async_trait]
impl ReservationEngine for InMemorySeatEngine {
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
        let now = self.now();
        let held_until = now + hold_duration_seconds as i64;
        let mut tables = self.tables.lock().await;
        let table = table_mut(&mut tables, showtime_id);

        let mut unavailable = Vec::new();
        for seat in seats {
            match table.seats.get(&seat.seat_id) {
                None => unavailable.push(UnavailableSeat {
                    seat_id: seat.seat_id.clone(),
                    reason: UnavailableReason::NotFound,
                }),
                Some(record) if record.status == SeatStatus::Booked => {
                    unavailable.push(UnavailableSeat {
                        seat_id: seat.seat_id.clone(),
                        reason: UnavailableReason::Booked,
                    })
                }
                Some(record)
                    if hold_live(record, now) && record.booking_id != Some(booking_id) =>
                {
                    unavailable.push(UnavailableSeat {
                        seat_id: seat.seat_id.clone(),
                        reason: UnavailableReason::Held,
                    })
                }
                Some(_) => {}
            }
        }
        if !unavailable.is_empty() {
            return Ok(ReserveOutcome::Unavailable { seats: unavailable });
        }

        let mut newly_held = 0;
        for seat in seats {
            let record = table.seats.get_mut(&seat.seat_id).expect("classified above");
            if record.status == SeatStatus::Available {
                newly_held += 1;
            }
            *record = SeatRecord {
                status: SeatStatus::Held,
                seat_type: record.seat_type,
                booking_id: Some(booking_id),
                held_until: Some(held_until),
                reserved_at: Some(now),
                confirmed_at: None,
                released_at: None,
                released_reason: None,
                previous_booking: None,
            };
        }
        table.available -= newly_held;
        Ok(ReserveOutcome::Reserved { count: seats.len() as u32, expires_at: held_until })
    }

    async fn confirm_seats(
        &self,
        showtime_id: Uuid,
        booking_id: Uuid,
        seat_ids: &[String],
    ) -> EngineResult<ConfirmOutcome> {
        let now = self.now();
        let mut tables = self.tables.lock().await;
        let table = table_mut(&mut tables, showtime_id);

        let mut outcome = ConfirmOutcome { confirmed: Vec::new(), failed: Vec::new() };
        for seat_id in seat_ids {
            let Some(record) = table.seats.get_mut(seat_id) else {
                outcome.failed.push(ConfirmFailure {
                    seat_id: seat_id.clone(),
                    reason: ConfirmFailReason::NotFound,
                });
                continue;
            };
            if record.status != SeatStatus::Held {
                outcome.failed.push(ConfirmFailure {
                    seat_id: seat_id.clone(),
                    reason: ConfirmFailReason::NotHeld,
                });
            } else if record.booking_id != Some(booking_id) {
                outcome.failed.push(ConfirmFailure {
                    seat_id: seat_id.clone(),
                    reason: ConfirmFailReason::WrongBooking,
                });
            } else if record.held_until.map_or(0, |u| u) <= now {
                outcome.failed.push(ConfirmFailure {
                    seat_id: seat_id.clone(),
                    reason: ConfirmFailReason::HoldExpired,
                });
            } else {
                record.status = SeatStatus::Booked;
                record.held_until = None;
                record.confirmed_at = Some(now);
                outcome.confirmed.push(seat_id.clone());
            }
        }
        Ok(outcome)
    }

    async fn release_seats(
        &self,
        showtime_id: Uuid,
        booking_id: Uuid,
        seat_ids: &[String],
    ) -> EngineResult<ReleaseOutcome> {
        let now = self.now();
        let mut tables = self.tables.lock().await;
        let table = table_mut(&mut tables, showtime_id);

        let mut released = Vec::new();
        let mut failed = Vec::new();
        for seat_id in seat_ids {
            let Some(record) = table.seats.get_mut(seat_id) else {
                failed.push(ReleaseFailure {
                    seat_id: seat_id.clone(),
                    reason: ReleaseFailReason::NotFound,
                });
                continue;
            };
            if record.booking_id != Some(booking_id) {
                failed.push(ReleaseFailure {
                    seat_id: seat_id.clone(),
                    reason: ReleaseFailReason::WrongBooking,
                });
            } else {
                *record = SeatRecord::available(record.seat_type);
                record.released_at = Some(now);
                record.previous_booking = Some(booking_id);
                released.push(seat_id.clone());
            }
        }
        table.available += released.len() as i64;
        Ok(ReleaseOutcome { released, failed, available: table.available })
    }

    async fn cleanup_expired_holds(&self, showtime_id: Uuid) -> EngineResult<CleanupOutcome> {
        let now = self.now();
        let mut tables = self.tables.lock().await;
        let table = table_mut(&mut tables, showtime_id);

        let mut released = Vec::new();
        for (seat_id, record) in table.seats.iter_mut() {
            if record.status == SeatStatus::Held && record.held_until.map_or(0, |u| u) <= now {
                reap(record, now);
                released.push(seat_id.clone());
            }
        }
        table.available += released.len() as i64;
        Ok(CleanupOutcome { released, available: table.available })
    }

    async fn seats_status(
        &self,
        showtime_id: Uuid,
        seat_ids: Option<&[String]>,
    ) -> EngineResult<SeatTableStatus> {
        let now = self.now();
        let mut tables = self.tables.lock().await;
        let table = table_mut(&mut tables, showtime_id);

        let ids: Vec<String> = match seat_ids {
            Some(ids) => ids.to_vec(),
            None => table.seats.keys().cloned().collect(),
        };
        let mut reaped = 0;
        let mut seats = Vec::new();
        for seat_id in ids {
            let Some(record) = table.seats.get_mut(&seat_id) else { continue };
            if record.status == SeatStatus::Held && record.held_until.map_or(0, |u| u) <= now {
                reap(record, now);
                reaped += 1;
            }
            let remaining = if record.status == SeatStatus::Held {
                record.held_until.map(|u| u - now)
            } else {
                None
            };
            seats.push(SeatView {
                seat_id,
                record: record.clone(),
                remaining_seconds: remaining,
            });
        }
        table.available += reaped;
        Ok(SeatTableStatus { seats, available: table.available })
    }

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
        let now = self.now();
        let mut tables = self.tables.lock().await;
        let table = table_mut(&mut tables, showtime_id);

        let mut extended = 0;
        for seat_id in seat_ids {
            if let Some(record) = table.seats.get_mut(seat_id) {
                if record.status == SeatStatus::Held
                    && record.booking_id == Some(booking_id)
                    && record.held_until.map_or(0, |u| u) > now
                {
                    record.held_until = record.held_until.map(|u| u + additional_seconds as i64);
                    extended += 1;
                }
            }
        }
        Ok(ExtendOutcome { extended })
    }

    async fn init_seat_table(
        &self,
        showtime_id: Uuid,
        seats: &[SeatInfo],
        _ttl_seconds: u64,
    ) -> EngineResult<u32> {
        if seats.is_empty() {
            return Err(EngineError::InvalidInput("empty seat layout".into()).into());
        }
        let mut tables = self.tables.lock().await;
        let table = SeatTable {
            seats: seats
                .iter()
                .map(|s| (s.seat_id.clone(), SeatRecord::available(s.seat_type)))
                .collect(),
            available: seats.len() as i64,
        };
        tables.insert(showtime_id, table);
        Ok(seats.len() as u32)
    }
}
