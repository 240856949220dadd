use std::time::Duration;

use chrono::Utc;
use tokio::time::MissedTickBehavior;
use tracing::{error, info, warn};

use marquee_core::repository::IdempotencyRepository;
use marquee_domain::booking::BookingStatus;

use crate::state::AppState;

/// Expiry reaper: once per period, return lapsed holds to the pool and mark
/// their bookings expired. Single runner per process; cross-process safety
/// comes from the engine's per-seat booking_id checks, so overlapping sweeps
/// cannot free someone else's seats.
pub async fn start_expiry_reaper(state: AppState, period: Duration) {
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    info!(period_seconds = period.as_secs(), "expiry reaper started");

    loop {
        interval.tick().await;

        match state.bookings.run_expiry_pass().await {
            Ok(expired) => {
                for booking in &expired {
                    if let Some(events) = &state.events {
                        let _ =
                            events.booking_event(booking.id, BookingStatus::Expired).await;
                    }
                }
                if !expired.is_empty() {
                    info!(count = expired.len(), "expired lapsed bookings");
                }
            }
            Err(err) => error!(error = %err, "expiry pass failed"),
        }

        // Durable stand-in for a TTL index on the dedup records.
        match state.idempotency.purge_expired(Utc::now()).await {
            Ok(0) => {}
            Ok(purged) => info!(purged, "purged expired idempotency records"),
            Err(err) => warn!(error = %err, "idempotency purge failed"),
        }
    }
}
