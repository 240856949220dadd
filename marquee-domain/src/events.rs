use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Broadcast when a batch reserve succeeds. Fans out over the SSE channel and
/// the `booking.held` topic.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeatsHeldEvent {
    pub showtime_id: Uuid,
    pub booking_id: Uuid,
    pub seat_ids: Vec<String>,
    pub hold_expires_at: i64,
}

/// Broadcast when seats go back to the pool, whatever the cause.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeatsReleasedEvent {
    pub showtime_id: Uuid,
    pub booking_id: Option<Uuid>,
    pub seat_ids: Vec<String>,
    pub reason: String,
}

/// Booking lifecycle notification published by the API layer and the reaper.
/// Keyed by booking; consumers resolve the showtime from the durable record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookingLifecycleEvent {
    pub booking_id: Uuid,
    pub status: String,
}
