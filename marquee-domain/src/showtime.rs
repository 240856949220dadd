use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::seat::SeatType;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ShowtimeStatus {
    Scheduled,
    Cancelled,
    Finished,
}

impl ShowtimeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ShowtimeStatus::Scheduled => "scheduled",
            ShowtimeStatus::Cancelled => "cancelled",
            ShowtimeStatus::Finished => "finished",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "scheduled" => Some(ShowtimeStatus::Scheduled),
            "cancelled" => Some(ShowtimeStatus::Cancelled),
            "finished" => Some(ShowtimeStatus::Finished),
            _ => None,
        }
    }
}

/// Authoritative per-seat metadata declared on the showtime: identity
/// (row letter + column number), type, and price in minor units.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeatInfo {
    pub seat_id: String,
    pub seat_type: SeatType,
    pub price: i64,
}

/// A scheduled screening. The seat layout here is read-only metadata; live
/// seat state belongs to the reservation engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Showtime {
    pub id: Uuid,
    pub movie_title: String,
    pub screen: String,
    pub status: ShowtimeStatus,
    pub start_time: DateTime<Utc>,
    pub currency: String,
    pub seats: Vec<SeatInfo>,
}

impl Showtime {
    pub fn seat_info(&self, seat_id: &str) -> Option<&SeatInfo> {
        self.seats.iter().find(|s| s.seat_id == seat_id)
    }
}
