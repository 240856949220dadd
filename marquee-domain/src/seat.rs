use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SeatStatus {
    Available,
    Held,
    Booked,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SeatType {
    Standard,
    Vip,
    Couple,
    Premium,
}

/// Live seat state as stored in one hash field of `seats:{showtime_id}`.
///
/// Timestamps are epoch seconds taken from the store's own clock; a `held`
/// seat whose `held_until` has passed is releasable by any later script pass.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeatRecord {
    pub status: SeatStatus,
    pub seat_type: SeatType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub booking_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub held_until: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reserved_at: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confirmed_at: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub released_at: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub released_reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub previous_booking: Option<Uuid>,
}

impl SeatRecord {
    pub fn available(seat_type: SeatType) -> Self {
        Self {
            status: SeatStatus::Available,
            seat_type,
            booking_id: None,
            held_until: None,
            reserved_at: None,
            confirmed_at: None,
            released_at: None,
            released_reason: None,
            previous_booking: None,
        }
    }

    /// Whether a hold on this seat is still live at `now` (epoch seconds).
    pub fn hold_live_at(&self, now: i64) -> bool {
        self.status == SeatStatus::Held && self.held_until.map_or(false, |until| until > now)
    }
}

/// One seat as reported by the status operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeatView {
    pub seat_id: String,
    #[serde(flatten)]
    pub record: SeatRecord,
    /// Seconds left on the hold, present only while the seat is held.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remaining_seconds: Option<i64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seat_record_roundtrip_keeps_optional_fields_compact() {
        let record = SeatRecord::available(SeatType::Vip);
        let json = serde_json::to_string(&record).unwrap();
        assert_eq!(json, r#"{"status":"available","seat_type":"vip"}"#);

        let parsed: SeatRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.status, SeatStatus::Available);
        assert_eq!(parsed.seat_type, SeatType::Vip);
        assert!(parsed.booking_id.is_none());
    }

    #[test]
    fn hold_liveness_uses_held_until() {
        let mut record = SeatRecord::available(SeatType::Standard);
        record.status = SeatStatus::Held;
        record.held_until = Some(1_000);

        assert!(record.hold_live_at(999));
        assert!(!record.hold_live_at(1_000));
        assert!(!record.hold_live_at(2_000));
    }
}
