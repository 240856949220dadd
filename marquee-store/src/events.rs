use std::time::Duration;

use rdkafka::config::ClientConfig;
use rdkafka::error::KafkaError;
use rdkafka::producer::{FutureProducer, FutureRecord};
use rdkafka::util::Timeout;
use tracing::{debug, error};
use uuid::Uuid;

use marquee_domain::booking::BookingStatus;
use marquee_domain::events::{BookingLifecycleEvent, SeatsHeldEvent};

/// Booking lifecycle topics, one per durable status transition.
pub mod topics {
    pub const BOOKING_HELD: &str = "booking.held";
    pub const BOOKING_CONFIRMED: &str = "booking.confirmed";
    pub const BOOKING_CANCELLED: &str = "booking.cancelled";
    pub const BOOKING_EXPIRED: &str = "booking.expired";
}

const SEND_TIMEOUT: Duration = Duration::from_secs(5);

/// Publisher for booking lifecycle events. Every event is keyed by booking
/// id, so one booking's transitions land on one partition in order.
#[derive(Clone)]
pub struct EventProducer {
    producer: FutureProducer,
}

impl EventProducer {
    pub fn new(brokers: &str) -> Result<Self, KafkaError> {
        let producer: FutureProducer = ClientConfig::new()
            .set("bootstrap.servers", brokers)
            .set("message.timeout.ms", "5000")
            .set("acks", "all")
            .create()?;

        Ok(Self { producer })
    }

    /// Announce a successful batch reserve on the `booking.held` topic.
    pub async fn seats_held(&self, event: &SeatsHeldEvent) -> Result<(), KafkaError> {
        let payload = serde_json::to_string(event).unwrap_or_default();
        self.send(topics::BOOKING_HELD, event.booking_id, &payload).await
    }

    /// Announce a booking status transition on the topic matching the new
    /// status.
    pub async fn booking_event(
        &self,
        booking_id: Uuid,
        status: BookingStatus,
    ) -> Result<(), KafkaError> {
        let topic = match status {
            BookingStatus::Pending => topics::BOOKING_HELD,
            BookingStatus::Confirmed => topics::BOOKING_CONFIRMED,
            BookingStatus::Cancelled => topics::BOOKING_CANCELLED,
            BookingStatus::Expired => topics::BOOKING_EXPIRED,
        };
        let event = BookingLifecycleEvent { booking_id, status: status.to_string() };
        let payload = serde_json::to_string(&event).unwrap_or_default();
        self.send(topic, booking_id, &payload).await
    }

    async fn send(&self, topic: &str, booking_id: Uuid, payload: &str) -> Result<(), KafkaError> {
        let key = booking_id.to_string();
        let record = FutureRecord::to(topic).key(&key).payload(payload);

        match self.producer.send(record, Timeout::After(SEND_TIMEOUT)).await {
            Ok((partition, offset)) => {
                debug!(topic, %booking_id, partition, offset, "event published");
                Ok(())
            }
            Err((err, _msg)) => {
                error!(topic, %booking_id, error = %err, "event publish failed");
                Err(err)
            }
        }
    }
}
