use std::sync::Arc;

use tokio::sync::broadcast;

use marquee_booking::BookingOrchestrator;
use marquee_core::engine::ReservationEngine;
use marquee_core::repository::{IdempotencyRepository, ShowtimeRepository};
use marquee_domain::events::SeatsHeldEvent;
use marquee_payment::PaymentOrchestrator;
use marquee_store::EventProducer;

#[derive(Clone)]
pub struct AuthConfig {
    pub secret: String,
    pub expiration: u64,
}

#[derive(Clone)]
pub struct AppState {
    pub bookings: Arc<BookingOrchestrator>,
    pub payments: Arc<PaymentOrchestrator>,
    pub engine: Arc<dyn ReservationEngine>,
    pub showtimes: Arc<dyn ShowtimeRepository>,
    pub idempotency: Arc<dyn IdempotencyRepository>,
    /// Absent in tests and Kafka-less local runs.
    pub events: Option<Arc<EventProducer>>,
    pub seat_tx: broadcast::Sender<SeatsHeldEvent>,
    pub auth: AuthConfig,
    pub seat_table_ttl_seconds: u64,
}
