pub mod engine;
pub mod envelope;
pub mod gateway;
pub mod idempotency;
pub mod repository;
pub mod sink;

pub use engine::ReservationEngine;
pub use gateway::PaymentGateway;
pub use repository::{
    BookingRepository, IdempotencyRepository, PaymentRepository, ShowtimeRepository, StoreError,
};
pub use sink::SeatConfirmSink;
