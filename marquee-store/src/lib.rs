pub mod app_config;
pub mod booking_repo;
pub mod database;
pub mod events;
pub mod idempotency_repo;
pub mod memory;
pub mod payment_repo;
pub mod showtime_repo;

pub use booking_repo::PgBookingRepository;
pub use database::DbClient;
pub use events::EventProducer;
pub use idempotency_repo::PgIdempotencyRepository;
pub use payment_repo::PgPaymentRepository;
pub use showtime_repo::PgShowtimeRepository;
