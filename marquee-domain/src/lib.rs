pub mod booking;
pub mod events;
pub mod idempotency;
pub mod payment;
pub mod seat;
pub mod showtime;

pub use booking::{Booking, BookingSeat, BookingStatus};
pub use idempotency::{IdempotencyRecord, IdempotencyStatus, ResourceType};
pub use payment::{Payment, PaymentMethod, PaymentStatus};
pub use seat::{SeatRecord, SeatStatus, SeatType, SeatView};
pub use showtime::{SeatInfo, Showtime, ShowtimeStatus};
