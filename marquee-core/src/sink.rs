use async_trait::async_trait;
use uuid::Uuid;

/// Narrow seam the payment side uses to drive seat state after a gateway
/// outcome. Implemented by the booking orchestrator; the payment orchestrator
/// reaches back through nothing else.
#[async_trait]
pub trait SeatConfirmSink: Send + Sync {
    /// Confirm the booking's seats after a successful payment. Returns false
    /// when the booking no longer exists.
    async fn confirm_after_payment(
        &self,
        booking_id: Uuid,
    ) -> Result<bool, Box<dyn std::error::Error + Send + Sync>>;

    /// Release the booking's seats and cancel it after a failed payment.
    async fn release_after_payment_failure(
        &self,
        booking_id: Uuid,
    ) -> Result<bool, Box<dyn std::error::Error + Send + Sync>>;
}
