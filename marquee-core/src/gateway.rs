use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use marquee_domain::payment::PaymentMethod;

/// What the gateway hands back when a checkout is created. The gateway later
/// reports the outcome through the webhook endpoint using `transaction_id`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayCheckout {
    pub transaction_id: String,
    pub payment_url: String,
    pub expires_at: DateTime<Utc>,
}

/// Adapter over the external payment provider. Signature verification and
/// provider-specific wire formats live with the host, not here.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn create_checkout(
        &self,
        payment_id: Uuid,
        method: PaymentMethod,
        amount: i64,
        currency: &str,
        return_url: Option<&str>,
    ) -> Result<GatewayCheckout, Box<dyn std::error::Error + Send + Sync>>;
}
