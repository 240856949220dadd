use async_trait::async_trait;
use chrono::{Duration, Utc};
use uuid::Uuid;

use marquee_core::gateway::{GatewayCheckout, PaymentGateway};
use marquee_domain::payment::PaymentMethod;

/// Deterministic stand-in for the external provider; the transaction id
/// encodes the payment id so webhook tests can be driven without callbacks.
pub struct MockGateway;

#[async_trait]
impl PaymentGateway for MockGateway {
    async fn create_checkout(
        &self,
        payment_id: Uuid,
        method: PaymentMethod,
        _amount: i64,
        _currency: &str,
        return_url: Option<&str>,
    ) -> Result<GatewayCheckout, Box<dyn std::error::Error + Send + Sync>> {
        let mut payment_url =
            format!("https://pay.example.com/{}/checkout/{}", method, payment_id.simple());
        if let Some(url) = return_url {
            payment_url.push_str("?return_url=");
            payment_url.push_str(url);
        }
        Ok(GatewayCheckout {
            transaction_id: format!("txn_{}", payment_id.simple()),
            payment_url,
            expires_at: Utc::now() + Duration::minutes(15),
        })
    }
}
