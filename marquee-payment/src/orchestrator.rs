use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use marquee_core::gateway::PaymentGateway;
use marquee_core::idempotency::{IdempotencyCheck, IdempotencyGuard};
use marquee_core::repository::{BookingRepository, PaymentRepository, StoreError};
use marquee_core::sink::SeatConfirmSink;
use marquee_domain::booking::BookingStatus;
use marquee_domain::payment::{Payment, PaymentMethod, PaymentStatus};
use marquee_domain::idempotency::ResourceType;

use crate::error::PaymentError;

const CREATE_PATH: &str = "/v1/payments";

#[derive(Debug, Clone)]
pub struct CreatePaymentRequest {
    pub booking_id: Uuid,
    pub payment_method: PaymentMethod,
    pub return_url: Option<String>,
    pub user_id: Uuid,
    pub idempotency_key: String,
    /// Request body as received; hashed for the dedup record.
    pub raw_body: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreatePaymentResponse {
    pub payment_id: Uuid,
    pub booking_id: Uuid,
    pub status: PaymentStatus,
    pub amount: i64,
    pub currency: String,
    pub payment_method: PaymentMethod,
    pub payment_url: Option<String>,
    pub expires_at: DateTime<Utc>,
}

impl CreatePaymentResponse {
    fn from_payment(payment: &Payment) -> Self {
        Self {
            payment_id: payment.id,
            booking_id: payment.booking_id,
            status: payment.status,
            amount: payment.amount,
            currency: payment.currency.clone(),
            payment_method: payment.payment_method,
            payment_url: payment.payment_url.clone(),
            expires_at: payment.expires_at,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WebhookStatus {
    Success,
    Failed,
    Pending,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WebhookPayload {
    pub transaction_id: String,
    pub status: WebhookStatus,
    pub amount: i64,
    #[serde(default)]
    pub paid_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub metadata: Option<Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookResponse {
    pub success: bool,
    pub message: String,
    /// Present only when this delivery settled the payment and moved its
    /// booking; replays and acknowledgements carry nothing.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub booking_id: Option<Uuid>,
}

impl WebhookResponse {
    fn ok(message: &str) -> Self {
        Self { success: true, message: message.to_string(), booking_id: None }
    }

    fn settled(message: &str, booking_id: Uuid) -> Self {
        Self { success: true, message: message.to_string(), booking_id: Some(booking_id) }
    }
}

/// Creates payment intents tied to bookings under idempotency, and reconciles
/// asynchronous gateway callbacks. Drives seat state only through the
/// [`SeatConfirmSink`] seam.
pub struct PaymentOrchestrator {
    payments: Arc<dyn PaymentRepository>,
    bookings: Arc<dyn BookingRepository>,
    gateway: Arc<dyn PaymentGateway>,
    sink: Arc<dyn SeatConfirmSink>,
    guard: IdempotencyGuard,
    payment_expiry_seconds: u64,
}

impl PaymentOrchestrator {
    pub fn new(
        payments: Arc<dyn PaymentRepository>,
        bookings: Arc<dyn BookingRepository>,
        gateway: Arc<dyn PaymentGateway>,
        sink: Arc<dyn SeatConfirmSink>,
        guard: IdempotencyGuard,
        payment_expiry_seconds: u64,
    ) -> Self {
        Self { payments, bookings, gateway, sink, guard, payment_expiry_seconds }
    }

    #[instrument(skip(self, request), fields(booking_id = %request.booking_id, user_id = %request.user_id))]
    pub async fn create_payment(
        &self,
        request: CreatePaymentRequest,
    ) -> Result<CreatePaymentResponse, PaymentError> {
        match self
            .guard
            .begin(
                &request.idempotency_key,
                request.user_id,
                CREATE_PATH,
                ResourceType::Payment,
                &request.raw_body,
            )
            .await
        {
            Ok(IdempotencyCheck::New) => {}
            Ok(IdempotencyCheck::Replay { status_code, body }) => {
                if status_code < 400 {
                    return serde_json::from_value(body)
                        .map_err(|e| StoreError::backend(format!("cached response: {e}")).into());
                }
                return Err(PaymentError::ReplayedFailure {
                    status_code: status_code as u16,
                    body,
                });
            }
            Err(err) => return Err(err.into()),
        }

        match self.create_payment_inner(&request).await {
            Ok(response) => {
                let body = serde_json::to_value(&response)
                    .map_err(|e| StoreError::backend(format!("encode response: {e}")))?;
                self.guard
                    .complete(
                        &request.idempotency_key,
                        request.user_id,
                        201,
                        &body,
                        Some(&response.payment_id.to_string()),
                    )
                    .await?;
                Ok(response)
            }
            Err(err) => {
                let envelope = err.envelope();
                if let Err(record_err) = self
                    .guard
                    .fail(
                        &request.idempotency_key,
                        request.user_id,
                        err.status_code() as i32,
                        &envelope,
                        &err.to_string(),
                    )
                    .await
                {
                    warn!(error = %record_err, "failed to record idempotent failure");
                }
                Err(err)
            }
        }
    }

    async fn create_payment_inner(
        &self,
        request: &CreatePaymentRequest,
    ) -> Result<CreatePaymentResponse, PaymentError> {
        let booking = self
            .bookings
            .get(request.booking_id)
            .await?
            .ok_or(PaymentError::BookingNotFound)?;
        if booking.user_id != request.user_id {
            return Err(PaymentError::BookingNotOwned);
        }
        match booking.status {
            BookingStatus::Pending => {}
            BookingStatus::Confirmed => return Err(PaymentError::BookingAlreadyPaid),
            BookingStatus::Cancelled | BookingStatus::Expired => {
                return Err(PaymentError::BookingNotPending)
            }
        }
        let now = Utc::now();
        if booking.hold_expires_at <= now {
            return Err(PaymentError::BookingHoldExpired);
        }

        // One open intent per booking: hand back the live checkout instead of
        // creating a second one.
        if let Some(existing) = self.payments.find_current_by_booking(booking.id).await? {
            match existing.status {
                PaymentStatus::Completed | PaymentStatus::Refunded => {
                    return Err(PaymentError::BookingAlreadyPaid)
                }
                PaymentStatus::Pending | PaymentStatus::Processing => {
                    return Ok(CreatePaymentResponse::from_payment(&existing));
                }
                PaymentStatus::Failed => {}
            }
        }

        let payment = Payment {
            id: Uuid::new_v4(),
            booking_id: booking.id,
            user_id: request.user_id,
            idempotency_key: request.idempotency_key.clone(),
            amount: booking.final_amount,
            currency: booking.currency.clone(),
            payment_method: request.payment_method,
            status: PaymentStatus::Pending,
            gateway_transaction_id: None,
            payment_url: None,
            expires_at: now + Duration::seconds(self.payment_expiry_seconds as i64),
            paid_at: None,
            attempt_count: 0,
            version: 0,
            created_at: now,
            updated_at: now,
        };
        match self.payments.create(&payment).await {
            Ok(()) => {}
            Err(err @ StoreError::Duplicate { .. }) if err.is_duplicate_on("idempotency_key") => {
                // A concurrent create with the same key won; serve its
                // payment.
                let winner = self
                    .payments
                    .get_by_idempotency_key(&request.idempotency_key)
                    .await?
                    .ok_or(err)?;
                return Ok(CreatePaymentResponse::from_payment(&winner));
            }
            Err(err) => return Err(err.into()),
        }
        self.bookings.set_payment_id(booking.id, payment.id).await?;

        let checkout = self
            .gateway
            .create_checkout(
                payment.id,
                request.payment_method,
                payment.amount,
                &payment.currency,
                request.return_url.as_deref(),
            )
            .await
            .map_err(|e| PaymentError::Gateway(e.to_string()))?;

        self.payments
            .mark_processing(payment.id, &checkout.transaction_id, &checkout.payment_url)
            .await?;
        let payment = self
            .payments
            .get(payment.id)
            .await?
            .ok_or_else(|| StoreError::backend("payment vanished after update"))?;

        info!(payment_id = %payment.id, txn = %checkout.transaction_id, "payment intent created");
        Ok(CreatePaymentResponse::from_payment(&payment))
    }

    /// Reconcile an asynchronous gateway callback. Redeliveries are the
    /// normal case, not an error: the conditional update on
    /// `status <> completed` decides which delivery takes effect.
    #[instrument(skip(self, payload), fields(txn = %payload.transaction_id))]
    pub async fn handle_webhook(
        &self,
        provider: &str,
        payload: WebhookPayload,
    ) -> Result<WebhookResponse, PaymentError> {
        let _provider = PaymentMethod::parse(provider)
            .ok_or_else(|| PaymentError::BadProvider(provider.to_string()))?;
        if payload.transaction_id.is_empty() {
            return Err(PaymentError::Validation("transaction_id is required".into()));
        }

        let payment = self
            .payments
            .get_by_gateway_transaction_id(&payload.transaction_id)
            .await?
            .ok_or(PaymentError::NotFound)?;

        if payment.status == PaymentStatus::Completed {
            return Ok(WebhookResponse::ok("already processed"));
        }
        if payload.amount != payment.amount {
            warn!(
                payment_id = %payment.id,
                expected = payment.amount,
                got = payload.amount,
                "webhook amount differs from payment record"
            );
        }

        match payload.status {
            WebhookStatus::Failed => {
                match self.payments.mark_failed(&payload.transaction_id).await? {
                    Some(updated) => {
                        self.sink
                            .release_after_payment_failure(updated.booking_id)
                            .await
                            .map_err(|e| PaymentError::Reconcile(e.to_string()))?;
                        info!(payment_id = %updated.id, "payment failed, seats released");
                        Ok(WebhookResponse::settled(
                            "payment failed, booking cancelled",
                            updated.booking_id,
                        ))
                    }
                    None => Ok(WebhookResponse::ok("already processed")),
                }
            }
            WebhookStatus::Success => {
                let paid_at = payload.paid_at.unwrap_or_else(Utc::now);
                match self.payments.mark_completed(&payload.transaction_id, paid_at).await? {
                    Some(updated) => {
                        self.sink
                            .confirm_after_payment(updated.booking_id)
                            .await
                            .map_err(|e| PaymentError::Reconcile(e.to_string()))?;
                        info!(payment_id = %updated.id, "payment completed, seats confirmed");
                        Ok(WebhookResponse::settled("payment completed", updated.booking_id))
                    }
                    // Lost the guard to a concurrent delivery.
                    None => Ok(WebhookResponse::ok("already processed")),
                }
            }
            WebhookStatus::Pending => {
                info!(payment_id = %payment.id, "gateway reports payment still pending");
                Ok(WebhookResponse::ok("acknowledged"))
            }
        }
    }

    pub async fn get_payment(&self, id: Uuid, user_id: Uuid) -> Result<Payment, PaymentError> {
        let payment = self.payments.get(id).await?.ok_or(PaymentError::NotFound)?;
        if payment.user_id != user_id {
            return Err(PaymentError::NotOwned);
        }
        Ok(payment)
    }
}
