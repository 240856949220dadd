use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use marquee_core::repository::{PaymentRepository, StoreError};
use marquee_domain::payment::{Payment, PaymentMethod, PaymentStatus};

use crate::database::map_sqlx_err;

pub struct PgPaymentRepository {
    pool: PgPool,
}

impl PgPaymentRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct PaymentRow {
    id: Uuid,
    booking_id: Uuid,
    user_id: Uuid,
    idempotency_key: String,
    amount: i64,
    currency: String,
    payment_method: String,
    status: String,
    gateway_transaction_id: Option<String>,
    payment_url: Option<String>,
    expires_at: DateTime<Utc>,
    paid_at: Option<DateTime<Utc>>,
    attempt_count: i32,
    version: i32,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl PaymentRow {
    fn into_payment(self) -> Result<Payment, StoreError> {
        let status = PaymentStatus::parse(&self.status)
            .ok_or_else(|| StoreError::backend(format!("bad payment status {}", self.status)))?;
        let method = PaymentMethod::parse(&self.payment_method).ok_or_else(|| {
            StoreError::backend(format!("bad payment method {}", self.payment_method))
        })?;
        Ok(Payment {
            id: self.id,
            booking_id: self.booking_id,
            user_id: self.user_id,
            idempotency_key: self.idempotency_key,
            amount: self.amount,
            currency: self.currency,
            payment_method: method,
            status,
            gateway_transaction_id: self.gateway_transaction_id,
            payment_url: self.payment_url,
            expires_at: self.expires_at,
            paid_at: self.paid_at,
            attempt_count: self.attempt_count,
            version: self.version,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

const SELECT_PAYMENT: &str = r#"
SELECT id, booking_id, user_id, idempotency_key, amount, currency, payment_method, status,
       gateway_transaction_id, payment_url, expires_at, paid_at, attempt_count, version,
       created_at, updated_at
FROM payments
"#;

#[async_trait]
impl PaymentRepository for PgPaymentRepository {
    async fn create(&self, payment: &Payment) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO payments
                (id, booking_id, user_id, idempotency_key, amount, currency, payment_method,
                 status, gateway_transaction_id, payment_url, expires_at, paid_at,
                 attempt_count, version, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16)
            "#,
        )
        .bind(payment.id)
        .bind(payment.booking_id)
        .bind(payment.user_id)
        .bind(&payment.idempotency_key)
        .bind(payment.amount)
        .bind(&payment.currency)
        .bind(payment.payment_method.as_str())
        .bind(payment.status.as_str())
        .bind(&payment.gateway_transaction_id)
        .bind(&payment.payment_url)
        .bind(payment.expires_at)
        .bind(payment.paid_at)
        .bind(payment.attempt_count)
        .bind(payment.version)
        .bind(payment.created_at)
        .bind(payment.updated_at)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_err)?;
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<Payment>, StoreError> {
        let row: Option<PaymentRow> =
            sqlx::query_as(&format!("{SELECT_PAYMENT} WHERE id = $1"))
                .bind(id)
                .fetch_optional(&self.pool)
                .await
                .map_err(map_sqlx_err)?;
        row.map(PaymentRow::into_payment).transpose()
    }

    async fn get_by_idempotency_key(&self, key: &str) -> Result<Option<Payment>, StoreError> {
        let row: Option<PaymentRow> =
            sqlx::query_as(&format!("{SELECT_PAYMENT} WHERE idempotency_key = $1"))
                .bind(key)
                .fetch_optional(&self.pool)
                .await
                .map_err(map_sqlx_err)?;
        row.map(PaymentRow::into_payment).transpose()
    }

    async fn get_by_gateway_transaction_id(
        &self,
        txn: &str,
    ) -> Result<Option<Payment>, StoreError> {
        let row: Option<PaymentRow> =
            sqlx::query_as(&format!("{SELECT_PAYMENT} WHERE gateway_transaction_id = $1"))
                .bind(txn)
                .fetch_optional(&self.pool)
                .await
                .map_err(map_sqlx_err)?;
        row.map(PaymentRow::into_payment).transpose()
    }

    async fn find_current_by_booking(
        &self,
        booking_id: Uuid,
    ) -> Result<Option<Payment>, StoreError> {
        let row: Option<PaymentRow> = sqlx::query_as(&format!(
            "{SELECT_PAYMENT} WHERE booking_id = $1 AND status <> 'failed'
             ORDER BY created_at DESC LIMIT 1"
        ))
        .bind(booking_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_err)?;
        row.map(PaymentRow::into_payment).transpose()
    }

    async fn mark_processing(
        &self,
        id: Uuid,
        gateway_transaction_id: &str,
        payment_url: &str,
    ) -> Result<bool, StoreError> {
        let result = sqlx::query(
            "UPDATE payments
             SET status = 'processing', gateway_transaction_id = $2, payment_url = $3,
                 attempt_count = attempt_count + 1, version = version + 1, updated_at = NOW()
             WHERE id = $1 AND status = 'pending'",
        )
        .bind(id)
        .bind(gateway_transaction_id)
        .bind(payment_url)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_err)?;
        Ok(result.rows_affected() > 0)
    }

    async fn mark_completed(
        &self,
        gateway_transaction_id: &str,
        paid_at: DateTime<Utc>,
    ) -> Result<Option<Payment>, StoreError> {
        // The status guard is the sole race control between duplicate webhook
        // deliveries; at most one caller ever sees a row back.
        let row: Option<PaymentRow> = sqlx::query_as(
            "UPDATE payments
             SET status = 'completed', paid_at = $2, version = version + 1, updated_at = NOW()
             WHERE gateway_transaction_id = $1 AND status <> 'completed'
             RETURNING id, booking_id, user_id, idempotency_key, amount, currency,
                       payment_method, status, gateway_transaction_id, payment_url, expires_at,
                       paid_at, attempt_count, version, created_at, updated_at",
        )
        .bind(gateway_transaction_id)
        .bind(paid_at)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_err)?;
        row.map(PaymentRow::into_payment).transpose()
    }

    async fn mark_failed(
        &self,
        gateway_transaction_id: &str,
    ) -> Result<Option<Payment>, StoreError> {
        let row: Option<PaymentRow> = sqlx::query_as(
            "UPDATE payments
             SET status = 'failed', version = version + 1, updated_at = NOW()
             WHERE gateway_transaction_id = $1 AND status <> 'completed' AND status <> 'failed'
             RETURNING id, booking_id, user_id, idempotency_key, amount, currency,
                       payment_method, status, gateway_transaction_id, payment_url, expires_at,
                       paid_at, attempt_count, version, created_at, updated_at",
        )
        .bind(gateway_transaction_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_err)?;
        row.map(PaymentRow::into_payment).transpose()
    }
}
