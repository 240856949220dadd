use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use marquee_core::repository::{BookingRepository, StoreError};
use marquee_domain::booking::{Booking, BookingSeat, BookingStatus};

use crate::database::map_sqlx_err;

pub struct PgBookingRepository {
    pool: PgPool,
}

impl PgBookingRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct BookingRow {
    id: Uuid,
    booking_code: String,
    user_id: Uuid,
    showtime_id: Uuid,
    seats: serde_json::Value,
    total_amount: i64,
    discount_amount: i64,
    final_amount: i64,
    currency: String,
    status: String,
    held_at: DateTime<Utc>,
    hold_expires_at: DateTime<Utc>,
    idempotency_key: String,
    confirmed_at: Option<DateTime<Utc>>,
    cancelled_at: Option<DateTime<Utc>>,
    cancellation_reason: Option<String>,
    payment_id: Option<Uuid>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl BookingRow {
    fn into_booking(self) -> Result<Booking, StoreError> {
        let status = BookingStatus::parse(&self.status)
            .ok_or_else(|| StoreError::backend(format!("bad booking status {}", self.status)))?;
        let seats: Vec<BookingSeat> = serde_json::from_value(self.seats)
            .map_err(|e| StoreError::backend(format!("bad booking seats: {e}")))?;
        Ok(Booking {
            id: self.id,
            booking_code: self.booking_code,
            user_id: self.user_id,
            showtime_id: self.showtime_id,
            seats,
            total_amount: self.total_amount,
            discount_amount: self.discount_amount,
            final_amount: self.final_amount,
            currency: self.currency,
            status,
            held_at: self.held_at,
            hold_expires_at: self.hold_expires_at,
            idempotency_key: self.idempotency_key,
            confirmed_at: self.confirmed_at,
            cancelled_at: self.cancelled_at,
            cancellation_reason: self.cancellation_reason,
            payment_id: self.payment_id,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

const SELECT_BOOKING: &str = r#"
SELECT id, booking_code, user_id, showtime_id, seats, total_amount, discount_amount,
       final_amount, currency, status, held_at, hold_expires_at, idempotency_key,
       confirmed_at, cancelled_at, cancellation_reason, payment_id, created_at, updated_at
FROM bookings
"#;

#[async_trait]
impl BookingRepository for PgBookingRepository {
    async fn create(&self, booking: &Booking) -> Result<(), StoreError> {
        let seats = serde_json::to_value(&booking.seats)
            .map_err(|e| StoreError::backend(format!("encode booking seats: {e}")))?;
        sqlx::query(
            r#"
            INSERT INTO bookings
                (id, booking_code, user_id, showtime_id, seats, total_amount, discount_amount,
                 final_amount, currency, status, held_at, hold_expires_at, idempotency_key,
                 created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
            "#,
        )
        .bind(booking.id)
        .bind(&booking.booking_code)
        .bind(booking.user_id)
        .bind(booking.showtime_id)
        .bind(seats)
        .bind(booking.total_amount)
        .bind(booking.discount_amount)
        .bind(booking.final_amount)
        .bind(&booking.currency)
        .bind(booking.status.as_str())
        .bind(booking.held_at)
        .bind(booking.hold_expires_at)
        .bind(&booking.idempotency_key)
        .bind(booking.created_at)
        .bind(booking.updated_at)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_err)?;
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<Booking>, StoreError> {
        let row: Option<BookingRow> =
            sqlx::query_as(&format!("{SELECT_BOOKING} WHERE id = $1"))
                .bind(id)
                .fetch_optional(&self.pool)
                .await
                .map_err(map_sqlx_err)?;
        row.map(BookingRow::into_booking).transpose()
    }

    async fn get_by_idempotency_key(&self, key: &str) -> Result<Option<Booking>, StoreError> {
        let row: Option<BookingRow> =
            sqlx::query_as(&format!("{SELECT_BOOKING} WHERE idempotency_key = $1"))
                .bind(key)
                .fetch_optional(&self.pool)
                .await
                .map_err(map_sqlx_err)?;
        row.map(BookingRow::into_booking).transpose()
    }

    async fn mark_confirmed(&self, id: Uuid, at: DateTime<Utc>) -> Result<bool, StoreError> {
        let result = sqlx::query(
            "UPDATE bookings SET status = 'confirmed', confirmed_at = $2, updated_at = NOW()
             WHERE id = $1 AND status = 'pending'",
        )
        .bind(id)
        .bind(at)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_err)?;
        Ok(result.rows_affected() > 0)
    }

    async fn mark_cancelled(
        &self,
        id: Uuid,
        reason: &str,
        at: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let result = sqlx::query(
            "UPDATE bookings
             SET status = 'cancelled', cancellation_reason = $2, cancelled_at = $3, updated_at = NOW()
             WHERE id = $1 AND status = 'pending'",
        )
        .bind(id)
        .bind(reason)
        .bind(at)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_err)?;
        Ok(result.rows_affected() > 0)
    }

    async fn mark_expired(&self, id: Uuid, at: DateTime<Utc>) -> Result<bool, StoreError> {
        let result = sqlx::query(
            "UPDATE bookings
             SET status = 'expired', cancellation_reason = 'Hold expired', cancelled_at = $2,
                 updated_at = NOW()
             WHERE id = $1 AND status = 'pending'",
        )
        .bind(id)
        .bind(at)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_err)?;
        Ok(result.rows_affected() > 0)
    }

    async fn set_payment_id(&self, id: Uuid, payment_id: Uuid) -> Result<(), StoreError> {
        sqlx::query("UPDATE bookings SET payment_id = $2, updated_at = NOW() WHERE id = $1")
            .bind(id)
            .bind(payment_id)
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_err)?;
        Ok(())
    }

    async fn find_expired_pending(
        &self,
        now: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<Booking>, StoreError> {
        let rows: Vec<BookingRow> = sqlx::query_as(&format!(
            "{SELECT_BOOKING} WHERE status = 'pending' AND hold_expires_at < $1
             ORDER BY hold_expires_at ASC LIMIT $2"
        ))
        .bind(now)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_err)?;
        rows.into_iter().map(BookingRow::into_booking).collect()
    }
}
