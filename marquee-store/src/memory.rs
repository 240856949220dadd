//! In-memory implementations of the repository traits, mirroring the unique
//! indexes and conditional-update guards of the Postgres schema. They back the
//! hermetic test suites and database-less local runs.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use marquee_core::repository::{
    BookingRepository, IdempotencyRepository, PaymentRepository, ShowtimeRepository, StoreError,
};
use marquee_domain::booking::{Booking, BookingStatus};
use marquee_domain::idempotency::{IdempotencyRecord, IdempotencyStatus};
use marquee_domain::payment::{Payment, PaymentStatus};
use marquee_domain::showtime::Showtime;

#[derive(Default)]
pub struct MemBookingRepository {
    rows: Mutex<HashMap<Uuid, Booking>>,
    fail_next_create: AtomicBool,
}

impl MemBookingRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `create` fail with a backend error; exercises the
    /// compensating-release path.
    pub fn fail_next_create(&self) {
        self.fail_next_create.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl BookingRepository for MemBookingRepository {
    async fn create(&self, booking: &Booking) -> Result<(), StoreError> {
        if self.fail_next_create.swap(false, Ordering::SeqCst) {
            return Err(StoreError::backend("injected create failure"));
        }
        let mut rows = self.rows.lock().unwrap();
        if rows.values().any(|b| b.booking_code == booking.booking_code) {
            return Err(StoreError::duplicate("bookings_booking_code_key"));
        }
        if rows.values().any(|b| b.idempotency_key == booking.idempotency_key) {
            return Err(StoreError::duplicate("bookings_idempotency_key_key"));
        }
        rows.insert(booking.id, booking.clone());
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<Booking>, StoreError> {
        Ok(self.rows.lock().unwrap().get(&id).cloned())
    }

    async fn get_by_idempotency_key(&self, key: &str) -> Result<Option<Booking>, StoreError> {
        Ok(self.rows.lock().unwrap().values().find(|b| b.idempotency_key == key).cloned())
    }

    async fn mark_confirmed(&self, id: Uuid, at: DateTime<Utc>) -> Result<bool, StoreError> {
        let mut rows = self.rows.lock().unwrap();
        match rows.get_mut(&id) {
            Some(b) if b.status == BookingStatus::Pending => {
                b.status = BookingStatus::Confirmed;
                b.confirmed_at = Some(at);
                b.updated_at = at;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn mark_cancelled(
        &self,
        id: Uuid,
        reason: &str,
        at: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let mut rows = self.rows.lock().unwrap();
        match rows.get_mut(&id) {
            Some(b) if b.status == BookingStatus::Pending => {
                b.status = BookingStatus::Cancelled;
                b.cancellation_reason = Some(reason.to_string());
                b.cancelled_at = Some(at);
                b.updated_at = at;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn mark_expired(&self, id: Uuid, at: DateTime<Utc>) -> Result<bool, StoreError> {
        let mut rows = self.rows.lock().unwrap();
        match rows.get_mut(&id) {
            Some(b) if b.status == BookingStatus::Pending => {
                b.status = BookingStatus::Expired;
                b.cancellation_reason = Some("Hold expired".to_string());
                b.cancelled_at = Some(at);
                b.updated_at = at;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn set_payment_id(&self, id: Uuid, payment_id: Uuid) -> Result<(), StoreError> {
        if let Some(b) = self.rows.lock().unwrap().get_mut(&id) {
            b.payment_id = Some(payment_id);
        }
        Ok(())
    }

    async fn find_expired_pending(
        &self,
        now: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<Booking>, StoreError> {
        let rows = self.rows.lock().unwrap();
        let mut expired: Vec<Booking> = rows
            .values()
            .filter(|b| b.status == BookingStatus::Pending && b.hold_expires_at < now)
            .cloned()
            .collect();
        expired.sort_by_key(|b| b.hold_expires_at);
        expired.truncate(limit as usize);
        Ok(expired)
    }
}

#[derive(Default)]
pub struct MemPaymentRepository {
    rows: Mutex<HashMap<Uuid, Payment>>,
}

impl MemPaymentRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PaymentRepository for MemPaymentRepository {
    async fn create(&self, payment: &Payment) -> Result<(), StoreError> {
        let mut rows = self.rows.lock().unwrap();
        if rows.values().any(|p| p.idempotency_key == payment.idempotency_key) {
            return Err(StoreError::duplicate("payments_idempotency_key_key"));
        }
        if let Some(txn) = &payment.gateway_transaction_id {
            if rows.values().any(|p| p.gateway_transaction_id.as_ref() == Some(txn)) {
                return Err(StoreError::duplicate("payments_gateway_transaction_id_key"));
            }
        }
        rows.insert(payment.id, payment.clone());
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<Payment>, StoreError> {
        Ok(self.rows.lock().unwrap().get(&id).cloned())
    }

    async fn get_by_idempotency_key(&self, key: &str) -> Result<Option<Payment>, StoreError> {
        Ok(self.rows.lock().unwrap().values().find(|p| p.idempotency_key == key).cloned())
    }

    async fn get_by_gateway_transaction_id(
        &self,
        txn: &str,
    ) -> Result<Option<Payment>, StoreError> {
        Ok(self
            .rows
            .lock()
            .unwrap()
            .values()
            .find(|p| p.gateway_transaction_id.as_deref() == Some(txn))
            .cloned())
    }

    async fn find_current_by_booking(
        &self,
        booking_id: Uuid,
    ) -> Result<Option<Payment>, StoreError> {
        let rows = self.rows.lock().unwrap();
        let mut current: Vec<&Payment> = rows
            .values()
            .filter(|p| p.booking_id == booking_id && p.status != PaymentStatus::Failed)
            .collect();
        current.sort_by_key(|p| p.created_at);
        Ok(current.last().cloned().cloned())
    }

    async fn mark_processing(
        &self,
        id: Uuid,
        gateway_transaction_id: &str,
        payment_url: &str,
    ) -> Result<bool, StoreError> {
        let mut rows = self.rows.lock().unwrap();
        match rows.get_mut(&id) {
            Some(p) if p.status == PaymentStatus::Pending => {
                p.status = PaymentStatus::Processing;
                p.gateway_transaction_id = Some(gateway_transaction_id.to_string());
                p.payment_url = Some(payment_url.to_string());
                p.attempt_count += 1;
                p.version += 1;
                p.updated_at = Utc::now();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn mark_completed(
        &self,
        gateway_transaction_id: &str,
        paid_at: DateTime<Utc>,
    ) -> Result<Option<Payment>, StoreError> {
        let mut rows = self.rows.lock().unwrap();
        let payment = rows.values_mut().find(|p| {
            p.gateway_transaction_id.as_deref() == Some(gateway_transaction_id)
                && p.status != PaymentStatus::Completed
        });
        Ok(payment.map(|p| {
            p.status = PaymentStatus::Completed;
            p.paid_at = Some(paid_at);
            p.version += 1;
            p.updated_at = paid_at;
            p.clone()
        }))
    }

    async fn mark_failed(
        &self,
        gateway_transaction_id: &str,
    ) -> Result<Option<Payment>, StoreError> {
        let mut rows = self.rows.lock().unwrap();
        let payment = rows.values_mut().find(|p| {
            p.gateway_transaction_id.as_deref() == Some(gateway_transaction_id)
                && p.status != PaymentStatus::Completed
                && p.status != PaymentStatus::Failed
        });
        Ok(payment.map(|p| {
            p.status = PaymentStatus::Failed;
            p.version += 1;
            p.updated_at = Utc::now();
            p.clone()
        }))
    }
}

#[derive(Default)]
pub struct MemIdempotencyRepository {
    rows: Mutex<HashMap<(String, Uuid), IdempotencyRecord>>,
}

impl MemIdempotencyRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl IdempotencyRepository for MemIdempotencyRepository {
    async fn insert_processing(&self, record: &IdempotencyRecord) -> Result<(), StoreError> {
        let mut rows = self.rows.lock().unwrap();
        let key = (record.idempotency_key.clone(), record.user_id);
        // Expired rows are taken over, matching the conditional upsert in the
        // Postgres implementation.
        if let Some(existing) = rows.get(&key) {
            if existing.expires_at > Utc::now() {
                return Err(StoreError::duplicate("idempotency_keys_key_user_key"));
            }
        }
        rows.insert(key, record.clone());
        Ok(())
    }

    async fn get(
        &self,
        key: &str,
        user_id: Uuid,
    ) -> Result<Option<IdempotencyRecord>, StoreError> {
        let rows = self.rows.lock().unwrap();
        Ok(rows
            .get(&(key.to_string(), user_id))
            .filter(|r| r.expires_at > Utc::now())
            .cloned())
    }

    async fn complete(
        &self,
        key: &str,
        user_id: Uuid,
        response_status: i32,
        response_body: &serde_json::Value,
        resource_id: Option<&str>,
    ) -> Result<bool, StoreError> {
        let mut rows = self.rows.lock().unwrap();
        match rows.get_mut(&(key.to_string(), user_id)) {
            Some(r) if r.status == IdempotencyStatus::Processing => {
                r.status = IdempotencyStatus::Completed;
                r.response_status = Some(response_status);
                r.response_body = Some(response_body.clone());
                r.resource_id = resource_id.map(str::to_string);
                r.updated_at = Utc::now();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn fail(
        &self,
        key: &str,
        user_id: Uuid,
        response_status: i32,
        response_body: &serde_json::Value,
        error_message: &str,
    ) -> Result<bool, StoreError> {
        let mut rows = self.rows.lock().unwrap();
        match rows.get_mut(&(key.to_string(), user_id)) {
            Some(r) if r.status == IdempotencyStatus::Processing => {
                r.status = IdempotencyStatus::Failed;
                r.response_status = Some(response_status);
                r.response_body = Some(response_body.clone());
                r.error_message = Some(error_message.to_string());
                r.updated_at = Utc::now();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64, StoreError> {
        let mut rows = self.rows.lock().unwrap();
        let before = rows.len();
        rows.retain(|_, r| r.expires_at > now);
        Ok((before - rows.len()) as u64)
    }
}

#[derive(Default)]
pub struct MemShowtimeRepository {
    rows: Mutex<HashMap<Uuid, Showtime>>,
}

impl MemShowtimeRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, showtime: Showtime) {
        self.rows.lock().unwrap().insert(showtime.id, showtime);
    }
}

#[async_trait]
impl ShowtimeRepository for MemShowtimeRepository {
    async fn get(&self, id: Uuid) -> Result<Option<Showtime>, StoreError> {
        Ok(self.rows.lock().unwrap().get(&id).cloned())
    }
}
