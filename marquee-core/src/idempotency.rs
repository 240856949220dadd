use std::sync::Arc;

use chrono::{Duration, Utc};
use serde_json::Value;
use sha2::{Digest, Sha256};
use uuid::Uuid;

use marquee_domain::idempotency::{IdempotencyRecord, IdempotencyStatus, ResourceType};

use crate::repository::{IdempotencyRepository, StoreError};

/// Keys are opaque strings; the collaborator boundary enforces UUID shape,
/// this layer only caps length.
pub const MAX_KEY_LENGTH: usize = 100;

/// Serialize a JSON body deterministically: mapping keys sorted recursively,
/// sequences kept in order. Hashes stay stable across encoder field ordering.
pub fn canonical_json(value: &Value) -> String {
    let mut out = String::new();
    write_canonical(value, &mut out);
    out
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push('{');
            for (i, key) in keys.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&Value::String((*key).clone()).to_string());
                out.push(':');
                write_canonical(&map[*key], out);
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        other => out.push_str(&other.to_string()),
    }
}

/// SHA-256 hex digest of the canonicalized body.
pub fn request_hash(body: &Value) -> String {
    let digest = Sha256::digest(canonical_json(body).as_bytes());
    let mut hex = String::with_capacity(64);
    for byte in digest {
        hex.push_str(&format!("{:02x}", byte));
    }
    hex
}

#[derive(Debug, thiserror::Error)]
pub enum IdempotencyError {
    #[error("idempotency key reused with a different request body")]
    KeyReusedDifferentBody,
    #[error("a request with this idempotency key is still in flight")]
    RequestInFlight,
    #[error("invalid idempotency key: {0}")]
    InvalidKey(String),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Outcome of the dedup check at the top of a mutating operation.
#[derive(Debug, Clone)]
pub enum IdempotencyCheck {
    /// No prior record; one was created in `processing` and the caller owns
    /// the request.
    New,
    /// A finished record exists; replay its response verbatim.
    Replay { status_code: i32, body: Value },
}

/// Request-level deduplicator shared by the booking and payment orchestrators.
pub struct IdempotencyGuard {
    repo: Arc<dyn IdempotencyRepository>,
    ttl_seconds: i64,
}

impl IdempotencyGuard {
    pub fn new(repo: Arc<dyn IdempotencyRepository>, ttl_seconds: i64) -> Self {
        Self { repo, ttl_seconds }
    }

    /// Find-or-create the `(key, user)` record. A duplicate-key collision is
    /// another handler racing us; re-read once and judge the record we find.
    pub async fn begin(
        &self,
        key: &str,
        user_id: Uuid,
        request_path: &str,
        resource_type: ResourceType,
        body: &Value,
    ) -> Result<IdempotencyCheck, IdempotencyError> {
        if key.is_empty() || key.len() > MAX_KEY_LENGTH {
            return Err(IdempotencyError::InvalidKey(format!(
                "key must be 1..={} characters",
                MAX_KEY_LENGTH
            )));
        }
        let hash = request_hash(body);

        let mut existing = self.repo.get(key, user_id).await?;
        if existing.is_none() {
            let now = Utc::now();
            let record = IdempotencyRecord {
                id: Uuid::new_v4(),
                idempotency_key: key.to_string(),
                user_id,
                request_path: request_path.to_string(),
                request_hash: hash.clone(),
                resource_type,
                status: IdempotencyStatus::Processing,
                response_status: None,
                response_body: None,
                resource_id: None,
                error_message: None,
                expires_at: now + Duration::seconds(self.ttl_seconds),
                created_at: now,
                updated_at: now,
            };
            match self.repo.insert_processing(&record).await {
                Ok(()) => return Ok(IdempotencyCheck::New),
                Err(StoreError::Duplicate { .. }) => {
                    existing = self.repo.get(key, user_id).await?;
                }
                Err(err) => return Err(err.into()),
            }
        }

        let record = match existing {
            Some(record) => record,
            // Lost the race and the winner's row vanished (TTL purge); treat
            // as in flight and let the client retry.
            None => return Err(IdempotencyError::RequestInFlight),
        };

        if record.request_hash != hash {
            return Err(IdempotencyError::KeyReusedDifferentBody);
        }

        match record.status {
            IdempotencyStatus::Processing => Err(IdempotencyError::RequestInFlight),
            IdempotencyStatus::Completed | IdempotencyStatus::Failed => {
                Ok(IdempotencyCheck::Replay {
                    status_code: record.response_status.unwrap_or(200),
                    body: record.response_body.unwrap_or(Value::Null),
                })
            }
        }
    }

    pub async fn complete(
        &self,
        key: &str,
        user_id: Uuid,
        status_code: i32,
        body: &Value,
        resource_id: Option<&str>,
    ) -> Result<(), IdempotencyError> {
        self.repo
            .complete(key, user_id, status_code, body, resource_id)
            .await?;
        Ok(())
    }

    pub async fn fail(
        &self,
        key: &str,
        user_id: Uuid,
        status_code: i32,
        body: &Value,
        error_message: &str,
    ) -> Result<(), IdempotencyError> {
        self.repo
            .fail(key, user_id, status_code, body, error_message)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::DateTime;
    use std::collections::HashMap;
    use std::sync::Mutex;

    #[test]
    fn canonical_json_sorts_keys_recursively() {
        let a: Value =
            serde_json::from_str(r#"{"b":{"y":2,"x":1},"a":[{"q":1,"p":2},3]}"#).unwrap();
        let b: Value =
            serde_json::from_str(r#"{"a":[{"p":2,"q":1},3],"b":{"x":1,"y":2}}"#).unwrap();
        assert_eq!(canonical_json(&a), canonical_json(&b));
        assert_eq!(
            canonical_json(&a),
            r#"{"a":[{"p":2,"q":1},3],"b":{"x":1,"y":2}}"#
        );
    }

    #[test]
    fn hash_is_stable_under_key_permutation_but_not_sequence_order() {
        let a: Value = serde_json::from_str(r#"{"seats":["A1","A2"],"showtime_id":"s1"}"#).unwrap();
        let b: Value = serde_json::from_str(r#"{"showtime_id":"s1","seats":["A1","A2"]}"#).unwrap();
        let c: Value = serde_json::from_str(r#"{"showtime_id":"s1","seats":["A2","A1"]}"#).unwrap();
        assert_eq!(request_hash(&a), request_hash(&b));
        assert_ne!(request_hash(&a), request_hash(&c));
    }

    struct MemIdempotency {
        rows: Mutex<HashMap<(String, Uuid), IdempotencyRecord>>,
    }

    impl MemIdempotency {
        fn new() -> Arc<Self> {
            Arc::new(Self { rows: Mutex::new(HashMap::new()) })
        }
    }

    #[async_trait]
    impl IdempotencyRepository for MemIdempotency {
        async fn insert_processing(&self, record: &IdempotencyRecord) -> Result<(), StoreError> {
            let mut rows = self.rows.lock().unwrap();
            let key = (record.idempotency_key.clone(), record.user_id);
            if rows.contains_key(&key) {
                return Err(StoreError::duplicate("idempotency_keys_key_user"));
            }
            rows.insert(key, record.clone());
            Ok(())
        }

        async fn get(
            &self,
            key: &str,
            user_id: Uuid,
        ) -> Result<Option<IdempotencyRecord>, StoreError> {
            Ok(self.rows.lock().unwrap().get(&(key.to_string(), user_id)).cloned())
        }

        async fn complete(
            &self,
            key: &str,
            user_id: Uuid,
            response_status: i32,
            response_body: &Value,
            resource_id: Option<&str>,
        ) -> Result<bool, StoreError> {
            let mut rows = self.rows.lock().unwrap();
            match rows.get_mut(&(key.to_string(), user_id)) {
                Some(r) if r.status == IdempotencyStatus::Processing => {
                    r.status = IdempotencyStatus::Completed;
                    r.response_status = Some(response_status);
                    r.response_body = Some(response_body.clone());
                    r.resource_id = resource_id.map(str::to_string);
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
            response_body: &Value,
            error_message: &str,
        ) -> Result<bool, StoreError> {
            let mut rows = self.rows.lock().unwrap();
            match rows.get_mut(&(key.to_string(), user_id)) {
                Some(r) if r.status == IdempotencyStatus::Processing => {
                    r.status = IdempotencyStatus::Failed;
                    r.response_status = Some(response_status);
                    r.response_body = Some(response_body.clone());
                    r.error_message = Some(error_message.to_string());
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

    #[tokio::test]
    async fn second_request_replays_completed_response() {
        let repo = MemIdempotency::new();
        let guard = IdempotencyGuard::new(repo, 86_400);
        let user = Uuid::new_v4();
        let body = serde_json::json!({"seats": ["A1"]});

        let first = guard
            .begin("key-1", user, "/v1/bookings/hold", ResourceType::Booking, &body)
            .await
            .unwrap();
        assert!(matches!(first, IdempotencyCheck::New));

        guard
            .complete("key-1", user, 201, &serde_json::json!({"booking_code": "BK-AAAA1111"}), None)
            .await
            .unwrap();

        match guard
            .begin("key-1", user, "/v1/bookings/hold", ResourceType::Booking, &body)
            .await
            .unwrap()
        {
            IdempotencyCheck::Replay { status_code, body } => {
                assert_eq!(status_code, 201);
                assert_eq!(body["booking_code"], "BK-AAAA1111");
            }
            other => panic!("expected replay, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn same_key_different_body_is_rejected() {
        let repo = MemIdempotency::new();
        let guard = IdempotencyGuard::new(repo, 86_400);
        let user = Uuid::new_v4();

        guard
            .begin(
                "key-1",
                user,
                "/v1/bookings/hold",
                ResourceType::Booking,
                &serde_json::json!({"seats": ["A1"]}),
            )
            .await
            .unwrap();

        let err = guard
            .begin(
                "key-1",
                user,
                "/v1/bookings/hold",
                ResourceType::Booking,
                &serde_json::json!({"seats": ["A2"]}),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, IdempotencyError::KeyReusedDifferentBody));
    }

    #[tokio::test]
    async fn in_flight_request_blocks_same_key() {
        let repo = MemIdempotency::new();
        let guard = IdempotencyGuard::new(repo, 86_400);
        let user = Uuid::new_v4();
        let body = serde_json::json!({"seats": ["A1"]});

        guard
            .begin("key-1", user, "/v1/payments", ResourceType::Payment, &body)
            .await
            .unwrap();
        let err = guard
            .begin("key-1", user, "/v1/payments", ResourceType::Payment, &body)
            .await
            .unwrap_err();
        assert!(matches!(err, IdempotencyError::RequestInFlight));
    }

    #[tokio::test]
    async fn failed_record_replays_the_failure_envelope() {
        let repo = MemIdempotency::new();
        let guard = IdempotencyGuard::new(repo, 86_400);
        let user = Uuid::new_v4();
        let body = serde_json::json!({"booking_id": "b1"});

        guard
            .begin("key-9", user, "/v1/payments", ResourceType::Payment, &body)
            .await
            .unwrap();
        guard
            .fail(
                "key-9",
                user,
                409,
                &serde_json::json!({"errorCode": "BOOKING_ALREADY_PAID"}),
                "booking already paid",
            )
            .await
            .unwrap();

        match guard
            .begin("key-9", user, "/v1/payments", ResourceType::Payment, &body)
            .await
            .unwrap()
        {
            IdempotencyCheck::Replay { status_code, body } => {
                assert_eq!(status_code, 409);
                assert_eq!(body["errorCode"], "BOOKING_ALREADY_PAID");
            }
            other => panic!("expected replay, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn oversized_keys_are_rejected() {
        let repo = MemIdempotency::new();
        let guard = IdempotencyGuard::new(repo, 86_400);
        let err = guard
            .begin(
                &"x".repeat(MAX_KEY_LENGTH + 1),
                Uuid::new_v4(),
                "/v1/payments",
                ResourceType::Payment,
                &Value::Null,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, IdempotencyError::InvalidKey(_)));
    }
}
