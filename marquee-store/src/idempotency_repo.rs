use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use marquee_core::repository::{IdempotencyRepository, StoreError};
use marquee_domain::idempotency::{IdempotencyRecord, IdempotencyStatus, ResourceType};

use crate::database::map_sqlx_err;

pub struct PgIdempotencyRepository {
    pool: PgPool,
}

impl PgIdempotencyRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct IdempotencyRow {
    id: Uuid,
    idempotency_key: String,
    user_id: Uuid,
    request_path: String,
    request_hash: String,
    resource_type: String,
    status: String,
    response_status: Option<i32>,
    response_body: Option<serde_json::Value>,
    resource_id: Option<String>,
    error_message: Option<String>,
    expires_at: DateTime<Utc>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl IdempotencyRow {
    fn into_record(self) -> Result<IdempotencyRecord, StoreError> {
        let status = IdempotencyStatus::parse(&self.status).ok_or_else(|| {
            StoreError::backend(format!("bad idempotency status {}", self.status))
        })?;
        let resource_type = ResourceType::parse(&self.resource_type).ok_or_else(|| {
            StoreError::backend(format!("bad resource type {}", self.resource_type))
        })?;
        Ok(IdempotencyRecord {
            id: self.id,
            idempotency_key: self.idempotency_key,
            user_id: self.user_id,
            request_path: self.request_path,
            request_hash: self.request_hash,
            resource_type,
            status,
            response_status: self.response_status,
            response_body: self.response_body,
            resource_id: self.resource_id,
            error_message: self.error_message,
            expires_at: self.expires_at,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

#[async_trait]
impl IdempotencyRepository for PgIdempotencyRepository {
    async fn insert_processing(&self, record: &IdempotencyRecord) -> Result<(), StoreError> {
        // An expired row still occupies the unique index until the purge pass
        // removes it; take it over in the same statement instead of refusing
        // the key.
        let result = sqlx::query(
            r#"
            INSERT INTO idempotency_keys
                (id, idempotency_key, user_id, request_path, request_hash, resource_type,
                 status, expires_at, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            ON CONFLICT (idempotency_key, user_id) DO UPDATE
            SET id = EXCLUDED.id,
                request_path = EXCLUDED.request_path,
                request_hash = EXCLUDED.request_hash,
                resource_type = EXCLUDED.resource_type,
                status = EXCLUDED.status,
                response_status = NULL,
                response_body = NULL,
                resource_id = NULL,
                error_message = NULL,
                expires_at = EXCLUDED.expires_at,
                created_at = EXCLUDED.created_at,
                updated_at = EXCLUDED.updated_at
            WHERE idempotency_keys.expires_at <= NOW()
            "#,
        )
        .bind(record.id)
        .bind(&record.idempotency_key)
        .bind(record.user_id)
        .bind(&record.request_path)
        .bind(&record.request_hash)
        .bind(record.resource_type.as_str())
        .bind(record.status.as_str())
        .bind(record.expires_at)
        .bind(record.created_at)
        .bind(record.updated_at)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_err)?;
        if result.rows_affected() == 0 {
            return Err(StoreError::duplicate("idempotency_keys_key_user_key"));
        }
        Ok(())
    }

    async fn get(
        &self,
        key: &str,
        user_id: Uuid,
    ) -> Result<Option<IdempotencyRecord>, StoreError> {
        let row: Option<IdempotencyRow> = sqlx::query_as(
            "SELECT id, idempotency_key, user_id, request_path, request_hash, resource_type,
                    status, response_status, response_body, resource_id, error_message,
                    expires_at, created_at, updated_at
             FROM idempotency_keys
             WHERE idempotency_key = $1 AND user_id = $2 AND expires_at > NOW()",
        )
        .bind(key)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_err)?;
        row.map(IdempotencyRow::into_record).transpose()
    }

    async fn complete(
        &self,
        key: &str,
        user_id: Uuid,
        response_status: i32,
        response_body: &serde_json::Value,
        resource_id: Option<&str>,
    ) -> Result<bool, StoreError> {
        let result = sqlx::query(
            "UPDATE idempotency_keys
             SET status = 'completed', response_status = $3, response_body = $4,
                 resource_id = $5, updated_at = NOW()
             WHERE idempotency_key = $1 AND user_id = $2 AND status = 'processing'",
        )
        .bind(key)
        .bind(user_id)
        .bind(response_status)
        .bind(response_body)
        .bind(resource_id)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_err)?;
        Ok(result.rows_affected() > 0)
    }

    async fn fail(
        &self,
        key: &str,
        user_id: Uuid,
        response_status: i32,
        response_body: &serde_json::Value,
        error_message: &str,
    ) -> Result<bool, StoreError> {
        let result = sqlx::query(
            "UPDATE idempotency_keys
             SET status = 'failed', response_status = $3, response_body = $4,
                 error_message = $5, updated_at = NOW()
             WHERE idempotency_key = $1 AND user_id = $2 AND status = 'processing'",
        )
        .bind(key)
        .bind(user_id)
        .bind(response_status)
        .bind(response_body)
        .bind(error_message)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_err)?;
        Ok(result.rows_affected() > 0)
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64, StoreError> {
        let result = sqlx::query("DELETE FROM idempotency_keys WHERE expires_at <= $1")
            .bind(now)
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_err)?;
        Ok(result.rows_affected())
    }
}
