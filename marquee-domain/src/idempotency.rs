use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IdempotencyStatus {
    Processing,
    Completed,
    Failed,
}

impl IdempotencyStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            IdempotencyStatus::Processing => "processing",
            IdempotencyStatus::Completed => "completed",
            IdempotencyStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "processing" => Some(IdempotencyStatus::Processing),
            "completed" => Some(IdempotencyStatus::Completed),
            "failed" => Some(IdempotencyStatus::Failed),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceType {
    Booking,
    Payment,
    Refund,
}

impl ResourceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceType::Booking => "booking",
            ResourceType::Payment => "payment",
            ResourceType::Refund => "refund",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "booking" => Some(ResourceType::Booking),
            "payment" => Some(ResourceType::Payment),
            "refund" => Some(ResourceType::Refund),
            _ => None,
        }
    }
}

/// Per-(key, user) deduplication record. Unique on that pair; rows expire
/// 24 hours after creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdempotencyRecord {
    pub id: Uuid,
    pub idempotency_key: String,
    pub user_id: Uuid,
    pub request_path: String,
    /// SHA-256 hex over the canonicalized request body.
    pub request_hash: String,
    pub resource_type: ResourceType,
    pub status: IdempotencyStatus,
    pub response_status: Option<i32>,
    pub response_body: Option<serde_json::Value>,
    pub resource_id: Option<String>,
    pub error_message: Option<String>,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
