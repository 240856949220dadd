use chrono::Utc;
use serde_json::{json, Value};

/// Categorized error envelope returned by every failing operation and cached
/// by the idempotency layer so retries replay the same failure.
pub fn error_envelope(status_code: u16, error_code: &str, message: &str) -> Value {
    json!({
        "statusCode": status_code,
        "errorCode": error_code,
        "message": message,
        "timestamp": Utc::now().to_rfc3339(),
    })
}
