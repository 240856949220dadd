use axum::{
    extract::{Path, State},
    response::IntoResponse,
    routing::post,
    Json, Router,
};

use marquee_domain::booking::BookingStatus;
use marquee_payment::{WebhookPayload, WebhookStatus};

use crate::error::ApiError;
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new().route("/v1/payments/webhook/:provider", post(handle_webhook))
}

/// Gateway callback. Signature verification (`X-Signature`, provider HMAC)
/// happens upstream; this endpoint assumes verified input and stays
/// idempotent across redeliveries.
async fn handle_webhook(
    State(state): State<AppState>,
    Path(provider): Path<String>,
    Json(payload): Json<WebhookPayload>,
) -> Result<impl IntoResponse, ApiError> {
    tracing::info!(%provider, txn = %payload.transaction_id, status = ?payload.status, "webhook received");

    let status = payload.status;
    let response = state.payments.handle_webhook(&provider, payload).await?;

    // booking_id is only set when this delivery settled the payment, so
    // replays publish nothing.
    if let (Some(events), Some(booking_id)) = (&state.events, response.booking_id) {
        let outcome = match status {
            WebhookStatus::Success => BookingStatus::Confirmed,
            WebhookStatus::Failed | WebhookStatus::Pending => BookingStatus::Cancelled,
        };
        let _ = events.booking_event(booking_id, outcome).await;
    }

    Ok(Json(response))
}
