use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Extension, Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use uuid::Uuid;

use marquee_booking::HoldSeatsRequest;
use marquee_domain::events::SeatsHeldEvent;
use marquee_domain::payment::PaymentMethod;
use marquee_payment::CreatePaymentRequest;

use crate::error::ApiError;
use crate::middleware::auth::AuthenticatedUser;
use crate::require_idempotency_key;
use crate::state::AppState;

#[derive(Debug, Serialize, Deserialize)]
struct HoldSeatsBody {
    showtime_id: Uuid,
    seats: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct ConfirmBookingBody {
    payment_method: PaymentMethod,
    #[serde(default)]
    return_url: Option<String>,
}

#[derive(Debug, Serialize)]
struct CancelBookingResponse {
    booking_id: Uuid,
    booking_code: String,
    status: String,
    cancellation_reason: Option<String>,
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/v1/bookings/hold", post(hold_seats))
        .route("/v1/bookings/:id/confirm", post(confirm_booking))
        .route("/v1/bookings/:id", get(get_booking).delete(cancel_booking))
}

async fn hold_seats(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
    headers: HeaderMap,
    Json(body): Json<HoldSeatsBody>,
) -> Result<impl IntoResponse, ApiError> {
    let idempotency_key = require_idempotency_key(&headers)?;
    let raw_body = serde_json::to_value(&body)
        .map_err(|e| ApiError::Internal(format!("encode request: {e}")))?;

    let response = state
        .bookings
        .hold_seats(HoldSeatsRequest {
            showtime_id: body.showtime_id,
            seats: body.seats,
            user_id: user.id,
            idempotency_key,
            raw_body,
        })
        .await?;

    let event = SeatsHeldEvent {
        showtime_id: response.showtime_id,
        booking_id: response.booking_id,
        seat_ids: response.seats.iter().map(|s| s.seat_id.clone()).collect(),
        hold_expires_at: response.hold_expires_at.timestamp(),
    };
    let _ = state.seat_tx.send(event.clone());
    if let Some(events) = &state.events {
        let _ = events.seats_held(&event).await;
    }

    Ok((StatusCode::CREATED, Json(response)))
}

/// Confirming a booking means opening its payment; the heavy lifting lives in
/// the payment orchestrator.
async fn confirm_booking(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
    Path(id): Path<Uuid>,
    headers: HeaderMap,
    Json(body): Json<ConfirmBookingBody>,
) -> Result<impl IntoResponse, ApiError> {
    let idempotency_key = require_idempotency_key(&headers)?;
    let raw_body = json!({
        "booking_id": id,
        "payment_method": body.payment_method,
        "return_url": body.return_url,
    });

    let response = state
        .payments
        .create_payment(CreatePaymentRequest {
            booking_id: id,
            payment_method: body.payment_method,
            return_url: body.return_url,
            user_id: user.id,
            idempotency_key,
            raw_body,
        })
        .await?;

    Ok((StatusCode::OK, Json(response)))
}

async fn get_booking(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let booking = state.bookings.get_booking(id, user.id).await?;
    Ok(Json(booking))
}

async fn cancel_booking(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let booking = state.bookings.cancel_booking(id, user.id).await?;

    if let Some(events) = &state.events {
        let _ = events.booking_event(booking.id, booking.status).await;
    }

    Ok(Json(CancelBookingResponse {
        booking_id: booking.id,
        booking_code: booking.booking_code.clone(),
        status: booking.status.to_string(),
        cancellation_reason: booking.cancellation_reason.clone(),
    }))
}
