use axum::{
    extract::{Path, State},
    response::IntoResponse,
    routing::post,
    Json, Router,
};
use serde::Serialize;
use uuid::Uuid;

use marquee_booking::BookingError;
use marquee_core::engine::ReservationEngine;
use marquee_core::repository::ShowtimeRepository;

use crate::error::ApiError;
use crate::state::AppState;

#[derive(Debug, Serialize)]
struct InitSeatsResponse {
    showtime_id: Uuid,
    initialized: u32,
}

pub fn routes() -> Router<AppState> {
    Router::new().route("/v1/admin/showtimes/:id/seats/init", post(init_seat_table))
}

/// Seed the engine's seat table from the showtime's stored layout. Wipes any
/// previous live state for the showtime, so this belongs to provisioning, not
/// to the sale path.
async fn init_seat_table(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let showtime = state
        .showtimes
        .get(id)
        .await
        .map_err(BookingError::from)?
        .ok_or(BookingError::ShowtimeNotFound)?;

    let initialized = state
        .engine
        .init_seat_table(id, &showtime.seats, state.seat_table_ttl_seconds)
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?;

    tracing::info!(showtime_id = %id, seats = initialized, "seat table initialized");
    Ok(Json(InitSeatsResponse { showtime_id: id, initialized }))
}
