use std::convert::Infallible;

use axum::{
    extract::{Path, State},
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse,
    },
    routing::get,
    Json, Router,
};
use futures_util::stream::Stream;
use serde::Serialize;
use tokio_stream::StreamExt;
use uuid::Uuid;

use marquee_core::engine::ReservationEngine;
use marquee_domain::seat::SeatView;

use crate::error::ApiError;
use crate::state::AppState;

#[derive(Debug, Serialize)]
struct SeatStatusResponse {
    showtime_id: Uuid,
    available: i64,
    seats: Vec<SeatView>,
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/v1/showtimes/:id/seats", get(seat_status))
        .route("/v1/showtimes/:id/seats/stream", get(seat_stream))
}

/// Live seat map straight from the engine; reading also lazily reaps any
/// lapsed hold it touches.
async fn seat_status(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let status = state
        .engine
        .seats_status(id, None)
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?;
    Ok(Json(SeatStatusResponse { showtime_id: id, available: status.available, seats: status.seats }))
}

async fn seat_stream(
    State(state): State<AppState>,
    Path(showtime_id): Path<Uuid>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let rx = state.seat_tx.subscribe();
    let stream = tokio_stream::wrappers::BroadcastStream::new(rx).filter_map(move |result| {
        match result {
            Ok(event) if event.showtime_id == showtime_id => {
                Some(Ok(Event::default().data(serde_json::to_string(&event).unwrap_or_default())))
            }
            _ => None,
        }
    });

    Sse::new(stream).keep_alive(KeepAlive::default())
}
