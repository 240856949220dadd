use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Extension, Json, Router,
};
use serde::Deserialize;
use uuid::Uuid;

use marquee_domain::payment::PaymentMethod;
use marquee_payment::CreatePaymentRequest;

use crate::error::ApiError;
use crate::middleware::auth::AuthenticatedUser;
use crate::require_idempotency_key;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
struct CreatePaymentBody {
    booking_id: Uuid,
    payment_method: PaymentMethod,
    #[serde(default)]
    return_url: Option<String>,
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/v1/payments", post(create_payment))
        .route("/v1/payments/:id", get(get_payment))
}

async fn create_payment(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
    headers: HeaderMap,
    Json(body): Json<CreatePaymentBody>,
) -> Result<impl IntoResponse, ApiError> {
    let idempotency_key = require_idempotency_key(&headers)?;
    let raw_body = serde_json::json!({
        "booking_id": body.booking_id,
        "payment_method": body.payment_method,
        "return_url": body.return_url,
    });

    let response = state
        .payments
        .create_payment(CreatePaymentRequest {
            booking_id: body.booking_id,
            payment_method: body.payment_method,
            return_url: body.return_url,
            user_id: user.id,
            idempotency_key,
            raw_body,
        })
        .await?;

    Ok((StatusCode::CREATED, Json(response)))
}

async fn get_payment(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let payment = state.payments.get_payment(id, user.id).await?;
    Ok(Json(payment))
}
