use axum::http::{HeaderMap, Method};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

pub mod admin;
pub mod bookings;
pub mod error;
pub mod middleware;
pub mod payments;
pub mod seats;
pub mod state;
pub mod webhooks;
pub mod worker;

pub use state::{AppState, AuthConfig};

use crate::error::ApiError;
use crate::middleware::auth::{admin_auth_middleware, customer_auth_middleware};

pub fn app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(tower_http::cors::Any)
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers([
            axum::http::header::AUTHORIZATION,
            axum::http::header::CONTENT_TYPE,
            axum::http::HeaderName::from_static("x-idempotency-key"),
        ]);

    let customer = Router::new()
        .merge(bookings::routes())
        .merge(payments::routes())
        .route_layer(axum::middleware::from_fn_with_state(
            state.clone(),
            customer_auth_middleware,
        ));

    let admin = admin::routes().route_layer(axum::middleware::from_fn_with_state(
        state.clone(),
        admin_auth_middleware,
    ));

    Router::new()
        .merge(customer)
        .merge(admin)
        // Webhooks authenticate by signature upstream; seat maps are public.
        .merge(webhooks::routes())
        .merge(seats::routes())
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Every idempotent mutation requires the `X-Idempotency-Key` header.
pub(crate) fn require_idempotency_key(headers: &HeaderMap) -> Result<String, ApiError> {
    headers
        .get("X-Idempotency-Key")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .filter(|v| !v.is_empty())
        .ok_or_else(|| ApiError::Validation("missing X-Idempotency-Key header".into()))
}
