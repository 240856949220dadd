use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::Response,
};
use jsonwebtoken::{decode, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::state::AppState;

/// Bearer claims minted by the host's auth service. One shape serves both
/// roles; what differs per route class is the role gate and whether a user
/// identity gets attached.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    pub sub: String,
    pub email: String,
    pub role: String,
    pub exp: usize,
}

/// Identity attached to the request once the customer gate passes. Handlers
/// read this instead of raw claims, so ownership checks always work on a
/// parsed user id.
#[derive(Debug, Clone)]
pub struct AuthenticatedUser {
    pub id: Uuid,
    pub email: String,
}

fn decode_claims(secret: &str, req: &Request) -> Result<Claims, StatusCode> {
    let token = req
        .headers()
        .get("Authorization")
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .ok_or(StatusCode::UNAUTHORIZED)?;

    decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map(|data| data.claims)
    .map_err(|_| StatusCode::UNAUTHORIZED)
}

/// Booking and payment routes act on the caller's own records, so the
/// customer gate also pins the token subject to a user id.
pub async fn customer_auth_middleware(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    let claims = decode_claims(&state.auth.secret, &req)?;
    if claims.role != "CUSTOMER" {
        return Err(StatusCode::FORBIDDEN);
    }
    let id = Uuid::parse_str(&claims.sub).map_err(|_| StatusCode::UNAUTHORIZED)?;
    req.extensions_mut().insert(AuthenticatedUser { id, email: claims.email });

    Ok(next.run(req).await)
}

/// Seat-table provisioning is operator work; the gate checks the role and
/// attaches nothing, since admin routes never touch per-user records.
pub async fn admin_auth_middleware(
    State(state): State<AppState>,
    req: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    let claims = decode_claims(&state.auth.secret, &req)?;
    if claims.role != "ADMIN" && claims.role != "SUPER_ADMIN" {
        return Err(StatusCode::FORBIDDEN);
    }

    Ok(next.run(req).await)
}
