use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use chrono::{Duration, Utc};
use http_body_util::BodyExt;
use jsonwebtoken::{encode, EncodingKey, Header};
use serde_json::{json, Value};
use tower::ServiceExt;
use uuid::Uuid;

use marquee_api::{app, AppState, AuthConfig};
use marquee_booking::{BookingOrchestrator, BookingPolicy};
use marquee_core::engine::ReservationEngine;
use marquee_core::idempotency::IdempotencyGuard;
use marquee_domain::seat::SeatType;
use marquee_domain::showtime::{SeatInfo, Showtime, ShowtimeStatus};
use marquee_engine::InMemorySeatEngine;
use marquee_payment::{MockGateway, PaymentOrchestrator};
use marquee_store::memory::{
    MemBookingRepository, MemIdempotencyRepository, MemPaymentRepository, MemShowtimeRepository,
};

const SECRET: &str = "test-secret";

struct TestApp {
    router: Router,
    showtime_id: Uuid,
}

async fn test_app() -> TestApp {
    let engine = Arc::new(InMemorySeatEngine::new());
    let bookings_repo = Arc::new(MemBookingRepository::new());
    let payments_repo = Arc::new(MemPaymentRepository::new());
    let showtimes_repo = Arc::new(MemShowtimeRepository::new());
    let idempotency_repo = Arc::new(MemIdempotencyRepository::new());

    let showtime_id = Uuid::new_v4();
    let layout = vec![
        SeatInfo { seat_id: "A1".into(), seat_type: SeatType::Standard, price: 90_000 },
        SeatInfo { seat_id: "A2".into(), seat_type: SeatType::Standard, price: 90_000 },
        SeatInfo { seat_id: "V1".into(), seat_type: SeatType::Vip, price: 150_000 },
    ];
    showtimes_repo.insert(Showtime {
        id: showtime_id,
        movie_title: "Midnight Premiere".into(),
        screen: "Screen 1".into(),
        status: ShowtimeStatus::Scheduled,
        start_time: Utc::now() + Duration::hours(4),
        currency: "VND".into(),
        seats: layout.clone(),
    });
    engine.init_seat_table(showtime_id, &layout, 604_800).await.unwrap();

    let bookings = Arc::new(BookingOrchestrator::new(
        engine.clone(),
        bookings_repo.clone(),
        showtimes_repo.clone(),
        IdempotencyGuard::new(idempotency_repo.clone(), 86_400),
        BookingPolicy::default(),
    ));
    let payments = Arc::new(PaymentOrchestrator::new(
        payments_repo,
        bookings_repo,
        Arc::new(MockGateway),
        bookings.clone(),
        IdempotencyGuard::new(idempotency_repo.clone(), 86_400),
        900,
    ));

    let (seat_tx, _) = tokio::sync::broadcast::channel(16);
    let state = AppState {
        bookings,
        payments,
        engine,
        showtimes: showtimes_repo,
        idempotency: idempotency_repo,
        events: None,
        seat_tx,
        auth: AuthConfig { secret: SECRET.into(), expiration: 3600 },
        seat_table_ttl_seconds: 604_800,
    };

    TestApp { router: app(state), showtime_id }
}

fn customer_token(user_id: Uuid) -> String {
    let claims = json!({
        "sub": user_id.to_string(),
        "email": "customer@example.com",
        "role": "CUSTOMER",
        "exp": (Utc::now() + Duration::hours(1)).timestamp(),
    });
    encode(&Header::default(), &claims, &EncodingKey::from_secret(SECRET.as_bytes())).unwrap()
}

async fn send(router: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, body)
}

fn hold_request(showtime_id: Uuid, seats: &[&str], token: &str, key: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/v1/bookings/hold")
        .header("Authorization", format!("Bearer {token}"))
        .header("X-Idempotency-Key", key)
        .header("Content-Type", "application/json")
        .body(Body::from(
            json!({"showtime_id": showtime_id, "seats": seats}).to_string(),
        ))
        .unwrap()
}

fn payment_request(booking_id: &str, token: &str, key: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/v1/payments")
        .header("Authorization", format!("Bearer {token}"))
        .header("X-Idempotency-Key", key)
        .header("Content-Type", "application/json")
        .body(Body::from(
            json!({"booking_id": booking_id, "payment_method": "momo"}).to_string(),
        ))
        .unwrap()
}

fn webhook_request(provider: &str, txn: &str, status: &str, amount: i64) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(format!("/v1/payments/webhook/{provider}"))
        .header("Content-Type", "application/json")
        .body(Body::from(
            json!({"transaction_id": txn, "status": status, "amount": amount}).to_string(),
        ))
        .unwrap()
}

#[tokio::test]
async fn hold_requires_authentication_and_an_idempotency_key() {
    let app = test_app().await;

    let unauthenticated = Request::builder()
        .method("POST")
        .uri("/v1/bookings/hold")
        .header("Content-Type", "application/json")
        .body(Body::from(json!({"showtime_id": app.showtime_id, "seats": ["A1"]}).to_string()))
        .unwrap();
    let (status, _) = send(&app.router, unauthenticated).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let token = customer_token(Uuid::new_v4());
    let missing_key = Request::builder()
        .method("POST")
        .uri("/v1/bookings/hold")
        .header("Authorization", format!("Bearer {token}"))
        .header("Content-Type", "application/json")
        .body(Body::from(json!({"showtime_id": app.showtime_id, "seats": ["A1"]}).to_string()))
        .unwrap();
    let (status, body) = send(&app.router, missing_key).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["errorCode"], "VALIDATION");
}

#[tokio::test]
async fn hold_then_replay_returns_byte_identical_bodies() {
    let app = test_app().await;
    let token = customer_token(Uuid::new_v4());

    let (status, first) =
        send(&app.router, hold_request(app.showtime_id, &["A1", "V1"], &token, "it-key-1")).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(first["total_amount"], 240_000);
    assert_eq!(first["status"], "pending");
    assert!(first["booking_code"].as_str().unwrap().starts_with("BK-"));

    let (status, second) =
        send(&app.router, hold_request(app.showtime_id, &["A1", "V1"], &token, "it-key-1")).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(first, second);
}

#[tokio::test]
async fn same_key_different_body_is_a_400() {
    let app = test_app().await;
    let token = customer_token(Uuid::new_v4());

    send(&app.router, hold_request(app.showtime_id, &["A1"], &token, "it-key-2")).await;
    let (status, body) =
        send(&app.router, hold_request(app.showtime_id, &["A2"], &token, "it-key-2")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["errorCode"], "KEY_REUSED_DIFFERENT_BODY");
}

#[tokio::test]
async fn contended_seat_is_a_409_with_the_unavailable_list() {
    let app = test_app().await;

    let (status, _) = send(
        &app.router,
        hold_request(app.showtime_id, &["A1"], &customer_token(Uuid::new_v4()), "winner-key"),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, body) = send(
        &app.router,
        hold_request(app.showtime_id, &["A1"], &customer_token(Uuid::new_v4()), "loser-key"),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["errorCode"], "SEATS_NOT_AVAILABLE");
}

#[tokio::test]
async fn pay_and_webhook_success_confirms_the_booking() {
    let app = test_app().await;
    let user = Uuid::new_v4();
    let token = customer_token(user);

    let (_, hold) =
        send(&app.router, hold_request(app.showtime_id, &["A1", "A2"], &token, "pay-hold")).await;
    let booking_id = hold["booking_id"].as_str().unwrap().to_string();

    let (status, payment) =
        send(&app.router, payment_request(&booking_id, &token, "pay-create")).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(payment["status"], "processing");
    let payment_id = payment["payment_id"].as_str().unwrap();
    let txn = format!("txn_{}", payment_id.replace('-', ""));

    let (status, body) = send(&app.router, webhook_request("momo", &txn, "success", 180_000)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);

    // The booking is confirmed and visible to its owner.
    let get = Request::builder()
        .method("GET")
        .uri(format!("/v1/bookings/{booking_id}"))
        .header("Authorization", format!("Bearer {token}"))
        .body(Body::empty())
        .unwrap();
    let (status, booking) = send(&app.router, get).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(booking["status"], "confirmed");

    // Redelivered webhook: 200, no further effect.
    let (status, replay) =
        send(&app.router, webhook_request("momo", &txn, "success", 180_000)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(replay["message"], "already processed");
}

#[tokio::test]
async fn failed_webhook_cancels_and_frees_the_seats() {
    let app = test_app().await;
    let user = Uuid::new_v4();
    let token = customer_token(user);

    let (_, hold) =
        send(&app.router, hold_request(app.showtime_id, &["A1", "A2"], &token, "fail-hold")).await;
    let booking_id = hold["booking_id"].as_str().unwrap().to_string();
    let (_, payment) = send(&app.router, payment_request(&booking_id, &token, "fail-create")).await;
    let payment_id = payment["payment_id"].as_str().unwrap();
    let txn = format!("txn_{}", payment_id.replace('-', ""));

    let (status, _) = send(&app.router, webhook_request("momo", &txn, "failed", 180_000)).await;
    assert_eq!(status, StatusCode::OK);

    let seats = Request::builder()
        .method("GET")
        .uri(format!("/v1/showtimes/{}/seats", app.showtime_id))
        .body(Body::empty())
        .unwrap();
    let (status, map) = send(&app.router, seats).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(map["available"], 3);
}

#[tokio::test]
async fn cancel_round_trips_the_seat_map() {
    let app = test_app().await;
    let user = Uuid::new_v4();
    let token = customer_token(user);

    let (_, hold) =
        send(&app.router, hold_request(app.showtime_id, &["A1"], &token, "cancel-hold")).await;
    let booking_id = hold["booking_id"].as_str().unwrap().to_string();

    let cancel = Request::builder()
        .method("DELETE")
        .uri(format!("/v1/bookings/{booking_id}"))
        .header("Authorization", format!("Bearer {token}"))
        .body(Body::empty())
        .unwrap();
    let (status, body) = send(&app.router, cancel).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "cancelled");

    let seats = Request::builder()
        .method("GET")
        .uri(format!("/v1/showtimes/{}/seats", app.showtime_id))
        .body(Body::empty())
        .unwrap();
    let (_, map) = send(&app.router, seats).await;
    assert_eq!(map["available"], 3);
}

#[tokio::test]
async fn webhooks_reject_unknown_providers_and_transactions() {
    let app = test_app().await;

    let (status, body) = send(&app.router, webhook_request("paypal", "txn_x", "success", 1)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["errorCode"], "BAD_PROVIDER");

    let (status, body) = send(&app.router, webhook_request("momo", "txn_x", "success", 1)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["errorCode"], "PAYMENT_NOT_FOUND");
}

#[tokio::test]
async fn foreign_bookings_are_invisible_and_not_cancellable() {
    let app = test_app().await;
    let owner = customer_token(Uuid::new_v4());
    let stranger = customer_token(Uuid::new_v4());

    let (_, hold) =
        send(&app.router, hold_request(app.showtime_id, &["A1"], &owner, "owner-hold")).await;
    let booking_id = hold["booking_id"].as_str().unwrap().to_string();

    let get = Request::builder()
        .method("GET")
        .uri(format!("/v1/bookings/{booking_id}"))
        .header("Authorization", format!("Bearer {stranger}"))
        .body(Body::empty())
        .unwrap();
    let (status, body) = send(&app.router, get).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["errorCode"], "BOOKING_NOT_OWNED");

    let cancel = Request::builder()
        .method("DELETE")
        .uri(format!("/v1/bookings/{booking_id}"))
        .header("Authorization", format!("Bearer {stranger}"))
        .body(Body::empty())
        .unwrap();
    let (status, _) = send(&app.router, cancel).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn admin_seat_init_requires_the_admin_role() {
    let app = test_app().await;

    let customer = customer_token(Uuid::new_v4());
    let init = Request::builder()
        .method("POST")
        .uri(format!("/v1/admin/showtimes/{}/seats/init", app.showtime_id))
        .header("Authorization", format!("Bearer {customer}"))
        .body(Body::empty())
        .unwrap();
    let (status, _) = send(&app.router, init).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let admin_claims = json!({
        "sub": Uuid::new_v4().to_string(),
        "email": "ops@example.com",
        "role": "ADMIN",
        "exp": (Utc::now() + Duration::hours(1)).timestamp(),
    });
    let admin = encode(
        &jsonwebtoken::Header::default(),
        &admin_claims,
        &EncodingKey::from_secret(SECRET.as_bytes()),
    )
    .unwrap();
    let init = Request::builder()
        .method("POST")
        .uri(format!("/v1/admin/showtimes/{}/seats/init", app.showtime_id))
        .header("Authorization", format!("Bearer {admin}"))
        .body(Body::empty())
        .unwrap();
    let (status, body) = send(&app.router, init).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["initialized"], 3);
}
