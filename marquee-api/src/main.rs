use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use marquee_api::{app, worker, AppState, AuthConfig};
use marquee_booking::{BookingOrchestrator, BookingPolicy};
use marquee_core::idempotency::IdempotencyGuard;
use marquee_engine::{RedisSeatEngine, ScriptRuntime};
use marquee_payment::{MockGateway, PaymentOrchestrator};
use marquee_store::{
    DbClient, EventProducer, PgBookingRepository, PgIdempotencyRepository, PgPaymentRepository,
    PgShowtimeRepository,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "marquee_api=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = marquee_store::app_config::Config::load().context("Failed to load config")?;
    tracing::info!("Starting Marquee API on port {}", config.server.port);

    let db = DbClient::new(&config.database.url).await.context("Failed to connect to Postgres")?;
    db.migrate().await.context("Failed to run migrations")?;

    // Loads every seat script and caches the SHAs up front.
    let runtime = ScriptRuntime::connect(&config.redis.url)
        .await
        .context("Failed to connect to Redis")?;
    let engine = Arc::new(RedisSeatEngine::new(runtime));

    let kafka = EventProducer::new(&config.kafka.brokers).context("Failed to create producer")?;

    let bookings_repo = Arc::new(PgBookingRepository::new(db.pool.clone()));
    let payments_repo = Arc::new(PgPaymentRepository::new(db.pool.clone()));
    let showtimes_repo = Arc::new(PgShowtimeRepository::new(db.pool.clone()));
    let idempotency_repo = Arc::new(PgIdempotencyRepository::new(db.pool.clone()));

    let rules = &config.business_rules;
    let booking_orchestrator = Arc::new(BookingOrchestrator::new(
        engine.clone(),
        bookings_repo.clone(),
        showtimes_repo.clone(),
        IdempotencyGuard::new(idempotency_repo.clone(), rules.idempotency_ttl_seconds),
        BookingPolicy {
            hold_duration_seconds: rules.hold_duration_seconds,
            max_seats_per_booking: rules.max_seats_per_booking,
            reaper_batch_size: rules.reaper_batch_size,
        },
    ));
    let payment_orchestrator = Arc::new(PaymentOrchestrator::new(
        payments_repo,
        bookings_repo,
        Arc::new(MockGateway),
        booking_orchestrator.clone(),
        IdempotencyGuard::new(idempotency_repo.clone(), rules.idempotency_ttl_seconds),
        rules.payment_expiry_seconds,
    ));

    let (seat_tx, _) = tokio::sync::broadcast::channel(100);

    let app_state = AppState {
        bookings: booking_orchestrator,
        payments: payment_orchestrator,
        engine,
        showtimes: showtimes_repo,
        idempotency: idempotency_repo,
        events: Some(Arc::new(kafka)),
        seat_tx,
        auth: AuthConfig {
            secret: config.auth.jwt_secret.clone(),
            expiration: config.auth.jwt_expiration_seconds,
        },
        seat_table_ttl_seconds: rules.seat_table_ttl_seconds,
    };

    tokio::spawn(worker::start_expiry_reaper(
        app_state.clone(),
        Duration::from_secs(rules.reaper_period_seconds),
    ));

    let app = app(app_state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await.context("bind failed")?;
    axum::serve(listener, app).await.context("server crashed")?;
    Ok(())
}
