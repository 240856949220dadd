use std::sync::Arc;

use uuid::Uuid;

use marquee_core::engine::{
    ConfirmFailReason, ReservationEngine, ReserveOutcome, SeatToReserve, UnavailableReason,
};
use marquee_domain::seat::{SeatStatus, SeatType};
use marquee_domain::showtime::SeatInfo;
use marquee_engine::InMemorySeatEngine;

fn layout(ids: &[&str]) -> Vec<SeatInfo> {
    ids.iter()
        .map(|id| SeatInfo { seat_id: (*id).to_string(), seat_type: SeatType::Standard, price: 90_000 })
        .collect()
}

fn to_reserve(ids: &[&str]) -> Vec<SeatToReserve> {
    ids.iter()
        .map(|id| SeatToReserve { seat_id: (*id).to_string(), seat_type: SeatType::Standard })
        .collect()
}

fn ids(ids: &[&str]) -> Vec<String> {
    ids.iter().map(|s| s.to_string()).collect()
}

async fn seeded(engine: &InMemorySeatEngine, seats: &[&str]) -> Uuid {
    let showtime = Uuid::new_v4();
    engine.init_seat_table(showtime, &layout(seats), 604_800).await.unwrap();
    showtime
}

#[tokio::test]
async fn reserve_holds_all_seats_and_decrements_counter() {
    let engine = InMemorySeatEngine::new();
    let showtime = seeded(&engine, &["A1", "A2", "A3"]).await;
    let booking = Uuid::new_v4();

    let outcome = engine
        .batch_reserve(showtime, booking, 600, &to_reserve(&["A1", "A2"]))
        .await
        .unwrap();
    match outcome {
        ReserveOutcome::Reserved { count, .. } => assert_eq!(count, 2),
        other => panic!("expected reserved, got {:?}", other),
    }

    let status = engine.seats_status(showtime, None).await.unwrap();
    assert_eq!(status.available, 1);
    let held: Vec<_> = status
        .seats
        .iter()
        .filter(|s| s.record.status == SeatStatus::Held)
        .map(|s| s.seat_id.clone())
        .collect();
    assert_eq!(held, vec!["A1", "A2"]);
    assert!(status.seats.iter().all(|s| {
        s.record.status != SeatStatus::Held || s.remaining_seconds.is_some()
    }));
}

#[tokio::test]
async fn reserve_is_all_or_nothing() {
    let engine = InMemorySeatEngine::new();
    let showtime = seeded(&engine, &["A1", "A2"]).await;
    let first = Uuid::new_v4();
    let second = Uuid::new_v4();

    engine.batch_reserve(showtime, first, 600, &to_reserve(&["A2"])).await.unwrap();

    // A1 is free but A2 is taken, so nothing may move.
    let outcome = engine
        .batch_reserve(showtime, second, 600, &to_reserve(&["A1", "A2"]))
        .await
        .unwrap();
    match outcome {
        ReserveOutcome::Unavailable { seats } => {
            assert_eq!(seats.len(), 1);
            assert_eq!(seats[0].seat_id, "A2");
            assert_eq!(seats[0].reason, UnavailableReason::Held);
        }
        other => panic!("expected unavailable, got {:?}", other),
    }

    let status = engine.seats_status(showtime, Some(&ids(&["A1"]))).await.unwrap();
    assert_eq!(status.seats[0].record.status, SeatStatus::Available);
    assert_eq!(status.available, 1);
}

#[tokio::test]
async fn unknown_seats_are_reported_not_found() {
    let engine = InMemorySeatEngine::new();
    let showtime = seeded(&engine, &["A1"]).await;

    let outcome = engine
        .batch_reserve(showtime, Uuid::new_v4(), 600, &to_reserve(&["Z9"]))
        .await
        .unwrap();
    match outcome {
        ReserveOutcome::Unavailable { seats } => {
            assert_eq!(seats[0].reason, UnavailableReason::NotFound)
        }
        other => panic!("expected unavailable, got {:?}", other),
    }
}

#[tokio::test]
async fn expired_hold_is_reservable_without_double_decrement() {
    let engine = InMemorySeatEngine::new();
    let showtime = seeded(&engine, &["A1"]).await;
    let first = Uuid::new_v4();
    let second = Uuid::new_v4();

    engine.batch_reserve(showtime, first, 600, &to_reserve(&["A1"])).await.unwrap();
    engine.advance_clock(601);

    let outcome = engine
        .batch_reserve(showtime, second, 600, &to_reserve(&["A1"]))
        .await
        .unwrap();
    assert!(matches!(outcome, ReserveOutcome::Reserved { .. }));

    // The first hold already took the seat out of the pool; taking over the
    // expired hold must not decrement again.
    let status = engine.seats_status(showtime, None).await.unwrap();
    assert_eq!(status.available, 0);
    assert_eq!(status.seats[0].record.booking_id, Some(second));
}

#[tokio::test]
async fn confirm_books_live_holds_and_reports_failures_per_seat() {
    let engine = InMemorySeatEngine::new();
    let showtime = seeded(&engine, &["A1", "A2", "A3"]).await;
    let booking = Uuid::new_v4();
    let intruder = Uuid::new_v4();

    engine.batch_reserve(showtime, booking, 600, &to_reserve(&["A1"])).await.unwrap();
    engine.batch_reserve(showtime, intruder, 600, &to_reserve(&["A2"])).await.unwrap();

    let outcome = engine
        .confirm_seats(showtime, booking, &ids(&["A1", "A2", "A3", "Z9"]))
        .await
        .unwrap();
    assert_eq!(outcome.confirmed, vec!["A1"]);
    assert!(!outcome.is_full());

    let reasons: Vec<(String, ConfirmFailReason)> =
        outcome.failed.iter().map(|f| (f.seat_id.clone(), f.reason)).collect();
    assert!(reasons.contains(&("A2".to_string(), ConfirmFailReason::WrongBooking)));
    assert!(reasons.contains(&("A3".to_string(), ConfirmFailReason::NotHeld)));
    assert!(reasons.contains(&("Z9".to_string(), ConfirmFailReason::NotFound)));

    // Confirming does not touch the counter; held seats were never available.
    let status = engine.seats_status(showtime, None).await.unwrap();
    assert_eq!(status.available, 1);
}

#[tokio::test]
async fn confirm_refuses_expired_holds() {
    let engine = InMemorySeatEngine::new();
    let showtime = seeded(&engine, &["A1"]).await;
    let booking = Uuid::new_v4();

    engine.batch_reserve(showtime, booking, 600, &to_reserve(&["A1"])).await.unwrap();
    engine.advance_clock(900);

    let outcome = engine.confirm_seats(showtime, booking, &ids(&["A1"])).await.unwrap();
    assert!(outcome.confirmed.is_empty());
    assert_eq!(outcome.failed[0].reason, ConfirmFailReason::HoldExpired);
}

#[tokio::test]
async fn release_restores_the_pre_hold_state() {
    let engine = InMemorySeatEngine::new();
    let showtime = seeded(&engine, &["A1", "A2"]).await;
    let booking = Uuid::new_v4();

    engine.batch_reserve(showtime, booking, 600, &to_reserve(&["A1", "A2"])).await.unwrap();
    let outcome = engine.release_seats(showtime, booking, &ids(&["A1", "A2"])).await.unwrap();
    assert_eq!(outcome.released.len(), 2);
    assert_eq!(outcome.available, 2);

    let status = engine.seats_status(showtime, None).await.unwrap();
    assert!(status.seats.iter().all(|s| s.record.status == SeatStatus::Available));
    assert_eq!(status.available, 2);
}

#[tokio::test]
async fn release_is_guarded_by_booking_id() {
    let engine = InMemorySeatEngine::new();
    let showtime = seeded(&engine, &["A1"]).await;
    let owner = Uuid::new_v4();
    let stranger = Uuid::new_v4();

    engine.batch_reserve(showtime, owner, 600, &to_reserve(&["A1"])).await.unwrap();

    // A reap for a different booking must not release this hold.
    let outcome = engine.release_seats(showtime, stranger, &ids(&["A1"])).await.unwrap();
    assert!(outcome.released.is_empty());
    assert_eq!(outcome.available, 0);

    // Double release: the second pass no longer matches and must not
    // double-increment the counter.
    engine.release_seats(showtime, owner, &ids(&["A1"])).await.unwrap();
    let again = engine.release_seats(showtime, owner, &ids(&["A1"])).await.unwrap();
    assert!(again.released.is_empty());
    assert_eq!(again.available, 1);
}

#[tokio::test]
async fn release_also_frees_booked_seats_for_refund_flows() {
    let engine = InMemorySeatEngine::new();
    let showtime = seeded(&engine, &["A1"]).await;
    let booking = Uuid::new_v4();

    engine.batch_reserve(showtime, booking, 600, &to_reserve(&["A1"])).await.unwrap();
    engine.confirm_seats(showtime, booking, &ids(&["A1"])).await.unwrap();

    let outcome = engine.release_seats(showtime, booking, &ids(&["A1"])).await.unwrap();
    assert_eq!(outcome.released, vec!["A1"]);
    assert_eq!(outcome.available, 1);
}

#[tokio::test]
async fn cleanup_reaps_only_lapsed_holds() {
    let engine = InMemorySeatEngine::new();
    let showtime = seeded(&engine, &["A1", "A2"]).await;
    let short = Uuid::new_v4();
    let long = Uuid::new_v4();

    engine.batch_reserve(showtime, short, 60, &to_reserve(&["A1"])).await.unwrap();
    engine.batch_reserve(showtime, long, 600, &to_reserve(&["A2"])).await.unwrap();
    engine.advance_clock(120);

    let outcome = engine.cleanup_expired_holds(showtime).await.unwrap();
    assert_eq!(outcome.released, vec!["A1"]);
    assert_eq!(outcome.available, 1);

    let status = engine.seats_status(showtime, Some(&ids(&["A1"]))).await.unwrap();
    assert_eq!(status.seats[0].record.released_reason.as_deref(), Some("HOLD_EXPIRED"));
}

#[tokio::test]
async fn status_read_lazily_reaps_expired_holds() {
    let engine = InMemorySeatEngine::new();
    let showtime = seeded(&engine, &["A1"]).await;

    engine.batch_reserve(showtime, Uuid::new_v4(), 60, &to_reserve(&["A1"])).await.unwrap();
    engine.advance_clock(61);

    let status = engine.seats_status(showtime, None).await.unwrap();
    assert_eq!(status.seats[0].record.status, SeatStatus::Available);
    assert_eq!(status.available, 1);
}

#[tokio::test]
async fn extend_hold_never_revives_an_expired_hold() {
    let engine = InMemorySeatEngine::new();
    let showtime = seeded(&engine, &["A1", "A2"]).await;
    let booking = Uuid::new_v4();

    engine.batch_reserve(showtime, booking, 60, &to_reserve(&["A1"])).await.unwrap();
    let live = engine.extend_hold(showtime, booking, &ids(&["A1"]), 300).await.unwrap();
    assert_eq!(live.extended, 1);

    engine.advance_clock(600);
    let lapsed = engine.extend_hold(showtime, booking, &ids(&["A1"]), 300).await.unwrap();
    assert_eq!(lapsed.extended, 0);
}

// Flash sale: one seat, many racing bookings, exactly one winner.
#[tokio::test]
async fn contended_reserve_admits_exactly_one_booking() {
    let engine = Arc::new(InMemorySeatEngine::new());
    let showtime = seeded(&engine, &["A1"]).await;

    let mut handles = Vec::new();
    for _ in 0..1000 {
        let engine = Arc::clone(&engine);
        handles.push(tokio::spawn(async move {
            engine
                .batch_reserve(showtime, Uuid::new_v4(), 600, &to_reserve(&["A1"]))
                .await
                .unwrap()
        }));
    }

    let mut won = 0;
    let mut lost = 0;
    for handle in handles {
        match handle.await.unwrap() {
            ReserveOutcome::Reserved { .. } => won += 1,
            ReserveOutcome::Unavailable { .. } => lost += 1,
        }
    }
    assert_eq!(won, 1);
    assert_eq!(lost, 999);

    let status = engine.seats_status(showtime, None).await.unwrap();
    assert_eq!(status.available, 0);
}
