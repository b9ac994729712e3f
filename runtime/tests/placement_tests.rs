//! Integration tests for order placement, scheduling and cancellation.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)] // Test code can use unwrap/expect/panic

mod common;

use std::time::Duration;

use common::{Harness, acting_as, admin, fast_config, place};
use futures::future::join_all;
use tripdesk_core::notify::Template;
use tripdesk_core::types::{
    ChangeReason, ItineraryPatch, Money, OrderStatus, OrderType, PaymentStatus, Role,
};
use tripdesk_core::{EngineError, OrderStore, StoreError, StoreTransaction};

#[tokio::test]
async fn first_placement_creates_pending_order() {
    let h = Harness::new();
    let payer = h.customer("CUS-1");
    let tc = h.consultant("TC-1");
    let itinerary = h.itinerary("ITN-1", &payer);

    let placed = h
        .engine
        .place_or_update_order(&acting_as(&payer), place(&itinerary, &payer, 250_000))
        .await
        .unwrap();

    assert!(placed.created);
    assert_eq!(placed.order.status, OrderStatus::Pending);
    assert_eq!(placed.order.consultant_id, tc.id);
    assert_eq!(placed.order.total_price, Money::from_cents(250_000));
    assert_eq!(placed.order.code, "ORD-000000000001");

    let changes = h.store.itinerary_changes().unwrap();
    assert_eq!(changes.len(), 1);
    assert_eq!(changes[0].previous_consultant_id, None);
    assert_eq!(changes[0].new_consultant_id, tc.id);

    h.drain().await;
    let templates = h.notifier.templates();
    assert_eq!(templates.len(), 2);
    assert!(templates.contains(&Template::OrderPlaced));
    assert!(templates.contains(&Template::ConsultantAssigned));
}

#[tokio::test]
async fn second_placement_updates_in_place() {
    let h = Harness::new();
    let payer = h.customer("CUS-1");
    let tc = h.consultant("TC-1");
    h.consultant("TC-2");
    let itinerary = h.itinerary("ITN-1", &payer);
    let actor = acting_as(&payer);

    let first = h
        .engine
        .place_or_update_order(&actor, place(&itinerary, &payer, 100_000))
        .await
        .unwrap();
    let mut again = place(&itinerary, &payer, 120_000);
    again.order_type = OrderType::Custom;
    let second = h.engine.place_or_update_order(&actor, again).await.unwrap();

    assert!(!second.created);
    assert_eq!(second.order.id, first.order.id);
    assert_eq!(second.order.code, first.order.code);
    assert_eq!(second.order.created_at, first.order.created_at);
    assert_eq!(second.order.consultant_id, tc.id);
    assert_eq!(second.order.total_price, Money::from_cents(120_000));
    assert_eq!(second.order.order_type, OrderType::Custom);
    assert_eq!(h.store.orders().unwrap().len(), 1);
    assert_eq!(h.store.itinerary_changes().unwrap().len(), 1);
}

#[tokio::test]
async fn concurrent_placements_leave_one_order() {
    let h = Harness::new();
    let payer = h.customer("CUS-1");
    h.consultant("TC-1");
    let itinerary = h.itinerary("ITN-1", &payer);
    let actor = acting_as(&payer);

    let attempts = (1..=8).map(|n| {
        h.engine
            .place_or_update_order(&actor, place(&itinerary, &payer, 100_000 + n))
    });
    let results = join_all(attempts).await;

    assert!(results.iter().all(Result::is_ok));
    assert_eq!(results.iter().filter(|r| r.as_ref().unwrap().created).count(), 1);
    let orders = h.store.orders().unwrap();
    assert_eq!(orders.len(), 1);
    let codes: Vec<_> = results.iter().map(|r| r.as_ref().unwrap().order.code.clone()).collect();
    assert!(codes.iter().all(|code| *code == orders[0].code));
}

#[tokio::test]
async fn least_loaded_consultant_wins_with_lowest_id_tie_break() {
    let h = Harness::new();
    let payer = h.customer("CUS-1");
    let loads = [3, 1, 4, 1, 5];
    let consultants: Vec<_> = (0..loads.len())
        .map(|n| h.consultant(&format!("TC-{n}")))
        .collect();
    for (consultant, load) in consultants.iter().zip(loads) {
        h.load(consultant, &payer, load);
    }
    let itinerary = h.itinerary("ITN-NEW", &payer);

    let placed = h
        .engine
        .place_or_update_order(&acting_as(&payer), place(&itinerary, &payer, 1_000))
        .await
        .unwrap();

    assert_eq!(placed.consultant.id, consultants[1].id);
    assert_eq!(
        h.engine.assign_least_loaded(Vec::new()).await.unwrap().id,
        consultants[3].id
    );
}

#[tokio::test]
async fn no_eligible_consultant_writes_nothing() {
    let h = Harness::new();
    let payer = h.customer("CUS-1");
    h.store
        .add_consultant_with("TC-OFF", Role::Tc, false, None)
        .unwrap();
    h.store
        .add_consultant_with("ADM-9", Role::Admin, true, None)
        .unwrap();
    let itinerary = h.itinerary("ITN-1", &payer);

    let err = h
        .engine
        .place_or_update_order(&acting_as(&payer), place(&itinerary, &payer, 1_000))
        .await
        .unwrap_err();

    assert_eq!(err, EngineError::NoEligibleConsultant);
    assert!(h.store.orders().unwrap().is_empty());
    assert!(h.store.itinerary_changes().unwrap().is_empty());
    assert!(h.store.activity().unwrap().is_empty());
}

#[tokio::test]
async fn explicit_consultant_overrides_and_is_logged() {
    let h = Harness::new();
    let payer = h.customer("CUS-1");
    let first = h.consultant("TC-1");
    let chosen = h.consultant("TC-2");
    let itinerary = h.itinerary("ITN-1", &payer);
    let staff = admin();

    h.engine
        .place_or_update_order(&staff, place(&itinerary, &payer, 1_000))
        .await
        .unwrap();
    let mut request = place(&itinerary, &payer, 1_000);
    request.consultant_code = Some(chosen.code.clone());
    let placed = h.engine.place_or_update_order(&staff, request).await.unwrap();

    assert_eq!(placed.order.consultant_id, chosen.id);
    let changes = h.store.itinerary_changes().unwrap();
    assert_eq!(changes.len(), 2);
    assert_eq!(changes[1].previous_consultant_id, Some(first.id));
    assert_eq!(changes[1].new_consultant_id, chosen.id);
    assert_eq!(changes[1].reason, ChangeReason::Override);

    let activity = h.store.activity().unwrap();
    assert!(activity.iter().all(|entry| entry.on_behalf()));
}

#[tokio::test]
async fn inactive_or_unknown_explicit_consultant_is_refused() {
    let h = Harness::new();
    let payer = h.customer("CUS-1");
    h.consultant("TC-1");
    h.store
        .add_consultant_with("TC-OFF", Role::Tc, false, None)
        .unwrap();
    let itinerary = h.itinerary("ITN-1", &payer);

    let mut request = place(&itinerary, &payer, 1_000);
    request.consultant_code = Some("TC-OFF".into());
    let err = h
        .engine
        .place_or_update_order(&admin(), request.clone())
        .await
        .unwrap_err();
    assert_eq!(err, EngineError::ConsultantInactive { code: "TC-OFF".into() });

    request.consultant_code = Some("TC-404".into());
    let err = h.engine.place_or_update_order(&admin(), request).await.unwrap_err();
    assert_eq!(err, EngineError::ConsultantNotFound { code: "TC-404".into() });
    assert!(h.store.orders().unwrap().is_empty());
}

#[tokio::test]
async fn validation_errors_come_before_any_write() {
    let h = Harness::new();
    let payer = h.customer("CUS-1");
    let other = h.customer("CUS-2");
    h.consultant("TC-1");
    let itinerary = h.itinerary("ITN-1", &payer);

    let err = h
        .engine
        .place_or_update_order(&acting_as(&payer), place(&itinerary, &payer, 0))
        .await
        .unwrap_err();
    assert_eq!(err, EngineError::InvalidAmount { cents: 0 });

    let err = h
        .engine
        .place_or_update_order(&acting_as(&other), place(&itinerary, &payer, 1_000))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::NotPermitted { .. }));

    let mut missing = place(&itinerary, &payer, 1_000);
    missing.itinerary_code = "ITN-404".into();
    let err = h
        .engine
        .place_or_update_order(&acting_as(&payer), missing)
        .await
        .unwrap_err();
    assert_eq!(err, EngineError::ItineraryNotFound { code: "ITN-404".into() });
    assert!(h.store.orders().unwrap().is_empty());
}

#[tokio::test]
async fn placement_can_patch_the_itinerary() {
    let h = Harness::new();
    let payer = h.customer("CUS-1");
    h.consultant("TC-1");
    let itinerary = h.itinerary("ITN-1", &payer);

    let mut request = place(&itinerary, &payer, 1_000);
    request.itinerary_update = Some(ItineraryPatch {
        title: Some("Bali, 5 nights".into()),
        ..ItineraryPatch::default()
    });
    h.engine
        .place_or_update_order(&acting_as(&payer), request)
        .await
        .unwrap();

    let stored = h.store.itinerary(itinerary.id).unwrap().unwrap();
    assert_eq!(stored.title, "Bali, 5 nights");
}

#[tokio::test]
async fn terminal_orders_are_closed_to_placement() {
    let h = Harness::new();
    let payer = h.customer("CUS-1");
    h.consultant("TC-1");
    let itinerary = h.itinerary("ITN-1", &payer);
    let actor = acting_as(&payer);

    let placed = h
        .engine
        .place_or_update_order(&actor, place(&itinerary, &payer, 1_000))
        .await
        .unwrap();
    let cancelled = h.engine.cancel_order(&actor, &placed.order.code).await.unwrap();
    assert_eq!(cancelled.status, OrderStatus::Cancelled);

    let err = h
        .engine
        .place_or_update_order(&actor, place(&itinerary, &payer, 2_000))
        .await
        .unwrap_err();
    assert_eq!(
        err,
        EngineError::OrderClosed {
            code: placed.order.code.clone(),
            status: OrderStatus::Cancelled,
        }
    );
}

#[tokio::test]
async fn cancel_voids_processing_payment_and_is_idempotent() {
    let h = Harness::new();
    let payer = h.customer("CUS-1");
    h.consultant("TC-1");
    let itinerary = h.itinerary("ITN-1", &payer);
    let actor = acting_as(&payer);
    let placed = h
        .engine
        .place_or_update_order(&actor, place(&itinerary, &payer, 1_000))
        .await
        .unwrap();
    h.engine
        .update_payment(&actor, &placed.order.code, Money::from_cents(1_000))
        .await
        .unwrap();

    h.engine.cancel_order(&actor, &placed.order.code).await.unwrap();
    let again = h.engine.cancel_order(&actor, &placed.order.code).await.unwrap();

    assert_eq!(again.status, OrderStatus::Cancelled);
    assert_eq!(h.store.payments().unwrap()[0].status, PaymentStatus::Cancelled);
    h.drain().await;
    let cancellations = h
        .notifier
        .templates()
        .into_iter()
        .filter(|t| *t == Template::OrderCancelled)
        .count();
    assert_eq!(cancellations, 1);
}

#[tokio::test]
async fn stranger_cannot_cancel() {
    let h = Harness::new();
    let payer = h.customer("CUS-1");
    let stranger = h.customer("CUS-2");
    h.consultant("TC-1");
    let itinerary = h.itinerary("ITN-1", &payer);
    let placed = h
        .engine
        .place_or_update_order(&acting_as(&payer), place(&itinerary, &payer, 1_000))
        .await
        .unwrap();

    let err = h
        .engine
        .cancel_order(&acting_as(&stranger), &placed.order.code)
        .await
        .unwrap_err();
    assert_eq!(
        err,
        EngineError::PayerMismatch {
            order_code: placed.order.code
        }
    );
}

#[tokio::test]
async fn held_aggregate_lock_hits_the_deadline_and_rolls_back() {
    let h = Harness::with_config(
        fast_config().with_transaction_deadline(Duration::from_millis(50)),
    );
    let payer = h.customer("CUS-1");
    h.consultant("TC-1");
    let itinerary = h.itinerary("ITN-1", &payer);

    let mut blocker = h.store.begin().await.unwrap();
    blocker.lock_aggregate(itinerary.id).await.unwrap();

    let err = h
        .engine
        .place_or_update_order(&acting_as(&payer), place(&itinerary, &payer, 1_000))
        .await
        .unwrap_err();
    assert_eq!(err, EngineError::DeadlineExceeded { deadline_ms: 50 });
    assert!(err.is_retryable());

    blocker.rollback().await.unwrap();
    assert!(h.store.orders().unwrap().is_empty());

    let placed = h
        .engine
        .place_or_update_order(&acting_as(&payer), place(&itinerary, &payer, 1_000))
        .await
        .unwrap();
    assert!(placed.created);
}

#[tokio::test]
async fn failed_commit_leaves_no_trace() {
    let h = Harness::new();
    let payer = h.customer("CUS-1");
    h.consultant("TC-1");
    let itinerary = h.itinerary("ITN-1", &payer);
    h.store
        .fail_next_commit(StoreError::Unavailable("connection reset".into()))
        .unwrap();

    let err = h
        .engine
        .place_or_update_order(&acting_as(&payer), place(&itinerary, &payer, 1_000))
        .await
        .unwrap_err();

    assert!(err.is_retryable());
    assert!(h.store.orders().unwrap().is_empty());
    h.drain().await;
    assert!(h.notifier.sent().is_empty());
}

#[tokio::test]
async fn activity_window_limits_candidates() {
    use chrono::Duration as Span;
    use tripdesk_testing::test_time;

    let h = Harness::with_config(
        fast_config().with_scheduler_active_within(Some(Duration::from_secs(15 * 60))),
    );
    let payer = h.customer("CUS-1");
    let stale = h
        .store
        .add_consultant_with("TC-STALE", Role::Tc, true, Some(test_time() - Span::hours(3)))
        .unwrap();
    let fresh = h
        .store
        .add_consultant_with("TC-FRESH", Role::Tc, true, Some(test_time() - Span::minutes(5)))
        .unwrap();
    h.load(&fresh, &payer, 2);

    let chosen = h.engine.assign_least_loaded(Vec::new()).await.unwrap();
    assert_eq!(chosen.id, fresh.id);

    h.engine.touch_consultant(&stale.code).await.unwrap();
    let chosen = h.engine.assign_least_loaded(Vec::new()).await.unwrap();
    assert_eq!(chosen.id, stale.id);
}
