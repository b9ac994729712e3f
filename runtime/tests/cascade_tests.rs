//! Integration tests for consultant deactivation and the reassignment cascade.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)] // Test code can use unwrap/expect/panic

mod common;

use std::time::Duration;

use common::{Harness, acting_as, admin};
use tripdesk_core::notify::Template;
use tripdesk_core::types::{Actor, ChangeReason, Money, NewOrder, OrderStatus, Role};
use tripdesk_core::{EngineError, OrderStore, StoreError, StoreTransaction};
use tripdesk_testing::test_time;

#[tokio::test]
async fn pending_orders_move_to_the_least_loaded_consultant() {
    let h = Harness::new();
    let payer = h.customer("CUS-1");
    let c = h.consultant("TC-C");
    let d = h.consultant("TC-D");
    let e = h.consultant("TC-E");
    h.load(&c, &payer, 2);
    h.load(&e, &payer, 2);

    let report = h.engine.deactivate_consultant(&admin(), &c.code).await.unwrap();

    assert!(report.is_complete());
    assert_eq!(report.consultant_code, "TC-C");
    assert_eq!(report.reassigned.len(), 2);
    assert!(report.reassigned.iter().all(|moved| moved.new_consultant == "TC-D"));
    assert!(report.skipped.is_empty());

    assert!(!h.store.consultant("TC-C").unwrap().unwrap().active);
    assert_eq!(h.engine.consultant_workload("TC-D").await.unwrap().len(), 2);
    assert!(h.engine.consultant_workload("TC-C").await.unwrap().is_empty());
    assert_eq!(h.engine.consultant_workload("TC-E").await.unwrap().len(), 2);

    let changes = h.store.itinerary_changes().unwrap();
    assert_eq!(changes.len(), 2);
    for change in &changes {
        assert_eq!(change.previous_consultant_id, Some(c.id));
        assert_eq!(change.new_consultant_id, d.id);
        assert_eq!(change.reason, ChangeReason::Admin);
    }
    assert!(changes.iter().all(|change| change.new_consultant_id != e.id));

    h.drain().await;
    let reassigned: Vec<_> = h
        .notifier
        .sent()
        .into_iter()
        .filter(|n| n.template == Template::ConsultantReassigned)
        .collect();
    assert_eq!(reassigned.len(), 2);
    assert!(reassigned
        .iter()
        .all(|n| n.recipients == vec![d.email.clone(), payer.email.clone()]));
}

#[tokio::test]
async fn terminal_orders_stay_put() {
    let h = Harness::new();
    let payer = h.customer("CUS-1");
    let c = h.consultant("TC-C");
    h.consultant("TC-D");
    let done = h.itinerary("ITN-DONE", &payer);
    h.store
        .add_order(&done, c.id, OrderStatus::Completed, test_time())
        .unwrap();
    h.load(&c, &payer, 1);

    let report = h.engine.deactivate_consultant(&admin(), &c.code).await.unwrap();

    assert_eq!(report.reassigned.len(), 1);
    let completed = h
        .store
        .orders()
        .unwrap()
        .into_iter()
        .find(|order| order.itinerary_id == done.id)
        .unwrap();
    assert_eq!(completed.consultant_id, c.id);
}

#[tokio::test]
async fn one_failing_order_does_not_block_the_rest() {
    let h = Harness::new();
    let payer = h.customer("CUS-1");
    let c = h.consultant("TC-C");
    h.consultant("TC-D");
    let stuck = h.itinerary("ITN-STUCK", &payer);
    let stuck_order = h
        .store
        .add_order(&stuck, c.id, OrderStatus::Pending, test_time())
        .unwrap();
    h.load(&c, &payer, 2);

    // One initial attempt plus two retries.
    h.store
        .fail_lock(stuck.id, 3, &StoreError::Unavailable("connection reset".into()))
        .unwrap();

    let report = h.engine.deactivate_consultant(&admin(), &c.code).await.unwrap();

    assert!(!report.is_complete());
    assert_eq!(report.reassigned.len(), 2);
    assert_eq!(report.failures.len(), 1);
    let failure = &report.failures[0];
    assert_eq!(failure.order_code, stuck_order.code);
    assert_eq!(failure.itinerary_code, "ITN-STUCK");
    assert!(failure.retryable);

    let rerun = h.engine.deactivate_consultant(&admin(), &c.code).await.unwrap();
    assert!(rerun.is_complete());
    assert_eq!(rerun.reassigned.len(), 1);
    assert_eq!(rerun.reassigned[0].order_code, stuck_order.code);
    assert!(h.engine.consultant_workload("TC-C").await.unwrap().is_empty());

    let deactivations = h
        .store
        .activity()
        .unwrap()
        .into_iter()
        .filter(|entry| entry.action == "consultant.deactivated")
        .count();
    assert_eq!(deactivations, 1);
}

#[tokio::test]
async fn transient_lock_failures_are_retried() {
    let h = Harness::new();
    let payer = h.customer("CUS-1");
    let c = h.consultant("TC-C");
    h.consultant("TC-D");
    let flaky = h.itinerary("ITN-FLAKY", &payer);
    h.store
        .add_order(&flaky, c.id, OrderStatus::Pending, test_time())
        .unwrap();
    h.store
        .fail_lock(flaky.id, 2, &StoreError::Timeout("lock wait".into()))
        .unwrap();

    let report = h.engine.deactivate_consultant(&admin(), &c.code).await.unwrap();

    assert!(report.is_complete());
    assert_eq!(report.reassigned.len(), 1);
}

#[tokio::test]
async fn nobody_left_to_take_the_work() {
    let h = Harness::new();
    let payer = h.customer("CUS-1");
    let c = h.consultant("TC-C");
    h.load(&c, &payer, 1);

    let report = h.engine.deactivate_consultant(&admin(), &c.code).await.unwrap();

    assert_eq!(report.failures.len(), 1);
    assert!(!report.failures[0].retryable);
    assert!(
        report.failures[0]
            .error
            .contains(&EngineError::NoEligibleConsultant.to_string())
    );
    assert_eq!(h.engine.consultant_workload("TC-C").await.unwrap().len(), 1);
}

#[tokio::test]
async fn lifecycle_operations_are_admin_only() {
    let h = Harness::new();
    let payer = h.customer("CUS-1");
    let c = h.consultant("TC-C");
    let tc = Actor::new("TC-X", Role::Tc);

    for actor in [acting_as(&payer), tc] {
        let err = h.engine.deactivate_consultant(&actor, &c.code).await.unwrap_err();
        assert!(matches!(err, EngineError::NotPermitted { .. }));
        let err = h.engine.reactivate_consultant(&actor, &c.code).await.unwrap_err();
        assert!(matches!(err, EngineError::NotPermitted { .. }));
    }
    assert!(h.store.consultant("TC-C").unwrap().unwrap().active);

    let err = h.engine.deactivate_consultant(&admin(), "TC-404").await.unwrap_err();
    assert_eq!(err, EngineError::ConsultantNotFound { code: "TC-404".into() });
}

#[tokio::test]
async fn reactivated_consultant_rejoins_the_pool_empty_handed() {
    let h = Harness::new();
    let payer = h.customer("CUS-1");
    let c = h.consultant("TC-C");
    let d = h.consultant("TC-D");
    h.load(&c, &payer, 1);
    h.load(&d, &payer, 1);

    h.engine.deactivate_consultant(&admin(), &c.code).await.unwrap();
    let back = h.engine.reactivate_consultant(&admin(), &c.code).await.unwrap();

    assert!(back.active);
    assert_eq!(back.last_seen_at, Some(test_time()));
    assert!(h.engine.consultant_workload("TC-C").await.unwrap().is_empty());
    assert_eq!(h.engine.assign_least_loaded(Vec::new()).await.unwrap().id, c.id);
    assert_eq!(
        h.engine.assign_least_loaded(vec![c.id]).await.unwrap().id,
        d.id
    );
}

#[tokio::test]
async fn heartbeat_committing_after_deactivation_keeps_the_consultant_out() {
    let h = Harness::new();
    let payer = h.customer("CUS-1");
    let c = h.consultant("TC-C");
    h.consultant("TC-D");
    h.load(&c, &payer, 1);
    let seen_at = test_time() + chrono::Duration::minutes(5);

    let mut heartbeat = h.store.begin().await.unwrap();
    heartbeat.touch_consultant(&c.code, seen_at).await.unwrap();
    let report = h.engine.deactivate_consultant(&admin(), &c.code).await.unwrap();
    heartbeat.commit().await.unwrap();

    assert_eq!(report.reassigned.len(), 1);
    let after = h.store.consultant("TC-C").unwrap().unwrap();
    assert!(!after.active);
    assert_eq!(after.last_seen_at, Some(seen_at));
    let next = h.engine.assign_least_loaded(Vec::new()).await.unwrap();
    assert_eq!(next.code, "TC-D");
}

#[tokio::test]
async fn deactivation_waits_for_an_in_flight_binding() {
    let h = Harness::new();
    let payer = h.customer("CUS-1");
    let c = h.consultant("TC-C");
    h.consultant("TC-D");
    let itinerary = h.itinerary("ITN-1", &payer);

    let mut placement = h.store.begin().await.unwrap();
    placement.lock_aggregate(itinerary.id).await.unwrap();
    let bound = placement.share_lock_consultant(c.id).await.unwrap().unwrap();
    assert!(bound.active);
    placement
        .insert_order(NewOrder {
            code: "ORD-INFLIGHT".into(),
            itinerary_id: itinerary.id,
            payer_id: payer.id,
            consultant_id: c.id,
            total_price: Money::from_cents(100_000),
            order_type: Default::default(),
            created_at: test_time(),
        })
        .await
        .unwrap();

    let commit_later = async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        placement.commit().await.unwrap();
    };
    let admin_actor = admin();
    let (report, ()) = tokio::join!(
        h.engine.deactivate_consultant(&admin_actor, &c.code),
        commit_later
    );
    let report = report.unwrap();

    assert_eq!(report.reassigned.len(), 1);
    assert_eq!(report.reassigned[0].order_code, "ORD-INFLIGHT");
    assert_eq!(report.reassigned[0].new_consultant, "TC-D");
    assert!(h.engine.consultant_workload("TC-C").await.unwrap().is_empty());
}

#[tokio::test]
async fn placement_after_deactivation_skips_the_consultant() {
    let h = Harness::new();
    let payer = h.customer("CUS-1");
    let c = h.consultant("TC-C");
    let itinerary = h.itinerary("ITN-1", &payer);
    h.engine.deactivate_consultant(&admin(), &c.code).await.unwrap();

    let mut explicit = common::place(&itinerary, &payer, 100_000);
    explicit.consultant_code = Some(c.code.clone());
    let err = h
        .engine
        .place_or_update_order(&acting_as(&payer), explicit)
        .await
        .unwrap_err();
    assert_eq!(err, EngineError::ConsultantInactive { code: "TC-C".into() });

    let err = h
        .engine
        .place_or_update_order(&acting_as(&payer), common::place(&itinerary, &payer, 100_000))
        .await
        .unwrap_err();
    assert_eq!(err, EngineError::NoEligibleConsultant);
    assert!(h.store.orders().unwrap().is_empty());
}
