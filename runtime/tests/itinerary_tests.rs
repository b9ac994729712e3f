//! Integration tests for itinerary operations.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)] // Test code can use unwrap/expect/panic

mod common;

use chrono::NaiveDate;
use common::{Harness, acting_as, admin, place};
use serde_json::json;
use tripdesk_core::EngineError;
use tripdesk_core::types::{ItineraryPatch, Money};
use tripdesk_runtime::CreateItinerary;

fn date(day: u32) -> Option<NaiveDate> {
    NaiveDate::from_ymd_opt(2026, 7, day)
}

fn create_request(customer_code: &str) -> CreateItinerary {
    CreateItinerary {
        customer_code: customer_code.to_string(),
        title: "Komodo liveaboard".into(),
        estimated_price: Money::from_cents(1_250_000),
        start_date: date(3),
        end_date: date(9),
        detail: json!({"cabins": 2}),
    }
}

#[tokio::test]
async fn customer_creates_and_reads_back() {
    let h = Harness::new();
    let customer = h.customer("CUS-1");

    let created = h
        .engine
        .create_itinerary(&acting_as(&customer), create_request("CUS-1"))
        .await
        .unwrap();

    assert_eq!(created.code, "ITN-000000000001");
    assert_eq!(created.customer_id, customer.id);
    assert!(!created.is_deleted());
    assert_eq!(h.engine.itinerary(&created.code).await.unwrap(), created);

    let activity = h.store.activity().unwrap();
    assert_eq!(activity.len(), 1);
    assert_eq!(activity[0].action, "itinerary.created");
    assert!(!activity[0].on_behalf());
}

#[tokio::test]
async fn staff_create_on_behalf() {
    let h = Harness::new();
    h.customer("CUS-1");

    h.engine
        .create_itinerary(&admin(), create_request("CUS-1"))
        .await
        .unwrap();

    assert!(h.store.activity().unwrap()[0].on_behalf());
}

#[tokio::test]
async fn create_validation() {
    let h = Harness::new();
    let customer = h.customer("CUS-1");
    let other = h.customer("CUS-2");
    let actor = acting_as(&customer);

    let mut backwards = create_request("CUS-1");
    backwards.start_date = date(10);
    let err = h.engine.create_itinerary(&actor, backwards).await.unwrap_err();
    assert!(matches!(err, EngineError::InvalidDateRange { .. }));

    let mut untitled = create_request("CUS-1");
    untitled.title = "   ".into();
    let err = h.engine.create_itinerary(&actor, untitled).await.unwrap_err();
    assert!(matches!(err, EngineError::InvalidInput(_)));

    let err = h
        .engine
        .create_itinerary(&acting_as(&other), create_request("CUS-1"))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::NotPermitted { .. }));

    let err = h
        .engine
        .create_itinerary(&admin(), create_request("CUS-404"))
        .await
        .unwrap_err();
    assert_eq!(err, EngineError::PayerNotFound { code: "CUS-404".into() });
}

#[tokio::test]
async fn patch_updates_fields_and_validates_merged_dates() {
    let h = Harness::new();
    let customer = h.customer("CUS-1");
    let actor = acting_as(&customer);
    let created = h
        .engine
        .create_itinerary(&actor, create_request("CUS-1"))
        .await
        .unwrap();

    let err = h
        .engine
        .update_itinerary(
            &actor,
            &created.code,
            ItineraryPatch {
                end_date: date(1),
                ..ItineraryPatch::default()
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::InvalidDateRange { .. }));

    let updated = h
        .engine
        .update_itinerary(
            &actor,
            &created.code,
            ItineraryPatch {
                title: Some("Komodo, 4 cabins".into()),
                detail: Some(json!({"cabins": 4})),
                ..ItineraryPatch::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(updated.title, "Komodo, 4 cabins");
    assert_eq!(updated.detail["cabins"], 4);
    assert_eq!(updated.start_date, date(3));
}

#[tokio::test]
async fn soft_delete_refuses_while_an_order_is_pending() {
    let h = Harness::new();
    let customer = h.customer("CUS-1");
    h.consultant("TC-1");
    let actor = acting_as(&customer);
    let itinerary = h.itinerary("ITN-1", &customer);
    let placed = h
        .engine
        .place_or_update_order(&actor, place(&itinerary, &customer, 1_000))
        .await
        .unwrap();

    let err = h
        .engine
        .soft_delete_itinerary(&actor, &itinerary.code)
        .await
        .unwrap_err();
    assert_eq!(
        err,
        EngineError::ItineraryHasPendingOrder {
            code: itinerary.code.clone()
        }
    );

    h.engine.cancel_order(&actor, &placed.order.code).await.unwrap();
    h.engine
        .soft_delete_itinerary(&actor, &itinerary.code)
        .await
        .unwrap();

    let err = h.engine.itinerary(&itinerary.code).await.unwrap_err();
    assert_eq!(err, EngineError::ItineraryNotFound { code: itinerary.code.clone() });
    let stored = h.store.itinerary(itinerary.id).unwrap().unwrap();
    assert!(stored.is_deleted());

    let err = h
        .engine
        .place_or_update_order(&actor, place(&itinerary, &customer, 1_000))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::ItineraryNotFound { .. }));
}

#[tokio::test]
async fn history_lists_every_consultant_change() {
    let h = Harness::new();
    let customer = h.customer("CUS-1");
    let first = h.consultant("TC-1");
    let second = h.consultant("TC-2");
    let itinerary = h.itinerary("ITN-1", &customer);

    h.engine
        .place_or_update_order(&admin(), place(&itinerary, &customer, 1_000))
        .await
        .unwrap();
    h.engine.deactivate_consultant(&admin(), &first.code).await.unwrap();

    let history = h.engine.itinerary_history(&itinerary.code).await.unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].previous_consultant_id, None);
    assert_eq!(history[0].new_consultant_id, first.id);
    assert_eq!(history[1].previous_consultant_id, Some(first.id));
    assert_eq!(history[1].new_consultant_id, second.id);

    let err = h.engine.itinerary_history("ITN-404").await.unwrap_err();
    assert_eq!(err, EngineError::ItineraryNotFound { code: "ITN-404".into() });
}
