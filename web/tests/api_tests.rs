//! HTTP surface tests over the in-memory store.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)] // Test code can use unwrap/expect/panic

use std::sync::Arc;

use axum::http::{HeaderName, HeaderValue, StatusCode};
use axum_test::{TestRequest, TestServer};
use serde_json::{Value, json};
use tripdesk_core::types::{Customer, Itinerary, OrderStatus};
use tripdesk_runtime::{Engine, EngineConfig, Environment};
use tripdesk_testing::{
    InMemoryOrderStore, MockPaymentGateway, RecordingNotifier, SequentialCodeGenerator,
    test_clock, test_time,
};
use tripdesk_web::{AppState, CORRELATION_ID_HEADER, WebhookVerifier, build_router};

const SERVER_KEY: &str = "SB-test-server-key";

struct Api {
    server: TestServer,
    store: Arc<InMemoryOrderStore>,
}

impl Api {
    fn new() -> Self {
        let store = Arc::new(InMemoryOrderStore::new());
        let env = Environment::new(
            Arc::new(MockPaymentGateway::new()),
            Arc::new(RecordingNotifier::new()),
        )
        .with_clock(Arc::new(test_clock()))
        .with_codes(Arc::new(SequentialCodeGenerator::new()));
        let engine = Engine::new(Arc::clone(&store), env, EngineConfig::default());
        let state = AppState::new(Arc::new(engine), WebhookVerifier::new(SERVER_KEY));
        let server = TestServer::new(build_router(state)).expect("test server");
        Self { server, store }
    }

    fn customer(&self, code: &str) -> Customer {
        self.store.add_customer(code).expect("seed customer")
    }

    fn itinerary(&self, code: &str, owner: &Customer) -> Itinerary {
        self.store
            .add_itinerary(code, owner.id, test_time())
            .expect("seed itinerary")
    }
}

/// Gateway notification signed the way the gateway signs it.
fn notification(order_id: &str, transaction_status: &str, gross_amount: &str) -> Value {
    let signature = WebhookVerifier::new(SERVER_KEY).sign(order_id, "200", gross_amount);
    json!({
        "order_id": order_id,
        "status_code": "200",
        "payment_type": "bank_transfer",
        "transaction_status": transaction_status,
        "fraud_status": "accept",
        "gross_amount": gross_amount,
        "signature_key": signature,
    })
}

fn as_actor(request: TestRequest, code: &str, role: &str) -> TestRequest {
    request
        .add_header(
            HeaderName::from_static("x-actor-code"),
            HeaderValue::from_str(code).unwrap(),
        )
        .add_header(
            HeaderName::from_static("x-actor-role"),
            HeaderValue::from_str(role).unwrap(),
        )
}

#[tokio::test]
async fn health_is_public() {
    let api = Api::new();

    let response = api.server.get("/health").await;

    assert_eq!(response.status_code(), StatusCode::OK);
    assert_eq!(response.json::<Value>()["status"], "ok");
    assert!(response.headers().contains_key(CORRELATION_ID_HEADER));
}

#[tokio::test]
async fn api_requires_actor_headers() {
    let api = Api::new();

    let response = api
        .server
        .post("/api/orders")
        .json(&json!({"itinerary_code": "ITN-1", "payer_code": "CUS-1", "total_price": 100}))
        .await;

    assert_eq!(response.status_code(), StatusCode::UNAUTHORIZED);
    assert_eq!(response.json::<Value>()["code"], "UNAUTHORIZED");
}

#[tokio::test]
async fn place_then_update_order() {
    let api = Api::new();
    let customer = api.customer("CUS-1");
    api.store.add_consultant("TC-1").unwrap();
    api.itinerary("ITN-1", &customer);
    let body = json!({"itinerary_code": "ITN-1", "payer_code": "CUS-1", "total_price": 150_000});

    let created = as_actor(api.server.post("/api/orders"), "CUS-1", "customer")
        .json(&body)
        .await;
    assert_eq!(created.status_code(), StatusCode::CREATED);
    let created: Value = created.json();
    assert_eq!(created["created"], true);
    assert_eq!(created["order"]["status"], "pending");
    assert_eq!(created["consultant"]["code"], "TC-1");

    let updated = as_actor(api.server.post("/api/orders"), "CUS-1", "customer")
        .json(&json!({"itinerary_code": "ITN-1", "payer_code": "CUS-1", "total_price": 175_000}))
        .await;
    assert_eq!(updated.status_code(), StatusCode::OK);
    let updated: Value = updated.json();
    assert_eq!(updated["order"]["code"], created["order"]["code"]);
    assert_eq!(updated["order"]["total_price"], 175_000);
}

#[tokio::test]
async fn engine_errors_map_to_statuses() {
    let api = Api::new();
    let customer = api.customer("CUS-1");
    api.customer("CUS-2");
    api.itinerary("ITN-1", &customer);

    let missing = as_actor(api.server.get("/api/itineraries/ITN-404"), "CUS-1", "customer").await;
    assert_eq!(missing.status_code(), StatusCode::NOT_FOUND);

    // Empty consultant pool.
    let conflict = as_actor(api.server.post("/api/orders"), "CUS-1", "customer")
        .json(&json!({"itinerary_code": "ITN-1", "payer_code": "CUS-1", "total_price": 100}))
        .await;
    assert_eq!(conflict.status_code(), StatusCode::CONFLICT);

    api.store.add_consultant("TC-1").unwrap();
    let invalid = as_actor(api.server.post("/api/orders"), "CUS-1", "customer")
        .json(&json!({"itinerary_code": "ITN-1", "payer_code": "CUS-1", "total_price": 0}))
        .await;
    assert_eq!(invalid.status_code(), StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(invalid.json::<Value>()["code"], "VALIDATION_ERROR");

    let mismatch = as_actor(api.server.post("/api/orders"), "CUS-1", "customer")
        .json(&json!({"itinerary_code": "ITN-1", "payer_code": "CUS-2", "total_price": 100}))
        .await;
    assert_eq!(mismatch.status_code(), StatusCode::CONFLICT);
    assert!(api.store.orders().unwrap().is_empty());
}

#[tokio::test]
async fn payment_then_settlement_webhook() {
    let api = Api::new();
    let customer = api.customer("CUS-1");
    api.store.add_consultant("TC-1").unwrap();
    api.itinerary("ITN-1", &customer);
    let placed: Value = as_actor(api.server.post("/api/orders"), "CUS-1", "customer")
        .json(&json!({"itinerary_code": "ITN-1", "payer_code": "CUS-1", "total_price": 90_000}))
        .await
        .json();
    let order_code = placed["order"]["code"].as_str().unwrap().to_string();

    let payment = as_actor(
        api.server.post(&format!("/api/orders/{order_code}/payment")),
        "CUS-1",
        "customer",
    )
    .json(&json!({"amount": 90_000}))
    .await;
    assert_eq!(payment.status_code(), StatusCode::OK);
    let payment: Value = payment.json();
    assert_eq!(payment["status"], "processing");
    assert_eq!(payment["renewed"], false);

    let webhook = notification(&order_code, "settlement", "90000.00");
    let applied = api.server.post("/webhooks/payment").json(&webhook).await;
    assert_eq!(applied.status_code(), StatusCode::OK);
    assert_eq!(applied.json::<Value>()["outcome"], "applied");

    let replay = api.server.post("/webhooks/payment").json(&webhook).await;
    assert_eq!(replay.json::<Value>()["outcome"], "unchanged");

    let order = as_actor(
        api.server.get(&format!("/api/orders/{order_code}")),
        "CUS-1",
        "customer",
    )
    .await;
    assert_eq!(order.json::<Value>()["status"], "completed");
    assert_eq!(api.store.orders().unwrap()[0].status, OrderStatus::Completed);
}

#[tokio::test]
async fn webhook_requires_json() {
    let api = Api::new();

    let response = api
        .server
        .post("/webhooks/payment")
        .text(r#"{"order_id":"ORD-1","transaction_status":"settlement"}"#)
        .await;

    assert_eq!(response.status_code(), StatusCode::UNSUPPORTED_MEDIA_TYPE);
}

#[tokio::test]
async fn webhook_for_unknown_order_is_not_found() {
    let api = Api::new();

    let response = api
        .server
        .post("/webhooks/payment")
        .json(&notification("ORD-404", "settlement", "1.00"))
        .await;

    assert_eq!(response.status_code(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn itinerary_lifecycle() {
    let api = Api::new();
    api.customer("CUS-1");

    let created = as_actor(api.server.post("/api/itineraries"), "CUS-1", "customer")
        .json(&json!({
            "customer_code": "CUS-1",
            "title": "Flores overland",
            "estimated_price": 800_000,
            "start_date": "2026-08-01",
            "end_date": "2026-08-07",
            "detail": {"guide": true},
        }))
        .await;
    assert_eq!(created.status_code(), StatusCode::CREATED);
    let code = created.json::<Value>()["code"].as_str().unwrap().to_string();

    let patched = as_actor(
        api.server.patch(&format!("/api/itineraries/{code}")),
        "CUS-1",
        "customer",
    )
    .json(&json!({"title": "Flores overland, 9 days", "end_date": "2026-08-09"}))
    .await;
    assert_eq!(patched.status_code(), StatusCode::OK);
    assert_eq!(patched.json::<Value>()["end_date"], "2026-08-09");

    let inverted = as_actor(
        api.server.patch(&format!("/api/itineraries/{code}")),
        "CUS-1",
        "customer",
    )
    .json(&json!({"start_date": "2026-09-01"}))
    .await;
    assert_eq!(inverted.status_code(), StatusCode::UNPROCESSABLE_ENTITY);

    let changes = as_actor(
        api.server.get(&format!("/api/itineraries/{code}/changes")),
        "CUS-1",
        "customer",
    )
    .await;
    assert_eq!(changes.json::<Vec<Value>>().len(), 0);

    let deleted = as_actor(
        api.server.delete(&format!("/api/itineraries/{code}")),
        "CUS-1",
        "customer",
    )
    .await;
    assert_eq!(deleted.status_code(), StatusCode::NO_CONTENT);

    let gone = as_actor(
        api.server.get(&format!("/api/itineraries/{code}")),
        "CUS-1",
        "customer",
    )
    .await;
    assert_eq!(gone.status_code(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn deactivation_reports_reassignments() {
    let api = Api::new();
    let customer = api.customer("CUS-1");
    api.store.add_consultant("TC-1").unwrap();
    api.itinerary("ITN-1", &customer);
    as_actor(api.server.post("/api/orders"), "CUS-1", "customer")
        .json(&json!({"itinerary_code": "ITN-1", "payer_code": "CUS-1", "total_price": 100}))
        .await;
    api.store.add_consultant("TC-2").unwrap();

    let refused = as_actor(
        api.server.post("/api/consultants/TC-1/deactivate"),
        "TC-2",
        "tc",
    )
    .await;
    assert_eq!(refused.status_code(), StatusCode::CONFLICT);

    let report = as_actor(
        api.server.post("/api/consultants/TC-1/deactivate"),
        "ADM-1",
        "admin",
    )
    .await;
    assert_eq!(report.status_code(), StatusCode::OK);
    let report: Value = report.json();
    assert_eq!(report["reassigned"][0]["new_consultant"], "TC-2");
    assert!(report["failures"].as_array().unwrap().is_empty());

    let workload = as_actor(
        api.server.get("/api/consultants/TC-2/workload"),
        "TC-2",
        "tc",
    )
    .await;
    assert_eq!(workload.json::<Vec<Value>>().len(), 1);

    let reactivated = as_actor(
        api.server.post("/api/consultants/TC-1/reactivate"),
        "ADM-1",
        "admin",
    )
    .await;
    assert_eq!(reactivated.json::<Value>()["active"], true);
}

#[tokio::test]
async fn heartbeat_is_self_service() {
    let api = Api::new();
    api.store.add_consultant("TC-1").unwrap();

    let other = as_actor(api.server.post("/api/consultants/TC-1/heartbeat"), "TC-9", "tc").await;
    assert_eq!(other.status_code(), StatusCode::CONFLICT);

    let own = as_actor(api.server.post("/api/consultants/TC-1/heartbeat"), "TC-1", "tc").await;
    assert_eq!(own.status_code(), StatusCode::OK);
    assert!(!own.json::<Value>()["last_seen_at"].is_null());
}

#[tokio::test]
async fn forged_notification_leaves_the_order_alone() {
    let api = Api::new();
    let customer = api.customer("CUS-1");
    api.store.add_consultant("TC-1").unwrap();
    api.itinerary("ITN-1", &customer);
    let placed: Value = as_actor(api.server.post("/api/orders"), "CUS-1", "customer")
        .json(&json!({"itinerary_code": "ITN-1", "payer_code": "CUS-1", "total_price": 90_000}))
        .await
        .json();
    let order_code = placed["order"]["code"].as_str().unwrap().to_string();
    as_actor(
        api.server.post(&format!("/api/orders/{order_code}/payment")),
        "CUS-1",
        "customer",
    )
    .json(&json!({"amount": 90_000}))
    .await;

    let mut forged = notification(&order_code, "settlement", "90000.00");
    forged["gross_amount"] = json!("1.00");
    let refused = api.server.post("/webhooks/payment").json(&forged).await;
    assert_eq!(refused.status_code(), StatusCode::UNAUTHORIZED);

    let mut unsigned = notification(&order_code, "settlement", "90000.00");
    unsigned.as_object_mut().unwrap().remove("signature_key");
    let refused = api.server.post("/webhooks/payment").json(&unsigned).await;
    assert_eq!(refused.status_code(), StatusCode::UNAUTHORIZED);

    let orders = api.store.orders().unwrap();
    assert_eq!(orders[0].status, OrderStatus::Pending);
    assert_eq!(
        api.store.payments().unwrap()[0].status,
        tripdesk_core::types::PaymentStatus::Processing
    );
}
