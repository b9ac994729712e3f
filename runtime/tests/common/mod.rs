//! Shared fixtures for engine integration tests.

#![allow(dead_code, clippy::expect_used)]

use std::sync::Arc;
use std::time::Duration;

use tripdesk_core::types::{Actor, Consultant, Customer, Itinerary, Money, OrderStatus, Role};
use tripdesk_runtime::{Engine, EngineConfig, Environment, PlaceOrder, RetryPolicy};
use tripdesk_testing::{
    InMemoryOrderStore, MockPaymentGateway, RecordingNotifier, SequentialCodeGenerator,
    test_clock, test_time,
};

pub struct Harness {
    pub store: Arc<InMemoryOrderStore>,
    pub engine: Engine<InMemoryOrderStore>,
    pub gateway: MockPaymentGateway,
    pub notifier: RecordingNotifier,
}

pub fn fast_config() -> EngineConfig {
    EngineConfig::default()
        .with_transaction_deadline(Duration::from_secs(2))
        .with_cascade_retry(
            RetryPolicy::builder()
                .max_retries(2)
                .initial_delay(Duration::from_millis(1))
                .build(),
        )
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(fast_config())
    }

    pub fn with_config(config: EngineConfig) -> Self {
        let store = Arc::new(InMemoryOrderStore::new());
        let gateway = MockPaymentGateway::new();
        let notifier = RecordingNotifier::new();
        let env = Environment::new(Arc::new(gateway.clone()), Arc::new(notifier.clone()))
            .with_clock(Arc::new(test_clock()))
            .with_codes(Arc::new(SequentialCodeGenerator::new()));
        let engine = Engine::new(Arc::clone(&store), env, config);
        Self {
            store,
            engine,
            gateway,
            notifier,
        }
    }

    pub fn customer(&self, code: &str) -> Customer {
        self.store.add_customer(code).expect("seed customer")
    }

    pub fn consultant(&self, code: &str) -> Consultant {
        self.store.add_consultant(code).expect("seed consultant")
    }

    pub fn itinerary(&self, code: &str, owner: &Customer) -> Itinerary {
        self.store
            .add_itinerary(code, owner.id, test_time())
            .expect("seed itinerary")
    }

    /// Give a consultant `count` pending orders on fresh itineraries.
    pub fn load(&self, consultant: &Consultant, owner: &Customer, count: usize) {
        for n in 0..count {
            let itinerary = self.itinerary(&format!("LOAD-{}-{n}", consultant.code), owner);
            self.store
                .add_order(&itinerary, consultant.id, OrderStatus::Pending, test_time())
                .expect("seed order");
        }
    }

    pub async fn drain(&self) {
        self.engine.notifications().drain().await;
    }
}

pub fn admin() -> Actor {
    Actor::new("ADM-1", Role::Admin)
}

pub fn acting_as(customer: &Customer) -> Actor {
    Actor::new(customer.code.clone(), Role::Customer)
}

pub fn place(itinerary: &Itinerary, payer: &Customer, cents: i64) -> PlaceOrder {
    PlaceOrder {
        itinerary_code: itinerary.code.clone(),
        payer_code: payer.code.clone(),
        total_price: Money::from_cents(cents),
        consultant_code: None,
        order_type: Default::default(),
        itinerary_update: None,
    }
}
