//! # Tripdesk Testing
//!
//! Testing utilities for the Tripdesk order engine.
//!
//! This crate provides:
//! - [`InMemoryOrderStore`]: transactional store with aggregate locks and
//!   fault injection
//! - Mock collaborators: clocks, code generator, payment gateway, notifier
//! - proptest strategies for domain types
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use tripdesk_testing::{InMemoryOrderStore, MockPaymentGateway, RecordingNotifier, test_clock};
//!
//! #[tokio::test]
//! async fn places_an_order() {
//!     let store = Arc::new(InMemoryOrderStore::new());
//!     let customer = store.add_customer("CUS-1")?;
//!     store.add_consultant("TC-1")?;
//!     // build an Engine over `store` and place an order
//! }
//! ```

/// Mock implementations of collaborator traits.
pub mod mocks;

/// Property-based testing strategies.
pub mod properties;

/// In-memory transactional store.
pub mod store;

// Re-export commonly used items
pub use mocks::{
    FixedClock, ManualClock, MockPaymentGateway, RecordingNotifier, SequentialCodeGenerator,
    test_clock, test_time,
};
pub use store::{InMemoryOrderStore, InMemoryTransaction};
