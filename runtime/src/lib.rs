//! # Tripdesk Runtime
//!
//! Services of the order engine, built on the storage and collaborator
//! traits from `tripdesk-core`.
//!
//! ## Components
//!
//! - **Itineraries**: create, patch, soft-delete, change history
//! - **Scheduler**: least-loaded consultant selection
//! - **Orders**: place-or-update with one order per itinerary, cancellation
//! - **Payments**: payment URL issuance and renewal
//! - **Reconciliation**: idempotent gateway webhook processing
//! - **Cascade**: consultant deactivation with per-order reassignment
//!
//! All of them are methods on [`Engine`], which owns the store, the
//! collaborators and the transaction deadline.
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use tripdesk_runtime::{Engine, EngineConfig, Environment, PlaceOrder};
//!
//! let engine = Engine::new(Arc::new(store), Environment::new(gateway, notifier), EngineConfig::default());
//! let placed = engine.place_or_update_order(&actor, PlaceOrder { .. }).await?;
//! let payment = engine.update_payment(&actor, &placed.order.code, placed.order.total_price).await?;
//! ```

/// Runtime configuration
pub mod config;

/// Engine, environment and transaction helper
pub mod engine;

/// Itinerary operations
pub mod itineraries;

/// Prometheus metrics for observability
pub mod metrics;

/// Post-commit notification dispatch
pub mod notifications;

/// Order placement and cancellation
pub mod orders;

/// Payment URL issuance
pub mod payments;

/// Gateway webhook reconciliation
pub mod reconciliation;

/// Retry logic with exponential backoff
pub mod retry;

/// Least-loaded consultant selection
pub mod scheduler;

/// Consultant deactivation and reassignment
pub mod cascade;

pub use cascade::{CascadeReport, Reassignment, ReassignmentFailure};
pub use config::EngineConfig;
pub use engine::{Engine, Environment};
pub use itineraries::CreateItinerary;
pub use notifications::{LogNotifier, NotificationDispatcher};
pub use orders::{PlaceOrder, PlacedOrder};
pub use payments::OrderPaymentView;
pub use reconciliation::{GatewayNotification, ReconcileOutcome};
pub use retry::RetryPolicy;
