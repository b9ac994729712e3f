//! # Tripdesk Core
//!
//! Domain types and collaborator traits for the Tripdesk order engine: the
//! subsystem that assigns travel consultants to customer itineraries, keeps
//! exactly one order (and one payment) per itinerary, reconciles payment
//! gateway webhooks and reassigns work when a consultant is deactivated.
//!
//! ## Core Concepts
//!
//! - **Itinerary**: a customer's travel plan, the unit an order is bound to
//! - **Order / `OrderPayment`**: one row each per parent, updated in place
//! - **Consultant**: a worker whose load is the count of its `pending` orders
//! - **`ItineraryChange`**: append-only audit log of reassignments
//!
//! ## Crate Layout
//!
//! - [`types`]: identifiers, statuses and entities
//! - [`error`]: the `NotFound / Conflict / Invalid / Transient / Fatal` taxonomy
//! - [`store`]: transactional storage traits with aggregate locking
//! - [`status_map`]: declarative gateway-status decision table
//! - [`assignment`]: least-loaded selection rule
//! - [`gateway`], [`notify`], [`environment`]: external collaborators
//!
//! Services built on these live in `tripdesk-runtime`.

pub mod assignment;
pub mod environment;
pub mod error;
pub mod gateway;
pub mod notify;
pub mod status_map;
pub mod store;
pub mod types;

// Re-export commonly used types
pub use chrono::{DateTime, NaiveDate, Utc};
pub use error::{EngineError, ErrorKind, GatewayError, NotifyError, Result, StoreError};
pub use store::{OrderStore, StoreTransaction};
