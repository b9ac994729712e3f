//! HTTP request handlers.
//!
//! Handlers are thin: extract, call one engine operation, map the result.

pub mod consultants;
pub mod health;
pub mod itineraries;
pub mod orders;
pub mod webhooks;

pub use health::{health_check, metrics};
