//! Injected dependencies that are not storage: time and code generation.

use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Clock trait - abstracts time operations for testability
pub trait Clock: Send + Sync {
    /// Get the current time
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Produces externally visible codes for new records.
///
/// Codes must be unique; the storage layer enforces it with unique indexes.
pub trait CodeGenerator: Send + Sync {
    /// Code for a new order.
    fn order_code(&self) -> String;

    /// Code for a new itinerary.
    fn itinerary_code(&self) -> String;
}

/// `ORD-` / `ITN-` followed by 12 upper-case hex characters of a v4 UUID.
#[derive(Clone, Copy, Debug, Default)]
pub struct UuidCodeGenerator;

impl UuidCodeGenerator {
    fn suffix() -> String {
        let mut hex = Uuid::new_v4().simple().to_string();
        hex.truncate(12);
        hex.to_uppercase()
    }
}

impl CodeGenerator for UuidCodeGenerator {
    fn order_code(&self) -> String {
        format!("ORD-{}", Self::suffix())
    }

    fn itinerary_code(&self) -> String {
        format!("ITN-{}", Self::suffix())
    }
}
