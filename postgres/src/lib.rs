//! `PostgreSQL` order store for the Tripdesk engine.
//!
//! Implements the `OrderStore` / `StoreTransaction` traits from
//! `tripdesk-core` with `sqlx`:
//!
//! - aggregate locks via `SELECT ... FROM itineraries WHERE id = $1 FOR UPDATE`
//! - one order per itinerary and one payment per order as unique constraints
//! - workload derived with a `LEFT JOIN` count of pending orders
//! - schema shipped as `sqlx` migrations
//!
//! # Example
//!
//! ```ignore
//! use tripdesk_postgres::{PoolSettings, PostgresOrderStore};
//!
//! async fn example() -> Result<(), Box<dyn std::error::Error>> {
//!     let store = PostgresOrderStore::connect("postgres://localhost/tripdesk", &PoolSettings::default()).await?;
//!     store.migrate().await?;
//!     Ok(())
//! }
//! ```

#![forbid(unsafe_code)]

mod error;
mod rows;
mod store;

pub use store::{PgTransaction, PoolSettings, PostgresOrderStore};
