//! Transactional storage abstraction.
//!
//! The engine mutates one aggregate at a time: an itinerary, its (at most one)
//! order and that order's (at most one) payment. Every mutation runs inside a
//! [`StoreTransaction`] and takes the aggregate lock with
//! [`StoreTransaction::lock_aggregate`] before reading the rows it is about
//! to change. Locks are always taken root first (itinerary, then order, then
//! payment), so placement, payment renewal, webhook reconciliation and
//! reassignment on the same aggregate serialize instead of interleaving.
//!
//! Consultant rows have their own locks. Flipping `active` takes an
//! exclusive lock; binding an order to a consultant takes a share lock after
//! the aggregate lock. Deactivation never takes an aggregate lock while
//! holding a consultant lock, so the two orders cannot cycle.
//!
//! Reads that happen before the lock (for example resolving an order by its
//! external code to learn which itinerary it belongs to) must be repeated
//! after the lock is held.
//!
//! # Implementations
//!
//! - `PostgresOrderStore` (in `tripdesk-postgres`): row locks with
//!   `SELECT ... FOR UPDATE`, unique indexes on `orders.itinerary_id` and
//!   `order_payments.order_id`
//! - `InMemoryOrderStore` (in `tripdesk-testing`): per-aggregate async locks
//!   and staged writes applied at commit
//!
//! Dropping a transaction without committing rolls it back.

use std::future::Future;

use chrono::{DateTime, Utc};

use crate::error::StoreResult;
use crate::types::{
    ActivityEntry, CandidateFilter, Consultant, ConsultantId, ConsultantLoad, Customer,
    CustomerId, Itinerary, ItineraryChange, ItineraryId, NewItinerary, NewItineraryChange,
    NewOrder, NewOrderPayment, Order, OrderId, OrderPayment,
};

/// Source of transactions.
pub trait OrderStore: Send + Sync {
    /// Transaction type handed out by [`OrderStore::begin`].
    type Transaction: StoreTransaction;

    /// Open a new transaction.
    ///
    /// # Errors
    ///
    /// Returns error if the backend is unreachable.
    fn begin(&self) -> impl Future<Output = StoreResult<Self::Transaction>> + Send;
}

/// A unit of work over the engine's tables.
pub trait StoreTransaction: Send {
    // ═══════════════════════════════════════════════════════════════════════
    // Locking
    // ═══════════════════════════════════════════════════════════════════════

    /// Take the write lock on an itinerary aggregate (itinerary, its order
    /// and the order's payment) until commit or rollback.
    ///
    /// # Errors
    ///
    /// Returns error if the lock cannot be acquired.
    fn lock_aggregate(
        &mut self,
        itinerary_id: ItineraryId,
    ) -> impl Future<Output = StoreResult<()>> + Send;

    // ═══════════════════════════════════════════════════════════════════════
    // Itineraries
    // ═══════════════════════════════════════════════════════════════════════

    /// Live (not soft-deleted) itinerary by code.
    ///
    /// # Errors
    ///
    /// Returns error if the query fails.
    fn itinerary_by_code(
        &mut self,
        code: &str,
    ) -> impl Future<Output = StoreResult<Option<Itinerary>>> + Send;

    /// Itinerary by id, including soft-deleted ones.
    ///
    /// # Errors
    ///
    /// Returns error if the query fails.
    fn itinerary_by_id(
        &mut self,
        id: ItineraryId,
    ) -> impl Future<Output = StoreResult<Option<Itinerary>>> + Send;

    /// Insert an itinerary.
    ///
    /// # Errors
    ///
    /// Returns `UniqueViolation` if the code is taken.
    fn insert_itinerary(
        &mut self,
        itinerary: NewItinerary,
    ) -> impl Future<Output = StoreResult<Itinerary>> + Send;

    /// Overwrite the mutable fields of an itinerary.
    ///
    /// # Errors
    ///
    /// Returns error if the update fails.
    fn update_itinerary(
        &mut self,
        itinerary: &Itinerary,
    ) -> impl Future<Output = StoreResult<()>> + Send;

    /// Append-only change log of an itinerary, oldest first.
    ///
    /// # Errors
    ///
    /// Returns error if the query fails.
    fn itinerary_changes(
        &mut self,
        itinerary_id: ItineraryId,
    ) -> impl Future<Output = StoreResult<Vec<ItineraryChange>>> + Send;

    /// Append a change row.
    ///
    /// # Errors
    ///
    /// Returns error if the insert fails.
    fn append_itinerary_change(
        &mut self,
        change: NewItineraryChange,
    ) -> impl Future<Output = StoreResult<ItineraryChange>> + Send;

    // ═══════════════════════════════════════════════════════════════════════
    // People
    // ═══════════════════════════════════════════════════════════════════════

    /// Customer by code.
    ///
    /// # Errors
    ///
    /// Returns error if the query fails.
    fn customer_by_code(
        &mut self,
        code: &str,
    ) -> impl Future<Output = StoreResult<Option<Customer>>> + Send;

    /// Customer by id.
    ///
    /// # Errors
    ///
    /// Returns error if the query fails.
    fn customer_by_id(
        &mut self,
        id: CustomerId,
    ) -> impl Future<Output = StoreResult<Option<Customer>>> + Send;

    /// Consultant by code.
    ///
    /// # Errors
    ///
    /// Returns error if the query fails.
    fn consultant_by_code(
        &mut self,
        code: &str,
    ) -> impl Future<Output = StoreResult<Option<Consultant>>> + Send;

    /// Consultant by id.
    ///
    /// # Errors
    ///
    /// Returns error if the query fails.
    fn consultant_by_id(
        &mut self,
        id: ConsultantId,
    ) -> impl Future<Output = StoreResult<Option<Consultant>>> + Send;

    /// Consultant by code, holding an exclusive row lock until commit or
    /// rollback. Required before [`StoreTransaction::update_consultant`].
    ///
    /// # Errors
    ///
    /// Returns error if the lock cannot be acquired.
    fn lock_consultant(
        &mut self,
        code: &str,
    ) -> impl Future<Output = StoreResult<Option<Consultant>>> + Send;

    /// Consultant by id, holding a share lock until commit or rollback.
    ///
    /// Taken when an order is bound to the consultant: a concurrent
    /// [`StoreTransaction::lock_consultant`] waits for the binding to commit,
    /// and a binding that waited sees the committed `active` flag.
    ///
    /// # Errors
    ///
    /// Returns error if the lock cannot be acquired.
    fn share_lock_consultant(
        &mut self,
        id: ConsultantId,
    ) -> impl Future<Output = StoreResult<Option<Consultant>>> + Send;

    /// Overwrite a consultant's `active` flag and `last_seen_at`.
    ///
    /// # Errors
    ///
    /// Returns error if the update fails.
    fn update_consultant(
        &mut self,
        consultant: &Consultant,
    ) -> impl Future<Output = StoreResult<()>> + Send;

    /// Set only `last_seen_at`, leaving `active` as committed by others.
    ///
    /// # Errors
    ///
    /// Returns error if the update fails.
    fn touch_consultant(
        &mut self,
        code: &str,
        at: DateTime<Utc>,
    ) -> impl Future<Output = StoreResult<Option<Consultant>>> + Send;

    /// Consultants admitted by `filter` with their `pending` order counts.
    ///
    /// Read without locks; the count may be stale by the time the caller
    /// commits.
    ///
    /// # Errors
    ///
    /// Returns error if the query fails.
    fn consultant_loads(
        &mut self,
        filter: &CandidateFilter,
    ) -> impl Future<Output = StoreResult<Vec<ConsultantLoad>>> + Send;

    // ═══════════════════════════════════════════════════════════════════════
    // Orders
    // ═══════════════════════════════════════════════════════════════════════

    /// The order bound to an itinerary.
    ///
    /// # Errors
    ///
    /// Returns error if the query fails.
    fn order_by_itinerary(
        &mut self,
        itinerary_id: ItineraryId,
    ) -> impl Future<Output = StoreResult<Option<Order>>> + Send;

    /// Order by its external code.
    ///
    /// # Errors
    ///
    /// Returns error if the query fails.
    fn order_by_code(
        &mut self,
        code: &str,
    ) -> impl Future<Output = StoreResult<Option<Order>>> + Send;

    /// Insert an order in status `pending`.
    ///
    /// # Errors
    ///
    /// Returns `UniqueViolation` if the itinerary already has an order.
    fn insert_order(&mut self, order: NewOrder) -> impl Future<Output = StoreResult<Order>> + Send;

    /// Overwrite the mutable fields of an order.
    ///
    /// # Errors
    ///
    /// Returns error if the update fails.
    fn update_order(&mut self, order: &Order) -> impl Future<Output = StoreResult<()>> + Send;

    /// `pending` orders assigned to a consultant, oldest first.
    ///
    /// # Errors
    ///
    /// Returns error if the query fails.
    fn pending_orders_for_consultant(
        &mut self,
        consultant_id: ConsultantId,
    ) -> impl Future<Output = StoreResult<Vec<Order>>> + Send;

    // ═══════════════════════════════════════════════════════════════════════
    // Payments
    // ═══════════════════════════════════════════════════════════════════════

    /// The payment bound to an order.
    ///
    /// # Errors
    ///
    /// Returns error if the query fails.
    fn payment_by_order(
        &mut self,
        order_id: OrderId,
    ) -> impl Future<Output = StoreResult<Option<OrderPayment>>> + Send;

    /// Insert a payment in status `processing`.
    ///
    /// # Errors
    ///
    /// Returns `UniqueViolation` if the order already has a payment.
    fn insert_payment(
        &mut self,
        payment: NewOrderPayment,
    ) -> impl Future<Output = StoreResult<OrderPayment>> + Send;

    /// Overwrite the mutable fields of a payment.
    ///
    /// # Errors
    ///
    /// Returns error if the update fails.
    fn update_payment(
        &mut self,
        payment: &OrderPayment,
    ) -> impl Future<Output = StoreResult<()>> + Send;

    // ═══════════════════════════════════════════════════════════════════════
    // Activity log
    // ═══════════════════════════════════════════════════════════════════════

    /// Append an activity entry.
    ///
    /// # Errors
    ///
    /// Returns error if the insert fails.
    fn record_activity(
        &mut self,
        entry: &ActivityEntry,
    ) -> impl Future<Output = StoreResult<()>> + Send;

    // ═══════════════════════════════════════════════════════════════════════
    // Completion
    // ═══════════════════════════════════════════════════════════════════════

    /// Make all writes visible atomically and release locks.
    ///
    /// # Errors
    ///
    /// Returns error if the commit fails; nothing is applied in that case.
    fn commit(self) -> impl Future<Output = StoreResult<()>> + Send;

    /// Discard all writes and release locks.
    ///
    /// # Errors
    ///
    /// Returns error if the backend fails to roll back.
    fn rollback(self) -> impl Future<Output = StoreResult<()>> + Send;
}
