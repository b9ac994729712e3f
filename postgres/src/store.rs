//! [`OrderStore`] over a Postgres pool.

use std::future::Future;
use std::time::Duration;

use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::{Postgres, Transaction};
use tripdesk_core::error::StoreResult;
use tripdesk_core::types::{
    ActivityEntry, CandidateFilter, Consultant, ConsultantId, ConsultantLoad, Customer,
    CustomerId, Itinerary, ItineraryChange, ItineraryId, NewItinerary, NewItineraryChange,
    NewOrder, NewOrderPayment, Order, OrderId, OrderPayment, OrderStatus, PaymentStatus,
};
use tripdesk_core::{DateTime, OrderStore, StoreError, StoreTransaction, Utc};

use crate::error::store_error;
use crate::rows::{
    self, change_columns, consultant_columns, customer_columns, itinerary_columns, order_columns,
    payment_columns,
};

/// Connection pool sizing.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PoolSettings {
    /// Upper bound on open connections
    pub max_connections: u32,
    /// Connections kept open while idle
    pub min_connections: u32,
    /// How long `begin` waits for a free connection
    pub acquire_timeout: Duration,
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self {
            max_connections: 10,
            min_connections: 1,
            acquire_timeout: Duration::from_secs(5),
        }
    }
}

/// Postgres-backed order store.
///
/// Aggregate locks are row locks on `itineraries`, held until the
/// transaction ends. One order per itinerary and one payment per order are
/// enforced by unique constraints.
#[derive(Clone, Debug)]
pub struct PostgresOrderStore {
    pool: PgPool,
}

impl PostgresOrderStore {
    /// Wrap an existing pool.
    #[must_use]
    pub const fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connect to `database_url`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Unavailable`] if the database cannot be reached.
    pub async fn connect(database_url: &str, settings: &PoolSettings) -> StoreResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(settings.max_connections)
            .min_connections(settings.min_connections)
            .acquire_timeout(settings.acquire_timeout)
            .connect(database_url)
            .await
            .map_err(|e| StoreError::Unavailable(format!("Failed to connect: {e}")))?;
        tracing::info!(
            max_connections = settings.max_connections,
            "Connected to Postgres"
        );
        Ok(Self::from_pool(pool))
    }

    /// Apply the bundled schema migrations.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Backend`] if a migration fails.
    pub async fn migrate(&self) -> StoreResult<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| StoreError::Backend(format!("Migration failed: {e}")))?;
        Ok(())
    }

    /// The underlying pool.
    #[must_use]
    pub const fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Cheap connectivity probe for health checks.
    ///
    /// # Errors
    ///
    /// Returns error if the database does not answer.
    pub async fn ping(&self) -> StoreResult<()> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(store_error)?;
        Ok(())
    }
}

impl OrderStore for PostgresOrderStore {
    type Transaction = PgTransaction;

    fn begin(&self) -> impl Future<Output = StoreResult<Self::Transaction>> + Send {
        async move {
            let tx = self.pool.begin().await.map_err(store_error)?;
            Ok(PgTransaction { tx })
        }
    }
}

/// An open Postgres transaction.
///
/// Dropping it without commit rolls back.
pub struct PgTransaction {
    tx: Transaction<'static, Postgres>,
}

impl std::fmt::Debug for PgTransaction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PgTransaction").finish_non_exhaustive()
    }
}

fn missing(kind: &str, id: impl std::fmt::Display) -> StoreError {
    StoreError::Corrupt(format!("{kind} {id} vanished during update"))
}

impl StoreTransaction for PgTransaction {
    fn lock_aggregate(
        &mut self,
        itinerary_id: ItineraryId,
    ) -> impl Future<Output = StoreResult<()>> + Send {
        async move {
            sqlx::query("SELECT id FROM itineraries WHERE id = $1 FOR UPDATE")
                .bind(itinerary_id.get())
                .fetch_optional(&mut *self.tx)
                .await
                .map_err(store_error)?;
            Ok(())
        }
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Itineraries
    // ═══════════════════════════════════════════════════════════════════════

    fn itinerary_by_code(
        &mut self,
        code: &str,
    ) -> impl Future<Output = StoreResult<Option<Itinerary>>> + Send {
        async move {
            sqlx::query(concat!(
                "SELECT ",
                itinerary_columns!(),
                " FROM itineraries WHERE code = $1 AND deleted_at IS NULL"
            ))
            .bind(code)
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(store_error)?
            .as_ref()
            .map(rows::itinerary)
            .transpose()
        }
    }

    fn itinerary_by_id(
        &mut self,
        id: ItineraryId,
    ) -> impl Future<Output = StoreResult<Option<Itinerary>>> + Send {
        async move {
            sqlx::query(concat!(
                "SELECT ",
                itinerary_columns!(),
                " FROM itineraries WHERE id = $1"
            ))
            .bind(id.get())
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(store_error)?
            .as_ref()
            .map(rows::itinerary)
            .transpose()
        }
    }

    fn insert_itinerary(
        &mut self,
        itinerary: NewItinerary,
    ) -> impl Future<Output = StoreResult<Itinerary>> + Send {
        async move {
            let row = sqlx::query(concat!(
                "INSERT INTO itineraries \
                 (code, customer_id, title, estimated_price, start_date, end_date, detail, \
                  created_at, updated_at) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $8) RETURNING ",
                itinerary_columns!()
            ))
            .bind(&itinerary.code)
            .bind(itinerary.customer_id.get())
            .bind(&itinerary.title)
            .bind(itinerary.estimated_price.cents())
            .bind(itinerary.start_date)
            .bind(itinerary.end_date)
            .bind(&itinerary.detail)
            .bind(itinerary.created_at)
            .fetch_one(&mut *self.tx)
            .await
            .map_err(store_error)?;
            rows::itinerary(&row)
        }
    }

    fn update_itinerary(
        &mut self,
        itinerary: &Itinerary,
    ) -> impl Future<Output = StoreResult<()>> + Send {
        async move {
            let done = sqlx::query(
                "UPDATE itineraries SET title = $2, estimated_price = $3, start_date = $4, \
                 end_date = $5, detail = $6, updated_at = $7, deleted_at = $8 WHERE id = $1",
            )
            .bind(itinerary.id.get())
            .bind(&itinerary.title)
            .bind(itinerary.estimated_price.cents())
            .bind(itinerary.start_date)
            .bind(itinerary.end_date)
            .bind(&itinerary.detail)
            .bind(itinerary.updated_at)
            .bind(itinerary.deleted_at)
            .execute(&mut *self.tx)
            .await
            .map_err(store_error)?;
            if done.rows_affected() == 0 {
                return Err(missing("itinerary", itinerary.id));
            }
            Ok(())
        }
    }

    fn itinerary_changes(
        &mut self,
        itinerary_id: ItineraryId,
    ) -> impl Future<Output = StoreResult<Vec<ItineraryChange>>> + Send {
        async move {
            sqlx::query(concat!(
                "SELECT ",
                change_columns!(),
                " FROM itinerary_changes WHERE itinerary_id = $1 ORDER BY id"
            ))
            .bind(itinerary_id.get())
            .fetch_all(&mut *self.tx)
            .await
            .map_err(store_error)?
            .iter()
            .map(rows::change)
            .collect()
        }
    }

    fn append_itinerary_change(
        &mut self,
        change: NewItineraryChange,
    ) -> impl Future<Output = StoreResult<ItineraryChange>> + Send {
        async move {
            let row = sqlx::query(concat!(
                "INSERT INTO itinerary_changes \
                 (itinerary_id, previous_consultant_id, new_consultant_id, reason, created_at) \
                 VALUES ($1, $2, $3, $4, $5) RETURNING ",
                change_columns!()
            ))
            .bind(change.itinerary_id.get())
            .bind(change.previous_consultant_id.map(ConsultantId::get))
            .bind(change.new_consultant_id.get())
            .bind(change.reason.as_str())
            .bind(change.created_at)
            .fetch_one(&mut *self.tx)
            .await
            .map_err(store_error)?;
            rows::change(&row)
        }
    }

    // ═══════════════════════════════════════════════════════════════════════
    // People
    // ═══════════════════════════════════════════════════════════════════════

    fn customer_by_code(
        &mut self,
        code: &str,
    ) -> impl Future<Output = StoreResult<Option<Customer>>> + Send {
        async move {
            sqlx::query(concat!(
                "SELECT ",
                customer_columns!(),
                " FROM customers WHERE code = $1"
            ))
            .bind(code)
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(store_error)?
            .as_ref()
            .map(rows::customer)
            .transpose()
        }
    }

    fn customer_by_id(
        &mut self,
        id: CustomerId,
    ) -> impl Future<Output = StoreResult<Option<Customer>>> + Send {
        async move {
            sqlx::query(concat!(
                "SELECT ",
                customer_columns!(),
                " FROM customers WHERE id = $1"
            ))
            .bind(id.get())
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(store_error)?
            .as_ref()
            .map(rows::customer)
            .transpose()
        }
    }

    fn consultant_by_code(
        &mut self,
        code: &str,
    ) -> impl Future<Output = StoreResult<Option<Consultant>>> + Send {
        async move {
            sqlx::query(concat!(
                "SELECT ",
                consultant_columns!(),
                " FROM consultants WHERE code = $1"
            ))
            .bind(code)
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(store_error)?
            .as_ref()
            .map(rows::consultant)
            .transpose()
        }
    }

    fn consultant_by_id(
        &mut self,
        id: ConsultantId,
    ) -> impl Future<Output = StoreResult<Option<Consultant>>> + Send {
        async move {
            sqlx::query(concat!(
                "SELECT ",
                consultant_columns!(),
                " FROM consultants WHERE id = $1"
            ))
            .bind(id.get())
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(store_error)?
            .as_ref()
            .map(rows::consultant)
            .transpose()
        }
    }

    fn lock_consultant(
        &mut self,
        code: &str,
    ) -> impl Future<Output = StoreResult<Option<Consultant>>> + Send {
        async move {
            sqlx::query(concat!(
                "SELECT ",
                consultant_columns!(),
                " FROM consultants WHERE code = $1 FOR UPDATE"
            ))
            .bind(code)
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(store_error)?
            .as_ref()
            .map(rows::consultant)
            .transpose()
        }
    }

    fn share_lock_consultant(
        &mut self,
        id: ConsultantId,
    ) -> impl Future<Output = StoreResult<Option<Consultant>>> + Send {
        async move {
            sqlx::query(concat!(
                "SELECT ",
                consultant_columns!(),
                " FROM consultants WHERE id = $1 FOR SHARE"
            ))
            .bind(id.get())
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(store_error)?
            .as_ref()
            .map(rows::consultant)
            .transpose()
        }
    }

    fn touch_consultant(
        &mut self,
        code: &str,
        at: DateTime<Utc>,
    ) -> impl Future<Output = StoreResult<Option<Consultant>>> + Send {
        async move {
            sqlx::query(concat!(
                "UPDATE consultants SET last_seen_at = $2 WHERE code = $1 RETURNING ",
                consultant_columns!()
            ))
            .bind(code)
            .bind(at)
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(store_error)?
            .as_ref()
            .map(rows::consultant)
            .transpose()
        }
    }

    fn update_consultant(
        &mut self,
        consultant: &Consultant,
    ) -> impl Future<Output = StoreResult<()>> + Send {
        async move {
            let done =
                sqlx::query("UPDATE consultants SET active = $2, last_seen_at = $3 WHERE id = $1")
                    .bind(consultant.id.get())
                    .bind(consultant.active)
                    .bind(consultant.last_seen_at)
                    .execute(&mut *self.tx)
                    .await
                    .map_err(store_error)?;
            if done.rows_affected() == 0 {
                return Err(missing("consultant", consultant.id));
            }
            Ok(())
        }
    }

    fn consultant_loads(
        &mut self,
        filter: &CandidateFilter,
    ) -> impl Future<Output = StoreResult<Vec<ConsultantLoad>>> + Send {
        async move {
            let excluding: Vec<i64> = filter.excluding.iter().map(|id| id.get()).collect();
            let (seen_from, seen_to) = filter
                .activity_window
                .map_or((None, None), |window| (Some(window.start), Some(window.end)));

            let loads = sqlx::query(
                "SELECT c.id, c.code, c.name, c.email, c.role, c.active, c.last_seen_at, \
                        COUNT(o.id) AS pending_orders \
                 FROM consultants c \
                 LEFT JOIN orders o ON o.consultant_id = c.id AND o.status = 'pending' \
                 WHERE c.active AND c.role = 'tc' \
                   AND NOT (c.id = ANY($1)) \
                   AND ($2::timestamptz IS NULL OR c.last_seen_at BETWEEN $2 AND $3) \
                 GROUP BY c.id \
                 ORDER BY pending_orders, c.id",
            )
            .bind(excluding)
            .bind(seen_from)
            .bind(seen_to)
            .fetch_all(&mut *self.tx)
            .await
            .map_err(store_error)?
            .iter()
            .map(rows::consultant_load)
            .collect::<StoreResult<Vec<_>>>()?;

            Ok(loads
                .into_iter()
                .filter(|load| filter.admits(&load.consultant))
                .collect())
        }
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Orders
    // ═══════════════════════════════════════════════════════════════════════

    fn order_by_itinerary(
        &mut self,
        itinerary_id: ItineraryId,
    ) -> impl Future<Output = StoreResult<Option<Order>>> + Send {
        async move {
            sqlx::query(concat!(
                "SELECT ",
                order_columns!(),
                " FROM orders WHERE itinerary_id = $1 FOR UPDATE"
            ))
            .bind(itinerary_id.get())
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(store_error)?
            .as_ref()
            .map(rows::order)
            .transpose()
        }
    }

    fn order_by_code(
        &mut self,
        code: &str,
    ) -> impl Future<Output = StoreResult<Option<Order>>> + Send {
        async move {
            sqlx::query(concat!(
                "SELECT ",
                order_columns!(),
                " FROM orders WHERE code = $1"
            ))
            .bind(code)
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(store_error)?
            .as_ref()
            .map(rows::order)
            .transpose()
        }
    }

    fn insert_order(&mut self, order: NewOrder) -> impl Future<Output = StoreResult<Order>> + Send {
        async move {
            let row = sqlx::query(concat!(
                "INSERT INTO orders \
                 (code, itinerary_id, payer_id, consultant_id, total_price, order_type, status, \
                  created_at, updated_at) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $8) RETURNING ",
                order_columns!()
            ))
            .bind(&order.code)
            .bind(order.itinerary_id.get())
            .bind(order.payer_id.get())
            .bind(order.consultant_id.get())
            .bind(order.total_price.cents())
            .bind(order.order_type.as_str())
            .bind(OrderStatus::Pending.as_str())
            .bind(order.created_at)
            .fetch_one(&mut *self.tx)
            .await
            .map_err(store_error)?;
            rows::order(&row)
        }
    }

    fn update_order(&mut self, order: &Order) -> impl Future<Output = StoreResult<()>> + Send {
        async move {
            let done = sqlx::query(
                "UPDATE orders SET payer_id = $2, consultant_id = $3, total_price = $4, \
                 order_type = $5, status = $6, updated_at = $7 WHERE id = $1",
            )
            .bind(order.id.get())
            .bind(order.payer_id.get())
            .bind(order.consultant_id.get())
            .bind(order.total_price.cents())
            .bind(order.order_type.as_str())
            .bind(order.status.as_str())
            .bind(order.updated_at)
            .execute(&mut *self.tx)
            .await
            .map_err(store_error)?;
            if done.rows_affected() == 0 {
                return Err(missing("order", order.id));
            }
            Ok(())
        }
    }

    fn pending_orders_for_consultant(
        &mut self,
        consultant_id: ConsultantId,
    ) -> impl Future<Output = StoreResult<Vec<Order>>> + Send {
        async move {
            sqlx::query(concat!(
                "SELECT ",
                order_columns!(),
                " FROM orders WHERE consultant_id = $1 AND status = 'pending' \
                  ORDER BY created_at, id"
            ))
            .bind(consultant_id.get())
            .fetch_all(&mut *self.tx)
            .await
            .map_err(store_error)?
            .iter()
            .map(rows::order)
            .collect()
        }
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Payments
    // ═══════════════════════════════════════════════════════════════════════

    fn payment_by_order(
        &mut self,
        order_id: OrderId,
    ) -> impl Future<Output = StoreResult<Option<OrderPayment>>> + Send {
        async move {
            sqlx::query(concat!(
                "SELECT ",
                payment_columns!(),
                " FROM order_payments WHERE order_id = $1 FOR UPDATE"
            ))
            .bind(order_id.get())
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(store_error)?
            .as_ref()
            .map(rows::payment)
            .transpose()
        }
    }

    fn insert_payment(
        &mut self,
        payment: NewOrderPayment,
    ) -> impl Future<Output = StoreResult<OrderPayment>> + Send {
        async move {
            let row = sqlx::query(concat!(
                "INSERT INTO order_payments \
                 (order_id, amount, status, payment_url, expired_at, created_at, updated_at) \
                 VALUES ($1, $2, $3, $4, $5, $6, $6) RETURNING ",
                payment_columns!()
            ))
            .bind(payment.order_id.get())
            .bind(payment.amount.cents())
            .bind(PaymentStatus::Processing.as_str())
            .bind(&payment.payment_url)
            .bind(payment.expired_at)
            .bind(payment.created_at)
            .fetch_one(&mut *self.tx)
            .await
            .map_err(store_error)?;
            rows::payment(&row)
        }
    }

    fn update_payment(
        &mut self,
        payment: &OrderPayment,
    ) -> impl Future<Output = StoreResult<()>> + Send {
        async move {
            let done = sqlx::query(
                "UPDATE order_payments SET payment_type = $2, amount = $3, status = $4, \
                 payment_url = $5, expired_at = $6, raw_payload = $7, updated_at = $8 \
                 WHERE id = $1",
            )
            .bind(payment.id.get())
            .bind(payment.payment_type.as_deref())
            .bind(payment.amount.cents())
            .bind(payment.status.as_str())
            .bind(&payment.payment_url)
            .bind(payment.expired_at)
            .bind(&payment.raw_payload)
            .bind(payment.updated_at)
            .execute(&mut *self.tx)
            .await
            .map_err(store_error)?;
            if done.rows_affected() == 0 {
                return Err(missing("payment", payment.id));
            }
            Ok(())
        }
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Activity log
    // ═══════════════════════════════════════════════════════════════════════

    fn record_activity(
        &mut self,
        entry: &ActivityEntry,
    ) -> impl Future<Output = StoreResult<()>> + Send {
        async move {
            sqlx::query(
                "INSERT INTO activity_logs \
                 (actor_code, actor_role, subject_code, action, reference, created_at) \
                 VALUES ($1, $2, $3, $4, $5, $6)",
            )
            .bind(&entry.actor_code)
            .bind(entry.actor_role.as_str())
            .bind(&entry.subject_code)
            .bind(&entry.action)
            .bind(&entry.reference)
            .bind(entry.created_at)
            .execute(&mut *self.tx)
            .await
            .map_err(store_error)?;
            Ok(())
        }
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Completion
    // ═══════════════════════════════════════════════════════════════════════

    fn commit(self) -> impl Future<Output = StoreResult<()>> + Send {
        async move { self.tx.commit().await.map_err(store_error) }
    }

    fn rollback(self) -> impl Future<Output = StoreResult<()>> + Send {
        async move { self.tx.rollback().await.map_err(store_error) }
    }
}
