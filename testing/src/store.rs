//! In-memory [`OrderStore`] for tests.
//!
//! Behaves like the Postgres store where the engine can observe it:
//!
//! - writes are staged per transaction and applied atomically on commit
//! - dropping or rolling back a transaction discards its writes
//! - `lock_aggregate` holds a per-itinerary async lock until the
//!   transaction ends, so concurrent transactions on one aggregate serialize
//! - consultant locks are per-consultant read/write locks: `lock_consultant`
//!   takes the write half, `share_lock_consultant` the read half
//! - `touch_consultant` is applied at commit as a single-column update
//! - unique keys (one order per itinerary, one payment per order, unique
//!   codes) are checked on insert and again on commit
//! - ids come from a shared sequence and are never reused
//!
//! Faults can be injected to exercise retry and rollback paths.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::future::{self, Future};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use tokio::sync::{
    Mutex as AsyncMutex, OwnedMutexGuard, OwnedRwLockReadGuard, OwnedRwLockWriteGuard, RwLock,
};
use tripdesk_core::error::StoreResult;
use tripdesk_core::types::{
    ActivityEntry, CandidateFilter, Consultant, ConsultantId, ConsultantLoad, Customer, CustomerId,
    Itinerary, ItineraryChange, ItineraryChangeId, ItineraryId, Money, NewItinerary,
    NewItineraryChange, NewOrder, NewOrderPayment, Order, OrderId, OrderPayment, OrderStatus,
    OrderType, PaymentId, PaymentStatus, Role,
};
use tripdesk_core::{OrderStore, StoreError, StoreTransaction};

const ORDERS_ITINERARY_KEY: &str = "orders_itinerary_id_key";
const ORDERS_CODE_KEY: &str = "orders_code_key";
const PAYMENTS_ORDER_KEY: &str = "order_payments_order_id_key";
const ITINERARIES_CODE_KEY: &str = "itineraries_code_key";

#[derive(Clone, Debug, Default)]
struct Tables {
    customers: BTreeMap<CustomerId, Customer>,
    consultants: BTreeMap<ConsultantId, Consultant>,
    itineraries: BTreeMap<ItineraryId, Itinerary>,
    orders: BTreeMap<OrderId, Order>,
    payments: BTreeMap<PaymentId, OrderPayment>,
    changes: Vec<ItineraryChange>,
    activity: Vec<ActivityEntry>,
    seen: BTreeMap<ConsultantId, DateTime<Utc>>,
}

impl Tables {
    fn overlay(&mut self, staged: &Self) {
        self.customers.extend(staged.customers.clone());
        self.consultants.extend(staged.consultants.clone());
        for (id, at) in &staged.seen {
            if let Some(consultant) = self.consultants.get_mut(id) {
                consultant.last_seen_at = Some(*at);
            }
        }
        self.itineraries.extend(staged.itineraries.clone());
        self.orders.extend(staged.orders.clone());
        self.payments.extend(staged.payments.clone());
        self.changes.extend(staged.changes.iter().cloned());
        self.activity.extend(staged.activity.iter().cloned());
    }

    fn check_unique(&self) -> StoreResult<()> {
        let violation = |constraint: &str| {
            Err(StoreError::UniqueViolation {
                constraint: constraint.to_string(),
            })
        };

        let mut itinerary_codes = HashMap::new();
        for itinerary in self.itineraries.values() {
            if itinerary_codes.insert(itinerary.code.as_str(), ()).is_some() {
                return violation(ITINERARIES_CODE_KEY);
            }
        }

        let mut per_itinerary = HashMap::new();
        let mut order_codes = HashMap::new();
        for order in self.orders.values() {
            if per_itinerary.insert(order.itinerary_id, ()).is_some() {
                return violation(ORDERS_ITINERARY_KEY);
            }
            if order_codes.insert(order.code.as_str(), ()).is_some() {
                return violation(ORDERS_CODE_KEY);
            }
        }

        let mut per_order = HashMap::new();
        for payment in self.payments.values() {
            if per_order.insert(payment.order_id, ()).is_some() {
                return violation(PAYMENTS_ORDER_KEY);
            }
        }
        Ok(())
    }
}

#[derive(Debug, Default)]
struct Faults {
    begin: VecDeque<StoreError>,
    commit: VecDeque<StoreError>,
    lock: HashMap<ItineraryId, VecDeque<StoreError>>,
}

#[derive(Debug, Default)]
struct Shared {
    tables: Mutex<Tables>,
    locks: Mutex<HashMap<ItineraryId, Arc<AsyncMutex<()>>>>,
    consultant_locks: Mutex<HashMap<ConsultantId, Arc<RwLock<()>>>>,
    faults: Mutex<Faults>,
    sequence: AtomicI64,
}

fn poisoned() -> StoreError {
    StoreError::Backend("in-memory store mutex poisoned".to_string())
}

impl Shared {
    fn tables(&self) -> StoreResult<MutexGuard<'_, Tables>> {
        self.tables.lock().map_err(|_| poisoned())
    }

    fn faults(&self) -> StoreResult<MutexGuard<'_, Faults>> {
        self.faults.lock().map_err(|_| poisoned())
    }

    fn consultant_lock(&self, id: ConsultantId) -> StoreResult<Arc<RwLock<()>>> {
        let mut locks = self.consultant_locks.lock().map_err(|_| poisoned())?;
        Ok(Arc::clone(locks.entry(id).or_default()))
    }

    fn next_id(&self) -> i64 {
        self.sequence.fetch_add(1, Ordering::SeqCst) + 1
    }
}

/// In-memory order store.
///
/// Cloning shares the underlying tables.
#[derive(Debug, Clone, Default)]
pub struct InMemoryOrderStore {
    shared: Arc<Shared>,
}

impl InMemoryOrderStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Fault injection
    // ═══════════════════════════════════════════════════════════════════════

    /// Make the next `begin` fail with `error`.
    ///
    /// # Errors
    ///
    /// Returns error if the store mutex is poisoned.
    pub fn fail_next_begin(&self, error: StoreError) -> StoreResult<()> {
        self.shared.faults()?.begin.push_back(error);
        Ok(())
    }

    /// Make the next `commit` fail with `error`.
    ///
    /// # Errors
    ///
    /// Returns error if the store mutex is poisoned.
    pub fn fail_next_commit(&self, error: StoreError) -> StoreResult<()> {
        self.shared.faults()?.commit.push_back(error);
        Ok(())
    }

    /// Make the next `times` lock attempts on an itinerary fail with `error`.
    ///
    /// # Errors
    ///
    /// Returns error if the store mutex is poisoned.
    pub fn fail_lock(&self, itinerary_id: ItineraryId, times: usize, error: &StoreError) -> StoreResult<()> {
        let mut faults = self.shared.faults()?;
        let queue = faults.lock.entry(itinerary_id).or_default();
        queue.extend(std::iter::repeat_n(error.clone(), times));
        Ok(())
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Seeding
    // ═══════════════════════════════════════════════════════════════════════

    /// Insert a customer with a derived name and email.
    ///
    /// # Errors
    ///
    /// Returns error if the store mutex is poisoned.
    pub fn add_customer(&self, code: &str) -> StoreResult<Customer> {
        let customer = Customer {
            id: CustomerId::new(self.shared.next_id()),
            code: code.to_string(),
            name: format!("Customer {code}"),
            email: format!("{}@customers.test", code.to_lowercase()),
        };
        self.shared
            .tables()?
            .customers
            .insert(customer.id, customer.clone());
        Ok(customer)
    }

    /// Insert an active travel consultant.
    ///
    /// # Errors
    ///
    /// Returns error if the store mutex is poisoned.
    pub fn add_consultant(&self, code: &str) -> StoreResult<Consultant> {
        self.add_consultant_with(code, Role::Tc, true, None)
    }

    /// Insert a consultant with explicit role, flag and heartbeat.
    ///
    /// # Errors
    ///
    /// Returns error if the store mutex is poisoned.
    pub fn add_consultant_with(
        &self,
        code: &str,
        role: Role,
        active: bool,
        last_seen_at: Option<DateTime<Utc>>,
    ) -> StoreResult<Consultant> {
        let consultant = Consultant {
            id: ConsultantId::new(self.shared.next_id()),
            code: code.to_string(),
            name: format!("Consultant {code}"),
            email: format!("{}@staff.test", code.to_lowercase()),
            role,
            active,
            last_seen_at,
        };
        self.shared
            .tables()?
            .consultants
            .insert(consultant.id, consultant.clone());
        Ok(consultant)
    }

    /// Insert an itinerary owned by `customer`.
    ///
    /// # Errors
    ///
    /// Returns error if the store mutex is poisoned.
    pub fn add_itinerary(
        &self,
        code: &str,
        customer: CustomerId,
        at: DateTime<Utc>,
    ) -> StoreResult<Itinerary> {
        let itinerary = Itinerary {
            id: ItineraryId::new(self.shared.next_id()),
            code: code.to_string(),
            customer_id: customer,
            title: format!("Trip {code}"),
            estimated_price: Money::from_cents(0),
            start_date: None,
            end_date: None,
            detail: serde_json::Value::Null,
            created_at: at,
            updated_at: at,
            deleted_at: None,
        };
        self.shared
            .tables()?
            .itineraries
            .insert(itinerary.id, itinerary.clone());
        Ok(itinerary)
    }

    /// Insert an order directly, bypassing the engine.
    ///
    /// # Errors
    ///
    /// Returns `UniqueViolation` if the itinerary already has an order.
    pub fn add_order(
        &self,
        itinerary: &Itinerary,
        consultant: ConsultantId,
        status: OrderStatus,
        at: DateTime<Utc>,
    ) -> StoreResult<Order> {
        let id = OrderId::new(self.shared.next_id());
        let order = Order {
            id,
            code: format!("SEED-{id}"),
            itinerary_id: itinerary.id,
            payer_id: itinerary.customer_id,
            consultant_id: consultant,
            total_price: Money::from_cents(100_000),
            order_type: OrderType::Regular,
            status,
            created_at: at,
            updated_at: at,
        };
        let mut tables = self.shared.tables()?;
        if tables.orders.values().any(|o| o.itinerary_id == itinerary.id) {
            return Err(StoreError::UniqueViolation {
                constraint: ORDERS_ITINERARY_KEY.to_string(),
            });
        }
        tables.orders.insert(order.id, order.clone());
        Ok(order)
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Inspection
    // ═══════════════════════════════════════════════════════════════════════

    /// All committed orders, by id.
    ///
    /// # Errors
    ///
    /// Returns error if the store mutex is poisoned.
    pub fn orders(&self) -> StoreResult<Vec<Order>> {
        Ok(self.shared.tables()?.orders.values().cloned().collect())
    }

    /// All committed payments, by id.
    ///
    /// # Errors
    ///
    /// Returns error if the store mutex is poisoned.
    pub fn payments(&self) -> StoreResult<Vec<OrderPayment>> {
        Ok(self.shared.tables()?.payments.values().cloned().collect())
    }

    /// Committed change log, in append order.
    ///
    /// # Errors
    ///
    /// Returns error if the store mutex is poisoned.
    pub fn itinerary_changes(&self) -> StoreResult<Vec<ItineraryChange>> {
        Ok(self.shared.tables()?.changes.clone())
    }

    /// Committed activity log, in append order.
    ///
    /// # Errors
    ///
    /// Returns error if the store mutex is poisoned.
    pub fn activity(&self) -> StoreResult<Vec<ActivityEntry>> {
        Ok(self.shared.tables()?.activity.clone())
    }

    /// Committed consultant by code.
    ///
    /// # Errors
    ///
    /// Returns error if the store mutex is poisoned.
    pub fn consultant(&self, code: &str) -> StoreResult<Option<Consultant>> {
        Ok(self
            .shared
            .tables()?
            .consultants
            .values()
            .find(|c| c.code == code)
            .cloned())
    }

    /// Committed itinerary by id, including soft-deleted ones.
    ///
    /// # Errors
    ///
    /// Returns error if the store mutex is poisoned.
    pub fn itinerary(&self, id: ItineraryId) -> StoreResult<Option<Itinerary>> {
        Ok(self.shared.tables()?.itineraries.get(&id).cloned())
    }
}

impl OrderStore for InMemoryOrderStore {
    type Transaction = InMemoryTransaction;

    fn begin(&self) -> impl Future<Output = StoreResult<Self::Transaction>> + Send {
        let shared = Arc::clone(&self.shared);
        async move {
            if let Some(error) = shared.faults()?.begin.pop_front() {
                return Err(error);
            }
            Ok(InMemoryTransaction {
                shared,
                staged: Tables::default(),
                held: HashMap::new(),
                consultants_held: HashMap::new(),
            })
        }
    }
}

#[allow(dead_code)] // guards are held for their drop
enum ConsultantGuard {
    Exclusive(OwnedRwLockWriteGuard<()>),
    Shared(OwnedRwLockReadGuard<()>),
}

/// Transaction over an [`InMemoryOrderStore`].
pub struct InMemoryTransaction {
    shared: Arc<Shared>,
    staged: Tables,
    held: HashMap<ItineraryId, OwnedMutexGuard<()>>,
    consultants_held: HashMap<ConsultantId, ConsultantGuard>,
}

impl std::fmt::Debug for InMemoryTransaction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryTransaction")
            .field("locked", &self.held.keys().collect::<Vec<_>>())
            .field(
                "consultants_locked",
                &self.consultants_held.keys().collect::<Vec<_>>(),
            )
            .finish_non_exhaustive()
    }
}

impl InMemoryTransaction {
    /// Committed state with this transaction's writes on top.
    fn view(&self) -> StoreResult<Tables> {
        let mut tables = self.shared.tables()?.clone();
        tables.overlay(&self.staged);
        Ok(tables)
    }

    fn read<T>(&self, query: impl FnOnce(&Tables) -> T) -> StoreResult<T> {
        self.view().map(|tables| query(&tables))
    }

    fn missing(kind: &str, id: impl std::fmt::Display) -> StoreError {
        StoreError::Corrupt(format!("{kind} {id} does not exist"))
    }
}

impl StoreTransaction for InMemoryTransaction {
    fn lock_aggregate(
        &mut self,
        itinerary_id: ItineraryId,
    ) -> impl Future<Output = StoreResult<()>> + Send {
        async move {
            if self.held.contains_key(&itinerary_id) {
                return Ok(());
            }
            let injected = self
                .shared
                .faults()?
                .lock
                .get_mut(&itinerary_id)
                .and_then(VecDeque::pop_front);
            if let Some(error) = injected {
                return Err(error);
            }
            let lock = {
                let mut locks = self.shared.locks.lock().map_err(|_| poisoned())?;
                Arc::clone(locks.entry(itinerary_id).or_default())
            };
            let guard = lock.lock_owned().await;
            self.held.insert(itinerary_id, guard);
            Ok(())
        }
    }

    fn itinerary_by_code(
        &mut self,
        code: &str,
    ) -> impl Future<Output = StoreResult<Option<Itinerary>>> + Send {
        future::ready(self.read(|t| {
            t.itineraries
                .values()
                .find(|i| i.code == code && !i.is_deleted())
                .cloned()
        }))
    }

    fn itinerary_by_id(
        &mut self,
        id: ItineraryId,
    ) -> impl Future<Output = StoreResult<Option<Itinerary>>> + Send {
        future::ready(self.read(|t| t.itineraries.get(&id).cloned()))
    }

    fn insert_itinerary(
        &mut self,
        itinerary: NewItinerary,
    ) -> impl Future<Output = StoreResult<Itinerary>> + Send {
        let result = self.read(|t| t.itineraries.values().any(|i| i.code == itinerary.code));
        let result = result.and_then(|taken| {
            if taken {
                return Err(StoreError::UniqueViolation {
                    constraint: ITINERARIES_CODE_KEY.to_string(),
                });
            }
            let row = Itinerary {
                id: ItineraryId::new(self.shared.next_id()),
                code: itinerary.code,
                customer_id: itinerary.customer_id,
                title: itinerary.title,
                estimated_price: itinerary.estimated_price,
                start_date: itinerary.start_date,
                end_date: itinerary.end_date,
                detail: itinerary.detail,
                created_at: itinerary.created_at,
                updated_at: itinerary.created_at,
                deleted_at: None,
            };
            self.staged.itineraries.insert(row.id, row.clone());
            Ok(row)
        });
        future::ready(result)
    }

    fn update_itinerary(
        &mut self,
        itinerary: &Itinerary,
    ) -> impl Future<Output = StoreResult<()>> + Send {
        let result = self
            .read(|t| t.itineraries.contains_key(&itinerary.id))
            .and_then(|exists| {
                if exists {
                    self.staged.itineraries.insert(itinerary.id, itinerary.clone());
                    Ok(())
                } else {
                    Err(Self::missing("itinerary", itinerary.id))
                }
            });
        future::ready(result)
    }

    fn itinerary_changes(
        &mut self,
        itinerary_id: ItineraryId,
    ) -> impl Future<Output = StoreResult<Vec<ItineraryChange>>> + Send {
        future::ready(self.read(|t| {
            let mut changes: Vec<_> = t
                .changes
                .iter()
                .filter(|c| c.itinerary_id == itinerary_id)
                .cloned()
                .collect();
            changes.sort_by_key(|c| c.id);
            changes
        }))
    }

    fn append_itinerary_change(
        &mut self,
        change: NewItineraryChange,
    ) -> impl Future<Output = StoreResult<ItineraryChange>> + Send {
        let row = ItineraryChange {
            id: ItineraryChangeId::new(self.shared.next_id()),
            itinerary_id: change.itinerary_id,
            previous_consultant_id: change.previous_consultant_id,
            new_consultant_id: change.new_consultant_id,
            reason: change.reason,
            created_at: change.created_at,
        };
        self.staged.changes.push(row.clone());
        future::ready(Ok(row))
    }

    fn customer_by_code(
        &mut self,
        code: &str,
    ) -> impl Future<Output = StoreResult<Option<Customer>>> + Send {
        future::ready(self.read(|t| t.customers.values().find(|c| c.code == code).cloned()))
    }

    fn customer_by_id(
        &mut self,
        id: CustomerId,
    ) -> impl Future<Output = StoreResult<Option<Customer>>> + Send {
        future::ready(self.read(|t| t.customers.get(&id).cloned()))
    }

    fn consultant_by_code(
        &mut self,
        code: &str,
    ) -> impl Future<Output = StoreResult<Option<Consultant>>> + Send {
        future::ready(self.read(|t| t.consultants.values().find(|c| c.code == code).cloned()))
    }

    fn consultant_by_id(
        &mut self,
        id: ConsultantId,
    ) -> impl Future<Output = StoreResult<Option<Consultant>>> + Send {
        future::ready(self.read(|t| t.consultants.get(&id).cloned()))
    }

    fn lock_consultant(
        &mut self,
        code: &str,
    ) -> impl Future<Output = StoreResult<Option<Consultant>>> + Send {
        let code = code.to_string();
        async move {
            let Some(id) = self.read(|t| {
                t.consultants.values().find(|c| c.code == code).map(|c| c.id)
            })?
            else {
                return Ok(None);
            };
            if !self.consultants_held.contains_key(&id) {
                let guard = self.shared.consultant_lock(id)?.write_owned().await;
                self.consultants_held.insert(id, ConsultantGuard::Exclusive(guard));
            }
            self.read(|t| t.consultants.get(&id).cloned())
        }
    }

    fn share_lock_consultant(
        &mut self,
        id: ConsultantId,
    ) -> impl Future<Output = StoreResult<Option<Consultant>>> + Send {
        async move {
            if !self.read(|t| t.consultants.contains_key(&id))? {
                return Ok(None);
            }
            if !self.consultants_held.contains_key(&id) {
                let guard = self.shared.consultant_lock(id)?.read_owned().await;
                self.consultants_held.insert(id, ConsultantGuard::Shared(guard));
            }
            self.read(|t| t.consultants.get(&id).cloned())
        }
    }

    fn touch_consultant(
        &mut self,
        code: &str,
        at: DateTime<Utc>,
    ) -> impl Future<Output = StoreResult<Option<Consultant>>> + Send {
        let result = self
            .read(|t| t.consultants.values().find(|c| c.code == code).map(|c| c.id))
            .and_then(|id| match id {
                Some(id) => {
                    self.staged.seen.insert(id, at);
                    self.read(|t| t.consultants.get(&id).cloned())
                }
                None => Ok(None),
            });
        future::ready(result)
    }

    fn update_consultant(
        &mut self,
        consultant: &Consultant,
    ) -> impl Future<Output = StoreResult<()>> + Send {
        let result = self
            .read(|t| t.consultants.contains_key(&consultant.id))
            .and_then(|exists| {
                if exists {
                    self.staged.consultants.insert(consultant.id, consultant.clone());
                    Ok(())
                } else {
                    Err(Self::missing("consultant", consultant.id))
                }
            });
        future::ready(result)
    }

    fn consultant_loads(
        &mut self,
        filter: &CandidateFilter,
    ) -> impl Future<Output = StoreResult<Vec<ConsultantLoad>>> + Send {
        future::ready(self.read(|t| {
            t.consultants
                .values()
                .filter(|c| filter.admits(c))
                .map(|c| ConsultantLoad {
                    consultant: c.clone(),
                    pending_orders: t
                        .orders
                        .values()
                        .filter(|o| o.consultant_id == c.id && o.status == OrderStatus::Pending)
                        .fold(0, |count, _| count + 1),
                })
                .collect()
        }))
    }

    fn order_by_itinerary(
        &mut self,
        itinerary_id: ItineraryId,
    ) -> impl Future<Output = StoreResult<Option<Order>>> + Send {
        future::ready(self.read(|t| {
            t.orders
                .values()
                .find(|o| o.itinerary_id == itinerary_id)
                .cloned()
        }))
    }

    fn order_by_code(
        &mut self,
        code: &str,
    ) -> impl Future<Output = StoreResult<Option<Order>>> + Send {
        future::ready(self.read(|t| t.orders.values().find(|o| o.code == code).cloned()))
    }

    fn insert_order(&mut self, order: NewOrder) -> impl Future<Output = StoreResult<Order>> + Send {
        let result = self
            .read(|t| {
                if t.orders.values().any(|o| o.itinerary_id == order.itinerary_id) {
                    Some(ORDERS_ITINERARY_KEY)
                } else if t.orders.values().any(|o| o.code == order.code) {
                    Some(ORDERS_CODE_KEY)
                } else {
                    None
                }
            })
            .and_then(|violated| {
                if let Some(constraint) = violated {
                    return Err(StoreError::UniqueViolation {
                        constraint: constraint.to_string(),
                    });
                }
                let row = Order {
                    id: OrderId::new(self.shared.next_id()),
                    code: order.code,
                    itinerary_id: order.itinerary_id,
                    payer_id: order.payer_id,
                    consultant_id: order.consultant_id,
                    total_price: order.total_price,
                    order_type: order.order_type,
                    status: OrderStatus::Pending,
                    created_at: order.created_at,
                    updated_at: order.created_at,
                };
                self.staged.orders.insert(row.id, row.clone());
                Ok(row)
            });
        future::ready(result)
    }

    fn update_order(&mut self, order: &Order) -> impl Future<Output = StoreResult<()>> + Send {
        let result = self
            .read(|t| t.orders.contains_key(&order.id))
            .and_then(|exists| {
                if exists {
                    self.staged.orders.insert(order.id, order.clone());
                    Ok(())
                } else {
                    Err(Self::missing("order", order.id))
                }
            });
        future::ready(result)
    }

    fn pending_orders_for_consultant(
        &mut self,
        consultant_id: ConsultantId,
    ) -> impl Future<Output = StoreResult<Vec<Order>>> + Send {
        future::ready(self.read(|t| {
            let mut orders: Vec<_> = t
                .orders
                .values()
                .filter(|o| o.consultant_id == consultant_id && o.status == OrderStatus::Pending)
                .cloned()
                .collect();
            orders.sort_by_key(|o| (o.created_at, o.id));
            orders
        }))
    }

    fn payment_by_order(
        &mut self,
        order_id: OrderId,
    ) -> impl Future<Output = StoreResult<Option<OrderPayment>>> + Send {
        future::ready(self.read(|t| t.payments.values().find(|p| p.order_id == order_id).cloned()))
    }

    fn insert_payment(
        &mut self,
        payment: NewOrderPayment,
    ) -> impl Future<Output = StoreResult<OrderPayment>> + Send {
        let result = self
            .read(|t| t.payments.values().any(|p| p.order_id == payment.order_id))
            .and_then(|taken| {
                if taken {
                    return Err(StoreError::UniqueViolation {
                        constraint: PAYMENTS_ORDER_KEY.to_string(),
                    });
                }
                let row = OrderPayment {
                    id: PaymentId::new(self.shared.next_id()),
                    order_id: payment.order_id,
                    payment_type: None,
                    amount: payment.amount,
                    status: PaymentStatus::Processing,
                    payment_url: payment.payment_url,
                    expired_at: payment.expired_at,
                    raw_payload: None,
                    created_at: payment.created_at,
                    updated_at: payment.created_at,
                };
                self.staged.payments.insert(row.id, row.clone());
                Ok(row)
            });
        future::ready(result)
    }

    fn update_payment(
        &mut self,
        payment: &OrderPayment,
    ) -> impl Future<Output = StoreResult<()>> + Send {
        let result = self
            .read(|t| t.payments.contains_key(&payment.id))
            .and_then(|exists| {
                if exists {
                    self.staged.payments.insert(payment.id, payment.clone());
                    Ok(())
                } else {
                    Err(Self::missing("payment", payment.id))
                }
            });
        future::ready(result)
    }

    fn record_activity(
        &mut self,
        entry: &ActivityEntry,
    ) -> impl Future<Output = StoreResult<()>> + Send {
        self.staged.activity.push(entry.clone());
        future::ready(Ok(()))
    }

    fn commit(self) -> impl Future<Output = StoreResult<()>> + Send {
        let result = (|| {
            if let Some(error) = self.shared.faults()?.commit.pop_front() {
                return Err(error);
            }
            let mut tables = self.shared.tables()?;
            let mut next = tables.clone();
            next.overlay(&self.staged);
            next.check_unique()?;
            *tables = next;
            Ok(())
        })();
        future::ready(result)
    }

    fn rollback(self) -> impl Future<Output = StoreResult<()>> + Send {
        future::ready(Ok(()))
    }
}
