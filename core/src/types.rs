//! Domain types for the order engine.
//!
//! Identifiers, money, status enums and the persisted entities: itineraries,
//! customers, consultants, orders, order payments and the append-only
//! itinerary change log.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::EngineError;

// ============================================================================
// Identifiers
// ============================================================================

macro_rules! entity_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(i64);

        impl $name {
            /// Wrap a raw storage identifier.
            #[must_use]
            pub const fn new(id: i64) -> Self {
                Self(id)
            }

            /// The raw storage identifier.
            #[must_use]
            pub const fn get(self) -> i64 {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

entity_id!(
    /// Storage identifier of an itinerary
    ItineraryId
);
entity_id!(
    /// Storage identifier of a customer (payer)
    CustomerId
);
entity_id!(
    /// Storage identifier of a consultant
    ConsultantId
);
entity_id!(
    /// Storage identifier of an order
    OrderId
);
entity_id!(
    /// Storage identifier of an order payment
    PaymentId
);
entity_id!(
    /// Storage identifier of an itinerary change row
    ItineraryChangeId
);

// ============================================================================
// Money
// ============================================================================

/// Amount of money in minor units (cents).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Money(i64);

impl Money {
    /// Create from minor units.
    #[must_use]
    pub const fn from_cents(cents: i64) -> Self {
        Self(cents)
    }

    /// Minor units.
    #[must_use]
    pub const fn cents(self) -> i64 {
        self.0
    }

    /// Strictly greater than zero.
    #[must_use]
    pub const fn is_positive(self) -> bool {
        self.0 > 0
    }

    /// Require a strictly positive amount.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::InvalidAmount`] for zero or negative amounts.
    pub fn ensure_positive(self) -> Result<Self, EngineError> {
        if self.is_positive() {
            Ok(self)
        } else {
            Err(EngineError::InvalidAmount { cents: self.0 })
        }
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        write!(f, "{sign}{}.{:02}", abs / 100, abs % 100)
    }
}

// ============================================================================
// Status enums
// ============================================================================

/// Lifecycle status of an order.
///
/// `Pending` is the only non-terminal state; it moves to `Completed` or
/// `Cancelled` and never leaves them.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    /// Placed, awaiting payment
    Pending,
    /// Paid in full
    Completed,
    /// Cancelled by the gateway or explicitly
    Cancelled,
}

impl OrderStatus {
    /// Storage representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
        }
    }

    /// Parse the storage representation.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "completed" => Some(Self::Completed),
            "cancelled" => Some(Self::Cancelled),
            _ => None,
        }
    }

    /// `Completed` and `Cancelled` are terminal.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled)
    }

    /// Whether the state machine allows moving from `self` to `next`.
    ///
    /// Self-transitions are allowed so that re-applying a status is a no-op.
    #[must_use]
    pub const fn can_transition_to(&self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Pending, _)
                | (Self::Completed, Self::Completed)
                | (Self::Cancelled, Self::Cancelled)
        )
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Status of the payment attempt bound to an order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    /// Payment URL issued, no final word from the gateway yet
    Processing,
    /// Settled
    Paid,
    /// Denied, expired or cancelled
    Cancelled,
}

impl PaymentStatus {
    /// Storage representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Processing => "processing",
            Self::Paid => "paid",
            Self::Cancelled => "cancelled",
        }
    }

    /// Parse the storage representation.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "processing" => Some(Self::Processing),
            "paid" => Some(Self::Paid),
            "cancelled" => Some(Self::Cancelled),
            _ => None,
        }
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind of order.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderType {
    /// Catalogue package
    #[default]
    Regular,
    /// Tailor-made itinerary
    Custom,
}

impl OrderType {
    /// Storage representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Regular => "regular",
            Self::Custom => "custom",
        }
    }

    /// Parse the storage representation.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "regular" => Some(Self::Regular),
            "custom" => Some(Self::Custom),
            _ => None,
        }
    }
}

/// Role of an authenticated user.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// End customer
    Customer,
    /// Travel consultant
    Tc,
    /// Back-office administrator
    Admin,
}

impl Role {
    /// Storage representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Customer => "customer",
            Self::Tc => "tc",
            Self::Admin => "admin",
        }
    }

    /// Parse the storage representation.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "customer" => Some(Self::Customer),
            "tc" => Some(Self::Tc),
            "admin" => Some(Self::Admin),
            _ => None,
        }
    }

    /// Staff roles act on behalf of customers.
    #[must_use]
    pub const fn is_staff(&self) -> bool {
        matches!(self, Self::Tc | Self::Admin)
    }
}

/// Why an itinerary changed hands.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeReason {
    /// Administrative reassignment (consultant deactivated)
    Admin,
    /// Explicit override on placement
    Override,
}

impl ChangeReason {
    /// Storage representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Admin => "admin",
            Self::Override => "override",
        }
    }

    /// Parse the storage representation.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "admin" => Some(Self::Admin),
            "override" => Some(Self::Override),
            _ => None,
        }
    }
}

// ============================================================================
// Session context
// ============================================================================

/// The authenticated user performing an operation.
///
/// Supplied by the authentication layer and trusted as already verified.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    /// User code (customer or consultant code)
    pub code: String,
    /// Role of the user
    pub role: Role,
}

impl Actor {
    /// Create an actor.
    #[must_use]
    pub fn new(code: impl Into<String>, role: Role) -> Self {
        Self {
            code: code.into(),
            role,
        }
    }
}

/// Closed time interval used for "currently on shift" filtering.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRange {
    /// Inclusive lower bound
    pub start: DateTime<Utc>,
    /// Inclusive upper bound
    pub end: DateTime<Utc>,
}

impl TimeRange {
    /// Create a range.
    #[must_use]
    pub const fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self { start, end }
    }

    /// Whether `at` lies inside the range.
    #[must_use]
    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        self.start <= at && at <= self.end
    }
}

// ============================================================================
// Entities
// ============================================================================

/// A customer-owned travel plan.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Itinerary {
    /// Storage id
    pub id: ItineraryId,
    /// Externally visible code
    pub code: String,
    /// Owning customer
    pub customer_id: CustomerId,
    /// Short title
    pub title: String,
    /// Estimated price
    pub estimated_price: Money,
    /// First day of travel
    pub start_date: Option<NaiveDate>,
    /// Last day of travel
    pub end_date: Option<NaiveDate>,
    /// Free-form structured detail
    pub detail: serde_json::Value,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Last modification time
    pub updated_at: DateTime<Utc>,
    /// Soft-delete marker
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Itinerary {
    /// Whether the itinerary has been soft-deleted.
    #[must_use]
    pub const fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }
}

/// Reject a date range whose start is after its end.
///
/// # Errors
///
/// Returns [`EngineError::InvalidDateRange`] when both dates are set and
/// `start > end`.
pub fn validate_date_range(
    start: Option<NaiveDate>,
    end: Option<NaiveDate>,
) -> Result<(), EngineError> {
    match (start, end) {
        (Some(start), Some(end)) if start > end => {
            Err(EngineError::InvalidDateRange { start, end })
        }
        _ => Ok(()),
    }
}

/// Values for a new itinerary row.
#[derive(Clone, Debug, PartialEq)]
pub struct NewItinerary {
    /// Generated code
    pub code: String,
    /// Owning customer
    pub customer_id: CustomerId,
    /// Short title
    pub title: String,
    /// Estimated price
    pub estimated_price: Money,
    /// First day of travel
    pub start_date: Option<NaiveDate>,
    /// Last day of travel
    pub end_date: Option<NaiveDate>,
    /// Free-form structured detail
    pub detail: serde_json::Value,
    /// Creation time
    pub created_at: DateTime<Utc>,
}

/// Partial update of an itinerary.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ItineraryPatch {
    /// New title
    pub title: Option<String>,
    /// New estimated price
    pub estimated_price: Option<Money>,
    /// New start date
    pub start_date: Option<NaiveDate>,
    /// New end date
    pub end_date: Option<NaiveDate>,
    /// Replacement detail payload
    pub detail: Option<serde_json::Value>,
}

impl ItineraryPatch {
    /// Whether the patch changes nothing.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.estimated_price.is_none()
            && self.start_date.is_none()
            && self.end_date.is_none()
            && self.detail.is_none()
    }

    /// Apply the patch, validating the merged date range and price.
    ///
    /// The itinerary is left untouched when validation fails.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::InvalidDateRange`] or
    /// [`EngineError::InvalidAmount`].
    pub fn apply(self, itinerary: &mut Itinerary, at: DateTime<Utc>) -> Result<(), EngineError> {
        let start = self.start_date.or(itinerary.start_date);
        let end = self.end_date.or(itinerary.end_date);
        validate_date_range(start, end)?;
        if let Some(price) = self.estimated_price {
            if price.cents() < 0 {
                return Err(EngineError::InvalidAmount {
                    cents: price.cents(),
                });
            }
            itinerary.estimated_price = price;
        }
        if let Some(title) = self.title {
            itinerary.title = title;
        }
        if let Some(detail) = self.detail {
            itinerary.detail = detail;
        }
        itinerary.start_date = start;
        itinerary.end_date = end;
        itinerary.updated_at = at;
        Ok(())
    }
}

/// A paying customer.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Customer {
    /// Storage id
    pub id: CustomerId,
    /// Externally visible code
    pub code: String,
    /// Display name
    pub name: String,
    /// Contact email
    pub email: String,
}

/// A staff worker who can be assigned to itineraries.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Consultant {
    /// Storage id
    pub id: ConsultantId,
    /// Externally visible code
    pub code: String,
    /// Display name
    pub name: String,
    /// Contact email
    pub email: String,
    /// Staff role; only `Tc` takes assignments
    pub role: Role,
    /// Only active consultants take assignments
    pub active: bool,
    /// Last activity heartbeat
    pub last_seen_at: Option<DateTime<Utc>>,
}

impl Consultant {
    /// Active travel consultant.
    #[must_use]
    pub fn is_assignable(&self) -> bool {
        self.active && self.role == Role::Tc
    }
}

/// A consultant together with its derived workload.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConsultantLoad {
    /// The consultant
    pub consultant: Consultant,
    /// Number of `pending` orders assigned to it
    pub pending_orders: u64,
}

/// Filter applied when gathering scheduling candidates.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CandidateFilter {
    /// Consultants that must not be chosen
    pub excluding: Vec<ConsultantId>,
    /// When set, only consultants last seen inside the window qualify
    pub activity_window: Option<TimeRange>,
}

impl CandidateFilter {
    /// Whether a consultant passes the filter.
    #[must_use]
    pub fn admits(&self, consultant: &Consultant) -> bool {
        if !consultant.is_assignable() || self.excluding.contains(&consultant.id) {
            return false;
        }
        match (self.activity_window, consultant.last_seen_at) {
            (None, _) => true,
            (Some(window), Some(seen)) => window.contains(seen),
            (Some(_), None) => false,
        }
    }
}

/// The commercial record bound to exactly one itinerary.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    /// Storage id
    pub id: OrderId,
    /// Externally visible code, stable across updates
    pub code: String,
    /// Owning itinerary (unique)
    pub itinerary_id: ItineraryId,
    /// Registered payer
    pub payer_id: CustomerId,
    /// Assigned consultant
    pub consultant_id: ConsultantId,
    /// Total price
    pub total_price: Money,
    /// Kind of order
    pub order_type: OrderType,
    /// Lifecycle status
    pub status: OrderStatus,
    /// Creation time, stable across updates
    pub created_at: DateTime<Utc>,
    /// Last modification time
    pub updated_at: DateTime<Utc>,
}

/// Values for a new order row.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NewOrder {
    /// Generated code
    pub code: String,
    /// Owning itinerary
    pub itinerary_id: ItineraryId,
    /// Registered payer
    pub payer_id: CustomerId,
    /// Assigned consultant
    pub consultant_id: ConsultantId,
    /// Total price
    pub total_price: Money,
    /// Kind of order
    pub order_type: OrderType,
    /// Creation time
    pub created_at: DateTime<Utc>,
}

/// The payment attempt bound 1:1 to an order.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OrderPayment {
    /// Storage id, stable across renewals
    pub id: PaymentId,
    /// Owning order (unique)
    pub order_id: OrderId,
    /// Gateway payment type, known once a webhook arrived
    pub payment_type: Option<String>,
    /// Amount requested
    pub amount: Money,
    /// Payment status
    pub status: PaymentStatus,
    /// Gateway redirect URL
    pub payment_url: String,
    /// When the URL stops being valid
    pub expired_at: DateTime<Utc>,
    /// Latest webhook payload, verbatim
    pub raw_payload: Option<serde_json::Value>,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Last modification time
    pub updated_at: DateTime<Utc>,
}

/// Values for a new payment row.
#[derive(Clone, Debug, PartialEq)]
pub struct NewOrderPayment {
    /// Owning order
    pub order_id: OrderId,
    /// Amount requested
    pub amount: Money,
    /// Gateway redirect URL
    pub payment_url: String,
    /// When the URL stops being valid
    pub expired_at: DateTime<Utc>,
    /// Creation time
    pub created_at: DateTime<Utc>,
}

/// Immutable audit row for a consultant change on an itinerary.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItineraryChange {
    /// Storage id
    pub id: ItineraryChangeId,
    /// Itinerary that changed hands
    pub itinerary_id: ItineraryId,
    /// Consultant before the change
    pub previous_consultant_id: Option<ConsultantId>,
    /// Consultant after the change
    pub new_consultant_id: ConsultantId,
    /// Why
    pub reason: ChangeReason,
    /// When
    pub created_at: DateTime<Utc>,
}

/// Values for a new itinerary change row.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NewItineraryChange {
    /// Itinerary that changed hands
    pub itinerary_id: ItineraryId,
    /// Consultant before the change
    pub previous_consultant_id: Option<ConsultantId>,
    /// Consultant after the change
    pub new_consultant_id: ConsultantId,
    /// Why
    pub reason: ChangeReason,
    /// When
    pub created_at: DateTime<Utc>,
}

/// Activity log entry: who did what, for whom.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityEntry {
    /// Code of the acting user
    pub actor_code: String,
    /// Role of the acting user
    pub actor_role: Role,
    /// Code of the user the action was performed for
    pub subject_code: String,
    /// Short action name, e.g. `order.created`
    pub action: String,
    /// Code of the affected record
    pub reference: String,
    /// When
    pub created_at: DateTime<Utc>,
}

impl ActivityEntry {
    /// Whether the actor acted on someone else's behalf.
    #[must_use]
    pub fn on_behalf(&self) -> bool {
        self.actor_code != self.subject_code
    }
}
