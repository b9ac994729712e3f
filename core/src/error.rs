//! Error taxonomy for the order engine.
//!
//! Every failure the engine reports is an [`EngineError`]. Callers branch on
//! [`EngineError::kind`] rather than on individual variants:
//!
//! - `NotFound` / `Conflict` / `Invalid` go back to the user as-is
//! - `Transient` rolled the transaction back and is safe to retry with the
//!   same idempotency key (order code or itinerary code)
//! - `Fatal` indicates a bug or a broken invariant and is surfaced as an
//!   opaque internal error

use chrono::NaiveDate;
use thiserror::Error;

use crate::types::OrderStatus;

/// Coarse classification of an [`EngineError`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// A referenced record does not exist
    NotFound,
    /// The request conflicts with current state
    Conflict,
    /// The request is malformed
    Invalid,
    /// Infrastructure hiccup, retryable
    Transient,
    /// Broken invariant or bug
    Fatal,
}

/// Errors returned by the storage layer.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// The backend could not be reached.
    #[error("Storage unavailable: {0}")]
    Unavailable(String),

    /// The backend did not answer in time.
    #[error("Storage timeout: {0}")]
    Timeout(String),

    /// A unique constraint was violated.
    #[error("Unique constraint violated: {constraint}")]
    UniqueViolation {
        /// Name of the violated constraint
        constraint: String,
    },

    /// A check or foreign-key constraint rejected the write.
    #[error("Constraint violated: {constraint}")]
    ConstraintViolation {
        /// Name of the violated constraint
        constraint: String,
    },

    /// A stored row could not be decoded.
    #[error("Corrupt row: {0}")]
    Corrupt(String),

    /// Any other backend failure. Not retried.
    #[error("Storage error: {0}")]
    Backend(String),
}

impl StoreError {
    /// Classification of the storage failure.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Unavailable(_) | Self::Timeout(_) => ErrorKind::Transient,
            Self::UniqueViolation { .. }
            | Self::ConstraintViolation { .. }
            | Self::Corrupt(_)
            | Self::Backend(_) => ErrorKind::Fatal,
        }
    }
}

/// Result alias for storage operations.
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Errors returned by the payment gateway collaborator.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GatewayError {
    /// The gateway did not answer in time.
    #[error("Gateway timeout")]
    Timeout,

    /// The gateway could not be reached or answered with a server error.
    #[error("Gateway unavailable: {0}")]
    Unavailable(String),

    /// The gateway refused the request.
    #[error("Gateway rejected request: {0}")]
    Rejected(String),
}

impl GatewayError {
    /// Classification of the gateway failure.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Timeout | Self::Unavailable(_) => ErrorKind::Transient,
            Self::Rejected(_) => ErrorKind::Invalid,
        }
    }
}

/// Error from the notification dispatcher collaborator.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Notification delivery failed: {0}")]
pub struct NotifyError(pub String);

/// Every failure the engine reports.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    // ═══════════════════════════════════════════════════════════
    // Not found
    // ═══════════════════════════════════════════════════════════
    /// No live itinerary with that code.
    #[error("Itinerary not found: {code}")]
    ItineraryNotFound {
        /// Requested itinerary code
        code: String,
    },

    /// No customer with that code.
    #[error("Payer not found: {code}")]
    PayerNotFound {
        /// Requested customer code
        code: String,
    },

    /// No consultant with that code.
    #[error("Consultant not found: {code}")]
    ConsultantNotFound {
        /// Requested consultant code
        code: String,
    },

    /// No order with that code.
    #[error("Order not found: {code}")]
    OrderNotFound {
        /// Requested order code
        code: String,
    },

    /// The order has no payment row yet.
    #[error("Payment not found for order {order_code}")]
    PaymentNotFound {
        /// Order the payment was looked up for
        order_code: String,
    },

    // ═══════════════════════════════════════════════════════════
    // Conflict
    // ═══════════════════════════════════════════════════════════
    /// The caller is not the order's registered payer.
    #[error("Caller is not the payer of order {order_code}")]
    PayerMismatch {
        /// Order code
        order_code: String,
    },

    /// No active consultant is available for assignment.
    #[error("No eligible consultant available")]
    NoEligibleConsultant,

    /// The explicitly requested consultant cannot take assignments.
    #[error("Consultant {code} is not an active travel consultant")]
    ConsultantInactive {
        /// Consultant code
        code: String,
    },

    /// The order reached a terminal status.
    #[error("Order {code} is already {status}")]
    OrderClosed {
        /// Order code
        code: String,
        /// Terminal status
        status: OrderStatus,
    },

    /// The itinerary still has an order awaiting payment.
    #[error("Itinerary {code} has a pending order")]
    ItineraryHasPendingOrder {
        /// Itinerary code
        code: String,
    },

    /// The actor may not perform this operation.
    #[error("Not permitted: {reason}")]
    NotPermitted {
        /// Why
        reason: String,
    },

    // ═══════════════════════════════════════════════════════════
    // Invalid
    // ═══════════════════════════════════════════════════════════
    /// Amount is zero or negative where a positive amount is required.
    #[error("Invalid amount: {cents}")]
    InvalidAmount {
        /// Offending amount in minor units
        cents: i64,
    },

    /// Start date after end date.
    #[error("Invalid date range: {start} is after {end}")]
    InvalidDateRange {
        /// Start date
        start: NaiveDate,
        /// End date
        end: NaiveDate,
    },

    /// Malformed input that passed transport validation.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    // ═══════════════════════════════════════════════════════════
    // Infrastructure
    // ═══════════════════════════════════════════════════════════
    /// The transaction ran past its deadline and was rolled back.
    #[error("Transaction deadline of {deadline_ms}ms exceeded")]
    DeadlineExceeded {
        /// Configured deadline
        deadline_ms: u64,
    },

    /// Storage failure.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Payment gateway failure.
    #[error(transparent)]
    Gateway(#[from] GatewayError),

    /// Broken invariant.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl EngineError {
    /// Classification used for propagation decisions.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::ItineraryNotFound { .. }
            | Self::PayerNotFound { .. }
            | Self::ConsultantNotFound { .. }
            | Self::OrderNotFound { .. }
            | Self::PaymentNotFound { .. } => ErrorKind::NotFound,

            Self::PayerMismatch { .. }
            | Self::NoEligibleConsultant
            | Self::ConsultantInactive { .. }
            | Self::OrderClosed { .. }
            | Self::ItineraryHasPendingOrder { .. }
            | Self::NotPermitted { .. } => ErrorKind::Conflict,

            Self::InvalidAmount { .. } | Self::InvalidDateRange { .. } | Self::InvalidInput(_) => {
                ErrorKind::Invalid
            }

            Self::DeadlineExceeded { .. } => ErrorKind::Transient,
            Self::Store(err) => err.kind(),
            Self::Gateway(err) => err.kind(),
            Self::Internal(_) => ErrorKind::Fatal,
        }
    }

    /// Only transient failures may be retried.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self.kind(), ErrorKind::Transient)
    }
}

/// Result alias for engine operations.
pub type Result<T> = std::result::Result<T, EngineError>;
