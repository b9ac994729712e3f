//! Gateway status vocabulary → internal `(OrderStatus, PaymentStatus)`.
//!
//! The mapping is a table of rules evaluated first-match. Each rule matches on
//! the gateway's payment type, transaction status and fraud status; the first
//! rule whose three matchers accept the report decides the [`Resolution`].
//! Reports that no rule accepts leave the current statuses untouched.
//!
//! | payment type | transaction status | fraud status | resolution |
//! |---|---|---|---|
//! | `credit_card` | `capture` | `accept` | settled |
//! | any | `settlement` | any | settled |
//! | any | `deny` / `expire` / `cancel` | any | voided |
//! | any | anything else | any | unresolved |
//!
//! # Example
//!
//! ```
//! use tripdesk_core::status_map::{GatewayReport, Resolution, StatusTable};
//!
//! let table = StatusTable::default();
//! let report = GatewayReport::new("bank_transfer", "settlement", "");
//! assert_eq!(table.resolve(&report), Resolution::Settled);
//! ```

use serde::{Deserialize, Serialize};

use crate::types::{OrderStatus, PaymentStatus};

/// The three gateway fields that drive reconciliation.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatewayReport {
    /// e.g. `credit_card`, `bank_transfer`, `gopay`
    pub payment_type: String,
    /// e.g. `capture`, `settlement`, `pending`, `deny`, `expire`, `cancel`
    pub transaction_status: String,
    /// e.g. `accept`, `challenge`, `deny`; empty when not reported
    pub fraud_status: String,
}

impl GatewayReport {
    /// Create a report.
    #[must_use]
    pub fn new(
        payment_type: impl Into<String>,
        transaction_status: impl Into<String>,
        fraud_status: impl Into<String>,
    ) -> Self {
        Self {
            payment_type: payment_type.into(),
            transaction_status: transaction_status.into(),
            fraud_status: fraud_status.into(),
        }
    }
}

/// What a report means for the order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Resolution {
    /// Money collected: `(completed, paid)`
    Settled,
    /// Payment will not happen: `(cancelled, cancelled)`
    Voided,
    /// No final word yet: statuses stay as they are
    Unresolved,
}

impl Resolution {
    /// Target statuses given the current ones.
    #[must_use]
    pub const fn target(
        self,
        current_order: OrderStatus,
        current_payment: PaymentStatus,
    ) -> (OrderStatus, PaymentStatus) {
        match self {
            Self::Settled => (OrderStatus::Completed, PaymentStatus::Paid),
            Self::Voided => (OrderStatus::Cancelled, PaymentStatus::Cancelled),
            Self::Unresolved => (current_order, current_payment),
        }
    }
}

/// Matches one gateway field.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Matcher {
    /// Accepts any value, including empty
    Any,
    /// Accepts the value, compared ASCII case-insensitively after trimming
    Exactly(String),
}

impl Matcher {
    /// Exact matcher.
    #[must_use]
    pub fn exactly(value: impl Into<String>) -> Self {
        Self::Exactly(value.into())
    }

    fn accepts(&self, value: &str) -> bool {
        match self {
            Self::Any => true,
            Self::Exactly(expected) => expected.eq_ignore_ascii_case(value.trim()),
        }
    }
}

/// One row of the decision table.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StatusRule {
    /// Payment type matcher
    pub payment_type: Matcher,
    /// Transaction status matcher
    pub transaction_status: Matcher,
    /// Fraud status matcher
    pub fraud_status: Matcher,
    /// Outcome when all three match
    pub resolution: Resolution,
}

impl StatusRule {
    /// Create a rule.
    #[must_use]
    pub const fn new(
        payment_type: Matcher,
        transaction_status: Matcher,
        fraud_status: Matcher,
        resolution: Resolution,
    ) -> Self {
        Self {
            payment_type,
            transaction_status,
            fraud_status,
            resolution,
        }
    }

    fn matches(&self, report: &GatewayReport) -> bool {
        self.payment_type.accepts(&report.payment_type)
            && self.transaction_status.accepts(&report.transaction_status)
            && self.fraud_status.accepts(&report.fraud_status)
    }
}

/// First-match decision table.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StatusTable {
    rules: Vec<StatusRule>,
}

impl StatusTable {
    /// Table with custom rules, for gateways with a different vocabulary.
    #[must_use]
    pub const fn new(rules: Vec<StatusRule>) -> Self {
        Self { rules }
    }

    /// The rules, in evaluation order.
    #[must_use]
    pub fn rules(&self) -> &[StatusRule] {
        &self.rules
    }

    /// Resolve a report; unmatched reports are [`Resolution::Unresolved`].
    #[must_use]
    pub fn resolve(&self, report: &GatewayReport) -> Resolution {
        self.rules
            .iter()
            .find(|rule| rule.matches(report))
            .map_or(Resolution::Unresolved, |rule| rule.resolution)
    }
}

impl Default for StatusTable {
    fn default() -> Self {
        let voided = |status: &str| {
            StatusRule::new(
                Matcher::Any,
                Matcher::exactly(status),
                Matcher::Any,
                Resolution::Voided,
            )
        };

        Self::new(vec![
            StatusRule::new(
                Matcher::exactly("credit_card"),
                Matcher::exactly("capture"),
                Matcher::exactly("accept"),
                Resolution::Settled,
            ),
            StatusRule::new(
                Matcher::Any,
                Matcher::exactly("settlement"),
                Matcher::Any,
                Resolution::Settled,
            ),
            voided("deny"),
            voided("expire"),
            voided("cancel"),
        ])
    }
}
