//! Engine tuning knobs.
//!
//! Plain data with sensible defaults; the HTTP binary fills it from the
//! environment, tests override individual fields.

use std::time::Duration;

use tripdesk_core::status_map::StatusTable;

use crate::retry::RetryPolicy;

/// Runtime configuration for [`crate::Engine`].
#[derive(Clone, Debug)]
pub struct EngineConfig {
    /// Upper bound on a single transaction, lock waits included.
    ///
    /// Exceeding it rolls the transaction back with `DeadlineExceeded`.
    pub transaction_deadline: Duration,

    /// How long a freshly issued payment URL stays valid.
    pub payment_url_ttl: Duration,

    /// When set, only consultants seen within this window before "now" are
    /// assignment candidates.
    pub scheduler_active_within: Option<Duration>,

    /// Retry policy for each item of a reassignment cascade.
    pub cascade_retry: RetryPolicy,

    /// Gateway status decision table.
    pub status_table: StatusTable,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            transaction_deadline: Duration::from_secs(5),
            payment_url_ttl: Duration::from_secs(24 * 60 * 60),
            scheduler_active_within: None,
            cascade_retry: RetryPolicy::default(),
            status_table: StatusTable::default(),
        }
    }
}

impl EngineConfig {
    /// Set the transaction deadline.
    #[must_use]
    pub const fn with_transaction_deadline(mut self, deadline: Duration) -> Self {
        self.transaction_deadline = deadline;
        self
    }

    /// Set the payment URL lifetime.
    #[must_use]
    pub const fn with_payment_url_ttl(mut self, ttl: Duration) -> Self {
        self.payment_url_ttl = ttl;
        self
    }

    /// Restrict candidates to recently active consultants.
    #[must_use]
    pub const fn with_scheduler_active_within(mut self, window: Option<Duration>) -> Self {
        self.scheduler_active_within = window;
        self
    }

    /// Set the cascade retry policy.
    #[must_use]
    pub fn with_cascade_retry(mut self, policy: RetryPolicy) -> Self {
        self.cascade_retry = policy;
        self
    }

    /// Replace the gateway status table.
    #[must_use]
    pub fn with_status_table(mut self, table: StatusTable) -> Self {
        self.status_table = table;
        self
    }
}
