//! The [`Engine`] and its transaction discipline.
//!
//! Every service method follows the same shape:
//!
//! 1. validate the request outside any transaction
//! 2. open a transaction with [`Engine::transaction`], take the aggregate lock,
//!    read, decide and write
//! 3. commit, or roll back on any error or when the deadline elapses
//! 4. dispatch the notifications collected in step 2
//!
//! Nothing observable leaves the engine before commit.

use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use tripdesk_core::environment::{Clock, CodeGenerator, SystemClock, UuidCodeGenerator};
use tripdesk_core::gateway::PaymentGateway;
use tripdesk_core::notify::{Notification, Notifier};
use tripdesk_core::types::{ActivityEntry, Actor, CandidateFilter, ConsultantId, Role, TimeRange};
use tripdesk_core::{DateTime, EngineError, OrderStore, Result, StoreTransaction, Utc};

use crate::config::EngineConfig;
use crate::metrics::EngineMetrics;
use crate::notifications::NotificationDispatcher;

/// External collaborators of the engine.
#[derive(Clone)]
pub struct Environment {
    /// Payment gateway client
    pub gateway: Arc<dyn PaymentGateway>,
    /// Time source
    pub clock: Arc<dyn Clock>,
    /// Order and itinerary code generator
    pub codes: Arc<dyn CodeGenerator>,
    /// Post-commit notification dispatch
    pub notifications: NotificationDispatcher,
}

impl Environment {
    /// Production environment: wall clock, UUID codes.
    #[must_use]
    pub fn new(gateway: Arc<dyn PaymentGateway>, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            gateway,
            clock: Arc::new(SystemClock),
            codes: Arc::new(UuidCodeGenerator),
            notifications: NotificationDispatcher::new(notifier),
        }
    }

    /// Replace the clock.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Replace the code generator.
    #[must_use]
    pub fn with_codes(mut self, codes: Arc<dyn CodeGenerator>) -> Self {
        self.codes = codes;
        self
    }
}

impl std::fmt::Debug for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Environment").finish_non_exhaustive()
    }
}

/// Order lifecycle engine over a transactional store.
///
/// The service operations live in sibling modules as `impl` blocks:
/// itineraries, placement, payments, reconciliation, scheduling and the
/// reassignment cascade.
pub struct Engine<S> {
    pub(crate) store: Arc<S>,
    pub(crate) env: Environment,
    pub(crate) config: EngineConfig,
}

impl<S: OrderStore> Engine<S> {
    /// Create an engine.
    #[must_use]
    pub const fn new(store: Arc<S>, env: Environment, config: EngineConfig) -> Self {
        Self { store, env, config }
    }

    /// The underlying store.
    #[must_use]
    pub fn store(&self) -> &S {
        &self.store
    }

    /// The active configuration.
    #[must_use]
    pub const fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// The notification dispatcher, for draining on shutdown.
    #[must_use]
    pub const fn notifications(&self) -> &NotificationDispatcher {
        &self.env.notifications
    }

    pub(crate) fn now(&self) -> DateTime<Utc> {
        self.env.clock.now()
    }

    /// Candidate filter for the scheduler, honouring the activity window.
    pub(crate) fn candidate_filter(&self, excluding: Vec<ConsultantId>) -> Result<CandidateFilter> {
        let activity_window = match self.config.scheduler_active_within {
            Some(window) => {
                let window = chrono::Duration::from_std(window)
                    .map_err(|e| EngineError::Internal(format!("activity window: {e}")))?;
                let now = self.now();
                Some(TimeRange::new(now - window, now))
            }
            None => None,
        };
        Ok(CandidateFilter {
            excluding,
            activity_window,
        })
    }

    pub(crate) fn dispatch(&self, notifications: Vec<Notification>) {
        self.env.notifications.dispatch(notifications);
    }

    /// Run `body` inside a transaction bounded by the configured deadline.
    ///
    /// `body` takes ownership of the transaction and hands it back with its
    /// result. `Ok` commits, `Err` rolls back. If the deadline elapses the
    /// in-flight future is dropped, which rolls the transaction back, and
    /// `DeadlineExceeded` is returned.
    ///
    /// # Errors
    ///
    /// Returns the body's error, a storage error from begin/commit, or
    /// `DeadlineExceeded`.
    pub(crate) async fn transaction<T, F, Fut>(&self, operation: &'static str, body: F) -> Result<T>
    where
        F: FnOnce(S::Transaction) -> Fut,
        Fut: Future<Output = (S::Transaction, Result<T>)>,
    {
        let started = Instant::now();
        let deadline = self.config.transaction_deadline;
        let outcome = tokio::time::timeout(deadline, self.execute(operation, body)).await;
        EngineMetrics::transaction(operation, started.elapsed());

        outcome.unwrap_or_else(|_| {
            let deadline_ms = u64::try_from(deadline.as_millis()).unwrap_or(u64::MAX);
            tracing::warn!(operation, deadline_ms, "Transaction deadline exceeded, rolled back");
            Err(EngineError::DeadlineExceeded { deadline_ms })
        })
    }

    async fn execute<T, F, Fut>(&self, operation: &'static str, body: F) -> Result<T>
    where
        F: FnOnce(S::Transaction) -> Fut,
        Fut: Future<Output = (S::Transaction, Result<T>)>,
    {
        let tx = self.store.begin().await?;
        let (tx, result) = body(tx).await;
        match result {
            Ok(value) => {
                tx.commit().await?;
                Ok(value)
            }
            Err(error) => {
                if let Err(rollback) = tx.rollback().await {
                    tracing::warn!(operation, error = %rollback, "Rollback failed");
                }
                tracing::debug!(operation, %error, "Transaction rolled back");
                Err(error)
            }
        }
    }
}

/// Customers may only act for themselves; staff may act for anyone.
pub(crate) fn require_self_or_staff(actor: &Actor, customer_code: &str) -> Result<()> {
    if actor.role.is_staff() || actor.code == customer_code {
        Ok(())
    } else {
        Err(EngineError::NotPermitted {
            reason: format!("{} may not act for customer {customer_code}", actor.code),
        })
    }
}

/// Reject everyone but administrators.
pub(crate) fn require_admin(actor: &Actor, action: &str) -> Result<()> {
    if actor.role == Role::Admin {
        Ok(())
    } else {
        Err(EngineError::NotPermitted {
            reason: format!("{action} requires the admin role"),
        })
    }
}

/// Activity log entry stamped with the acting user.
pub(crate) fn activity(
    actor: &Actor,
    subject_code: &str,
    action: &str,
    reference: &str,
    at: DateTime<Utc>,
) -> ActivityEntry {
    ActivityEntry {
        actor_code: actor.code.clone(),
        actor_role: actor.role,
        subject_code: subject_code.to_string(),
        action: action.to_string(),
        reference: reference.to_string(),
        created_at: at,
    }
}
