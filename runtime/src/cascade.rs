//! Consultant lifecycle and the reassignment cascade.
//!
//! Deactivating a consultant moves each of its `pending` orders to the
//! least-loaded remaining consultant. Every order is handled in its own
//! transaction under its own aggregate lock, retried on transient failures,
//! and reported individually: one failure never blocks the others.

use serde::Serialize;
use serde_json::json;
use tripdesk_core::notify::{Notification, Template};
use tripdesk_core::types::{Actor, ChangeReason, Consultant, NewItineraryChange, Order, OrderStatus};
use tripdesk_core::{EngineError, OrderStore, Result, StoreTransaction};

use crate::engine::{Engine, activity, require_admin};
use crate::metrics::EngineMetrics;
use crate::orders::payer_of;
use crate::retry::retry_transient;
use crate::scheduler::select_consultant;

/// An order that moved to another consultant.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Reassignment {
    /// Itinerary the order belongs to
    pub itinerary_code: String,
    /// The order
    pub order_code: String,
    /// Consultant it left
    pub previous_consultant: String,
    /// Consultant it went to
    pub new_consultant: String,
}

/// An order the cascade could not move.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ReassignmentFailure {
    /// Itinerary the order belongs to
    pub itinerary_code: String,
    /// The order
    pub order_code: String,
    /// Why it failed, after retries
    pub error: String,
    /// Whether a later retry of the cascade may succeed
    pub retryable: bool,
}

/// Per-order result of a cascade.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct CascadeReport {
    /// Deactivated consultant
    pub consultant_code: String,
    /// Orders moved
    pub reassigned: Vec<Reassignment>,
    /// Orders that were no longer pending on this consultant when locked
    pub skipped: Vec<String>,
    /// Orders that could not be moved
    pub failures: Vec<ReassignmentFailure>,
}

impl CascadeReport {
    /// Whether every pending order was handled.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

enum ItemOutcome {
    Reassigned(Reassignment),
    Skipped,
}

impl<S: OrderStore> Engine<S> {
    /// Deactivate a consultant and reassign its pending orders.
    ///
    /// The flag flip commits first, so the consultant stops receiving new
    /// assignments before the cascade starts. Calling this again for an
    /// inactive consultant re-runs the cascade over whatever is still pending.
    ///
    /// # Errors
    ///
    /// Returns `NotPermitted` for non-admins, `ConsultantNotFound`, or a
    /// storage error from the deactivation itself. Per-order failures are
    /// reported in [`CascadeReport::failures`].
    pub async fn deactivate_consultant(
        &self,
        actor: &Actor,
        consultant_code: &str,
    ) -> Result<CascadeReport> {
        require_admin(actor, "deactivating a consultant")?;
        let now = self.now();

        let (consultant, pending) = self
            .transaction("deactivate_consultant", |mut tx| async move {
                let result: Result<_> = async {
                    let mut consultant = lock_consultant(&mut tx, consultant_code).await?;
                    if consultant.active {
                        consultant.active = false;
                        tx.update_consultant(&consultant).await?;
                        tx.record_activity(&activity(
                            actor,
                            &consultant.code,
                            "consultant.deactivated",
                            &consultant.code,
                            now,
                        ))
                        .await?;
                    }
                    let mut pending = Vec::new();
                    for order in tx.pending_orders_for_consultant(consultant.id).await? {
                        let itinerary_code = tx
                            .itinerary_by_id(order.itinerary_id)
                            .await?
                            .map(|itinerary| itinerary.code)
                            .unwrap_or_default();
                        pending.push((order, itinerary_code));
                    }
                    Ok((consultant, pending))
                }
                .await;
                (tx, result)
            })
            .await?;

        tracing::info!(
            consultant = %consultant.code,
            pending_orders = pending.len(),
            "Consultant deactivated, reassigning pending orders"
        );

        let mut report = CascadeReport {
            consultant_code: consultant.code.clone(),
            ..CascadeReport::default()
        };

        for (order, itinerary_code) in pending {
            let outcome = retry_transient(&self.config.cascade_retry, &order.code, || {
                self.reassign_order(actor, &consultant, &order, &itinerary_code)
            })
            .await;

            match outcome {
                Ok(ItemOutcome::Reassigned(moved)) => {
                    EngineMetrics::reassignment("reassigned");
                    report.reassigned.push(moved);
                }
                Ok(ItemOutcome::Skipped) => {
                    EngineMetrics::reassignment("skipped");
                    report.skipped.push(order.code);
                }
                Err(error) => {
                    EngineMetrics::reassignment("failed");
                    tracing::error!(
                        consultant = %consultant.code,
                        order = %order.code,
                        %error,
                        "Reassignment failed"
                    );
                    report.failures.push(ReassignmentFailure {
                        itinerary_code,
                        order_code: order.code,
                        retryable: error.is_retryable(),
                        error: error.to_string(),
                    });
                }
            }
        }

        tracing::info!(
            consultant = %consultant.code,
            reassigned = report.reassigned.len(),
            skipped = report.skipped.len(),
            failed = report.failures.len(),
            "Reassignment cascade finished"
        );
        Ok(report)
    }

    /// Move one order off `from`, under the order's aggregate lock.
    async fn reassign_order(
        &self,
        actor: &Actor,
        from: &Consultant,
        order: &Order,
        itinerary_code: &str,
    ) -> Result<ItemOutcome> {
        let now = self.now();
        let filter = self.candidate_filter(vec![from.id])?;

        let (outcome, notifications) = self
            .transaction("reassign_order", |mut tx| async move {
                let result: Result<_> = async {
                    tx.lock_aggregate(order.itinerary_id).await?;
                    let Some(mut locked) = tx.order_by_itinerary(order.itinerary_id).await? else {
                        return Ok((ItemOutcome::Skipped, Vec::new()));
                    };
                    if locked.id != order.id
                        || locked.status != OrderStatus::Pending
                        || locked.consultant_id != from.id
                    {
                        return Ok((ItemOutcome::Skipped, Vec::new()));
                    }

                    let to = select_consultant(&mut tx, &filter).await?;
                    locked.consultant_id = to.id;
                    locked.updated_at = now;
                    tx.update_order(&locked).await?;
                    tx.append_itinerary_change(NewItineraryChange {
                        itinerary_id: locked.itinerary_id,
                        previous_consultant_id: Some(from.id),
                        new_consultant_id: to.id,
                        reason: ChangeReason::Admin,
                        created_at: now,
                    })
                    .await?;

                    let payer = payer_of(&mut tx, &locked).await?;
                    tx.record_activity(&activity(
                        actor,
                        &payer.code,
                        "order.reassigned",
                        &locked.code,
                        now,
                    ))
                    .await?;

                    let notification = Notification::new(
                        vec![to.email.clone(), payer.email.clone()],
                        Template::ConsultantReassigned,
                        json!({
                            "order_code": locked.code,
                            "itinerary_code": itinerary_code,
                            "previous_consultant_name": from.name,
                            "consultant_name": to.name,
                            "payer_name": payer.name,
                        }),
                    );
                    let moved = Reassignment {
                        itinerary_code: itinerary_code.to_string(),
                        order_code: locked.code,
                        previous_consultant: from.code.clone(),
                        new_consultant: to.code,
                    };
                    Ok((ItemOutcome::Reassigned(moved), vec![notification]))
                }
                .await;
                (tx, result)
            })
            .await?;

        if let ItemOutcome::Reassigned(moved) = &outcome {
            tracing::info!(
                order = %moved.order_code,
                from = %moved.previous_consultant,
                to = %moved.new_consultant,
                "Order reassigned"
            );
        }
        self.dispatch(notifications);
        Ok(outcome)
    }

    /// Put a consultant back into the assignment pool.
    ///
    /// Orders moved away during deactivation stay where they are.
    ///
    /// # Errors
    ///
    /// Returns `NotPermitted` for non-admins or `ConsultantNotFound`.
    pub async fn reactivate_consultant(
        &self,
        actor: &Actor,
        consultant_code: &str,
    ) -> Result<Consultant> {
        require_admin(actor, "reactivating a consultant")?;
        let now = self.now();

        let consultant = self
            .transaction("reactivate_consultant", |mut tx| async move {
                let result: Result<_> = async {
                    let mut consultant = lock_consultant(&mut tx, consultant_code).await?;
                    if !consultant.active {
                        consultant.active = true;
                        consultant.last_seen_at = Some(now);
                        tx.update_consultant(&consultant).await?;
                        tx.record_activity(&activity(
                            actor,
                            &consultant.code,
                            "consultant.reactivated",
                            &consultant.code,
                            now,
                        ))
                        .await?;
                    }
                    Ok(consultant)
                }
                .await;
                (tx, result)
            })
            .await?;

        tracing::info!(consultant = %consultant.code, "Consultant reactivated");
        Ok(consultant)
    }

    /// Record consultant activity for the scheduler's activity window.
    ///
    /// Only `last_seen_at` is written; a concurrent deactivation stays in
    /// effect.
    ///
    /// # Errors
    ///
    /// Returns `ConsultantNotFound` for unknown codes.
    pub async fn touch_consultant(&self, consultant_code: &str) -> Result<Consultant> {
        let now = self.now();
        self.transaction("touch_consultant", |mut tx| async move {
            let result = tx
                .touch_consultant(consultant_code, now)
                .await
                .map_err(EngineError::from)
                .and_then(|touched| {
                    touched.ok_or_else(|| EngineError::ConsultantNotFound {
                        code: consultant_code.to_string(),
                    })
                });
            (tx, result)
        })
        .await
    }

    /// Pending orders currently assigned to a consultant.
    ///
    /// # Errors
    ///
    /// Returns `ConsultantNotFound` for unknown codes.
    pub async fn consultant_workload(&self, consultant_code: &str) -> Result<Vec<Order>> {
        self.transaction("consultant_workload", |mut tx| async move {
            let result: Result<_> = async {
                let consultant = find_consultant(&mut tx, consultant_code).await?;
                Ok(tx.pending_orders_for_consultant(consultant.id).await?)
            }
            .await;
            (tx, result)
        })
        .await
    }
}

async fn lock_consultant<Tx: StoreTransaction>(tx: &mut Tx, code: &str) -> Result<Consultant> {
    tx.lock_consultant(code)
        .await?
        .ok_or_else(|| EngineError::ConsultantNotFound {
            code: code.to_string(),
        })
}

async fn find_consultant<Tx: StoreTransaction>(tx: &mut Tx, code: &str) -> Result<Consultant> {
    tx.consultant_by_code(code)
        .await?
        .ok_or_else(|| EngineError::ConsultantNotFound {
            code: code.to_string(),
        })
}
