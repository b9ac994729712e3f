//! Payment gateway webhook reconciliation.
//!
//! Webhooks may arrive more than once, out of order and concurrently. Each
//! one is processed under the aggregate lock:
//!
//! - the raw payload always replaces the stored one
//! - statuses move only along `pending -> completed | cancelled`
//! - a report that would move a terminal order into the other terminal state
//!   is rejected: logged, counted and acknowledged without writing anything
//! - notifications go out only when a status actually changed

use serde::Serialize;
use serde_json::{Value, json};
use tripdesk_core::notify::{Notification, Template};
use tripdesk_core::status_map::{GatewayReport, Resolution};
use tripdesk_core::types::{OrderStatus, PaymentStatus};
use tripdesk_core::{EngineError, OrderStore, Result, StoreTransaction};

use crate::engine::Engine;
use crate::metrics::EngineMetrics;
use crate::orders::{consultant_of, lock_order, payer_of};

/// A parsed gateway notification.
#[derive(Clone, Debug, PartialEq)]
pub struct GatewayNotification {
    /// Order code echoed by the gateway
    pub order_code: String,
    /// The status fields
    pub report: GatewayReport,
    /// Payload as received, stored verbatim
    pub raw_payload: Value,
}

impl GatewayNotification {
    /// Parse a webhook body.
    ///
    /// `order_id` and `transaction_status` are required; `payment_type` and
    /// `fraud_status` default to empty.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::InvalidInput`] when a required field is missing
    /// or not a string.
    pub fn from_payload(payload: Value) -> Result<Self> {
        let field = |name: &str| payload.get(name).and_then(Value::as_str).map(str::to_string);
        let required = |name: &str| {
            field(name)
                .filter(|value| !value.trim().is_empty())
                .ok_or_else(|| EngineError::InvalidInput(format!("webhook is missing {name}")))
        };

        let order_code = required("order_id")?;
        let transaction_status = required("transaction_status")?;
        let report = GatewayReport::new(
            field("payment_type").unwrap_or_default(),
            transaction_status,
            field("fraud_status").unwrap_or_default(),
        );

        Ok(Self {
            order_code,
            report,
            raw_payload: payload,
        })
    }
}

/// What a webhook did.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ReconcileOutcome {
    /// Statuses changed
    Applied {
        /// New order status
        order_status: OrderStatus,
        /// New payment status
        payment_status: PaymentStatus,
    },
    /// Statuses already matched; only the payload was refreshed
    Unchanged {
        /// Order status
        order_status: OrderStatus,
        /// Payment status
        payment_status: PaymentStatus,
    },
    /// The report contradicts a terminal order; nothing was written
    Rejected {
        /// Status the order holds
        current: OrderStatus,
        /// Status the report asked for
        reported: OrderStatus,
    },
}

impl ReconcileOutcome {
    const fn label(&self) -> &'static str {
        match self {
            Self::Applied { .. } => "applied",
            Self::Unchanged { .. } => "unchanged",
            Self::Rejected { .. } => "rejected",
        }
    }
}

impl<S: OrderStore> Engine<S> {
    /// Apply a gateway notification to the order and its payment.
    ///
    /// # Errors
    ///
    /// Returns `OrderNotFound` / `PaymentNotFound` for unknown references, or
    /// a retryable storage error. Terminal conflicts are not errors; they
    /// come back as [`ReconcileOutcome::Rejected`].
    pub async fn reconcile_webhook(
        &self,
        notification: GatewayNotification,
    ) -> Result<ReconcileOutcome> {
        let resolution = self.config.status_table.resolve(&notification.report);
        let now = self.now();
        let order_code = notification.order_code.clone();

        let (outcome, notifications) = self
            .transaction("reconcile_webhook", |mut tx| async move {
                let result: Result<_> = async {
                    let mut order = lock_order(&mut tx, &notification.order_code).await?;
                    let mut payment = tx.payment_by_order(order.id).await?.ok_or_else(|| {
                        EngineError::PaymentNotFound {
                            order_code: order.code.clone(),
                        }
                    })?;

                    let (order_status, payment_status) =
                        resolution.target(order.status, payment.status);

                    if !order.status.can_transition_to(order_status) {
                        return Ok((
                            ReconcileOutcome::Rejected {
                                current: order.status,
                                reported: order_status,
                            },
                            Vec::new(),
                        ));
                    }

                    let changed = (order_status, payment_status) != (order.status, payment.status);

                    payment.raw_payload = Some(notification.raw_payload);
                    if !notification.report.payment_type.is_empty() {
                        payment.payment_type = Some(notification.report.payment_type.clone());
                    }
                    payment.updated_at = now;

                    if !changed {
                        tx.update_payment(&payment).await?;
                        return Ok((
                            ReconcileOutcome::Unchanged {
                                order_status,
                                payment_status,
                            },
                            Vec::new(),
                        ));
                    }

                    let order_changed = order.status != order_status;
                    order.status = order_status;
                    payment.status = payment_status;
                    if order_changed {
                        order.updated_at = now;
                        tx.update_order(&order).await?;
                    }
                    tx.update_payment(&payment).await?;

                    let template = match resolution {
                        Resolution::Settled => Some(Template::PaymentCompleted),
                        Resolution::Voided => Some(Template::PaymentCancelled),
                        Resolution::Unresolved => None,
                    };
                    let mut notifications = Vec::new();
                    if let (Some(template), true) = (template, order_changed) {
                        let payer = payer_of(&mut tx, &order).await?;
                        let consultant = consultant_of(&mut tx, &order).await?;
                        notifications.push(Notification::new(
                            vec![payer.email, consultant.email],
                            template,
                            json!({
                                "order_code": order.code,
                                "payer_name": payer.name,
                                "amount": payment.amount.to_string(),
                                "payment_type": notification.report.payment_type,
                            }),
                        ));
                    }

                    Ok((
                        ReconcileOutcome::Applied {
                            order_status,
                            payment_status,
                        },
                        notifications,
                    ))
                }
                .await;
                (tx, result)
            })
            .await?;

        EngineMetrics::webhook(outcome.label());
        match outcome {
            ReconcileOutcome::Rejected { current, reported } => tracing::warn!(
                order = %order_code,
                current = current.as_str(),
                reported = reported.as_str(),
                "Webhook contradicts terminal order, ignored"
            ),
            ReconcileOutcome::Applied {
                order_status,
                payment_status,
            } => tracing::info!(
                order = %order_code,
                order_status = order_status.as_str(),
                payment_status = payment_status.as_str(),
                "Webhook applied"
            ),
            ReconcileOutcome::Unchanged { .. } => {
                tracing::debug!(order = %order_code, "Webhook replay, statuses unchanged");
            }
        }
        self.dispatch(notifications);
        Ok(outcome)
    }
}
