//! Payment URL issuance and renewal.
//!
//! The gateway round-trip happens before the write transaction so no row lock
//! is held across network I/O. The order is re-checked under the aggregate
//! lock afterwards; if it left `pending` in the meantime the freshly issued
//! URL is discarded.

use serde::Serialize;
use tripdesk_core::gateway::PaymentUrlRequest;
use tripdesk_core::types::{
    Actor, Money, NewOrderPayment, OrderPayment, OrderStatus, PaymentId, PaymentStatus,
};
use tripdesk_core::{DateTime, EngineError, OrderStore, Result, StoreTransaction, Utc};

use crate::engine::{Engine, activity};
use crate::metrics::EngineMetrics;
use crate::orders::{lock_order, payer_of};

/// What the payer needs to complete a payment.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct OrderPaymentView {
    /// Order the payment belongs to
    pub order_code: String,
    /// Payment row id, stable across renewals
    pub payment_id: PaymentId,
    /// Amount to collect
    pub amount: Money,
    /// Current payment status
    pub status: PaymentStatus,
    /// Gateway redirect URL
    pub payment_url: String,
    /// When the URL stops working
    pub expired_at: DateTime<Utc>,
    /// `true` when an existing payment row was renewed
    pub renewed: bool,
}

impl OrderPaymentView {
    fn new(order_code: &str, payment: &OrderPayment, renewed: bool) -> Self {
        Self {
            order_code: order_code.to_string(),
            payment_id: payment.id,
            amount: payment.amount,
            status: payment.status,
            payment_url: payment.payment_url.clone(),
            expired_at: payment.expired_at,
            renewed,
        }
    }
}

fn ensure_pending(code: &str, status: OrderStatus) -> Result<()> {
    if status.is_terminal() {
        Err(EngineError::OrderClosed {
            code: code.to_string(),
            status,
        })
    } else {
        Ok(())
    }
}

impl<S: OrderStore> Engine<S> {
    /// Issue a payment URL for a `pending` order, or renew the existing one.
    ///
    /// Renewal keeps the payment id, replaces URL, amount and expiry, and puts
    /// the payment back into `processing`.
    ///
    /// # Errors
    ///
    /// - `InvalidAmount` for a non-positive amount
    /// - `OrderNotFound`
    /// - `PayerMismatch` when the actor is not the order's payer
    /// - `OrderClosed` when the order is no longer `pending`
    /// - gateway errors (`Timeout` / `Unavailable` are retryable)
    pub async fn update_payment(
        &self,
        actor: &Actor,
        order_code: &str,
        amount: Money,
    ) -> Result<OrderPaymentView> {
        amount.ensure_positive()?;

        let (order, payer) = self
            .transaction("update_payment.read", |mut tx| async move {
                let result: Result<_> = async {
                    let order = tx.order_by_code(order_code).await?.ok_or_else(|| {
                        EngineError::OrderNotFound {
                            code: order_code.to_string(),
                        }
                    })?;
                    let payer = payer_of(&mut tx, &order).await?;
                    Ok((order, payer))
                }
                .await;
                (tx, result)
            })
            .await?;

        if actor.code != payer.code {
            return Err(EngineError::PayerMismatch {
                order_code: order.code,
            });
        }
        ensure_pending(&order.code, order.status)?;

        let payment_url = self
            .env
            .gateway
            .request_payment_url(PaymentUrlRequest {
                payer_email: payer.email.clone(),
                payer_name: payer.name.clone(),
                order_code: order.code.clone(),
                amount,
            })
            .await
            .inspect_err(|error| {
                tracing::warn!(order = %order.code, %error, "Payment URL request failed");
            })?;

        let ttl = chrono::Duration::from_std(self.config.payment_url_ttl)
            .map_err(|e| EngineError::Internal(format!("payment url ttl: {e}")))?;
        let now = self.now();
        let expired_at = now + ttl;
        let payer_id = payer.id;

        let view = self
            .transaction("update_payment", |mut tx| async move {
                let result: Result<_> = async {
                    let order = lock_order(&mut tx, order_code).await?;
                    // A re-placement may have switched payers since the read above.
                    if order.payer_id != payer_id {
                        return Err(EngineError::PayerMismatch {
                            order_code: order.code,
                        });
                    }
                    ensure_pending(&order.code, order.status)?;

                    let (payment, renewed) = match tx.payment_by_order(order.id).await? {
                        Some(mut payment) => {
                            payment.amount = amount;
                            payment.payment_url = payment_url;
                            payment.expired_at = expired_at;
                            payment.status = PaymentStatus::Processing;
                            payment.updated_at = now;
                            tx.update_payment(&payment).await?;
                            (payment, true)
                        }
                        None => {
                            let payment = tx
                                .insert_payment(NewOrderPayment {
                                    order_id: order.id,
                                    amount,
                                    payment_url,
                                    expired_at,
                                    created_at: now,
                                })
                                .await?;
                            (payment, false)
                        }
                    };

                    let action = if renewed { "payment.renewed" } else { "payment.requested" };
                    tx.record_activity(&activity(actor, &actor.code, action, &order.code, now))
                        .await?;
                    Ok(OrderPaymentView::new(&order.code, &payment, renewed))
                }
                .await;
                (tx, result)
            })
            .await?;

        EngineMetrics::payment_requested(view.renewed);
        tracing::info!(
            order = %view.order_code,
            payment_id = %view.payment_id,
            renewed = view.renewed,
            amount = %view.amount,
            "Payment URL issued"
        );
        Ok(view)
    }

    /// The payment of an order.
    ///
    /// # Errors
    ///
    /// Returns `OrderNotFound` or `PaymentNotFound`.
    pub async fn payment(&self, order_code: &str) -> Result<OrderPayment> {
        self.transaction("payment", |mut tx| async move {
            let result: Result<_> = async {
                let order = tx.order_by_code(order_code).await?.ok_or_else(|| {
                    EngineError::OrderNotFound {
                        code: order_code.to_string(),
                    }
                })?;
                tx.payment_by_order(order.id)
                    .await?
                    .ok_or_else(|| EngineError::PaymentNotFound {
                        order_code: order.code.clone(),
                    })
            }
            .await;
            (tx, result)
        })
        .await
    }
}
