//! Order placement and cancellation.
//!
//! An itinerary has at most one order. Placing an order on an itinerary that
//! already has a `pending` one updates that row in place: the order code, the
//! creation time and (unless overridden) the consultant survive. Concurrent
//! placements on one itinerary serialize on the aggregate lock, so exactly one
//! of them inserts and the rest update.

use serde::{Deserialize, Serialize};
use serde_json::json;
use tripdesk_core::notify::{Notification, Template};
use tripdesk_core::types::{
    Actor, ChangeReason, Consultant, Customer, Itinerary, ItineraryPatch, Money, NewItineraryChange,
    NewOrder, Order, OrderStatus, OrderType, PaymentStatus,
};
use tripdesk_core::{EngineError, OrderStore, Result, StoreTransaction};

use crate::engine::{Engine, activity, require_self_or_staff};
use crate::itineraries::lock_itinerary;
use crate::metrics::EngineMetrics;
use crate::scheduler::{bind_consultant, select_consultant};

/// Request to place (or re-place) the order of an itinerary.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PlaceOrder {
    /// Itinerary the order is for
    pub itinerary_code: String,
    /// Customer who pays
    pub payer_code: String,
    /// Order total, must be positive
    pub total_price: Money,
    /// Explicit consultant; the scheduler picks one when absent
    #[serde(default)]
    pub consultant_code: Option<String>,
    /// Regular or custom order
    #[serde(default)]
    pub order_type: OrderType,
    /// Itinerary edits applied in the same transaction
    #[serde(default)]
    pub itinerary_update: Option<ItineraryPatch>,
}

/// Result of a placement.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct PlacedOrder {
    /// The order as stored
    pub order: Order,
    /// The consultant bound to it
    pub consultant: Consultant,
    /// `true` when the row was inserted, `false` when updated in place
    pub created: bool,
}

/// Load the order of a locked aggregate by code.
///
/// Resolves the order's itinerary, takes the aggregate lock and re-reads the
/// order under it.
pub(crate) async fn lock_order<Tx: StoreTransaction>(tx: &mut Tx, code: &str) -> Result<Order> {
    let not_found = || EngineError::OrderNotFound {
        code: code.to_string(),
    };
    let order = tx.order_by_code(code).await?.ok_or_else(not_found)?;
    tx.lock_aggregate(order.itinerary_id).await?;
    tx.order_by_itinerary(order.itinerary_id)
        .await?
        .filter(|locked| locked.id == order.id)
        .ok_or_else(not_found)
}

pub(crate) async fn payer_of<Tx: StoreTransaction>(tx: &mut Tx, order: &Order) -> Result<Customer> {
    tx.customer_by_id(order.payer_id).await?.ok_or_else(|| {
        EngineError::Internal(format!(
            "order {} references missing payer {}",
            order.code, order.payer_id
        ))
    })
}

pub(crate) async fn consultant_of<Tx: StoreTransaction>(
    tx: &mut Tx,
    order: &Order,
) -> Result<Consultant> {
    tx.consultant_by_id(order.consultant_id).await?.ok_or_else(|| {
        EngineError::Internal(format!(
            "order {} references missing consultant {}",
            order.code, order.consultant_id
        ))
    })
}

fn placed_notifications(
    placed: &PlacedOrder,
    payer: &Customer,
    itinerary: &Itinerary,
    consultant_changed: bool,
) -> Vec<Notification> {
    let content = json!({
        "order_code": placed.order.code,
        "itinerary_code": itinerary.code,
        "itinerary_title": itinerary.title,
        "payer_name": payer.name,
        "consultant_name": placed.consultant.name,
        "total_price": placed.order.total_price.to_string(),
    });

    let mut notifications = Vec::new();
    if placed.created {
        notifications.push(Notification::new(
            vec![payer.email.clone(), placed.consultant.email.clone()],
            Template::OrderPlaced,
            content.clone(),
        ));
    }
    if placed.created || consultant_changed {
        notifications.push(Notification::new(
            vec![placed.consultant.email.clone()],
            Template::ConsultantAssigned,
            content,
        ));
    }
    notifications
}

impl<S: OrderStore> Engine<S> {
    /// Create the itinerary's order, or update its `pending` order in place.
    ///
    /// # Errors
    ///
    /// - `InvalidAmount` for a non-positive total
    /// - `ItineraryNotFound` / `PayerNotFound` / `ConsultantNotFound`
    /// - `ConsultantInactive` for an explicit consultant that cannot take work
    /// - `NoEligibleConsultant` when the scheduler finds nobody; no order row
    ///   is written in that case
    /// - `OrderClosed` when the existing order is already terminal
    pub async fn place_or_update_order(
        &self,
        actor: &Actor,
        request: PlaceOrder,
    ) -> Result<PlacedOrder> {
        request.total_price.ensure_positive()?;
        require_self_or_staff(actor, &request.payer_code)?;

        let now = self.now();
        let filter = self.candidate_filter(Vec::new())?;
        let new_code = self.env.codes.order_code();

        let (placed, notifications) = self
            .transaction("place_or_update_order", |mut tx| async move {
                let result: Result<_> = async {
                    let mut itinerary = lock_itinerary(&mut tx, &request.itinerary_code).await?;
                    let payer = tx.customer_by_code(&request.payer_code).await?.ok_or_else(|| {
                        EngineError::PayerNotFound {
                            code: request.payer_code.clone(),
                        }
                    })?;

                    let existing = tx.order_by_itinerary(itinerary.id).await?;
                    if let Some(order) = &existing {
                        if order.status.is_terminal() {
                            return Err(EngineError::OrderClosed {
                                code: order.code.clone(),
                                status: order.status,
                            });
                        }
                    }

                    let consultant = match (&request.consultant_code, &existing) {
                        (Some(code), _) => {
                            let requested = tx.consultant_by_code(code).await?.ok_or_else(|| {
                                EngineError::ConsultantNotFound { code: code.clone() }
                            })?;
                            bind_consultant(&mut tx, requested.id).await?.ok_or_else(|| {
                                EngineError::ConsultantInactive { code: code.clone() }
                            })?
                        }
                        (None, Some(order)) => {
                            match bind_consultant(&mut tx, order.consultant_id).await? {
                                Some(current) => current,
                                None => select_consultant(&mut tx, &filter).await?,
                            }
                        }
                        (None, None) => select_consultant(&mut tx, &filter).await?,
                    };

                    if let Some(patch) = request.itinerary_update {
                        if !patch.is_empty() {
                            patch.apply(&mut itinerary, now)?;
                            tx.update_itinerary(&itinerary).await?;
                        }
                    }

                    let (order, created, previous) = match existing {
                        Some(mut order) => {
                            let previous = order.consultant_id;
                            order.payer_id = payer.id;
                            order.consultant_id = consultant.id;
                            order.total_price = request.total_price;
                            order.order_type = request.order_type;
                            order.updated_at = now;
                            tx.update_order(&order).await?;
                            (order, false, Some(previous))
                        }
                        None => {
                            let order = tx
                                .insert_order(NewOrder {
                                    code: new_code,
                                    itinerary_id: itinerary.id,
                                    payer_id: payer.id,
                                    consultant_id: consultant.id,
                                    total_price: request.total_price,
                                    order_type: request.order_type,
                                    created_at: now,
                                })
                                .await?;
                            (order, true, None)
                        }
                    };

                    let consultant_changed = previous != Some(consultant.id);
                    if consultant_changed {
                        let reason = if request.consultant_code.is_some() {
                            ChangeReason::Override
                        } else {
                            ChangeReason::Admin
                        };
                        tx.append_itinerary_change(NewItineraryChange {
                            itinerary_id: itinerary.id,
                            previous_consultant_id: previous,
                            new_consultant_id: consultant.id,
                            reason,
                            created_at: now,
                        })
                        .await?;
                    }

                    let action = if created { "order.created" } else { "order.updated" };
                    tx.record_activity(&activity(actor, &payer.code, action, &order.code, now))
                        .await?;

                    let placed = PlacedOrder {
                        order,
                        consultant,
                        created,
                    };
                    let notifications =
                        placed_notifications(&placed, &payer, &itinerary, consultant_changed);
                    Ok((placed, notifications))
                }
                .await;
                (tx, result)
            })
            .await?;

        EngineMetrics::order_placed(placed.created);
        tracing::info!(
            order = %placed.order.code,
            consultant = %placed.consultant.code,
            created = placed.created,
            actor = %actor.code,
            "Order placed"
        );
        self.dispatch(notifications);
        Ok(placed)
    }

    /// Cancel a `pending` order and void its payment.
    ///
    /// Cancelling an already cancelled order is a no-op.
    ///
    /// # Errors
    ///
    /// Returns `OrderNotFound`, `PayerMismatch` for a customer that is not the
    /// payer, or `OrderClosed` for a completed order.
    pub async fn cancel_order(&self, actor: &Actor, order_code: &str) -> Result<Order> {
        let now = self.now();
        let (order, notifications) = self
            .transaction("cancel_order", |mut tx| async move {
                let result: Result<_> = async {
                    let mut order = lock_order(&mut tx, order_code).await?;
                    let payer = payer_of(&mut tx, &order).await?;
                    if !actor.role.is_staff() && actor.code != payer.code {
                        return Err(EngineError::PayerMismatch {
                            order_code: order.code.clone(),
                        });
                    }

                    match order.status {
                        OrderStatus::Cancelled => return Ok((order, Vec::new())),
                        OrderStatus::Completed => {
                            return Err(EngineError::OrderClosed {
                                code: order.code.clone(),
                                status: order.status,
                            });
                        }
                        OrderStatus::Pending => {}
                    }

                    order.status = OrderStatus::Cancelled;
                    order.updated_at = now;
                    tx.update_order(&order).await?;

                    if let Some(mut payment) = tx.payment_by_order(order.id).await? {
                        if payment.status == PaymentStatus::Processing {
                            payment.status = PaymentStatus::Cancelled;
                            payment.updated_at = now;
                            tx.update_payment(&payment).await?;
                        }
                    }

                    tx.record_activity(&activity(
                        actor,
                        &payer.code,
                        "order.cancelled",
                        &order.code,
                        now,
                    ))
                    .await?;

                    let consultant = consultant_of(&mut tx, &order).await?;
                    let notification = Notification::new(
                        vec![payer.email.clone(), consultant.email.clone()],
                        Template::OrderCancelled,
                        json!({
                            "order_code": order.code,
                            "payer_name": payer.name,
                            "consultant_name": consultant.name,
                        }),
                    );
                    Ok((order, vec![notification]))
                }
                .await;
                (tx, result)
            })
            .await?;

        if !notifications.is_empty() {
            EngineMetrics::order_cancelled();
            tracing::info!(order = %order.code, actor = %actor.code, "Order cancelled");
        }
        self.dispatch(notifications);
        Ok(order)
    }

    /// An order by code.
    ///
    /// # Errors
    ///
    /// Returns `OrderNotFound` for unknown codes.
    pub async fn order(&self, order_code: &str) -> Result<Order> {
        self.transaction("order", |mut tx| async move {
            let result = tx
                .order_by_code(order_code)
                .await
                .map_err(EngineError::from)
                .and_then(|found| {
                    found.ok_or_else(|| EngineError::OrderNotFound {
                        code: order_code.to_string(),
                    })
                });
            (tx, result)
        })
        .await
    }
}
