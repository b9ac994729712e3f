//! Order endpoints.
//!
//! - `POST /api/orders` - place or update the order of an itinerary
//! - `GET /api/orders/:code` - read
//! - `POST /api/orders/:code/payment` - create or renew the payment URL
//! - `GET /api/orders/:code/payment` - read the payment
//! - `POST /api/orders/:code/cancel` - cancel

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use serde::Deserialize;
use tripdesk_core::OrderStore;
use tripdesk_core::types::{Money, Order, OrderPayment};
use tripdesk_runtime::{OrderPaymentView, PlaceOrder, PlacedOrder};

use crate::WebResult;
use crate::extractors::{CorrelationId, CurrentActor};
use crate::state::AppState;

/// Body of `POST /api/orders/:code/payment`.
#[derive(Debug, Deserialize)]
pub struct PaymentRequest {
    /// Amount to collect, in minor units
    pub amount: Money,
}

/// Place a new order or update the existing one.
///
/// Answers 201 when the order was created and 200 when it was updated.
///
/// # Errors
///
/// 404 for unknown itinerary, payer or consultant; 409 for payer mismatch,
/// closed orders, inactive consultants or an empty pool; 422 for a
/// non-positive total.
pub async fn place<S: OrderStore + 'static>(
    State(state): State<AppState<S>>,
    correlation_id: CorrelationId,
    CurrentActor(actor): CurrentActor,
    Json(request): Json<PlaceOrder>,
) -> WebResult<(StatusCode, Json<PlacedOrder>)> {
    let placed = state.engine.place_or_update_order(&actor, request).await?;
    tracing::debug!(
        correlation_id = %correlation_id.0,
        order_code = %placed.order.code,
        created = placed.created,
        "Placement handled"
    );
    let status = if placed.created {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };
    Ok((status, Json(placed)))
}

/// Read an order.
///
/// # Errors
///
/// 404 for unknown orders.
pub async fn show<S: OrderStore + 'static>(
    State(state): State<AppState<S>>,
    Path(code): Path<String>,
) -> WebResult<Json<Order>> {
    Ok(Json(state.engine.order(&code).await?))
}

/// Create or renew the payment URL of an order.
///
/// # Errors
///
/// 409 when the actor is not the payer or the order is closed, 422 for a
/// non-positive amount or a gateway refusal, 503 when the gateway is down.
pub async fn request_payment<S: OrderStore + 'static>(
    State(state): State<AppState<S>>,
    CurrentActor(actor): CurrentActor,
    Path(code): Path<String>,
    Json(request): Json<PaymentRequest>,
) -> WebResult<Json<OrderPaymentView>> {
    Ok(Json(
        state
            .engine
            .update_payment(&actor, &code, request.amount)
            .await?,
    ))
}

/// Read the payment of an order.
///
/// # Errors
///
/// 404 when the order or its payment does not exist.
pub async fn show_payment<S: OrderStore + 'static>(
    State(state): State<AppState<S>>,
    Path(code): Path<String>,
) -> WebResult<Json<OrderPayment>> {
    Ok(Json(state.engine.payment(&code).await?))
}

/// Cancel a pending order.
///
/// # Errors
///
/// 409 for completed orders or actors that may not cancel.
pub async fn cancel<S: OrderStore + 'static>(
    State(state): State<AppState<S>>,
    CurrentActor(actor): CurrentActor,
    Path(code): Path<String>,
) -> WebResult<Json<Order>> {
    Ok(Json(state.engine.cancel_order(&actor, &code).await?))
}
