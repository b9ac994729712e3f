//! Payment gateway webhook.
//!
//! `POST /webhooks/payment` takes the gateway's JSON notification verbatim.
//! Its `signature_key` is checked against the server key first.
//! Every processed notification is acknowledged with 200, including ones
//! rejected for contradicting a terminal order, so the gateway stops
//! redelivering them.

use axum::{
    Json,
    extract::{State, rejection::JsonRejection},
};
use serde_json::Value;
use tripdesk_core::OrderStore;
use tripdesk_runtime::{GatewayNotification, ReconcileOutcome};

use crate::WebResult;
use crate::error::AppError;
use crate::extractors::CorrelationId;
use crate::state::AppState;

/// Reconcile a gateway notification.
///
/// # Errors
///
/// 415 without a JSON content type, 400/422 for unreadable or incomplete
/// bodies, 401 for a missing or wrong signature, 404 for unknown orders or payments, 503 on storage trouble (the
/// gateway retries).
pub async fn payment_notification<S: OrderStore + 'static>(
    State(state): State<AppState<S>>,
    correlation_id: CorrelationId,
    body: Result<Json<Value>, JsonRejection>,
) -> WebResult<Json<ReconcileOutcome>> {
    let Json(payload) = body.map_err(|rejection| {
        AppError::new(
            rejection.status(),
            rejection.body_text(),
            "INVALID_BODY".to_string(),
        )
    })?;

    state.webhooks.verify(&payload)?;
    let notification = GatewayNotification::from_payload(payload)?;
    tracing::info!(
        correlation_id = %correlation_id.0,
        order_code = %notification.order_code,
        "Payment notification received"
    );

    Ok(Json(state.engine.reconcile_webhook(notification).await?))
}
