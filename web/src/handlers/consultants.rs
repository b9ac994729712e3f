//! Consultant endpoints.
//!
//! - `POST /api/consultants/:code/deactivate` - deactivate and reassign
//! - `POST /api/consultants/:code/reactivate`
//! - `POST /api/consultants/:code/heartbeat` - record activity
//! - `GET /api/consultants/:code/workload` - pending orders

use axum::{
    Json,
    extract::{Path, State},
};
use tripdesk_core::types::{Consultant, Order, Role};
use tripdesk_core::{EngineError, OrderStore};
use tripdesk_runtime::CascadeReport;

use crate::WebResult;
use crate::extractors::CurrentActor;
use crate::state::AppState;

/// Deactivate a consultant and move their pending orders.
///
/// Per-order failures are part of the report, not an error status.
///
/// # Errors
///
/// 404 for unknown consultants, 409 for non-admin actors.
pub async fn deactivate<S: OrderStore + 'static>(
    State(state): State<AppState<S>>,
    CurrentActor(actor): CurrentActor,
    Path(code): Path<String>,
) -> WebResult<Json<CascadeReport>> {
    Ok(Json(state.engine.deactivate_consultant(&actor, &code).await?))
}

/// Return a consultant to the scheduling pool.
///
/// # Errors
///
/// 404 for unknown consultants, 409 for non-admin actors.
pub async fn reactivate<S: OrderStore + 'static>(
    State(state): State<AppState<S>>,
    CurrentActor(actor): CurrentActor,
    Path(code): Path<String>,
) -> WebResult<Json<Consultant>> {
    Ok(Json(state.engine.reactivate_consultant(&actor, &code).await?))
}

/// Record that a consultant is active.
///
/// Consultants touch themselves; admins may touch anyone.
///
/// # Errors
///
/// 404 for unknown consultants, 409 for other actors.
pub async fn heartbeat<S: OrderStore + 'static>(
    State(state): State<AppState<S>>,
    CurrentActor(actor): CurrentActor,
    Path(code): Path<String>,
) -> WebResult<Json<Consultant>> {
    if actor.code != code && actor.role != Role::Admin {
        return Err(EngineError::NotPermitted {
            reason: format!("{} cannot record activity for {code}", actor.code),
        }
        .into());
    }
    Ok(Json(state.engine.touch_consultant(&code).await?))
}

/// Pending orders assigned to a consultant.
///
/// # Errors
///
/// 404 for unknown consultants, 409 for customers.
pub async fn workload<S: OrderStore + 'static>(
    State(state): State<AppState<S>>,
    CurrentActor(actor): CurrentActor,
    Path(code): Path<String>,
) -> WebResult<Json<Vec<Order>>> {
    if !actor.role.is_staff() {
        return Err(EngineError::NotPermitted {
            reason: "workload is visible to staff only".to_string(),
        }
        .into());
    }
    Ok(Json(state.engine.consultant_workload(&code).await?))
}
