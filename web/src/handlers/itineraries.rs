//! Itinerary endpoints.
//!
//! - `POST /api/itineraries` - create
//! - `GET /api/itineraries/:code` - read
//! - `PATCH /api/itineraries/:code` - partial update
//! - `DELETE /api/itineraries/:code` - soft delete
//! - `GET /api/itineraries/:code/changes` - consultant change history

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use tripdesk_core::OrderStore;
use tripdesk_core::types::{Itinerary, ItineraryChange, ItineraryPatch};
use tripdesk_runtime::CreateItinerary;

use crate::WebResult;
use crate::extractors::CurrentActor;
use crate::state::AppState;

/// Create an itinerary for a customer.
///
/// # Errors
///
/// 404 for an unknown customer, 409 when a customer creates for someone
/// else, 422 for an invalid title, price or date range.
pub async fn create<S: OrderStore + 'static>(
    State(state): State<AppState<S>>,
    CurrentActor(actor): CurrentActor,
    Json(request): Json<CreateItinerary>,
) -> WebResult<(StatusCode, Json<Itinerary>)> {
    let itinerary = state.engine.create_itinerary(&actor, request).await?;
    Ok((StatusCode::CREATED, Json(itinerary)))
}

/// Read a live itinerary.
///
/// # Errors
///
/// 404 for unknown or soft-deleted itineraries.
pub async fn show<S: OrderStore + 'static>(
    State(state): State<AppState<S>>,
    Path(code): Path<String>,
) -> WebResult<Json<Itinerary>> {
    Ok(Json(state.engine.itinerary(&code).await?))
}

/// Apply a partial update.
///
/// # Errors
///
/// 404 for unknown itineraries, 422 when the merged dates are inverted.
pub async fn update<S: OrderStore + 'static>(
    State(state): State<AppState<S>>,
    CurrentActor(actor): CurrentActor,
    Path(code): Path<String>,
    Json(patch): Json<ItineraryPatch>,
) -> WebResult<Json<Itinerary>> {
    Ok(Json(state.engine.update_itinerary(&actor, &code, patch).await?))
}

/// Soft-delete an itinerary.
///
/// # Errors
///
/// 409 while the itinerary has a pending order.
pub async fn delete<S: OrderStore + 'static>(
    State(state): State<AppState<S>>,
    CurrentActor(actor): CurrentActor,
    Path(code): Path<String>,
) -> WebResult<StatusCode> {
    state.engine.soft_delete_itinerary(&actor, &code).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Consultant change history, oldest first.
///
/// # Errors
///
/// 404 for unknown itineraries.
pub async fn changes<S: OrderStore + 'static>(
    State(state): State<AppState<S>>,
    Path(code): Path<String>,
) -> WebResult<Json<Vec<ItineraryChange>>> {
    Ok(Json(state.engine.itinerary_history(&code).await?))
}
