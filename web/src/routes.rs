//! Router configuration.

use axum::{
    Router,
    routing::{get, post},
};
use tower_http::trace::TraceLayer;
use tripdesk_core::OrderStore;

use crate::handlers::{consultants, health_check, itineraries, metrics, orders, webhooks};
use crate::middleware::correlation_id_layer;
use crate::state::AppState;

/// Build the complete Axum router.
///
/// Everything under `/api` requires the actor headers; `/webhooks`, `/health`
/// and `/metrics` do not.
pub fn build_router<S: OrderStore + 'static>(state: AppState<S>) -> Router {
    let api_routes = Router::new()
        .route("/itineraries", post(itineraries::create::<S>))
        .route(
            "/itineraries/:code",
            get(itineraries::show::<S>)
                .patch(itineraries::update::<S>)
                .delete(itineraries::delete::<S>),
        )
        .route("/itineraries/:code/changes", get(itineraries::changes::<S>))
        .route("/orders", post(orders::place::<S>))
        .route("/orders/:code", get(orders::show::<S>))
        .route(
            "/orders/:code/payment",
            post(orders::request_payment::<S>).get(orders::show_payment::<S>),
        )
        .route("/orders/:code/cancel", post(orders::cancel::<S>))
        .route(
            "/consultants/:code/deactivate",
            post(consultants::deactivate::<S>),
        )
        .route(
            "/consultants/:code/reactivate",
            post(consultants::reactivate::<S>),
        )
        .route(
            "/consultants/:code/heartbeat",
            post(consultants::heartbeat::<S>),
        )
        .route("/consultants/:code/workload", get(consultants::workload::<S>));

    Router::new()
        .route("/health", get(health_check))
        .route("/metrics", get(metrics::<S>))
        .route("/webhooks/payment", post(webhooks::payment_notification::<S>))
        .nest("/api", api_routes)
        .layer(TraceLayer::new_for_http())
        .layer(correlation_id_layer())
        .with_state(state)
}
