//! Application state for Axum handlers.

use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;
use tripdesk_core::OrderStore;
use tripdesk_runtime::Engine;

use crate::signature::WebhookVerifier;

/// Application state shared across all HTTP handlers.
///
/// Generic over the store so the same router serves Postgres in production
/// and the in-memory store in tests.
pub struct AppState<S> {
    /// The order engine
    pub engine: Arc<Engine<S>>,
    /// Checks gateway notification signatures
    pub webhooks: WebhookVerifier,
    /// Prometheus renderer, when a recorder is installed
    pub metrics: Option<PrometheusHandle>,
}

impl<S> Clone for AppState<S> {
    fn clone(&self) -> Self {
        Self {
            engine: Arc::clone(&self.engine),
            webhooks: self.webhooks.clone(),
            metrics: self.metrics.clone(),
        }
    }
}

impl<S: OrderStore> AppState<S> {
    /// Create state around an engine.
    #[must_use]
    pub const fn new(engine: Arc<Engine<S>>, webhooks: WebhookVerifier) -> Self {
        Self {
            engine,
            webhooks,
            metrics: None,
        }
    }

    /// Serve `/metrics` from this handle.
    #[must_use]
    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics = Some(handle);
        self
    }
}

impl<S> std::fmt::Debug for AppState<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("metrics", &self.metrics.is_some())
            .finish_non_exhaustive()
    }
}
