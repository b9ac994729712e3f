//! Prometheus metrics for the order engine.
//!
//! Services record through the `metrics` facade; [`MetricsServer`] installs
//! the Prometheus recorder and renders the scrape body.
//!
//! | metric | type | labels |
//! |---|---|---|
//! | `orders_placed_total` | counter | `outcome` = `created` / `updated` |
//! | `orders_cancelled_total` | counter | |
//! | `payments_requested_total` | counter | `outcome` = `created` / `renewed` |
//! | `webhooks_reconciled_total` | counter | `outcome` = `applied` / `unchanged` / `rejected` |
//! | `reassignments_total` | counter | `outcome` = `reassigned` / `failed` / `skipped` |
//! | `notifications_failed_total` | counter | `template` |
//! | `transaction_duration_seconds` | histogram | `operation` |
//!
//! # Example
//!
//! ```rust,no_run
//! use tripdesk_runtime::metrics::MetricsServer;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let mut server = MetricsServer::new("0.0.0.0:9090".parse()?);
//! server.start()?;
//! let body = server.render();
//! # Ok(())
//! # }
//! ```

use metrics::{describe_counter, describe_histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use std::net::SocketAddr;
use std::time::Duration;
use thiserror::Error;

/// Errors from metrics operations.
#[derive(Error, Debug)]
pub enum MetricsError {
    /// Failed to build metrics exporter
    #[error("Failed to build metrics exporter: {0}")]
    Build(String),
    /// Failed to install metrics exporter
    #[error("Failed to install metrics exporter: {0}")]
    Install(String),
}

/// Prometheus recorder and scrape renderer.
pub struct MetricsServer {
    addr: SocketAddr,
    handle: Option<PrometheusHandle>,
}

impl MetricsServer {
    /// Create a metrics server for the given scrape address.
    #[must_use]
    pub const fn new(addr: SocketAddr) -> Self {
        Self { addr, handle: None }
    }

    /// Address the scrape endpoint should be served on.
    #[must_use]
    pub const fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Register descriptions and install the Prometheus recorder.
    ///
    /// # Errors
    ///
    /// Returns error if the exporter cannot be built or installed. A recorder
    /// that is already installed (common in tests) is logged and tolerated.
    pub fn start(&mut self) -> Result<(), MetricsError> {
        register_metrics();

        let builder = PrometheusBuilder::new()
            .set_buckets_for_metric(
                Matcher::Suffix("duration_seconds".to_string()),
                &[0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0],
            )
            .map_err(|e| MetricsError::Build(e.to_string()))?;

        match builder.install_recorder() {
            Ok(handle) => {
                self.handle = Some(handle);
                tracing::info!(addr = %self.addr, "Metrics recorder installed");
                Ok(())
            }
            Err(e) => {
                let err_msg = e.to_string();
                if err_msg.contains("already initialized") {
                    tracing::warn!("Metrics recorder already initialized, skipping re-initialization");
                    Ok(())
                } else {
                    Err(MetricsError::Install(err_msg))
                }
            }
        }
    }

    /// Handle for rendering from another task.
    #[must_use]
    pub fn handle(&self) -> Option<PrometheusHandle> {
        self.handle.clone()
    }

    /// Render current metrics in Prometheus text format.
    ///
    /// Returns `None` if the server hasn't been started.
    #[must_use]
    pub fn render(&self) -> Option<String> {
        self.handle.as_ref().map(PrometheusHandle::render)
    }
}

fn register_metrics() {
    describe_counter!("orders_placed_total", "Orders created or updated by placement");
    describe_counter!("orders_cancelled_total", "Orders cancelled by an actor");
    describe_counter!(
        "payments_requested_total",
        "Payment URLs created or renewed"
    );
    describe_counter!(
        "webhooks_reconciled_total",
        "Gateway notifications processed, by outcome"
    );
    describe_counter!(
        "reassignments_total",
        "Pending orders handled by the reassignment cascade, by outcome"
    );
    describe_counter!(
        "notifications_failed_total",
        "Notifications the notifier failed to deliver"
    );
    describe_histogram!(
        "transaction_duration_seconds",
        "Wall time of engine transactions, including lock waits"
    );
}

/// Recorders used by the services.
pub(crate) struct EngineMetrics;

impl EngineMetrics {
    pub(crate) fn order_placed(created: bool) {
        let outcome = if created { "created" } else { "updated" };
        metrics::counter!("orders_placed_total", "outcome" => outcome).increment(1);
    }

    pub(crate) fn order_cancelled() {
        metrics::counter!("orders_cancelled_total").increment(1);
    }

    pub(crate) fn payment_requested(renewed: bool) {
        let outcome = if renewed { "renewed" } else { "created" };
        metrics::counter!("payments_requested_total", "outcome" => outcome).increment(1);
    }

    pub(crate) fn webhook(outcome: &'static str) {
        metrics::counter!("webhooks_reconciled_total", "outcome" => outcome).increment(1);
    }

    pub(crate) fn reassignment(outcome: &'static str) {
        metrics::counter!("reassignments_total", "outcome" => outcome).increment(1);
    }

    pub(crate) fn notification_failed(template: &'static str) {
        metrics::counter!("notifications_failed_total", "template" => template).increment(1);
    }

    pub(crate) fn transaction(operation: &'static str, duration: Duration) {
        metrics::histogram!("transaction_duration_seconds", "operation" => operation)
            .record(duration.as_secs_f64());
    }
}
