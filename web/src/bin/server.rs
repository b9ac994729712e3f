//! Tripdesk order engine HTTP server.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use axum::{Router, routing::get};
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use tripdesk_postgres::{PoolSettings, PostgresOrderStore};
use tripdesk_runtime::metrics::MetricsServer;
use tripdesk_runtime::{Engine, Environment, LogNotifier};
use tripdesk_web::{AppState, Config, HttpPaymentGateway, WebhookVerifier, build_router};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tripdesk=info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Tripdesk order engine");

    let config = Config::from_env();
    info!(
        server = %config.server_addr(),
        metrics = %config.metrics_addr(),
        gateway = %config.gateway.base_url,
        "Configuration loaded"
    );

    let metrics_addr: SocketAddr = config
        .metrics_addr()
        .parse()
        .context("invalid METRICS_HOST/METRICS_PORT")?;
    let mut metrics_server = MetricsServer::new(metrics_addr);
    metrics_server.start()?;

    info!("Connecting to database...");
    let store = PostgresOrderStore::connect(
        &config.postgres.url,
        &PoolSettings {
            max_connections: config.postgres.max_connections,
            min_connections: config.postgres.min_connections,
            acquire_timeout: Duration::from_secs(config.postgres.connect_timeout),
        },
    )
    .await
    .context("database connection failed")?;
    store.migrate().await.context("migrations failed")?;
    info!("Database ready");

    let gateway = HttpPaymentGateway::new(&config.gateway).context("gateway client")?;
    let environment = Environment::new(Arc::new(gateway), Arc::new(LogNotifier));
    let engine = Arc::new(Engine::new(
        Arc::new(store),
        environment,
        config.engine.engine_config(),
    ));

    if config.gateway.server_key.is_empty() {
        warn!("GATEWAY_SERVER_KEY is empty; payment notifications will fail verification");
    }
    let webhooks = WebhookVerifier::new(config.gateway.server_key.clone());
    let mut state = AppState::new(Arc::clone(&engine), webhooks);
    if let Some(handle) = metrics_server.handle() {
        state = state.with_metrics(handle.clone());
        let metrics_app = Router::new().route(
            "/metrics",
            get(move || {
                let handle = handle.clone();
                async move { handle.render() }
            }),
        );
        let listener = tokio::net::TcpListener::bind(metrics_addr).await?;
        info!(address = %metrics_addr, "Metrics endpoint listening");
        tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, metrics_app).await {
                error!(error = %e, "Metrics server stopped");
            }
        });
    }

    let app = build_router(state);
    let addr = config.server_addr();
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(address = %addr, "Server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    let grace = Duration::from_secs(config.server.shutdown_timeout);
    if tokio::time::timeout(grace, engine.notifications().drain())
        .await
        .is_err()
    {
        warn!(timeout_secs = grace.as_secs(), "Pending notifications abandoned");
    }

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            info!("Received Ctrl+C signal, shutting down gracefully...");
        },
        () = terminate => {
            info!("Received SIGTERM signal, shutting down gracefully...");
        },
    }
}
