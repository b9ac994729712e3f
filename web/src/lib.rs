//! # Tripdesk Web
//!
//! Thin HTTP surface over the order engine.
//!
//! # Request Flow
//!
//! 1. **Correlation id** is attached by [`middleware::correlation_id_layer`]
//! 2. **Actor** is read from the `X-Actor-Code` / `X-Actor-Role` headers
//! 3. **One engine operation** runs with the extracted request
//! 4. **Errors** map to statuses by kind through [`AppError`]
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use tripdesk_web::{AppState, WebhookVerifier, build_router};
//!
//! let app = build_router(AppState::new(Arc::new(engine), WebhookVerifier::new("server-key")));
//! axum::serve(listener, app).await?;
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod error;
pub mod extractors;
pub mod gateway;
pub mod handlers;
pub mod middleware;
pub mod routes;
pub mod signature;
pub mod state;

pub use config::Config;
pub use error::AppError;
pub use extractors::{ACTOR_CODE_HEADER, ACTOR_ROLE_HEADER, CorrelationId, CurrentActor};
pub use gateway::HttpPaymentGateway;
pub use middleware::{CORRELATION_ID_HEADER, correlation_id_layer};
pub use routes::build_router;
pub use signature::WebhookVerifier;
pub use state::AppState;

/// Result type alias for web handlers.
pub type WebResult<T> = Result<T, AppError>;
