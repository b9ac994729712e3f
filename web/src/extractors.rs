//! Custom Axum extractors.
//!
//! - [`CurrentActor`]: the acting user, from headers set by the
//!   authentication layer in front of this service
//! - [`CorrelationId`]: the request correlation id
//!
//! # Examples
//!
//! ```ignore
//! async fn handler(
//!     CurrentActor(actor): CurrentActor,
//!     correlation_id: CorrelationId,
//! ) -> Result<Json<Response>, AppError> {
//!     tracing::info!(correlation_id = %correlation_id.0, actor = %actor.code, "Processing request");
//!     Ok(Json(response))
//! }
//! ```

use axum::{async_trait, extract::FromRequestParts, http::request::Parts};
use tripdesk_core::types::{Actor, Role};
use uuid::Uuid;

use crate::error::AppError;
use crate::middleware::CORRELATION_ID_HEADER;

/// Header carrying the acting user's code.
pub const ACTOR_CODE_HEADER: &str = "X-Actor-Code";

/// Header carrying the acting user's role (`customer`, `tc` or `admin`).
pub const ACTOR_ROLE_HEADER: &str = "X-Actor-Role";

/// The acting user.
///
/// Rejects with 401 when either header is missing, blank or carries an
/// unknown role.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CurrentActor(pub Actor);

#[async_trait]
impl<S> FromRequestParts<S> for CurrentActor
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let header = |name: &str| {
            parts
                .headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::trim)
                .filter(|v| !v.is_empty())
        };

        let code = header(ACTOR_CODE_HEADER)
            .ok_or_else(|| AppError::unauthorized(format!("missing {ACTOR_CODE_HEADER}")))?;
        let role = header(ACTOR_ROLE_HEADER)
            .ok_or_else(|| AppError::unauthorized(format!("missing {ACTOR_ROLE_HEADER}")))?;
        let role = Role::parse(&role.to_ascii_lowercase())
            .ok_or_else(|| AppError::unauthorized(format!("unknown role {role}")))?;

        Ok(Self(Actor::new(code, role)))
    }
}

/// Correlation ID for request tracing.
///
/// Taken from the request extensions when the correlation middleware ran,
/// otherwise from the `X-Correlation-ID` header, otherwise a fresh UUID v4.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CorrelationId(pub Uuid);

#[async_trait]
impl<S> FromRequestParts<S> for CorrelationId
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        if let Some(id) = parts.extensions.get::<Self>() {
            return Ok(*id);
        }

        let correlation_id = parts
            .headers
            .get(CORRELATION_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .and_then(|s| Uuid::parse_str(s).ok())
            .unwrap_or_else(Uuid::new_v4);

        Ok(Self(correlation_id))
    }
}
