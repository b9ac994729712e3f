//! Payment gateway collaborator.
//!
//! The engine only needs one call from the gateway: obtain a redirect URL for
//! an order. Status updates arrive asynchronously as webhooks and are mapped
//! by [`crate::status_map`], not by the gateway client.

use std::future::Future;
use std::pin::Pin;

use serde::{Deserialize, Serialize};

use crate::error::GatewayError;
use crate::types::Money;

/// Payment gateway result
pub type GatewayResult<T> = Result<T, GatewayError>;

/// Everything the gateway needs to issue a payment page.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentUrlRequest {
    /// Payer email
    pub payer_email: String,
    /// Payer display name
    pub payer_name: String,
    /// Order code, echoed back by the gateway in webhooks
    pub order_code: String,
    /// Amount to collect
    pub amount: Money,
}

/// Payment gateway trait
///
/// Uses explicit `Pin<Box<dyn Future>>` returns so implementations can be
/// shared as `Arc<dyn PaymentGateway>`.
pub trait PaymentGateway: Send + Sync {
    /// Request (or re-request) a payment redirect URL.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Timeout`] / [`GatewayError::Unavailable`] for
    /// transient failures and [`GatewayError::Rejected`] when the gateway
    /// refuses the request.
    fn request_payment_url(
        &self,
        request: PaymentUrlRequest,
    ) -> Pin<Box<dyn Future<Output = GatewayResult<String>> + Send + '_>>;
}
