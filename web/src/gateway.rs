//! HTTP payment gateway client.
//!
//! Speaks a Snap-style redirect API: `POST {base_url}/snap/v1/transactions`
//! with the server key as the basic-auth user, answering
//! `{"token": "...", "redirect_url": "..."}`. `gross_amount` is sent in
//! whole currency units.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use tripdesk_core::GatewayError;
use tripdesk_core::gateway::{GatewayResult, PaymentGateway, PaymentUrlRequest};

use crate::config::GatewayConfig;

/// Request body sent to the gateway.
#[derive(Debug, Serialize)]
struct TransactionRequest<'a> {
    transaction_details: TransactionDetails<'a>,
    customer_details: CustomerDetails<'a>,
}

#[derive(Debug, Serialize)]
struct TransactionDetails<'a> {
    order_id: &'a str,
    gross_amount: i64,
}

#[derive(Debug, Serialize)]
struct CustomerDetails<'a> {
    first_name: &'a str,
    email: &'a str,
}

#[derive(Debug, Deserialize)]
struct TransactionResponse {
    redirect_url: String,
}

/// Payment gateway over HTTP.
#[derive(Clone, Debug)]
pub struct HttpPaymentGateway {
    client: reqwest::Client,
    base_url: String,
    server_key: String,
    minor_units: i64,
}

impl HttpPaymentGateway {
    /// Build a client from configuration.
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP client cannot be constructed.
    pub fn new(config: &GatewayConfig) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout))
            .build()?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            server_key: config.server_key.clone(),
            minor_units: config.minor_units.max(1),
        })
    }

    fn gross_amount(&self, request: &PaymentUrlRequest) -> GatewayResult<i64> {
        let cents = request.amount.cents();
        if cents % self.minor_units != 0 {
            return Err(GatewayError::Rejected(format!(
                "amount {} is not a whole number of currency units",
                request.amount
            )));
        }
        Ok(cents / self.minor_units)
    }

    async fn create_transaction(&self, request: PaymentUrlRequest) -> GatewayResult<String> {
        let body = TransactionRequest {
            transaction_details: TransactionDetails {
                order_id: &request.order_code,
                gross_amount: self.gross_amount(&request)?,
            },
            customer_details: CustomerDetails {
                first_name: &request.payer_name,
                email: &request.payer_email,
            },
        };

        let response = self
            .client
            .post(format!("{}/snap/v1/transactions", self.base_url))
            .basic_auth(&self.server_key, Some(""))
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    GatewayError::Timeout
                } else {
                    GatewayError::Unavailable(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            tracing::warn!(
                order_code = %request.order_code,
                status = %status,
                body = %text,
                "Gateway refused payment request"
            );
            return Err(if is_transient(status) {
                GatewayError::Unavailable(format!("gateway returned {status}"))
            } else {
                GatewayError::Rejected(format!("gateway returned {status}: {text}"))
            });
        }

        let parsed: TransactionResponse = response
            .json()
            .await
            .map_err(|e| GatewayError::Unavailable(format!("unreadable gateway response: {e}")))?;
        tracing::debug!(order_code = %request.order_code, "Payment URL issued");
        Ok(parsed.redirect_url)
    }
}

fn is_transient(status: StatusCode) -> bool {
    status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS
}

impl PaymentGateway for HttpPaymentGateway {
    fn request_payment_url(
        &self,
        request: PaymentUrlRequest,
    ) -> Pin<Box<dyn Future<Output = GatewayResult<String>> + Send + '_>> {
        Box::pin(self.create_transaction(request))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use tripdesk_core::types::Money;
    use wiremock::matchers::{body_partial_json, header_exists, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn gateway(base_url: &str) -> HttpPaymentGateway {
        HttpPaymentGateway::new(&GatewayConfig {
            base_url: base_url.to_string(),
            server_key: "SB-server-key".to_string(),
            timeout: 2,
            minor_units: 100,
        })
        .unwrap()
    }

    fn request() -> PaymentUrlRequest {
        PaymentUrlRequest {
            payer_email: "ana@customers.test".to_string(),
            payer_name: "Ana".to_string(),
            order_code: "ORD-1".to_string(),
            amount: Money::from_cents(250_000),
        }
    }

    #[tokio::test]
    async fn returns_redirect_url() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/snap/v1/transactions"))
            .and(header_exists("authorization"))
            .and(body_partial_json(serde_json::json!({
                "transaction_details": {"order_id": "ORD-1", "gross_amount": 2_500}
            })))
            .respond_with(ResponseTemplate::new(201).set_body_json(serde_json::json!({
                "token": "tok",
                "redirect_url": "https://pay.example/tok"
            })))
            .mount(&server)
            .await;

        let url = gateway(&server.uri())
            .request_payment_url(request())
            .await
            .unwrap();
        assert_eq!(url, "https://pay.example/tok");
    }

    #[tokio::test]
    async fn fractional_amounts_never_reach_the_gateway() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(201))
            .expect(0)
            .mount(&server)
            .await;

        let mut fractional = request();
        fractional.amount = Money::from_cents(250_050);
        let err = gateway(&server.uri())
            .request_payment_url(fractional)
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::Rejected(_)));
    }

    #[tokio::test]
    async fn client_errors_are_rejections() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(400).set_body_string("duplicate order_id"))
            .mount(&server)
            .await;

        let err = gateway(&server.uri())
            .request_payment_url(request())
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::Rejected(msg) if msg.contains("duplicate")));
    }

    #[tokio::test]
    async fn server_errors_are_transient() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let err = gateway(&server.uri())
            .request_payment_url(request())
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::Unavailable(_)));
    }

    #[tokio::test]
    async fn slow_gateway_times_out() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(5)))
            .mount(&server)
            .await;

        let err = gateway(&server.uri())
            .request_payment_url(request())
            .await
            .unwrap_err();
        assert_eq!(err, GatewayError::Timeout);
    }
}
