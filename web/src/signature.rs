//! Gateway notification signatures.
//!
//! The gateway signs each notification with
//! `hex(sha512(order_id + status_code + gross_amount + server_key))` and
//! sends it as `signature_key`. Unsigned or mismatching notifications are
//! refused before they reach the engine.

use serde_json::Value;
use sha2::{Digest, Sha512};

use crate::error::AppError;

/// Checks `signature_key` on incoming payment notifications.
#[derive(Clone)]
pub struct WebhookVerifier {
    server_key: String,
}

impl std::fmt::Debug for WebhookVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebhookVerifier").finish_non_exhaustive()
    }
}

impl WebhookVerifier {
    /// Verifier for notifications signed with `server_key`.
    #[must_use]
    pub fn new(server_key: impl Into<String>) -> Self {
        Self {
            server_key: server_key.into(),
        }
    }

    /// Signature the gateway would attach for these fields.
    #[must_use]
    pub fn sign(&self, order_id: &str, status_code: &str, gross_amount: &str) -> String {
        let mut hasher = Sha512::new();
        hasher.update(order_id.as_bytes());
        hasher.update(status_code.as_bytes());
        hasher.update(gross_amount.as_bytes());
        hasher.update(self.server_key.as_bytes());
        hex::encode(hasher.finalize())
    }

    /// Accept the payload only if its `signature_key` matches.
    ///
    /// # Errors
    ///
    /// Returns 401 when the signature is missing or does not match.
    pub fn verify(&self, payload: &Value) -> Result<(), AppError> {
        let field = |name: &str| payload.get(name).and_then(Value::as_str).unwrap_or_default();
        let Some(presented) = payload.get("signature_key").and_then(Value::as_str) else {
            return Err(AppError::unauthorized("Missing notification signature"));
        };

        let expected = self.sign(field("order_id"), field("status_code"), field("gross_amount"));
        if constant_time_eq(expected.as_bytes(), presented.to_ascii_lowercase().as_bytes()) {
            Ok(())
        } else {
            tracing::warn!(order_id = field("order_id"), "Notification signature mismatch");
            Err(AppError::unauthorized("Invalid notification signature"))
        }
    }
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    a.len() == b.len() && a.iter().zip(b).fold(0u8, |diff, (x, y)| diff | (x ^ y)) == 0
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use axum::http::StatusCode;
    use serde_json::json;

    fn signed(verifier: &WebhookVerifier, gross_amount: &str) -> Value {
        json!({
            "order_id": "ORD-1",
            "status_code": "200",
            "gross_amount": gross_amount,
            "transaction_status": "settlement",
            "signature_key": verifier.sign("ORD-1", "200", gross_amount),
        })
    }

    #[test]
    fn signature_is_sha512_hex() {
        let signature = WebhookVerifier::new("SB-key").sign("ORD-1", "200", "1000.00");
        assert_eq!(signature.len(), 128);
        assert!(signature.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn accepts_matching_signature() {
        let verifier = WebhookVerifier::new("SB-key");
        assert!(verifier.verify(&signed(&verifier, "1000.00")).is_ok());
    }

    #[test]
    fn refuses_tampered_amount_and_foreign_key() {
        let verifier = WebhookVerifier::new("SB-key");
        let mut tampered = signed(&verifier, "1000.00");
        tampered["gross_amount"] = json!("1.00");
        let err = verifier.verify(&tampered).unwrap_err();
        assert_eq!(err.status(), StatusCode::UNAUTHORIZED);

        let forged = signed(&WebhookVerifier::new("other-key"), "1000.00");
        assert!(verifier.verify(&forged).is_err());
    }

    #[test]
    fn refuses_unsigned_payloads() {
        let verifier = WebhookVerifier::new("SB-key");
        let err = verifier
            .verify(&json!({"order_id": "ORD-1", "transaction_status": "settlement"}))
            .unwrap_err();
        assert_eq!(err.status(), StatusCode::UNAUTHORIZED);
    }
}
