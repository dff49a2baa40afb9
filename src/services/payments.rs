use hmac::{Hmac, Mac};
use serde::Deserialize;
use serde_json::{json, Value};
use sha2::Sha256;
use thiserror::Error;

use crate::config;
use crate::models::{Tour, User};

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Error)]
pub enum PaymentError {
    #[error("Payment provider not configured")]
    NotConfigured,

    #[error("Payment provider request failed: {0}")]
    Provider(String),

    #[error("Malformed signature header")]
    MalformedSignature,

    #[error("Signature verification failed")]
    BadSignature,

    #[error("Webhook timestamp outside tolerance")]
    StaleTimestamp,
}

/// Create a hosted checkout session for a tour and the signed-in user.
/// Returns the provider's session object verbatim for the client to redirect
/// with.
pub async fn create_checkout_session(
    tour: &Tour,
    user: &User,
    origin: &str,
) -> Result<Value, PaymentError> {
    let payments = &config::config().payments;
    if payments.secret_key.is_empty() {
        return Err(PaymentError::NotConfigured);
    }

    let body = json!({
        "mode": "payment",
        "client_reference_id": tour.id,
        "customer_email": user.email,
        "success_url": format!("{}/my-bookings", origin),
        "cancel_url": format!("{}/tour/{}", origin, tour.slug),
        "line_items": [{
            "name": format!("{} Tour", tour.name),
            "description": tour.summary,
            "amount": (tour.price * 100.0).round() as i64, // cents
            "currency": "usd",
            "quantity": 1,
        }],
    });

    let response = reqwest::Client::new()
        .post(format!("{}/checkout/sessions", payments.api_url))
        .bearer_auth(&payments.secret_key)
        .json(&body)
        .send()
        .await
        .map_err(|e| PaymentError::Provider(e.to_string()))?;

    if !response.status().is_success() {
        return Err(PaymentError::Provider(format!(
            "provider returned {}",
            response.status()
        )));
    }

    response
        .json::<Value>()
        .await
        .map_err(|e| PaymentError::Provider(e.to_string()))
}

/// Signed event payload the provider posts to the webhook endpoint.
#[derive(Debug, Deserialize)]
pub struct WebhookEvent {
    #[serde(rename = "type")]
    pub kind: String,
    pub data: WebhookData,
}

#[derive(Debug, Deserialize)]
pub struct WebhookData {
    pub object: CheckoutSession,
}

#[derive(Debug, Deserialize)]
pub struct CheckoutSession {
    /// Tour id stashed when the session was created.
    pub client_reference_id: String,
    pub customer_email: String,
    /// Total in cents.
    pub amount_total: i64,
}

/// Verify the provider signature header `t=<unix>,v1=<hex hmac>` against the
/// raw payload. The digest is HMAC-SHA256 over `"{t}.{payload}"`; comparison
/// is constant-time, and stale timestamps are rejected to stop replays.
pub fn verify_signature(
    payload: &[u8],
    header: &str,
    secret: &str,
    now: i64,
    tolerance_secs: i64,
) -> Result<(), PaymentError> {
    let mut timestamp: Option<i64> = None;
    let mut signature: Option<Vec<u8>> = None;

    for part in header.split(',') {
        match part.trim().split_once('=') {
            Some(("t", value)) => timestamp = value.parse().ok(),
            Some(("v1", value)) => signature = hex::decode(value).ok(),
            _ => {}
        }
    }

    let timestamp = timestamp.ok_or(PaymentError::MalformedSignature)?;
    let signature = signature.ok_or(PaymentError::MalformedSignature)?;

    if (now - timestamp).abs() > tolerance_secs {
        return Err(PaymentError::StaleTimestamp);
    }

    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|_| PaymentError::MalformedSignature)?;
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(payload);

    mac.verify_slice(&signature)
        .map_err(|_| PaymentError::BadSignature)
}

/// Produce the signature header for a payload; the counterpart of
/// `verify_signature`, used when replaying events locally.
pub fn sign_payload(payload: &[u8], secret: &str, timestamp: i64) -> String {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("hmac accepts any key length");
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(payload);
    format!("t={},v1={}", timestamp, hex::encode(mac.finalize().into_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "whsec_test";
    const PAYLOAD: &[u8] = br#"{"type":"checkout.session.completed"}"#;

    #[test]
    fn valid_signature_verifies() {
        let header = sign_payload(PAYLOAD, SECRET, 1_700_000_000);
        assert!(verify_signature(PAYLOAD, &header, SECRET, 1_700_000_010, 300).is_ok());
    }

    #[test]
    fn wrong_secret_is_rejected() {
        let header = sign_payload(PAYLOAD, "whsec_other", 1_700_000_000);
        assert!(matches!(
            verify_signature(PAYLOAD, &header, SECRET, 1_700_000_010, 300),
            Err(PaymentError::BadSignature)
        ));
    }

    #[test]
    fn tampered_payload_is_rejected() {
        let header = sign_payload(PAYLOAD, SECRET, 1_700_000_000);
        assert!(matches!(
            verify_signature(b"{}", &header, SECRET, 1_700_000_010, 300),
            Err(PaymentError::BadSignature)
        ));
    }

    #[test]
    fn stale_timestamp_is_rejected() {
        let header = sign_payload(PAYLOAD, SECRET, 1_700_000_000);
        assert!(matches!(
            verify_signature(PAYLOAD, &header, SECRET, 1_700_001_000, 300),
            Err(PaymentError::StaleTimestamp)
        ));
    }

    #[test]
    fn malformed_headers_are_rejected() {
        for header in ["", "t=abc,v1=00", "v1=00", "t=1700000000", "t=1,v1=zz"] {
            assert!(matches!(
                verify_signature(PAYLOAD, header, SECRET, 1_700_000_000, 300),
                Err(PaymentError::MalformedSignature)
            ));
        }
    }

    #[test]
    fn event_payload_deserializes() {
        let event: WebhookEvent = serde_json::from_value(serde_json::json!({
            "type": "checkout.session.completed",
            "data": {"object": {
                "client_reference_id": "7b7a0f6e-2c4f-4b9e-9d6e-54c7a1b00c11",
                "customer_email": "jo@example.com",
                "amount_total": 49700,
            }},
        }))
        .unwrap();
        assert_eq!(event.kind, "checkout.session.completed");
        assert_eq!(event.data.object.amount_total, 49700);
    }
}
