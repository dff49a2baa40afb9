use trailhead_api::services::payments::{
    sign_payload, verify_signature, PaymentError, WebhookEvent,
};

const SECRET: &str = "whsec_integration";

fn completed_event() -> Vec<u8> {
    serde_json::json!({
        "type": "checkout.session.completed",
        "data": {"object": {
            "client_reference_id": "3f0c9a64-8d2b-4f54-9a4e-1d2f5f2e7a10",
            "customer_email": "hiker@example.com",
            "amount_total": 129700,
        }},
    })
    .to_string()
    .into_bytes()
}

#[test]
fn signed_events_verify_and_parse() {
    let payload = completed_event();
    let now = 1_722_000_000;
    let header = sign_payload(&payload, SECRET, now);

    verify_signature(&payload, &header, SECRET, now + 5, 300).expect("valid signature");

    let event: WebhookEvent = serde_json::from_slice(&payload).expect("parse");
    assert_eq!(event.kind, "checkout.session.completed");
    assert_eq!(event.data.object.customer_email, "hiker@example.com");
    assert_eq!(event.data.object.amount_total, 129_700);
}

#[test]
fn invalid_signatures_are_rejected_before_any_processing() {
    let payload = completed_event();
    let now = 1_722_000_000;

    // Signed with someone else's secret.
    let header = sign_payload(&payload, "whsec_attacker", now);
    assert!(matches!(
        verify_signature(&payload, &header, SECRET, now, 300),
        Err(PaymentError::BadSignature)
    ));

    // Body swapped after signing.
    let header = sign_payload(&payload, SECRET, now);
    assert!(matches!(
        verify_signature(b"{\"type\":\"other\"}", &header, SECRET, now, 300),
        Err(PaymentError::BadSignature)
    ));

    // Replay of an old event.
    assert!(matches!(
        verify_signature(&payload, &header, SECRET, now + 3600, 300),
        Err(PaymentError::StaleTimestamp)
    ));

    // Garbage header.
    assert!(matches!(
        verify_signature(&payload, "sig=deadbeef", SECRET, now, 300),
        Err(PaymentError::MalformedSignature)
    ));
}

#[test]
fn unrelated_event_types_still_parse() {
    let payload = serde_json::json!({
        "type": "payment_intent.created",
        "data": {"object": {
            "client_reference_id": "n/a",
            "customer_email": "hiker@example.com",
            "amount_total": 0,
        }},
    });

    let event: WebhookEvent = serde_json::from_value(payload).expect("parse");
    assert_ne!(event.kind, "checkout.session.completed");
}
