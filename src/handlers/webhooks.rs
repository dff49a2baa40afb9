use axum::{
    body::Bytes,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Json, Response},
};
use chrono::Utc;
use serde_json::{json, Map, Value};
use uuid::Uuid;

use crate::config;
use crate::database::repository::{scope_eq, scope_ne};
use crate::database::{DatabaseManager, Repository};
use crate::models::{Booking, User};
use crate::services::payments::{self, WebhookEvent};

/// POST /webhooks/payments - consume signed events from the payment
/// provider.
///
/// The response contract is the provider's, not the JSON API's: 400 with an
/// error description when the signature does not verify, 200 `{received}`
/// regardless of internal processing outcome once it does.
pub async fn payments(headers: HeaderMap, body: Bytes) -> Response {
    let payments_config = &config::config().payments;

    let signature = headers
        .get("payment-signature")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");

    if let Err(e) = payments::verify_signature(
        &body,
        signature,
        &payments_config.webhook_secret,
        Utc::now().timestamp(),
        payments_config.webhook_tolerance_secs,
    ) {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({"error": format!("Webhook signature verification failed: {}", e)})),
        )
            .into_response();
    }

    // Acknowledge verified events no matter what happens below; the provider
    // retries on anything but a 2xx and the failure is ours to chase.
    match serde_json::from_slice::<WebhookEvent>(&body) {
        Ok(event) if event.kind == "checkout.session.completed" => {
            if let Err(e) = create_booking_from_session(&event).await {
                tracing::error!("webhook booking creation failed: {}", e);
            }
        }
        Ok(event) => {
            tracing::debug!("ignoring webhook event type {}", event.kind);
        }
        Err(e) => {
            tracing::error!("unparseable webhook payload: {}", e);
        }
    }

    Json(json!({"received": true})).into_response()
}

async fn create_booking_from_session(event: &WebhookEvent) -> anyhow::Result<()> {
    let session = &event.data.object;
    let tour_id: Uuid = session.client_reference_id.parse()?;

    let pool = DatabaseManager::pool().await?;
    let user = Repository::<User>::new(pool.clone())
        .find_where(vec![
            scope_eq("email", session.customer_email.clone()),
            scope_ne("active", false),
        ])
        .await?
        .ok_or_else(|| anyhow::anyhow!("no user for email {}", session.customer_email))?;

    let mut fields = Map::new();
    fields.insert("tour_id".to_string(), Value::String(tour_id.to_string()));
    fields.insert("user_id".to_string(), Value::String(user.id.to_string()));
    fields.insert(
        "price".to_string(),
        Value::from(session.amount_total as f64 / 100.0),
    );
    fields.insert("paid".to_string(), Value::Bool(true));

    let booking = Repository::<Booking>::new(pool).insert(&fields).await?;
    tracing::info!(
        "created booking {} for tour {} from checkout session",
        booking.id,
        tour_id
    );
    Ok(())
}
