use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Map, Value};
use sqlx::FromRow;
use uuid::Uuid;

use crate::error::ApiError;
use crate::models::Model;

/// A paid (or deliberately unpaid) reservation, created either through the
/// management API or by the payment provider's webhook.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Booking {
    pub id: Uuid,
    pub price: f64,
    pub paid: bool,
    pub tour_id: Uuid,
    pub user_id: Uuid,
    pub created_at: DateTime<Utc>,
}

impl Model for Booking {
    const TABLE: &'static str = "bookings";

    const WRITABLE: &'static [&'static str] = &["price", "paid", "tour_id", "user_id"];
}

pub fn validate(payload: &Map<String, Value>, is_create: bool) -> Result<(), ApiError> {
    let mut field_errors: HashMap<String, String> = HashMap::new();

    if is_create {
        for required in ["price", "tour_id", "user_id"] {
            if !payload.contains_key(required) {
                field_errors.insert(required.to_string(), "This field is required".to_string());
            }
        }
    }

    if let Some(price) = payload.get("price").and_then(Value::as_f64) {
        if price <= 0.0 {
            field_errors.insert("price".to_string(), "Must be greater than zero".to_string());
        }
    }

    if field_errors.is_empty() {
        Ok(())
    } else {
        Err(ApiError::validation("Invalid input data", Some(field_errors)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn create_requires_references_and_price() {
        let body = json!({"price": 400});
        let err = validate(body.as_object().unwrap(), true).unwrap_err();
        match err {
            ApiError::Validation { field_errors, .. } => {
                let errors = field_errors.unwrap();
                assert!(errors.contains_key("tour_id"));
                assert!(errors.contains_key("user_id"));
            }
            other => panic!("expected validation error, got {:?}", other),
        }
    }
}
