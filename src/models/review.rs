use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Map, Value};
use sqlx::FromRow;
use uuid::Uuid;

use crate::error::ApiError;
use crate::models::Model;

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Review {
    pub id: Uuid,
    pub review: String,
    pub rating: i32,
    pub tour_id: Uuid,
    pub user_id: Uuid,
    pub created_at: DateTime<Utc>,
}

impl Model for Review {
    const TABLE: &'static str = "reviews";

    const WRITABLE: &'static [&'static str] = &["review", "rating", "tour_id", "user_id"];
}

pub fn validate(payload: &Map<String, Value>, is_create: bool) -> Result<(), ApiError> {
    let mut field_errors: HashMap<String, String> = HashMap::new();

    if is_create {
        match payload.get("review").and_then(Value::as_str) {
            Some(text) if !text.trim().is_empty() => {}
            _ => {
                field_errors.insert("review".to_string(), "Review cannot be empty".to_string());
            }
        }
        if !payload.contains_key("rating") {
            field_errors.insert("rating".to_string(), "This field is required".to_string());
        }
    }

    if let Some(rating) = payload.get("rating") {
        match rating.as_i64() {
            Some(r) if (1..=5).contains(&r) => {}
            _ => {
                field_errors.insert(
                    "rating".to_string(),
                    "Rating must be between 1 and 5".to_string(),
                );
            }
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

    fn payload(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn rating_bounds() {
        assert!(validate(&payload(json!({"review": "Great", "rating": 5})), true).is_ok());
        assert!(validate(&payload(json!({"review": "Meh", "rating": 0})), true).is_err());
        assert!(validate(&payload(json!({"review": "Meh", "rating": 6})), true).is_err());
        assert!(validate(&payload(json!({"review": "Meh", "rating": 4.5})), true).is_err());
    }

    #[test]
    fn review_text_required_on_create_only() {
        assert!(validate(&payload(json!({"rating": 4})), true).is_err());
        assert!(validate(&payload(json!({"rating": 4})), false).is_ok());
    }
}
