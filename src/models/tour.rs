use std::collections::HashMap;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sqlx::types::Json;
use sqlx::FromRow;
use uuid::Uuid;

use crate::error::ApiError;
use crate::models::Model;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Difficulty {
    Easy,
    Medium,
    Difficult,
}

impl FromStr for Difficulty {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "easy" => Ok(Difficulty::Easy),
            "medium" => Ok(Difficulty::Medium),
            "difficult" => Ok(Difficulty::Difficult),
            _ => Err(()),
        }
    }
}

/// Embedded GeoJSON-style point carried in jsonb columns.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeoPoint {
    #[serde(rename = "type", default = "point_kind")]
    pub kind: String,
    /// `[longitude, latitude]`
    pub coordinates: Vec<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub day: Option<i32>,
}

fn point_kind() -> String {
    "Point".to_string()
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Tour {
    pub id: Uuid,
    pub name: String,
    pub slug: String,
    pub duration: i32,
    pub max_group_size: i32,
    pub difficulty: String,
    pub ratings_average: f64,
    pub ratings_quantity: i32,
    pub price: f64,
    pub price_discount: Option<f64>,
    pub summary: String,
    pub description: Option<String>,
    pub image_cover: Option<String>,
    pub images: Json<Vec<String>>,
    pub start_dates: Json<Vec<DateTime<Utc>>>,
    pub secret_tour: bool,
    pub start_location: Option<Json<GeoPoint>>,
    pub locations: Json<Vec<GeoPoint>>,
    pub guides: Json<Vec<Uuid>>,
    pub created_at: DateTime<Utc>,
}

impl Model for Tour {
    const TABLE: &'static str = "tours";

    const WRITABLE: &'static [&'static str] = &[
        "name",
        "duration",
        "max_group_size",
        "difficulty",
        "price",
        "price_discount",
        "summary",
        "description",
        "image_cover",
        "images",
        "start_dates",
        "secret_tour",
        "start_location",
        "locations",
        "guides",
    ];
}

impl Tour {
    /// Derived at read time, never persisted.
    pub fn duration_weeks(&self) -> f64 {
        f64::from(self.duration) / 7.0
    }

    /// Serialize with derived fields attached.
    pub fn api_json(&self) -> Value {
        let mut value = serde_json::to_value(self).unwrap_or(Value::Null);
        value["duration_weeks"] = Value::from(self.duration_weeks());
        value
    }
}

/// Lowercase hyphen-separated slug from the tour name. Idempotent.
pub fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    let mut last_was_dash = true; // swallow leading separators
    for c in name.chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c.to_ascii_lowercase());
            last_was_dash = false;
        } else if !last_was_dash {
            slug.push('-');
            last_was_dash = true;
        }
    }
    while slug.ends_with('-') {
        slug.pop();
    }
    slug
}

/// Field-level validation for create and partial-update payloads.
/// `existing` carries the stored row on update so cross-field rules
/// (discount < price) see the effective values.
pub fn validate(payload: &Map<String, Value>, existing: Option<&Tour>) -> Result<(), ApiError> {
    let mut field_errors: HashMap<String, String> = HashMap::new();

    if existing.is_none() {
        for required in ["name", "duration", "max_group_size", "difficulty", "price", "summary"] {
            if !payload.contains_key(required) {
                field_errors.insert(required.to_string(), "This field is required".to_string());
            }
        }
    }

    if let Some(name) = payload.get("name").and_then(Value::as_str) {
        let len = name.trim().chars().count();
        if !(10..=40).contains(&len) {
            field_errors.insert(
                "name".to_string(),
                "A tour name must have between 10 and 40 characters".to_string(),
            );
        }
    }

    if let Some(difficulty) = payload.get("difficulty").and_then(Value::as_str) {
        if Difficulty::from_str(difficulty).is_err() {
            field_errors.insert(
                "difficulty".to_string(),
                "Difficulty can only be: easy, medium or difficult".to_string(),
            );
        }
    }

    for positive in ["duration", "max_group_size", "price"] {
        if let Some(value) = payload.get(positive).and_then(Value::as_f64) {
            if value <= 0.0 {
                field_errors.insert(positive.to_string(), "Must be greater than zero".to_string());
            }
        }
    }

    if let Some(dates) = payload.get("start_dates").and_then(Value::as_array) {
        let all_parse = dates.iter().all(|d| {
            d.as_str()
                .map(|s| DateTime::parse_from_rfc3339(s).is_ok())
                .unwrap_or(false)
        });
        if !all_parse {
            field_errors.insert(
                "start_dates".to_string(),
                "Start dates must be RFC 3339 timestamps".to_string(),
            );
        }
    }

    if let Some(location) = payload.get("start_location") {
        if serde_json::from_value::<GeoPoint>(location.clone()).is_err() {
            field_errors.insert(
                "start_location".to_string(),
                "Must be a GeoJSON point".to_string(),
            );
        }
    }
    if let Some(locations) = payload.get("locations") {
        if serde_json::from_value::<Vec<GeoPoint>>(locations.clone()).is_err() {
            field_errors.insert(
                "locations".to_string(),
                "Must be a list of GeoJSON points".to_string(),
            );
        }
    }

    if let Some(guides) = payload.get("guides") {
        if serde_json::from_value::<Vec<Uuid>>(guides.clone()).is_err() {
            field_errors.insert(
                "guides".to_string(),
                "Guides must be a list of user ids".to_string(),
            );
        }
    }

    if let Some(discount) = payload.get("price_discount").and_then(Value::as_f64) {
        let price = payload
            .get("price")
            .and_then(Value::as_f64)
            .or_else(|| existing.map(|t| t.price));
        if matches!(price, Some(p) if discount >= p) {
            field_errors.insert(
                "price_discount".to_string(),
                "Discount price should be less than the regular price".to_string(),
            );
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
    fn slugify_is_lowercase_and_idempotent() {
        assert_eq!(slugify("The Forest Hiker"), "the-forest-hiker");
        assert_eq!(slugify("  Sea --- Explorer! "), "sea-explorer");
        assert_eq!(slugify(&slugify("The Forest Hiker")), "the-forest-hiker");
    }

    #[test]
    fn create_requires_core_fields() {
        let err = validate(&payload(json!({"name": "The Forest Hiker"})), None).unwrap_err();
        match err {
            ApiError::Validation { field_errors, .. } => {
                let errors = field_errors.unwrap();
                assert!(errors.contains_key("price"));
                assert!(errors.contains_key("difficulty"));
            }
            other => panic!("expected validation error, got {:?}", other),
        }
    }

    #[test]
    fn name_length_is_bounded() {
        let body = payload(json!({
            "name": "Too short",
            "duration": 5, "max_group_size": 10,
            "difficulty": "easy", "price": 400, "summary": "s",
        }));
        assert!(validate(&body, None).is_err());

        let body = payload(json!({
            "name": "The Forest Hiker",
            "duration": 5, "max_group_size": 10,
            "difficulty": "easy", "price": 400, "summary": "s",
        }));
        assert!(validate(&body, None).is_ok());
    }

    #[test]
    fn discount_must_undercut_price() {
        let body = payload(json!({
            "name": "The Forest Hiker",
            "duration": 5, "max_group_size": 10,
            "difficulty": "easy", "price": 400, "summary": "s",
            "price_discount": 500,
        }));
        assert!(validate(&body, None).is_err());

        let body = payload(json!({
            "name": "The Forest Hiker",
            "duration": 5, "max_group_size": 10,
            "difficulty": "easy", "price": 400, "summary": "s",
            "price_discount": 300,
        }));
        assert!(validate(&body, None).is_ok());
    }

    #[test]
    fn rejects_unknown_difficulty() {
        let body = payload(json!({
            "name": "The Forest Hiker",
            "duration": 5, "max_group_size": 10,
            "difficulty": "extreme", "price": 400, "summary": "s",
        }));
        assert!(validate(&body, None).is_err());
    }
}
