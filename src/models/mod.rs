use serde::Serialize;
use serde_json::{Map, Value};
use sqlx::{postgres::PgRow, FromRow};

pub mod booking;
pub mod review;
pub mod tour;
pub mod user;

pub use booking::Booking;
pub use review::Review;
pub use tour::Tour;
pub use user::User;

/// A persisted resource type the generic repository can operate on.
pub trait Model: for<'r> FromRow<'r, PgRow> + Serialize + Send + Unpin {
    const TABLE: &'static str;

    /// Columns a client payload may set. Everything else (ids, rating
    /// aggregates, password bookkeeping) is owned by the application.
    const WRITABLE: &'static [&'static str];
}

/// Keep only the allowed fields of a request body. Null entries are dropped
/// as well: absent and null mean the same thing to the storage layer, and
/// binding typed nulls is the one thing the dynamic writer cannot do.
pub fn filter_payload(body: &Map<String, Value>, allowed: &[&str]) -> Map<String, Value> {
    body.iter()
        .filter(|(key, value)| allowed.contains(&key.as_str()) && !value.is_null())
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn filter_payload_keeps_allowed_fields_only() {
        let body = json!({
            "name": "Jo",
            "email": "jo@example.com",
            "role": "admin",
            "photo": null,
        });
        let filtered = filter_payload(body.as_object().unwrap(), &["name", "email", "photo"]);

        assert_eq!(filtered.len(), 2);
        assert!(filtered.contains_key("name"));
        assert!(filtered.contains_key("email"));
        assert!(!filtered.contains_key("role"));
        // nulls dropped
        assert!(!filtered.contains_key("photo"));
    }
}
