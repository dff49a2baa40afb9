use std::collections::HashMap;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Map, Value};
use sqlx::FromRow;
use uuid::Uuid;

use crate::error::ApiError;
use crate::models::Model;

/// Role ladder for route guarding. Stored as text; parsed where the guard
/// predicate needs it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    User,
    Guide,
    LeadGuide,
    Admin,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Guide => "guide",
            Role::LeadGuide => "lead-guide",
            Role::Admin => "admin",
        }
    }
}

impl FromStr for Role {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(Role::User),
            "guide" => Ok(Role::Guide),
            "lead-guide" => Ok(Role::LeadGuide),
            "admin" => Ok(Role::Admin),
            _ => Err(()),
        }
    }
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct User {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub photo: Option<String>,
    pub role: String,
    pub active: bool,
    pub created_at: DateTime<Utc>,

    // Credential bookkeeping never leaves the process.
    #[serde(skip_serializing)]
    pub password: String,
    #[serde(skip_serializing)]
    pub password_changed_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing)]
    pub password_reset_token: Option<String>,
    #[serde(skip_serializing)]
    pub password_reset_expires: Option<DateTime<Utc>>,
}

impl Model for User {
    const TABLE: &'static str = "users";

    // Role and active are managed through dedicated admin/auth paths.
    const WRITABLE: &'static [&'static str] = &["name", "email", "photo", "role", "active"];
}

impl User {
    pub fn role(&self) -> Option<Role> {
        Role::from_str(&self.role).ok()
    }

    /// True when the stored password changed after a token issued at
    /// `token_iat` (seconds since epoch) - such tokens are no longer valid.
    pub fn changed_password_after(&self, token_iat: i64) -> bool {
        match self.password_changed_at {
            Some(changed_at) => token_iat < changed_at.timestamp(),
            None => false,
        }
    }

    /// Minimal public profile inlined into reviews and guide listings.
    pub fn public_profile(&self) -> Value {
        serde_json::json!({
            "id": self.id,
            "name": self.name,
            "photo": self.photo,
        })
    }
}

/// The shape the signup route accepts. `password_confirm` is write-only; it
/// never reaches the storage layer.
pub fn validate_signup(payload: &Map<String, Value>) -> Result<(), ApiError> {
    let mut field_errors: HashMap<String, String> = HashMap::new();

    for required in ["name", "email", "password", "password_confirm"] {
        match payload.get(required).and_then(Value::as_str) {
            Some(v) if !v.trim().is_empty() => {}
            _ => {
                field_errors.insert(required.to_string(), "This field is required".to_string());
            }
        }
    }

    if let Some(email) = payload.get("email").and_then(Value::as_str) {
        if !valid_email(email) {
            field_errors.insert("email".to_string(), "Please enter a valid email".to_string());
        }
    }

    let password = payload.get("password").and_then(Value::as_str);
    if let Some(password) = password {
        if password.chars().count() < 8 {
            field_errors.insert(
                "password".to_string(),
                "Password must be at least 8 characters".to_string(),
            );
        }
    }

    if let (Some(password), Some(confirm)) = (
        password,
        payload.get("password_confirm").and_then(Value::as_str),
    ) {
        if password != confirm {
            field_errors.insert(
                "password_confirm".to_string(),
                "The passwords do not match".to_string(),
            );
        }
    }

    if field_errors.is_empty() {
        Ok(())
    } else {
        Err(ApiError::validation("Invalid input data", Some(field_errors)))
    }
}

/// Basic shape check; the unique index is the real gatekeeper.
pub fn valid_email(email: &str) -> bool {
    let mut parts = email.split('@');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(local), Some(domain), None) => {
            !local.is_empty() && domain.contains('.') && !domain.starts_with('.') && !domain.ends_with('.')
        }
        _ => false,
    }
}
