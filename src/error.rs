// HTTP API error types
use axum::{http::StatusCode, response::IntoResponse, Json};
use serde_json::{json, Value};
use std::collections::HashMap;

use crate::config::Environment;

/// API error with appropriate status codes and client-facing messages.
///
/// Every variant except `Internal` is operational: the failure is anticipated
/// and its message is safe to expose. `Internal` messages are suppressed in
/// production and logged server-side instead.
#[derive(Debug)]
pub enum ApiError {
    // 400 Bad Request
    BadRequest(String),
    Validation {
        message: String,
        field_errors: Option<HashMap<String, String>>,
    },
    /// Duplicate unique field. Surfaced with status 400, matching the
    /// storage-boundary translation of duplicate-key errors.
    Conflict(String),

    // 401 Unauthorized
    Unauthorized(String),

    // 403 Forbidden
    Forbidden(String),

    // 404 Not Found
    NotFound(String),

    // 429 Too Many Requests
    TooManyRequests(String),

    // 500 Internal Server Error
    Internal(String),
}

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Validation { .. } => StatusCode::BAD_REQUEST,
            ApiError::Conflict(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::TooManyRequests(_) => StatusCode::TOO_MANY_REQUESTS,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Anticipated failures whose message is safe to describe to the caller.
    pub fn is_operational(&self) -> bool {
        !matches!(self, ApiError::Internal(_))
    }

    pub fn message(&self) -> &str {
        match self {
            ApiError::BadRequest(msg) => msg,
            ApiError::Validation { message, .. } => message,
            ApiError::Conflict(msg) => msg,
            ApiError::Unauthorized(msg) => msg,
            ApiError::Forbidden(msg) => msg,
            ApiError::NotFound(msg) => msg,
            ApiError::TooManyRequests(msg) => msg,
            ApiError::Internal(msg) => msg,
        }
    }

    /// Envelope status word: "fail" for 4xx, "error" for 5xx.
    pub fn status_word(&self) -> &'static str {
        if self.status_code().is_client_error() {
            "fail"
        } else {
            "error"
        }
    }

    fn to_json(&self, environment: Environment) -> Value {
        let expose = self.is_operational() || environment != Environment::Production;

        let mut body = json!({
            "status": self.status_word(),
            "message": if expose { self.message() } else { "Something went wrong" },
        });

        if let ApiError::Validation {
            field_errors: Some(field_errors),
            ..
        } = self
        {
            body["field_errors"] = json!(field_errors);
        }

        // Development responses carry the full variant for debugging.
        if environment == Environment::Development {
            body["error"] = Value::String(format!("{:?}", self));
        }

        body
    }
}

// Static constructors, mirroring call sites like `ApiError::not_found(...)`
impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        ApiError::BadRequest(message.into())
    }

    pub fn validation(
        message: impl Into<String>,
        field_errors: Option<HashMap<String, String>>,
    ) -> Self {
        ApiError::Validation {
            message: message.into(),
            field_errors,
        }
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        ApiError::Conflict(message.into())
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        ApiError::Unauthorized(message.into())
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        ApiError::Forbidden(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        ApiError::NotFound(message.into())
    }

    pub fn too_many_requests(message: impl Into<String>) -> Self {
        ApiError::TooManyRequests(message.into())
    }

    pub fn internal(message: impl Into<String>) -> Self {
        ApiError::Internal(message.into())
    }
}

impl From<crate::database::manager::DatabaseError> for ApiError {
    fn from(err: crate::database::manager::DatabaseError) -> Self {
        use crate::database::manager::DatabaseError;

        match err {
            DatabaseError::NotFound(msg) => ApiError::not_found(msg),
            // Render-time rejections come from client-supplied query shapes.
            DatabaseError::QueryError(msg) => ApiError::bad_request(msg),
            DatabaseError::Sqlx(sqlx_err) => translate_sqlx_error(sqlx_err),
            other => {
                tracing::error!("database error: {}", other);
                ApiError::internal("Database error occurred")
            }
        }
    }
}

impl From<sqlx::Error> for ApiError {
    fn from(err: sqlx::Error) -> Self {
        translate_sqlx_error(err)
    }
}

/// Translate storage-layer failures into the operational taxonomy.
/// Unique violations become Conflict, constraint violations become
/// Validation; everything else is unexpected and collapses to Internal.
fn translate_sqlx_error(err: sqlx::Error) -> ApiError {
    if let sqlx::Error::RowNotFound = err {
        return ApiError::not_found("No record found with that id");
    }

    if let Some(db_err) = err.as_database_error() {
        match db_err.code().as_deref() {
            // unique_violation
            Some("23505") => {
                return ApiError::conflict("Duplicate field value, please use another value")
            }
            // foreign_key_violation
            Some("23503") => {
                return ApiError::bad_request("Referenced record does not exist")
            }
            // check_violation, not_null_violation
            Some("23514") | Some("23502") => {
                return ApiError::validation("Invalid input data", None)
            }
            _ => {}
        }
    }

    tracing::error!("sqlx error: {}", err);
    ApiError::internal("Database error occurred")
}

impl From<crate::query::error::QueryError> for ApiError {
    fn from(err: crate::query::error::QueryError) -> Self {
        ApiError::bad_request(err.to_string())
    }
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message())
    }
}

impl std::error::Error for ApiError {}

// Automatic HTTP response conversion for axum
impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        if !self.is_operational() {
            tracing::error!("unexpected error: {}", self.message());
        }
        let environment = crate::config::config().environment;
        (self.status_code(), Json(self.to_json(environment))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_word_follows_status_class() {
        assert_eq!(ApiError::not_found("x").status_word(), "fail");
        assert_eq!(ApiError::unauthorized("x").status_word(), "fail");
        assert_eq!(ApiError::internal("x").status_word(), "error");
    }

    #[test]
    fn production_suppresses_internal_messages() {
        let err = ApiError::internal("connection pool exhausted");
        let body = err.to_json(Environment::Production);
        assert_eq!(body["message"], "Something went wrong");

        let err = ApiError::not_found("No tour found with that id");
        let body = err.to_json(Environment::Production);
        assert_eq!(body["message"], "No tour found with that id");
    }

    #[test]
    fn development_exposes_detail() {
        let err = ApiError::internal("connection pool exhausted");
        let body = err.to_json(Environment::Development);
        assert_eq!(body["message"], "connection pool exhausted");
        assert!(body.get("error").is_some());
    }
}
