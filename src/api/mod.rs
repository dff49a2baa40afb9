use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde::Serialize;
use serde_json::{json, Value};

/// Wrapper for API responses that adds the success envelope:
/// `{status: "success", results?, data}`.
#[derive(Debug)]
pub struct ApiResponse<T: Serialize> {
    data: T,
    status_code: StatusCode,
    /// Count of returned items, set on list responses.
    results: Option<usize>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            data,
            status_code: StatusCode::OK,
            results: None,
        }
    }

    pub fn created(data: T) -> Self {
        Self {
            data,
            status_code: StatusCode::CREATED,
            results: None,
        }
    }

    pub fn list(data: T, results: usize) -> Self {
        Self {
            data,
            status_code: StatusCode::OK,
            results: Some(results),
        }
    }
}

/// 204 No Content; the envelope carries `data: null` semantics by omission.
pub fn no_content() -> Response {
    StatusCode::NO_CONTENT.into_response()
}

impl<T: Serialize> IntoResponse for ApiResponse<T> {
    fn into_response(self) -> Response {
        let data_value = match serde_json::to_value(&self.data) {
            Ok(value) => value,
            Err(e) => {
                tracing::error!("failed to serialize response data: {}", e);
                return (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({
                        "status": "error",
                        "message": "Failed to serialize response data"
                    })),
                )
                    .into_response();
            }
        };

        let mut envelope = json!({
            "status": "success",
            "data": data_value,
        });
        if let Some(results) = self.results {
            envelope["results"] = Value::from(results);
        }

        (self.status_code, Json(envelope)).into_response()
    }
}

/// Result alias used by every handler.
pub type ApiResult<T> = Result<ApiResponse<T>, crate::error::ApiError>;
