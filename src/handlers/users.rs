use std::collections::HashMap;

use axum::{
    extract::{Path, Query},
    response::{Json, Response},
    Extension,
};
use serde_json::{json, Value};
use uuid::Uuid;

use crate::api::{no_content, ApiResponse, ApiResult};
use crate::database::repository::{scope_eq, scope_ne};
use crate::database::{DatabaseManager, Repository};
use crate::error::ApiError;
use crate::handlers::auth::as_object;
use crate::middleware::CurrentUser;
use crate::models::user::{valid_email, Role};
use crate::models::{filter_payload, Model, User};
use crate::query::QueryFeatures;

async fn repo() -> Result<Repository<User>, ApiError> {
    Ok(Repository::new(DatabaseManager::pool().await?))
}

/// Soft-deleted users stay out of every default read path.
async fn find_visible(id: Uuid) -> Result<User, ApiError> {
    repo()
        .await?
        .find_where(vec![scope_eq("id", id.to_string()), scope_ne("active", false)])
        .await?
        .ok_or_else(|| ApiError::not_found("No user found with that id"))
}

/// Columns that never leave the process, whatever the projection says.
const PROTECTED_FIELDS: [&str; 3] = [
    "password",
    "password_reset_token",
    "password_reset_expires",
];

/// GET /api/v1/users (admin)
pub async fn list(Query(params): Query<HashMap<String, String>>) -> ApiResult<Vec<Value>> {
    let mut query = QueryFeatures::new(params)
        .into_list_query()
        .scoped(scope_ne("active", false));
    query
        .select
        .retain(|field| !PROTECTED_FIELDS.contains(&field.as_str()));

    let mut users = repo().await?.select_json(&query).await?;
    for user in users.iter_mut() {
        for field in PROTECTED_FIELDS {
            user.remove(field);
        }
    }

    let users: Vec<Value> = users.into_iter().map(Value::Object).collect();
    let results = users.len();
    Ok(ApiResponse::list(users, results))
}

/// GET /api/v1/users/:id (admin)
pub async fn get(Path(id): Path<Uuid>) -> ApiResult<Value> {
    let user = find_visible(id).await?;
    Ok(ApiResponse::success(json!({"user": user})))
}

/// GET /api/v1/users/me - the factory get-one pointed at the principal.
pub async fn get_me(Extension(CurrentUser(user)): Extension<CurrentUser>) -> ApiResult<Value> {
    let user = find_visible(user.id).await?;
    Ok(ApiResponse::success(json!({"user": user})))
}

/// GET /api/v1/users/session - soft-verified personalization: reports the
/// signed-in user, or null for anonymous callers.
pub async fn session(current: Option<Extension<CurrentUser>>) -> Json<Value> {
    let user = current.map(|Extension(CurrentUser(user))| user);
    Json(json!({"status": "success", "data": {"user": user}}))
}

/// PATCH /api/v1/users/update-me - profile fields only.
pub async fn update_me(
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Json(body): Json<Value>,
) -> ApiResult<Value> {
    let body = as_object(&body)?;

    if body.contains_key("password") || body.contains_key("password_confirm") {
        return Err(ApiError::bad_request(
            "This route is not for password updates, please use /update-my-password",
        ));
    }

    let fields = filter_payload(body, &["name", "email", "photo"]);
    if let Some(email) = fields.get("email").and_then(Value::as_str) {
        if !valid_email(email) {
            return Err(ApiError::validation("Please enter a valid email", None));
        }
    }

    let updated = repo().await?.update(user.id, &fields).await?;
    Ok(ApiResponse::success(json!({"user": updated})))
}

/// DELETE /api/v1/users/delete-me - soft delete: the record stays, default
/// queries stop seeing it.
pub async fn delete_me(
    Extension(CurrentUser(user)): Extension<CurrentUser>,
) -> Result<Response, ApiError> {
    let mut fields = serde_json::Map::new();
    fields.insert("active".to_string(), Value::Bool(false));
    repo().await?.update(user.id, &fields).await?;
    Ok(no_content())
}

/// PATCH /api/v1/users/:id (admin)
pub async fn update(Path(id): Path<Uuid>, Json(body): Json<Value>) -> ApiResult<Value> {
    let body = as_object(&body)?;
    let fields = filter_payload(body, User::WRITABLE);

    if let Some(role) = fields.get("role").and_then(Value::as_str) {
        if role.parse::<Role>().is_err() {
            return Err(ApiError::validation(
                "Role can only be: user, guide, lead-guide or admin",
                None,
            ));
        }
    }
    if let Some(email) = fields.get("email").and_then(Value::as_str) {
        if !valid_email(email) {
            return Err(ApiError::validation("Please enter a valid email", None));
        }
    }

    let updated = repo().await?.update(id, &fields).await?;
    Ok(ApiResponse::success(json!({"user": updated})))
}

/// DELETE /api/v1/users/:id (admin) - hard delete, unlike delete-me.
pub async fn delete(Path(id): Path<Uuid>) -> Result<Response, ApiError> {
    repo().await?.delete(id).await?;
    Ok(no_content())
}
