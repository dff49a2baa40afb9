use std::collections::HashMap;

use axum::{
    extract::{Path, Query},
    response::Response,
    Extension, Json,
};
use serde_json::{json, Value};
use uuid::Uuid;

use crate::api::{no_content, ApiResponse, ApiResult};
use crate::database::repository::scope_eq;
use crate::database::{DatabaseManager, Repository};
use crate::error::ApiError;
use crate::handlers::auth::as_object;
use crate::middleware::CurrentUser;
use crate::models::{filter_payload, review, Model, Review, User};
use crate::query::QueryFeatures;
use crate::services::ratings::recompute_tour_ratings;

async fn repo() -> Result<Repository<Review>, ApiError> {
    Ok(Repository::new(DatabaseManager::pool().await?))
}

/// GET /api/v1/reviews
pub async fn list(Query(params): Query<HashMap<String, String>>) -> ApiResult<Vec<Value>> {
    list_with(params, None).await
}

/// GET /api/v1/tours/:id/reviews - the same listing scoped to one tour.
pub async fn list_for_tour(
    Path(tour_id): Path<Uuid>,
    Query(params): Query<HashMap<String, String>>,
) -> ApiResult<Vec<Value>> {
    list_with(params, Some(tour_id)).await
}

async fn list_with(
    params: HashMap<String, String>,
    tour_id: Option<Uuid>,
) -> ApiResult<Vec<Value>> {
    let mut query = QueryFeatures::new(params).into_list_query();
    if let Some(tour_id) = tour_id {
        query = query.scoped(scope_eq("tour_id", tour_id.to_string()));
    }

    let reviews = repo().await?.select_json(&query).await?;
    let reviews: Vec<Value> = reviews.into_iter().map(Value::Object).collect();
    let results = reviews.len();
    Ok(ApiResponse::list(reviews, results))
}

/// GET /api/v1/reviews/:id - inlines the author's public profile.
pub async fn get(Path(id): Path<Uuid>) -> ApiResult<Value> {
    let pool = DatabaseManager::pool().await?;
    let review = Repository::<Review>::new(pool.clone()).find(id).await?;

    let author = Repository::<User>::new(pool)
        .find(review.user_id)
        .await
        .ok()
        .map(|u| u.public_profile());

    let mut data = serde_json::to_value(&review).unwrap_or(Value::Null);
    data["user"] = author.unwrap_or(Value::Null);

    Ok(ApiResponse::success(json!({"review": data})))
}

/// POST /api/v1/reviews and POST /api/v1/tours/:tour_id/reviews
/// (protected, `user` role). The tour comes from the path on the nested
/// route; the author is stamped from the principal when absent.
pub async fn create(
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Json(body): Json<Value>,
) -> ApiResult<Value> {
    create_inner(None, user, body).await
}

pub async fn create_for_tour(
    Path(tour_id): Path<Uuid>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Json(body): Json<Value>,
) -> ApiResult<Value> {
    create_inner(Some(tour_id), user, body).await
}

async fn create_inner(tour_id: Option<Uuid>, user: User, body: Value) -> ApiResult<Value> {
    let body = as_object(&body)?;
    review::validate(body, true)?;

    let mut fields = filter_payload(body, Review::WRITABLE);
    if let Some(tour_id) = tour_id {
        fields
            .entry("tour_id".to_string())
            .or_insert_with(|| Value::String(tour_id.to_string()));
    }
    fields
        .entry("user_id".to_string())
        .or_insert_with(|| Value::String(user.id.to_string()));

    if !fields.contains_key("tour_id") {
        return Err(ApiError::validation("Review must belong to a tour", None));
    }

    let created = repo().await?.insert(&fields).await?;

    // Synchronous recompute: the unique (tour, user) index has already
    // accepted this row, so the stats include it before we respond.
    let pool = DatabaseManager::pool().await?;
    recompute_tour_ratings(&pool, created.tour_id).await?;

    Ok(ApiResponse::created(json!({"review": created})))
}

/// PATCH /api/v1/reviews/:id (user, admin)
pub async fn update(Path(id): Path<Uuid>, Json(body): Json<Value>) -> ApiResult<Value> {
    let body = as_object(&body)?;
    review::validate(body, false)?;

    // Re-pointing a review at another tour or author is not a thing.
    let fields = filter_payload(body, &["review", "rating"]);

    let updated = repo().await?.update(id, &fields).await?;

    let pool = DatabaseManager::pool().await?;
    recompute_tour_ratings(&pool, updated.tour_id).await?;

    Ok(ApiResponse::success(json!({"review": updated})))
}

/// DELETE /api/v1/reviews/:id (user, admin)
pub async fn delete(Path(id): Path<Uuid>) -> Result<Response, ApiError> {
    let repo = repo().await?;
    let review = repo.find(id).await?;
    repo.delete(id).await?;

    let pool = DatabaseManager::pool().await?;
    recompute_tour_ratings(&pool, review.tour_id).await?;

    Ok(no_content())
}
