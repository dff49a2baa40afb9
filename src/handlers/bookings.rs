use std::collections::HashMap;

use axum::{
    extract::{Path, Query},
    http::HeaderMap,
    response::Response,
    Extension, Json,
};
use serde_json::{json, Value};
use uuid::Uuid;

use crate::api::{no_content, ApiResponse, ApiResult};
use crate::database::{DatabaseManager, Repository};
use crate::error::ApiError;
use crate::handlers::auth::as_object;
use crate::handlers::request_origin;
use crate::middleware::CurrentUser;
use crate::models::{booking, filter_payload, Booking, Model, Tour};
use crate::query::QueryFeatures;
use crate::services::payments;

async fn repo() -> Result<Repository<Booking>, ApiError> {
    Ok(Repository::new(DatabaseManager::pool().await?))
}

/// GET /api/v1/bookings/checkout-session/:tour_id - create a hosted checkout
/// session with the payment provider for the signed-in user.
pub async fn checkout_session(
    Path(tour_id): Path<Uuid>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    headers: HeaderMap,
) -> ApiResult<Value> {
    let pool = DatabaseManager::pool().await?;
    let tour = Repository::<Tour>::new(pool).find(tour_id).await?;

    let session = payments::create_checkout_session(&tour, &user, &request_origin(&headers))
        .await
        .map_err(|e| {
            tracing::error!("checkout session for tour {} failed: {}", tour_id, e);
            ApiError::internal("Could not create a checkout session")
        })?;

    Ok(ApiResponse::success(json!({"session": session})))
}

/// GET /api/v1/bookings (lead-guide, admin)
pub async fn list(Query(params): Query<HashMap<String, String>>) -> ApiResult<Vec<Value>> {
    let query = QueryFeatures::new(params).into_list_query();
    let bookings = repo().await?.select_json(&query).await?;
    let bookings: Vec<Value> = bookings.into_iter().map(Value::Object).collect();
    let results = bookings.len();
    Ok(ApiResponse::list(bookings, results))
}

/// GET /api/v1/bookings/:id (lead-guide, admin)
pub async fn get(Path(id): Path<Uuid>) -> ApiResult<Value> {
    let booking = repo().await?.find(id).await?;
    Ok(ApiResponse::success(json!({"booking": booking})))
}

/// POST /api/v1/bookings (lead-guide, admin) - manual bookings, e.g. paid
/// outside the provider.
pub async fn create(Json(body): Json<Value>) -> ApiResult<Value> {
    let body = as_object(&body)?;
    booking::validate(body, true)?;

    let fields = filter_payload(body, Booking::WRITABLE);
    let created = repo().await?.insert(&fields).await?;
    Ok(ApiResponse::created(json!({"booking": created})))
}

/// PATCH /api/v1/bookings/:id (lead-guide, admin)
pub async fn update(Path(id): Path<Uuid>, Json(body): Json<Value>) -> ApiResult<Value> {
    let body = as_object(&body)?;
    booking::validate(body, false)?;

    let fields = filter_payload(body, &["price", "paid"]);
    let updated = repo().await?.update(id, &fields).await?;
    Ok(ApiResponse::success(json!({"booking": updated})))
}

/// DELETE /api/v1/bookings/:id (lead-guide, admin)
pub async fn delete(Path(id): Path<Uuid>) -> Result<Response, ApiError> {
    repo().await?.delete(id).await?;
    Ok(no_content())
}
