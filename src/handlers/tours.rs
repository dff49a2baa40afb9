use std::collections::HashMap;

use axum::{
    extract::{Path, Query},
    response::Response,
    Json,
};
use serde_json::{json, Map, Value};
use sqlx::Row;
use uuid::Uuid;

use crate::api::{no_content, ApiResponse, ApiResult};
use crate::database::repository::{scope_eq, scope_ne};
use crate::database::{DatabaseManager, Repository};
use crate::error::ApiError;
use crate::handlers::auth::as_object;
use crate::models::tour::slugify;
use crate::models::{filter_payload, tour, Model, Review, Tour, User};
use crate::query::QueryFeatures;
use crate::services::geo::{self, Unit};

async fn repo() -> Result<Repository<Tour>, ApiError> {
    Ok(Repository::new(DatabaseManager::pool().await?))
}

/// GET /api/v1/tours
pub async fn list(Query(params): Query<HashMap<String, String>>) -> ApiResult<Vec<Value>> {
    list_with(params).await
}

/// GET /api/v1/tours/top-5-cheap - alias route with server-side pre-filled
/// query parameters.
pub async fn top_five_cheap(
    Query(params): Query<HashMap<String, String>>,
) -> ApiResult<Vec<Value>> {
    let mut params = params;
    params.insert("limit".to_string(), "5".to_string());
    params.insert("sort".to_string(), "-ratings_average,price".to_string());
    params.insert(
        "fields".to_string(),
        "name,price,ratings_average,summary,difficulty".to_string(),
    );
    list_with(params).await
}

async fn list_with(params: HashMap<String, String>) -> ApiResult<Vec<Value>> {
    // Secret tours stay out of every default listing.
    let query = QueryFeatures::new(params)
        .into_list_query()
        .scoped(scope_ne("secret_tour", true));

    let mut tours = repo().await?.select_json(&query).await?;
    for tour in tours.iter_mut() {
        attach_duration_weeks(tour);
    }

    let tours: Vec<Value> = tours.into_iter().map(Value::Object).collect();
    let results = tours.len();
    Ok(ApiResponse::list(tours, results))
}

/// GET /api/v1/tours/:id - inlines reviews (with author profiles) and guide
/// profiles.
pub async fn get(Path(id): Path<Uuid>) -> ApiResult<Value> {
    let pool = DatabaseManager::pool().await?;

    let tour = Repository::<Tour>::new(pool.clone())
        .find_where(vec![
            scope_eq("id", id.to_string()),
            scope_ne("secret_tour", true),
        ])
        .await?
        .ok_or_else(|| ApiError::not_found("No tour found with that id"))?;

    let reviews = Repository::<Review>::new(pool.clone())
        .find_all_where(vec![scope_eq("tour_id", id.to_string())])
        .await?;

    // Stitch author profiles onto the reviews and resolve guide references.
    let user_repo = Repository::<User>::new(pool);
    let author_ids: Vec<Uuid> = reviews.iter().map(|r| r.user_id).collect();
    let authors = user_repo.select_ids(&author_ids).await?;
    let guides = user_repo.select_ids(&tour.guides.0).await?;

    let reviews: Vec<Value> = reviews
        .into_iter()
        .map(|review| {
            let author = authors
                .iter()
                .find(|u| u.id == review.user_id)
                .map(User::public_profile);
            let mut value = serde_json::to_value(&review).unwrap_or(Value::Null);
            value["user"] = author.unwrap_or(Value::Null);
            value
        })
        .collect();

    let mut data = tour.api_json();
    data["reviews"] = Value::Array(reviews);
    data["guides"] = Value::Array(guides.iter().map(|g| g.public_profile()).collect());

    Ok(ApiResponse::success(json!({"tour": data})))
}

/// POST /api/v1/tours (admin, lead-guide)
pub async fn create(Json(body): Json<Value>) -> ApiResult<Value> {
    let body = as_object(&body)?;
    tour::validate(body, None)?;

    let mut fields = filter_payload(body, Tour::WRITABLE);
    insert_slug(&mut fields);

    let created = repo().await?.insert(&fields).await?;
    Ok(ApiResponse::created(json!({"tour": created.api_json()})))
}

/// PATCH /api/v1/tours/:id (admin, lead-guide)
pub async fn update(Path(id): Path<Uuid>, Json(body): Json<Value>) -> ApiResult<Value> {
    let existing = repo().await?.find(id).await?;

    let body = as_object(&body)?;
    tour::validate(body, Some(&existing))?;

    let mut fields = filter_payload(body, Tour::WRITABLE);
    insert_slug(&mut fields);

    let updated = repo().await?.update(id, &fields).await?;
    Ok(ApiResponse::success(json!({"tour": updated.api_json()})))
}

/// DELETE /api/v1/tours/:id (admin, lead-guide)
pub async fn delete(Path(id): Path<Uuid>) -> Result<Response, ApiError> {
    repo().await?.delete(id).await?;
    Ok(no_content())
}

/// GET /api/v1/tours/stats - rating/price aggregates grouped by difficulty
/// over well-rated tours.
pub async fn stats() -> ApiResult<Value> {
    let pool = DatabaseManager::pool().await?;

    let rows = sqlx::query(
        "SELECT difficulty, \
                COUNT(*) AS num_tours, \
                SUM(ratings_quantity)::int8 AS num_ratings, \
                AVG(ratings_average) AS avg_rating, \
                AVG(price) AS avg_price, \
                MIN(price) AS min_price, \
                MAX(price) AS max_price \
         FROM tours \
         WHERE ratings_average >= 4.5 \
         GROUP BY difficulty \
         ORDER BY avg_price",
    )
    .fetch_all(&pool)
    .await?;

    let mut stats = Vec::with_capacity(rows.len());
    for row in rows {
        stats.push(json!({
            "difficulty": row.try_get::<String, _>("difficulty")?,
            "num_tours": row.try_get::<i64, _>("num_tours")?,
            "num_ratings": row.try_get::<Option<i64>, _>("num_ratings")?.unwrap_or(0),
            "avg_rating": row.try_get::<Option<f64>, _>("avg_rating")?,
            "avg_price": row.try_get::<Option<f64>, _>("avg_price")?,
            "min_price": row.try_get::<Option<f64>, _>("min_price")?,
            "max_price": row.try_get::<Option<f64>, _>("max_price")?,
        }));
    }

    Ok(ApiResponse::success(json!({"stats": stats})))
}

/// GET /api/v1/tours/monthly-plan/:year (admin, lead-guide, guide) - tour
/// starts per month of the given year, busiest first.
pub async fn monthly_plan(Path(year): Path<i32>) -> ApiResult<Value> {
    let pool = DatabaseManager::pool().await?;

    let rows = sqlx::query(
        "SELECT EXTRACT(MONTH FROM start_date)::int4 AS month, \
                COUNT(*) AS num_tour_starts, \
                array_agg(name) AS tours \
         FROM (SELECT name, (jsonb_array_elements_text(start_dates))::timestamptz AS start_date \
               FROM tours) unrolled \
         WHERE start_date >= make_timestamptz($1, 1, 1, 0, 0, 0) \
           AND start_date < make_timestamptz($1 + 1, 1, 1, 0, 0, 0) \
         GROUP BY month \
         ORDER BY num_tour_starts DESC \
         LIMIT 12",
    )
    .bind(year)
    .fetch_all(&pool)
    .await?;

    let mut plan = Vec::with_capacity(rows.len());
    for row in rows {
        plan.push(json!({
            "month": row.try_get::<i32, _>("month")?,
            "num_tour_starts": row.try_get::<i64, _>("num_tour_starts")?,
            "tours": row.try_get::<Vec<String>, _>("tours")?,
        }));
    }

    Ok(ApiResponse::success(json!({"plan": plan})))
}

/// GET /api/v1/tours/within/:distance/center/:latlng/unit/:unit
pub async fn within(
    Path((distance, latlng, unit)): Path<(f64, String, String)>,
) -> ApiResult<Vec<Value>> {
    let (lat, lng) = geo::parse_latlng(&latlng)
        .ok_or_else(|| ApiError::bad_request("Please provide lat/lng in the format lat,lng"))?;
    let radius_km = Unit::from_param(&unit).to_km(distance);

    let tours = located_tours().await?;
    let matches: Vec<Value> = tours
        .into_iter()
        .filter(|tour| match tour_coordinates(tour) {
            Some((tour_lat, tour_lng)) => {
                geo::haversine_km(lat, lng, tour_lat, tour_lng) <= radius_km
            }
            None => false,
        })
        .map(|tour| tour.api_json())
        .collect();

    let results = matches.len();
    Ok(ApiResponse::list(matches, results))
}

/// GET /api/v1/tours/distances/:latlng/unit/:unit - distance from a point to
/// every tour's start location.
pub async fn distances(Path((latlng, unit)): Path<(String, String)>) -> ApiResult<Value> {
    let (lat, lng) = geo::parse_latlng(&latlng)
        .ok_or_else(|| ApiError::bad_request("Please provide lat/lng in the format lat,lng"))?;
    let unit = Unit::from_param(&unit);

    let tours = located_tours().await?;
    let distances: Vec<Value> = tours
        .into_iter()
        .filter_map(|tour| {
            tour_coordinates(&tour).map(|(tour_lat, tour_lng)| {
                json!({
                    "id": tour.id,
                    "name": tour.name,
                    "distance": unit.from_km(geo::haversine_km(lat, lng, tour_lat, tour_lng)),
                })
            })
        })
        .collect();

    Ok(ApiResponse::success(json!({"distances": distances})))
}

async fn located_tours() -> Result<Vec<Tour>, ApiError> {
    let pool = DatabaseManager::pool().await?;
    let tours = sqlx::query_as::<_, Tour>(&format!(
        "SELECT * FROM \"{}\" WHERE secret_tour <> TRUE AND start_location IS NOT NULL",
        Tour::TABLE
    ))
    .fetch_all(&pool)
    .await?;
    Ok(tours)
}

/// Stored coordinates are GeoJSON order: `[longitude, latitude]`.
fn tour_coordinates(tour: &Tour) -> Option<(f64, f64)> {
    let location = tour.start_location.as_ref()?;
    match location.0.coordinates.as_slice() {
        [lng, lat, ..] => Some((*lat, *lng)),
        _ => None,
    }
}

/// Slug rides along with every create and rename.
fn insert_slug(fields: &mut Map<String, Value>) {
    if let Some(name) = fields.get("name").and_then(Value::as_str) {
        fields.insert("slug".to_string(), Value::String(slugify(name)));
    }
}

fn attach_duration_weeks(tour: &mut Map<String, Value>) {
    if let Some(duration) = tour.get("duration").and_then(Value::as_f64) {
        tour.insert("duration_weeks".to_string(), Value::from(duration / 7.0));
    }
}
