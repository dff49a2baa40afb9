use std::net::SocketAddr;

use axum::{
    extract::OriginalUri,
    middleware::{from_fn, from_fn_with_state},
    routing::{delete, get, patch, post},
    Router,
};
use serde_json::{json, Value};
use tower::ServiceBuilder;
use tower_cookies::CookieManagerLayer;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use trailhead_api::database::DatabaseManager;
use trailhead_api::error::ApiError;
use trailhead_api::handlers::{auth, bookings, reviews, tours, users, webhooks};
use trailhead_api::middleware::{maybe_user, protect, rate_limit, restrict_to, RateLimiter, RoleSet};
use trailhead_api::models::user::Role;

#[tokio::main]
async fn main() {
    // Load .env if present so cargo run picks up DATABASE_URL, JWT_SECRET, etc.
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt::init();

    let config = trailhead_api::config::config();
    tracing::info!("Starting Trailhead API in {:?} mode", config.environment);

    if let Err(e) = DatabaseManager::migrate().await {
        tracing::warn!("database migrations not applied: {}", e);
    }

    let app = app();

    // Allow deployments to override the port via env
    let port = std::env::var("PORT")
        .ok()
        .and_then(|s| s.parse::<u16>().ok())
        .unwrap_or(3000);

    let bind_addr = format!("0.0.0.0:{}", port);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .unwrap_or_else(|e| panic!("failed to bind {}: {}", bind_addr, e));

    println!("🚀 Trailhead API listening on http://{}", bind_addr);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
    .expect("server");
}

fn app() -> Router {
    let api = tour_routes()
        .merge(user_routes())
        .merge(review_routes())
        .merge(booking_routes())
        // Fixed per-client quota over the whole API surface
        .layer(from_fn_with_state(RateLimiter::from_config(), rate_limit));

    Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .nest("/api/v1", api)
        // Provider-facing endpoint, outside the versioned API surface
        .route("/webhooks/payments", post(webhooks::payments))
        .fallback(unhandled_route)
        // Global middleware, outermost first
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive())
                .layer(CookieManagerLayer::new()),
        )
}

fn tour_routes() -> Router {
    let staff = RoleSet(&[Role::Admin, Role::LeadGuide]);
    let planners = RoleSet(&[Role::Admin, Role::LeadGuide, Role::Guide]);

    let public = Router::new()
        // Alias route before the id matcher so the static segment wins
        .route("/tours/top-5-cheap", get(tours::top_five_cheap))
        .route("/tours/stats", get(tours::stats))
        .route(
            "/tours/within/:distance/center/:latlng/unit/:unit",
            get(tours::within),
        )
        .route("/tours/distances/:latlng/unit/:unit", get(tours::distances))
        .route("/tours", get(tours::list))
        .route("/tours/:id", get(tours::get));

    let managed = Router::new()
        .route("/tours", post(tours::create))
        .route("/tours/:id", patch(tours::update).delete(tours::delete))
        .route_layer(from_fn_with_state(staff, restrict_to))
        .route_layer(from_fn(protect));

    let plan = Router::new()
        .route("/tours/monthly-plan/:year", get(tours::monthly_plan))
        .route_layer(from_fn_with_state(planners, restrict_to))
        .route_layer(from_fn(protect));

    public.merge(managed).merge(plan)
}

fn user_routes() -> Router {
    let admin = RoleSet(&[Role::Admin]);

    let public = Router::new()
        .route("/users/signup", post(auth::signup))
        .route("/users/login", post(auth::login))
        .route("/users/logout", get(auth::logout))
        .route("/users/forgot-password", post(auth::forgot_password))
        .route("/users/reset-password/:token", patch(auth::reset_password));

    // Soft verification only: anonymous callers get a null user.
    let session = Router::new()
        .route("/users/session", get(users::session))
        .route_layer(from_fn(maybe_user));

    let me = Router::new()
        .route("/users/update-my-password", patch(auth::update_password))
        .route("/users/me", get(users::get_me))
        .route("/users/update-me", patch(users::update_me))
        .route("/users/delete-me", delete(users::delete_me))
        .route_layer(from_fn(protect));

    let managed = Router::new()
        .route("/users", get(users::list))
        .route(
            "/users/:id",
            get(users::get).patch(users::update).delete(users::delete),
        )
        .route_layer(from_fn_with_state(admin, restrict_to))
        .route_layer(from_fn(protect));

    public.merge(session).merge(me).merge(managed)
}

fn review_routes() -> Router {
    let reviewers = RoleSet(&[Role::User]);
    let moderators = RoleSet(&[Role::User, Role::Admin]);

    let reads = Router::new()
        .route("/reviews", get(reviews::list))
        .route("/reviews/:id", get(reviews::get))
        // Nested listing of one tour's reviews
        .route("/tours/:id/reviews", get(reviews::list_for_tour))
        .route_layer(from_fn(protect));

    let writes = Router::new()
        .route("/reviews", post(reviews::create))
        .route("/tours/:id/reviews", post(reviews::create_for_tour))
        .route_layer(from_fn_with_state(reviewers, restrict_to))
        .route_layer(from_fn(protect));

    let moderation = Router::new()
        .route(
            "/reviews/:id",
            patch(reviews::update).delete(reviews::delete),
        )
        .route_layer(from_fn_with_state(moderators, restrict_to))
        .route_layer(from_fn(protect));

    reads.merge(writes).merge(moderation)
}

fn booking_routes() -> Router {
    let managers = RoleSet(&[Role::LeadGuide, Role::Admin]);

    let checkout = Router::new()
        .route(
            "/bookings/checkout-session/:id",
            get(bookings::checkout_session),
        )
        .route_layer(from_fn(protect));

    let managed = Router::new()
        .route("/bookings", get(bookings::list).post(bookings::create))
        .route(
            "/bookings/:id",
            get(bookings::get)
                .patch(bookings::update)
                .delete(bookings::delete),
        )
        .route_layer(from_fn_with_state(managers, restrict_to))
        .route_layer(from_fn(protect));

    checkout.merge(managed)
}

async fn root() -> axum::response::Json<Value> {
    let version = env!("CARGO_PKG_VERSION");

    axum::response::Json(json!({
        "status": "success",
        "data": {
            "name": "Trailhead API",
            "version": version,
            "description": "Tour booking backend built with Rust (Axum)",
            "endpoints": {
                "tours": "/api/v1/tours",
                "users": "/api/v1/users",
                "reviews": "/api/v1/reviews",
                "bookings": "/api/v1/bookings",
                "webhooks": "/webhooks/payments",
            },
        }
    }))
}

async fn health() -> impl axum::response::IntoResponse {
    let now = chrono::Utc::now();

    match DatabaseManager::health_check().await {
        Ok(_) => (
            axum::http::StatusCode::OK,
            axum::response::Json(json!({
                "status": "success",
                "data": {
                    "status": "ok",
                    "timestamp": now,
                    "database": "ok"
                }
            })),
        ),
        Err(e) => (
            axum::http::StatusCode::SERVICE_UNAVAILABLE,
            axum::response::Json(json!({
                "status": "error",
                "message": "database unavailable",
                "data": {
                    "status": "degraded",
                    "timestamp": now,
                    "database_error": e.to_string()
                }
            })),
        ),
    }
}

async fn unhandled_route(OriginalUri(uri): OriginalUri) -> ApiError {
    ApiError::not_found(format!("Cannot find {} on this server", uri))
}
