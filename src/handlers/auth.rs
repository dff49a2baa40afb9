use axum::{
    extract::Path,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Json, Response},
    Extension,
};
use serde_json::{json, Map, Value};
use sqlx::PgPool;
use tower_cookies::{cookie::time::Duration as CookieDuration, Cookie, Cookies};

use crate::auth::{self, LOGOUT_SENTINEL, PASSWORD_CHANGE_SKEW_SECS};
use crate::config;
use crate::database::{DatabaseManager, Repository};
use crate::error::ApiError;
use crate::handlers::request_origin;
use crate::middleware::CurrentUser;
use crate::models::{filter_payload, user, User};
use crate::services::email::Mailer;
use crate::{is_production, models::Model};

/// POST /api/v1/users/signup
pub async fn signup(
    cookies: Cookies,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Result<Response, ApiError> {
    let body = as_object(&body)?;
    user::validate_signup(body)?;
    let password = body
        .get("password")
        .and_then(Value::as_str)
        .ok_or_else(|| ApiError::bad_request("Please provide a password"))?;

    // Only the signup fields make it to storage; role and active keep their
    // defaults, and the confirmation field never leaves this function.
    let mut fields = filter_payload(body, &["name", "email", "photo"]);
    fields.insert(
        "password".to_string(),
        Value::String(auth::hash_password(password).map_err(|e| ApiError::internal(e.to_string()))?),
    );

    let pool = DatabaseManager::pool().await?;
    let new_user = Repository::<User>::new(pool).insert(&fields).await?;

    let url = format!("{}/me", request_origin(&headers));
    if let Err(e) = Mailer::new(&new_user, url).send_welcome().await {
        tracing::warn!("welcome mail for {} failed: {}", new_user.email, e);
    }

    send_token(&new_user, StatusCode::CREATED, &cookies)
}

/// POST /api/v1/users/login
pub async fn login(cookies: Cookies, Json(body): Json<Value>) -> Result<Response, ApiError> {
    let body = as_object(&body)?;
    let email = body.get("email").and_then(Value::as_str);
    let password = body.get("password").and_then(Value::as_str);

    let (email, password) = match (email, password) {
        (Some(email), Some(password)) => (email, password),
        _ => return Err(ApiError::bad_request("Please provide an email and password")),
    };

    // One message for both unknown email and bad password.
    let user = find_active_by_email(&DatabaseManager::pool().await?, email)
        .await?
        .ok_or_else(|| ApiError::unauthorized("Incorrect email or password"))?;

    if !auth::verify_password(password, &user.password) {
        return Err(ApiError::unauthorized("Incorrect email or password"));
    }

    send_token(&user, StatusCode::OK, &cookies)
}

/// GET /api/v1/users/logout - overwrite the cookie with a short-lived
/// sentinel, since the real one is http-only.
pub async fn logout(cookies: Cookies) -> Response {
    let mut cookie = Cookie::new("jwt", LOGOUT_SENTINEL);
    cookie.set_http_only(true);
    cookie.set_path("/");
    cookie.set_max_age(CookieDuration::seconds(10));
    cookies.add(cookie);

    Json(json!({"status": "success"})).into_response()
}

/// POST /api/v1/users/forgot-password
pub async fn forgot_password(
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Result<Response, ApiError> {
    let body = as_object(&body)?;
    let email = body
        .get("email")
        .and_then(Value::as_str)
        .ok_or_else(|| ApiError::bad_request("Please provide an email"))?;

    let pool = DatabaseManager::pool().await?;
    let user = find_active_by_email(&pool, email)
        .await?
        .ok_or_else(|| ApiError::not_found("There is no user with that email address"))?;

    let token = auth::generate_reset_token();
    store_reset_token(&pool, &user, Some(&token.digest)).await?;

    let reset_url = format!(
        "{}/api/v1/users/reset-password/{}",
        request_origin(&headers),
        token.plaintext
    );

    if let Err(e) = Mailer::new(&user, reset_url).send_password_reset().await {
        // Leaving a dangling digest behind would lock the flow for 10 minutes.
        store_reset_token(&pool, &user, None).await?;
        tracing::error!("reset mail for {} failed: {}", user.email, e);
        return Err(ApiError::internal("There was an error sending the email"));
    }

    Ok(Json(json!({"status": "success", "data": "Token sent to email"})).into_response())
}

/// PATCH /api/v1/users/reset-password/:token
pub async fn reset_password(
    cookies: Cookies,
    Path(token): Path<String>,
    Json(body): Json<Value>,
) -> Result<Response, ApiError> {
    let body = as_object(&body)?;
    let (password, confirm) = password_pair(body)?;
    validate_password_pair(password, confirm)?;

    // Look up by digest within the unexpired reset window.
    let digest = auth::digest_reset_token(&token);
    let pool = DatabaseManager::pool().await?;
    let user = sqlx::query_as::<_, User>(
        "SELECT * FROM users \
         WHERE password_reset_token = $1 AND password_reset_expires > now()",
    )
    .bind(&digest)
    .fetch_optional(&pool)
    .await?
    .ok_or_else(|| ApiError::bad_request("Token is invalid or has expired"))?;

    store_new_password(&pool, &user, password).await?;

    send_token(&user, StatusCode::OK, &cookies)
}

/// PATCH /api/v1/users/update-my-password (protected)
pub async fn update_password(
    cookies: Cookies,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Json(body): Json<Value>,
) -> Result<Response, ApiError> {
    let body = as_object(&body)?;

    let current = body
        .get("password_current")
        .and_then(Value::as_str)
        .ok_or_else(|| ApiError::bad_request("Please provide your current password"))?;
    if !auth::verify_password(current, &user.password) {
        return Err(ApiError::unauthorized("Your current password is wrong"));
    }

    let (password, confirm) = password_pair(body)?;
    validate_password_pair(password, confirm)?;

    let pool = DatabaseManager::pool().await?;
    store_new_password(&pool, &user, password).await?;

    send_token(&user, StatusCode::OK, &cookies)
}

/// Issue a session token as both JSON payload and http-only cookie.
fn send_token(user: &User, status: StatusCode, cookies: &Cookies) -> Result<Response, ApiError> {
    let token = auth::sign_token(user.id).map_err(|e| ApiError::internal(e.to_string()))?;

    let mut cookie = Cookie::new("jwt", token.clone());
    cookie.set_http_only(true);
    cookie.set_path("/");
    cookie.set_max_age(CookieDuration::days(
        config::config().security.cookie_expiry_days,
    ));
    if is_production!() {
        cookie.set_secure(true);
    }
    cookies.add(cookie);

    Ok((
        status,
        Json(json!({
            "status": "success",
            "token": token,
            "data": {"user": user},
        })),
    )
        .into_response())
}

async fn find_active_by_email(pool: &PgPool, email: &str) -> Result<Option<User>, ApiError> {
    let user = sqlx::query_as::<_, User>(&format!(
        "SELECT * FROM \"{}\" WHERE email = $1 AND active <> FALSE",
        User::TABLE
    ))
    .bind(email)
    .fetch_optional(pool)
    .await?;
    Ok(user)
}

/// Persist (or clear) the reset digest with its 10-minute expiry window.
async fn store_reset_token(
    pool: &PgPool,
    user: &User,
    digest: Option<&str>,
) -> Result<(), ApiError> {
    sqlx::query(
        "UPDATE users SET password_reset_token = $1, \
         password_reset_expires = CASE WHEN $1 IS NULL THEN NULL \
         ELSE now() + make_interval(mins => $2) END \
         WHERE id = $3",
    )
    .bind(digest)
    .bind(config::config().security.reset_token_expiry_mins as i32)
    .bind(user.id)
    .execute(pool)
    .await?;
    Ok(())
}

/// Re-hash and store a password; stamps the change with a small negative
/// skew so the token issued in the same instant stays valid, and clears any
/// outstanding reset token so it cannot be replayed.
async fn store_new_password(pool: &PgPool, user: &User, password: &str) -> Result<(), ApiError> {
    let hash = auth::hash_password(password).map_err(|e| ApiError::internal(e.to_string()))?;
    sqlx::query(
        "UPDATE users SET password = $1, \
         password_changed_at = now() - make_interval(secs => $2), \
         password_reset_token = NULL, password_reset_expires = NULL \
         WHERE id = $3",
    )
    .bind(hash)
    .bind(PASSWORD_CHANGE_SKEW_SECS as f64)
    .bind(user.id)
    .execute(pool)
    .await?;
    Ok(())
}

fn password_pair(body: &Map<String, Value>) -> Result<(&str, &str), ApiError> {
    match (
        body.get("password").and_then(Value::as_str),
        body.get("password_confirm").and_then(Value::as_str),
    ) {
        (Some(password), Some(confirm)) => Ok((password, confirm)),
        _ => Err(ApiError::bad_request(
            "Please provide password and password_confirm",
        )),
    }
}

fn validate_password_pair(password: &str, confirm: &str) -> Result<(), ApiError> {
    if password.chars().count() < 8 {
        return Err(ApiError::validation(
            "Password must be at least 8 characters",
            None,
        ));
    }
    if password != confirm {
        return Err(ApiError::validation("The passwords do not match", None));
    }
    Ok(())
}

pub(crate) fn as_object(body: &Value) -> Result<&Map<String, Value>, ApiError> {
    body.as_object()
        .ok_or_else(|| ApiError::bad_request("Request body must be a JSON object"))
}
