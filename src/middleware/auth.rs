use axum::{
    extract::{Request, State},
    http::HeaderMap,
    middleware::Next,
    response::Response,
};
use tower_cookies::Cookies;

use crate::auth::{self, LOGOUT_SENTINEL};
use crate::database::{DatabaseManager, Repository};
use crate::error::ApiError;
use crate::models::user::{Role, User};

/// Authenticated principal attached to the request by `protect` (always) and
/// `maybe_user` (when a valid session is present).
#[derive(Debug, Clone)]
pub struct CurrentUser(pub User);

/// Verification middleware: rejects with 401 unless the request carries a
/// valid session token for a user that still exists, is active, and has not
/// changed their password since the token was issued.
pub async fn protect(
    cookies: Cookies,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = extract_token(request.headers(), &cookies)
        .ok_or_else(|| ApiError::unauthorized("You are not logged in"))?;

    let user = resolve_token_user(&token).await?;
    request.extensions_mut().insert(CurrentUser(user));

    Ok(next.run(request).await)
}

/// Soft verification: identical checks, but any failure silently continues
/// as anonymous. Used only to personalize responses.
pub async fn maybe_user(cookies: Cookies, mut request: Request, next: Next) -> Response {
    if let Some(token) = extract_token(request.headers(), &cookies) {
        if let Ok(user) = resolve_token_user(&token).await {
            request.extensions_mut().insert(CurrentUser(user));
        }
    }
    next.run(request).await
}

/// Allowed-role set handed to the `restrict_to` guard at route registration.
#[derive(Debug, Clone, Copy)]
pub struct RoleSet(pub &'static [Role]);

/// Pure role predicate; a user with an unknown role is never allowed.
pub fn role_allowed(role: Option<Role>, allowed: &[Role]) -> bool {
    matches!(role, Some(role) if allowed.contains(&role))
}

/// Role guard layered after `protect`; 403 when the authenticated user's
/// role is not in the allowed set.
pub async fn restrict_to(
    State(roles): State<RoleSet>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let user = request
        .extensions()
        .get::<CurrentUser>()
        .ok_or_else(|| ApiError::unauthorized("You are not logged in"))?;

    if !role_allowed(user.0.role(), roles.0) {
        return Err(ApiError::forbidden(
            "You do not have permission to perform this action",
        ));
    }

    Ok(next.run(request).await)
}

/// Token from the Authorization bearer header, falling back to the `jwt`
/// cookie. The logout sentinel never counts as a token.
fn extract_token(headers: &HeaderMap, cookies: &Cookies) -> Option<String> {
    if let Some(auth_header) = headers.get("authorization").and_then(|v| v.to_str().ok()) {
        if let Some(token) = auth_header.strip_prefix("Bearer ") {
            if !token.trim().is_empty() {
                return Some(token.to_string());
            }
        }
    }

    cookies
        .get("jwt")
        .map(|c| c.value().to_string())
        .filter(|v| !v.is_empty() && v != LOGOUT_SENTINEL)
}

async fn resolve_token_user(token: &str) -> Result<User, ApiError> {
    let claims = auth::verify_token(token)
        .map_err(|_| ApiError::unauthorized("Invalid or expired token"))?;

    let pool = DatabaseManager::pool().await?;
    let user = Repository::<User>::new(pool)
        .find(claims.sub)
        .await
        .map_err(|_| {
            ApiError::unauthorized("The user belonging to this token no longer exists")
        })?;

    if !user.active {
        return Err(ApiError::unauthorized(
            "The user belonging to this token no longer exists",
        ));
    }

    if user.changed_password_after(claims.iat) {
        return Err(ApiError::unauthorized(
            "User recently changed password, please log in again",
        ));
    }

    Ok(user)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_predicate_is_exact_membership() {
        let allowed = [Role::Admin, Role::LeadGuide];
        assert!(role_allowed(Some(Role::Admin), &allowed));
        assert!(role_allowed(Some(Role::LeadGuide), &allowed));
        assert!(!role_allowed(Some(Role::User), &allowed));
        assert!(!role_allowed(Some(Role::Guide), &allowed));
        // unknown role string parsed to None
        assert!(!role_allowed(None, &allowed));
    }
}
