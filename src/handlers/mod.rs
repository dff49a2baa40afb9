use axum::http::HeaderMap;

pub mod auth;
pub mod bookings;
pub mod reviews;
pub mod tours;
pub mod users;
pub mod webhooks;

/// Origin for links we hand back to clients (emails, checkout redirects),
/// honoring the proxy's forwarded protocol.
pub fn request_origin(headers: &HeaderMap) -> String {
    let proto = headers
        .get("x-forwarded-proto")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("http");
    let host = headers
        .get("host")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("localhost");
    format!("{}://{}", proto, host)
}
