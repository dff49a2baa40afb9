use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use axum::{
    extract::{ConnectInfo, Request, State},
    middleware::Next,
    response::Response,
};

use crate::config;
use crate::error::ApiError;

/// Fixed-window request quota per client, applied to the whole API surface.
/// Reference quota: 100 requests per 60-minute window.
pub struct RateLimiter {
    windows: Mutex<HashMap<String, (Instant, u32)>>,
    max_requests: u32,
    window: Duration,
}

impl RateLimiter {
    pub fn new(max_requests: u32, window: Duration) -> Self {
        Self {
            windows: Mutex::new(HashMap::new()),
            max_requests,
            window,
        }
    }

    pub fn from_config() -> Arc<Self> {
        let api = &config::config().api;
        Arc::new(Self::new(
            api.rate_limit_requests,
            Duration::from_secs(api.rate_limit_window_secs),
        ))
    }

    /// Record one request for `client` and report whether it is within quota.
    pub fn check(&self, client: &str) -> bool {
        let now = Instant::now();
        let mut windows = self.windows.lock().expect("rate limiter poisoned");

        // Opportunistic pruning keeps the map bounded without a sweeper task.
        if windows.len() > 4096 {
            let window = self.window;
            windows.retain(|_, (start, _)| now.duration_since(*start) < window);
        }

        let entry = windows.entry(client.to_string()).or_insert((now, 0));
        if now.duration_since(entry.0) >= self.window {
            *entry = (now, 0);
        }
        entry.1 += 1;
        entry.1 <= self.max_requests
    }
}

pub async fn rate_limit(
    State(limiter): State<Arc<RateLimiter>>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    if !config::config().api.enable_rate_limiting {
        return Ok(next.run(request).await);
    }

    let client = client_key(&request);
    if !limiter.check(&client) {
        return Err(ApiError::too_many_requests(
            "Too many requests from this IP, please try again in an hour",
        ));
    }

    Ok(next.run(request).await)
}

/// Client identity: the first forwarded address when behind a proxy, the
/// peer address otherwise.
fn client_key(request: &Request) -> String {
    if let Some(forwarded) = request
        .headers()
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
    {
        return forwarded.trim().to_string();
    }

    request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|info| info.0.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn enforces_quota_within_window() {
        let limiter = RateLimiter::new(3, Duration::from_secs(3600));
        assert!(limiter.check("10.0.0.1"));
        assert!(limiter.check("10.0.0.1"));
        assert!(limiter.check("10.0.0.1"));
        assert!(!limiter.check("10.0.0.1"));
        // Other clients are unaffected.
        assert!(limiter.check("10.0.0.2"));
    }

    #[test]
    fn window_resets_after_elapsing() {
        let limiter = RateLimiter::new(1, Duration::from_millis(10));
        assert!(limiter.check("10.0.0.1"));
        assert!(!limiter.check("10.0.0.1"));
        std::thread::sleep(Duration::from_millis(15));
        assert!(limiter.check("10.0.0.1"));
    }
}
