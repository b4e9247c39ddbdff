//! Fixed-window, per-IP rate limiting for unauthenticated routes

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};
use shared::error::{AppError, ErrorCode};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::state::AppState;

/// One limited route: at most `max_requests` per `window` per client IP
#[derive(Debug, Clone, Copy)]
pub struct RateRule {
    pub route: &'static str,
    pub max_requests: u32,
    pub window: Duration,
}

pub const LOGIN: RateRule = RateRule {
    route: "login",
    max_requests: 5,
    window: Duration::from_secs(60),
};

pub const SIGNUP: RateRule = RateRule {
    route: "signup",
    max_requests: 3,
    window: Duration::from_secs(60),
};

pub const PLACE_ORDER: RateRule = RateRule {
    route: "place_order",
    max_requests: 20,
    window: Duration::from_secs(60),
};

/// Entries idle this long are dropped by [`RateLimiter::cleanup`]
const IDLE_CUTOFF: Duration = Duration::from_secs(300);

struct Window {
    count: u32,
    started: Instant,
}

#[derive(Clone, Default)]
pub struct RateLimiter {
    /// (route, ip) → current window
    windows: Arc<Mutex<HashMap<(&'static str, String), Window>>>,
}

impl RateLimiter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count one request; `true` if it is within the limit
    pub async fn check(&self, rule: RateRule, ip: &str) -> bool {
        let mut windows = self.windows.lock().await;
        let now = Instant::now();
        let window = windows
            .entry((rule.route, ip.to_owned()))
            .or_insert(Window {
                count: 0,
                started: now,
            });

        if now.duration_since(window.started) >= rule.window {
            window.count = 0;
            window.started = now;
        }

        window.count += 1;
        window.count <= rule.max_requests
    }

    /// Drop windows that have been idle for a while
    pub async fn cleanup(&self) {
        let now = Instant::now();
        self.windows
            .lock()
            .await
            .retain(|_, w| now.duration_since(w.started) < IDLE_CUTOFF);
    }
}

/// Client IP: first `X-Forwarded-For` entry (load balancer), then the peer address
fn client_ip(request: &Request) -> String {
    if let Some(forwarded) = request.headers().get("x-forwarded-for")
        && let Ok(val) = forwarded.to_str()
        && let Some(first) = val.split(',').next()
    {
        let ip = first.trim();
        if !ip.is_empty() {
            return ip.to_owned();
        }
    }

    request
        .extensions()
        .get::<axum::extract::ConnectInfo<std::net::SocketAddr>>()
        .map(|ci| ci.0.ip().to_string())
        .unwrap_or_else(|| "unknown".to_owned())
}

async fn enforce(
    state: &AppState,
    rule: RateRule,
    request: Request,
    next: Next,
) -> Result<Response, Response> {
    let ip = client_ip(&request);
    if !state.rate_limiter.check(rule, &ip).await {
        tracing::warn!(route = rule.route, ip = %ip, "Rate limit exceeded");
        return Err(AppError::new(ErrorCode::TooManyRequests).into_response());
    }
    Ok(next.run(request).await)
}

/// 5 requests/minute per IP
pub async fn login_rate_limit(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, Response> {
    enforce(&state, LOGIN, request, next).await
}

/// 3 requests/minute per IP
pub async fn signup_rate_limit(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, Response> {
    enforce(&state, SIGNUP, request, next).await
}

/// 20 requests/minute per IP
pub async fn place_order_rate_limit(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, Response> {
    enforce(&state, PLACE_ORDER, request, next).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn limits_per_route_and_ip() {
        let limiter = RateLimiter::new();
        for _ in 0..SIGNUP.max_requests {
            assert!(limiter.check(SIGNUP, "10.0.0.1").await);
        }
        assert!(!limiter.check(SIGNUP, "10.0.0.1").await);

        // Other IPs and routes have their own windows
        assert!(limiter.check(SIGNUP, "10.0.0.2").await);
        assert!(limiter.check(LOGIN, "10.0.0.1").await);
    }

    #[tokio::test(start_paused = true)]
    async fn window_resets_after_expiry() {
        let limiter = RateLimiter::new();
        for _ in 0..LOGIN.max_requests {
            assert!(limiter.check(LOGIN, "10.0.0.1").await);
        }
        assert!(!limiter.check(LOGIN, "10.0.0.1").await);

        tokio::time::advance(LOGIN.window).await;
        assert!(limiter.check(LOGIN, "10.0.0.1").await);
    }

    #[tokio::test(start_paused = true)]
    async fn cleanup_drops_idle_windows() {
        let limiter = RateLimiter::new();
        limiter.check(LOGIN, "10.0.0.1").await;
        tokio::time::advance(IDLE_CUTOFF).await;
        limiter.cleanup().await;
        assert!(limiter.windows.lock().await.is_empty());
    }
}
