//! Per-client rate limiting for password reset requests.
//!
//! Each client IP gets its own governor limiter; the quota is
//! `reset_rate_limit_per_minute` requests per minute.

use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::{header, HeaderMap, HeaderValue, Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use governor::{
    clock::{Clock, DefaultClock},
    state::{InMemoryState, NotKeyed},
    Quota, RateLimiter as GovRateLimiter,
};
use serde_json::json;
use std::{
    collections::HashMap,
    net::SocketAddr,
    num::NonZeroU32,
    sync::{Arc, RwLock},
};

use crate::app::AppState;

type ClientRateLimiter = GovRateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Limiters keyed by client address.
pub struct RateLimiterState {
    limiters: RwLock<HashMap<String, Arc<ClientRateLimiter>>>,
    quota: Quota,
    per_minute: NonZeroU32,
}

impl RateLimiterState {
    /// Returns `None` when the limit is 0 (disabled).
    pub fn new(per_minute: u32) -> Option<Self> {
        let per_minute = NonZeroU32::new(per_minute)?;
        Some(Self {
            limiters: RwLock::new(HashMap::new()),
            quota: Quota::per_minute(per_minute),
            per_minute,
        })
    }

    pub fn per_minute(&self) -> u32 {
        self.per_minute.get()
    }

    fn limiter_for(&self, client: &str) -> Arc<ClientRateLimiter> {
        if let Ok(limiters) = self.limiters.read() {
            if let Some(limiter) = limiters.get(client) {
                return limiter.clone();
            }
        }

        // A poisoned lock only means another request panicked mid-insert;
        // the map itself is still usable.
        let mut limiters = self
            .limiters
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        limiters
            .entry(client.to_string())
            .or_insert_with(|| Arc::new(GovRateLimiter::direct(self.quota)))
            .clone()
    }

    /// `Err(retry_after_secs)` when the client is over its quota.
    pub fn check(&self, client: &str) -> Result<(), u64> {
        self.limiter_for(client).check().map_err(|not_until| {
            not_until
                .wait_time_from(DefaultClock::default().now())
                .as_secs()
                .max(1)
        })
    }

    fn tracked_clients(&self) -> usize {
        self.limiters.read().map(|l| l.len()).unwrap_or(0)
    }
}

impl std::fmt::Debug for RateLimiterState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimiterState")
            .field("per_minute", &self.per_minute)
            .field("tracked_clients", &self.tracked_clients())
            .finish()
    }
}

/// Client key: the first `X-Forwarded-For` hop, else the peer address.
fn client_key(headers: &HeaderMap, peer: Option<SocketAddr>) -> String {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .or_else(|| peer.map(|addr| addr.ip().to_string()))
        .unwrap_or_else(|| "unknown".to_string())
}

/// Middleware guarding `POST /auth/resets`.
pub async fn reset_rate_limit(
    State(state): State<AppState>,
    req: Request<Body>,
    next: Next,
) -> Response {
    let Some(limiter) = state.reset_limiter.as_ref() else {
        return next.run(req).await;
    };

    let peer = req
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);
    let client = client_key(req.headers(), peer);

    if let Err(retry_after) = limiter.check(&client) {
        tracing::warn!(client = %client, "Password reset rate limit exceeded");
        return rate_limited_response(limiter.per_minute(), retry_after);
    }

    next.run(req).await
}

fn rate_limited_response(limit: u32, retry_after: u64) -> Response {
    let body = json!({
        "error": "rate_limited",
        "message": format!("Too many requests: limit is {} per minute", limit),
        "retryAfter": retry_after
    });

    let mut response = (StatusCode::TOO_MANY_REQUESTS, Json(body)).into_response();
    response
        .headers_mut()
        .insert(header::RETRY_AFTER, HeaderValue::from(retry_after));
    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_limit_disables() {
        assert!(RateLimiterState::new(0).is_none());
    }

    #[test]
    fn test_limiter_exhaustion() {
        let state = RateLimiterState::new(1).unwrap();
        assert!(state.check("10.0.0.1").is_ok());
        let retry_after = state.check("10.0.0.1").unwrap_err();
        assert!(retry_after >= 1);
    }

    #[test]
    fn test_clients_are_independent() {
        let state = RateLimiterState::new(1).unwrap();
        assert!(state.check("10.0.0.1").is_ok());
        assert!(state.check("10.0.0.2").is_ok());
        assert!(state.check("10.0.0.1").is_err());
    }

    #[test]
    fn test_limiter_reused_per_client() {
        let state = RateLimiterState::new(5).unwrap();
        let a = state.limiter_for("10.0.0.1");
        let b = state.limiter_for("10.0.0.1");
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(state.tracked_clients(), 1);
    }

    #[test]
    fn test_client_key_prefers_forwarded_for() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", HeaderValue::from_static("203.0.113.7, 10.0.0.1"));
        let peer: SocketAddr = "127.0.0.1:5000".parse().unwrap();
        assert_eq!(client_key(&headers, Some(peer)), "203.0.113.7");
    }

    #[test]
    fn test_client_key_falls_back_to_peer() {
        let peer: SocketAddr = "192.0.2.4:5000".parse().unwrap();
        assert_eq!(client_key(&HeaderMap::new(), Some(peer)), "192.0.2.4");
        assert_eq!(client_key(&HeaderMap::new(), None), "unknown");
    }

    #[test]
    fn test_rate_limited_response() {
        let response = rate_limited_response(1, 60);
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers().get(header::RETRY_AFTER).unwrap(), "60");
    }
}
