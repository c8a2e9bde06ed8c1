//! Rate limiting middleware.
//!
//! Fixed-window limiting keyed by authenticated user, falling back to client IP.

use crate::auth::AuthContext;
use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::{HeaderValue, Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::warn;

/// Configuration for rate limiting.
#[derive(Clone, Debug)]
pub struct RateLimitConfig {
    /// Maximum requests per window.
    pub max_requests: u32,
    /// Window duration.
    pub window: Duration,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_requests: 60,
            window: Duration::from_secs(60),
        }
    }
}

impl RateLimitConfig {
    pub fn per_minute(max_requests: u32) -> Self {
        Self {
            max_requests,
            ..Self::default()
        }
    }
}

/// Who a request is counted against.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RateLimitKey {
    User(i64),
    Ip(IpAddr),
}

impl RateLimitKey {
    /// Authenticated caller if known, otherwise the peer address.
    fn for_request(request: &Request<Body>) -> Self {
        if let Some(ctx) = request.extensions().get::<AuthContext>() {
            return RateLimitKey::User(ctx.user_id());
        }
        let ip = request
            .extensions()
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| addr.ip())
            .unwrap_or(IpAddr::V4(Ipv4Addr::UNSPECIFIED));
        RateLimitKey::Ip(ip)
    }
}

/// Rate limiter state tracking requests per key.
#[derive(Clone)]
pub struct RateLimitLayer {
    config: RateLimitConfig,
    state: Arc<Mutex<HashMap<RateLimitKey, RateLimitEntry>>>,
}

struct RateLimitEntry {
    count: u32,
    window_start: Instant,
}

impl RateLimitLayer {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            state: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    /// Check if request should be allowed.
    fn check(&self, key: RateLimitKey) -> RateLimitResult {
        let mut state = self.state.lock();
        let now = Instant::now();

        let entry = state.entry(key).or_insert(RateLimitEntry {
            count: 0,
            window_start: now,
        });

        // Reset window if expired
        if now.duration_since(entry.window_start) >= self.config.window {
            entry.count = 0;
            entry.window_start = now;
        }

        entry.count += 1;

        let reset_at = entry.window_start + self.config.window;

        if entry.count > self.config.max_requests {
            RateLimitResult::Exceeded {
                retry_after: reset_at.duration_since(now),
            }
        } else {
            RateLimitResult::Allowed {
                remaining: self.config.max_requests - entry.count,
            }
        }
    }

    /// Periodic cleanup of old entries (call from a background task).
    pub fn cleanup(&self) {
        let mut state = self.state.lock();
        let now = Instant::now();
        let window = self.config.window;

        state.retain(|_, entry| now.duration_since(entry.window_start) < window * 2);
    }

    pub fn tracked_keys(&self) -> usize {
        self.state.lock().len()
    }
}

enum RateLimitResult {
    Allowed { remaining: u32 },
    Exceeded { retry_after: Duration },
}

/// Rate limiting middleware function.
pub async fn rate_limit_middleware(
    State(limiter): State<RateLimitLayer>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let key = RateLimitKey::for_request(&request);
    let limit = limiter.config.max_requests;

    match limiter.check(key) {
        RateLimitResult::Allowed { remaining } => {
            let mut response = next.run(request).await;
            let headers = response.headers_mut();
            headers.insert("X-RateLimit-Limit", HeaderValue::from(limit));
            headers.insert("X-RateLimit-Remaining", HeaderValue::from(remaining));
            response
        }
        RateLimitResult::Exceeded { retry_after } => {
            // Round up so clients never retry inside the window
            let retry_secs = retry_after.as_secs() + u64::from(retry_after.subsec_nanos() > 0);
            warn!(
                key = ?key,
                retry_after_secs = retry_secs,
                "Rate limit exceeded"
            );

            let body = serde_json::json!({
                "message": "Too Many Attempts.",
                "retry_after_seconds": retry_secs,
            });

            (
                StatusCode::TOO_MANY_REQUESTS,
                [
                    ("Retry-After", retry_secs.to_string()),
                    ("X-RateLimit-Limit", limit.to_string()),
                    ("X-RateLimit-Remaining", "0".to_string()),
                ],
                axum::Json(body),
            )
                .into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ip_key() -> RateLimitKey {
        RateLimitKey::Ip("127.0.0.1".parse().unwrap())
    }

    #[test]
    fn test_rate_limit_allows_under_limit() {
        let limiter = RateLimitLayer::new(RateLimitConfig::per_minute(10));

        for expected_remaining in (0..10).rev() {
            match limiter.check(ip_key()) {
                RateLimitResult::Allowed { remaining } => {
                    assert_eq!(remaining, expected_remaining)
                }
                _ => panic!("Should be allowed"),
            }
        }
    }

    #[test]
    fn test_rate_limit_rejects_over_limit() {
        let limiter = RateLimitLayer::new(RateLimitConfig::per_minute(5));

        for _ in 0..5 {
            assert!(matches!(
                limiter.check(ip_key()),
                RateLimitResult::Allowed { .. }
            ));
        }

        match limiter.check(ip_key()) {
            RateLimitResult::Exceeded { retry_after } => {
                assert!(retry_after <= Duration::from_secs(60))
            }
            _ => panic!("Should be exceeded"),
        }
    }

    #[test]
    fn test_keys_are_counted_independently() {
        let limiter = RateLimitLayer::new(RateLimitConfig::per_minute(1));

        assert!(matches!(
            limiter.check(RateLimitKey::User(1)),
            RateLimitResult::Allowed { .. }
        ));
        assert!(matches!(
            limiter.check(RateLimitKey::User(2)),
            RateLimitResult::Allowed { .. }
        ));
        assert!(matches!(
            limiter.check(ip_key()),
            RateLimitResult::Allowed { .. }
        ));
        assert!(matches!(
            limiter.check(RateLimitKey::User(1)),
            RateLimitResult::Exceeded { .. }
        ));
    }

    #[test]
    fn test_window_resets() {
        let limiter = RateLimitLayer::new(RateLimitConfig {
            max_requests: 1,
            window: Duration::from_millis(20),
        });

        assert!(matches!(
            limiter.check(ip_key()),
            RateLimitResult::Allowed { .. }
        ));
        assert!(matches!(
            limiter.check(ip_key()),
            RateLimitResult::Exceeded { .. }
        ));

        std::thread::sleep(Duration::from_millis(30));
        assert!(matches!(
            limiter.check(ip_key()),
            RateLimitResult::Allowed { .. }
        ));
    }

    #[test]
    fn test_cleanup_drops_stale_entries() {
        let limiter = RateLimitLayer::new(RateLimitConfig {
            max_requests: 5,
            window: Duration::from_millis(10),
        });
        limiter.check(ip_key());
        limiter.check(RateLimitKey::User(9));
        assert_eq!(limiter.tracked_keys(), 2);

        std::thread::sleep(Duration::from_millis(25));
        limiter.cleanup();
        assert_eq!(limiter.tracked_keys(), 0);
    }
}
