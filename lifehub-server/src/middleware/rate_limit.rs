//! Per-client request throttling
//!
//! Two keyed GCRA limiters (per minute and per hour) share one client key:
//! `user:<id>` once authenticated, otherwise `ip:<addr>`.

use std::net::SocketAddr;
use std::num::NonZeroU32;

use axum::{
    extract::{ConnectInfo, Request, State},
    http::HeaderMap,
    middleware::Next,
    response::Response,
};
use governor::{
    clock::{Clock, DefaultClock},
    DefaultKeyedRateLimiter, Quota,
};
use lifehub_common::config::RateLimitSection;
use tracing::warn;

use crate::error::{ApiError, ApiResult};
use crate::extract::AuthUser;
use crate::AppState;

/// Keyed limiters for one server
pub struct RateLimiter {
    enabled: bool,
    per_minute: DefaultKeyedRateLimiter<String>,
    per_hour: DefaultKeyedRateLimiter<String>,
    clock: DefaultClock,
}

impl RateLimiter {
    pub fn new(config: &RateLimitSection) -> Self {
        let per_minute = NonZeroU32::new(config.per_minute).unwrap_or(NonZeroU32::MIN);
        let per_hour = NonZeroU32::new(config.per_hour).unwrap_or(NonZeroU32::MIN);
        Self {
            enabled: config.enabled,
            per_minute: governor::RateLimiter::keyed(Quota::per_minute(per_minute)),
            per_hour: governor::RateLimiter::keyed(Quota::per_hour(per_hour)),
            clock: DefaultClock::default(),
        }
    }

    /// Record one request for `key`
    ///
    /// Returns the number of seconds to wait when either limit is exhausted.
    pub fn check(&self, key: &str) -> Result<(), u64> {
        if !self.enabled {
            return Ok(());
        }
        let key = key.to_string();
        for limiter in [&self.per_minute, &self.per_hour] {
            if let Err(not_until) = limiter.check_key(&key) {
                let wait = not_until.wait_time_from(self.clock.now());
                return Err(wait.as_secs().max(1));
            }
        }
        Ok(())
    }

    /// Drop state for clients whose limits have fully replenished
    pub fn purge(&self) {
        self.per_minute.retain_recent();
        self.per_hour.retain_recent();
        self.per_minute.shrink_to_fit();
        self.per_hour.shrink_to_fit();
    }
}

fn forwarded_ip(headers: &HeaderMap) -> Option<String> {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn peer_ip(connect_info: Option<&ConnectInfo<SocketAddr>>) -> Option<String> {
    connect_info.map(|ConnectInfo(addr)| addr.ip().to_string())
}

/// Client address for error reports, preferring the first `X-Forwarded-For` entry
pub fn client_ip(headers: &HeaderMap, connect_info: Option<&ConnectInfo<SocketAddr>>) -> String {
    forwarded_ip(headers)
        .or_else(|| peer_ip(connect_info))
        .unwrap_or_else(|| "unknown".to_string())
}

/// Address anonymous clients are throttled under
///
/// `X-Forwarded-For` only counts when the connecting peer is a trusted proxy.
pub fn throttle_ip(
    headers: &HeaderMap,
    connect_info: Option<&ConnectInfo<SocketAddr>>,
    trusted_proxies: &[String],
) -> String {
    match peer_ip(connect_info) {
        Some(peer) if trusted_proxies.iter().any(|p| p == &peer) => forwarded_ip(headers).unwrap_or(peer),
        Some(peer) => peer,
        None => "unknown".to_string(),
    }
}

/// Throttling middleware
pub async fn rate_limit_middleware(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> ApiResult<Response> {
    let key = match request.extensions().get::<AuthUser>() {
        Some(user) => format!("user:{}", user.id),
        None => format!(
            "ip:{}",
            throttle_ip(
                request.headers(),
                request.extensions().get::<ConnectInfo<SocketAddr>>(),
                &state.config.server.trusted_proxies,
            )
        ),
    };

    if let Err(retry_after) = state.limiter.check(&key) {
        warn!("Rate limit exceeded for {}", key);
        return Err(ApiError::RateLimited {
            message: "Request was throttled".to_string(),
            retry_after,
        });
    }

    Ok(next.run(request).await)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_limit_applies_per_key() {
        let limiter = RateLimiter::new(&RateLimitSection {
            enabled: true,
            per_minute: 2,
            per_hour: 100,
        });
        assert!(limiter.check("ip:1.1.1.1").is_ok());
        assert!(limiter.check("ip:1.1.1.1").is_ok());
        let wait = limiter.check("ip:1.1.1.1").unwrap_err();
        assert!(wait >= 1);
        assert!(limiter.check("ip:2.2.2.2").is_ok());
    }

    #[test]
    fn test_disabled_never_limits() {
        let limiter = RateLimiter::new(&RateLimitSection {
            enabled: false,
            per_minute: 1,
            per_hour: 1,
        });
        for _ in 0..10 {
            assert!(limiter.check("user:x").is_ok());
        }
    }

    #[test]
    fn test_client_ip_prefers_forwarded_header() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", "10.0.0.7, 192.168.1.1".parse().unwrap());
        let addr: SocketAddr = "127.0.0.1:9000".parse().unwrap();
        assert_eq!(client_ip(&headers, Some(&ConnectInfo(addr))), "10.0.0.7");
        assert_eq!(client_ip(&HeaderMap::new(), Some(&ConnectInfo(addr))), "127.0.0.1");
        assert_eq!(client_ip(&HeaderMap::new(), None), "unknown");
    }

    #[test]
    fn test_throttle_ip_ignores_untrusted_forwarded_header() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", "10.0.0.7".parse().unwrap());
        let client: SocketAddr = "203.0.113.5:40000".parse().unwrap();
        let proxy: SocketAddr = "127.0.0.1:9000".parse().unwrap();
        let trusted = vec!["127.0.0.1".to_string()];

        assert_eq!(throttle_ip(&headers, Some(&ConnectInfo(client)), &trusted), "203.0.113.5");
        assert_eq!(throttle_ip(&headers, Some(&ConnectInfo(proxy)), &trusted), "10.0.0.7");
        assert_eq!(throttle_ip(&headers, Some(&ConnectInfo(proxy)), &[]), "127.0.0.1");
        assert_eq!(throttle_ip(&headers, None, &trusted), "unknown");
    }
}
