//! Per-IP token-bucket rate limiting. Three named instances exist (auth,
//! video, comment) each with their own (rate, burst); buckets are created
//! lazily per IP and swept by a background task once idle buckets pile up.

use axum::http::HeaderMap;
use dashmap::DashMap;
use governor::{
    Quota, RateLimiter as GovernorLimiter,
    clock::DefaultClock,
    state::{InMemoryState, NotKeyed},
};
use std::net::SocketAddr;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::{Duration, Instant};

type Bucket = GovernorLimiter<NotKeyed, InMemoryState, DefaultClock>;

struct Entry {
    bucket: Arc<Bucket>,
    last_seen: Instant,
}

#[derive(Clone, Copy, Debug)]
pub struct RateLimiterConfig {
    pub rate_per_sec: f64,
    pub burst: u32,
}

impl RateLimiterConfig {
    pub const AUTH: Self = Self { rate_per_sec: 0.5, burst: 5 };
    pub const VIDEO: Self = Self { rate_per_sec: 5.0, burst: 20 };
    pub const COMMENT: Self = Self { rate_per_sec: 0.2, burst: 3 };
}

const IDLE_EVICT_AFTER: Duration = Duration::from_secs(10 * 60);
const SWEEP_INTERVAL: Duration = Duration::from_secs(5 * 60);

#[derive(Clone)]
pub struct RateLimiter {
    buckets: Arc<DashMap<String, Entry>>,
    config: RateLimiterConfig,
}

impl RateLimiter {
    pub fn new(config: RateLimiterConfig) -> Self {
        Self {
            buckets: Arc::new(DashMap::new()),
            config,
        }
    }

    /// Returns `true` when the request is allowed.
    pub fn check(&self, key: &str) -> bool {
        let now = Instant::now();
        if let Some(mut entry) = self.buckets.get_mut(key) {
            entry.last_seen = now;
            return entry.bucket.check().is_ok();
        }
        let replenish_interval =
            Duration::from_secs_f64(1.0 / self.config.rate_per_sec.max(0.001));
        let quota = Quota::with_period(replenish_interval)
            .unwrap_or_else(|| Quota::per_second(NonZeroU32::new(1).unwrap()))
            .allow_burst(NonZeroU32::new(self.config.burst.max(1)).unwrap());
        let bucket = Arc::new(GovernorLimiter::direct(quota));
        let allowed = bucket.check().is_ok();
        self.buckets.insert(
            key.to_string(),
            Entry {
                bucket,
                last_seen: now,
            },
        );
        allowed
    }

    pub fn sweep_idle(&self) {
        let deadline = Instant::now() - IDLE_EVICT_AFTER;
        self.buckets.retain(|_, entry| entry.last_seen >= deadline);
    }

    pub fn spawn_sweeper(self, shutdown: tokio_util::sync::CancellationToken) {
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = tokio::time::sleep(SWEEP_INTERVAL) => {
                        self.sweep_idle();
                    }
                    _ = shutdown.cancelled() => break,
                }
            }
        });
    }
}

/// Route-scoped gates. Each wraps one of `AppState`'s three named limiters
/// and is mounted per-endpoint via `middleware::from_fn_with_state`, never
/// globally — there is no single request-wide rate limit.
pub mod gate {
    use crate::error::AppError;
    use crate::state::AppState;
    use axum::{
        extract::{ConnectInfo, Request, State},
        middleware::Next,
        response::Response,
    };
    use std::net::SocketAddr;

    fn peer_of(req: &Request) -> SocketAddr {
        req.extensions()
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ci| ci.0)
            .unwrap_or_else(|| "0.0.0.0:0".parse().unwrap())
    }

    async fn enforce(
        limiter: &super::RateLimiter,
        req: &Request,
    ) -> Result<(), AppError> {
        let key = super::client_ip_key(req.headers(), peer_of(req));
        if limiter.check(&key) {
            Ok(())
        } else {
            Err(AppError::TooManyRequests)
        }
    }

    pub async fn auth(State(state): State<AppState>, req: Request, next: Next) -> Result<Response, AppError> {
        enforce(&state.auth_limiter, &req).await?;
        Ok(next.run(req).await)
    }

    pub async fn video(State(state): State<AppState>, req: Request, next: Next) -> Result<Response, AppError> {
        enforce(&state.video_limiter, &req).await?;
        Ok(next.run(req).await)
    }

    pub async fn comment(State(state): State<AppState>, req: Request, next: Next) -> Result<Response, AppError> {
        enforce(&state.comment_limiter, &req).await?;
        Ok(next.run(req).await)
    }
}

/// `X-Forwarded-For` first hop if present, else the socket peer address.
pub fn client_ip_key(headers: &HeaderMap, peer: SocketAddr) -> String {
    if let Some(xff) = headers.get("x-forwarded-for").and_then(|v| v.to_str().ok()) {
        if let Some(first) = xff.split(',').next() {
            let trimmed = first.trim();
            if !trimmed.is_empty() {
                return trimmed.to_string();
            }
        }
    }
    peer.ip().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allows_burst_then_throttles() {
        let limiter = RateLimiter::new(RateLimiterConfig { rate_per_sec: 0.5, burst: 5 });
        let mut allowed = 0;
        for _ in 0..6 {
            if limiter.check("203.0.113.5") {
                allowed += 1;
            }
        }
        assert_eq!(allowed, 5);
    }

    #[test]
    fn separate_keys_have_separate_buckets() {
        let limiter = RateLimiter::new(RateLimiterConfig::AUTH);
        assert!(limiter.check("1.1.1.1"));
        assert!(limiter.check("2.2.2.2"));
    }
}
