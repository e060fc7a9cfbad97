use crate::config::Config;
use crate::email::EmailSender;
use crate::object_store::ObjectStore;
use crate::rate_limiter::{RateLimiter, RateLimiterConfig};
use sqlx::PgPool;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

#[derive(Clone)]
pub struct AppState {
    pub db: PgPool,
    pub objects: ObjectStore,
    pub config: Arc<Config>,
    pub auth_limiter: RateLimiter,
    pub video_limiter: RateLimiter,
    pub comment_limiter: RateLimiter,
    pub email: Arc<dyn EmailSender>,
    pub shutdown: CancellationToken,
}

impl AppState {
    pub fn new(
        db: PgPool,
        objects: ObjectStore,
        config: Arc<Config>,
        email: Arc<dyn EmailSender>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            db,
            objects,
            config,
            auth_limiter: RateLimiter::new(RateLimiterConfig::AUTH),
            video_limiter: RateLimiter::new(RateLimiterConfig::VIDEO),
            comment_limiter: RateLimiter::new(RateLimiterConfig::COMMENT),
            email,
            shutdown,
        }
    }
}
