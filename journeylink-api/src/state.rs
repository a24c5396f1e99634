use journeylink_shared::DomainEvent;
use journeylink_store::app_config::RateLimitConfig;
use journeylink_store::RedisClient;
use journeylink_trips::{BookingManager, RideManager};
use std::sync::Arc;
use tokio::sync::broadcast;

#[derive(Clone)]
pub struct AuthConfig {
    pub secret: String,
    pub leeway: u64,
}

#[derive(Clone)]
pub struct AppState {
    pub rides: Arc<RideManager>,
    pub bookings: Arc<BookingManager>,
    /// Absent when no Redis is configured; rate limiting is then off.
    pub redis: Option<Arc<RedisClient>>,
    pub notifications: broadcast::Sender<DomainEvent>,
    pub auth: AuthConfig,
    pub rate_limit: RateLimitConfig,
}

impl AppState {
    pub fn new(
        rides: Arc<RideManager>,
        bookings: Arc<BookingManager>,
        notifications: broadcast::Sender<DomainEvent>,
        auth: AuthConfig,
    ) -> Self {
        Self {
            rides,
            bookings,
            redis: None,
            notifications,
            auth,
            rate_limit: RateLimitConfig::default(),
        }
    }

    pub fn with_redis(mut self, redis: Arc<RedisClient>, rate_limit: RateLimitConfig) -> Self {
        self.redis = Some(redis);
        self.rate_limit = rate_limit;
        self
    }
}
