pub mod app_config;
pub mod booking_repo;
pub mod database;
#[cfg(feature = "kafka")]
pub mod events;
pub mod redis_repo;
pub mod ride_repo;

pub use booking_repo::StoreBookingRepository;
pub use database::DbClient;
#[cfg(feature = "kafka")]
pub use events::{EventProducer, KafkaEventSink};
pub use redis_repo::RedisClient;
pub use ride_repo::StoreRideRepository;

use journeylink_core::StoreError;

pub(crate) fn backend(e: sqlx::Error) -> StoreError {
    StoreError::Backend(e.to_string())
}
