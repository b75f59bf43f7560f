//! Redis pub/sub driver.
//!
//! The implementation lives in `redis.rs` and is compiled only with the
//! `transport_redis` feature. Without it, [`create_redis_driver`] is a stub
//! that always fails.

#[cfg(feature = "transport_redis")]
#[allow(clippy::module_inception)]
mod redis;

#[cfg(feature = "transport_redis")]
pub use redis::{create_redis_driver, BlockingRedisDriver, ConcurrentRedisDriver};

#[cfg(not(feature = "transport_redis"))]
pub async fn create_redis_driver(config: crate::DriverConfig) -> crate::Result<crate::Driver> {
    crate::log_error!(
        "{}: redis driver requested but the transport_redis feature is not enabled",
        config.driver_id
    );
    Err(crate::DriverError::Connection(
        "transport_redis feature is not enabled".into(),
    ))
}
