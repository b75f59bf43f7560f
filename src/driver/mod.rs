//! Driver implementations.
//!
//! This module provides concrete implementations of the domain-level driver
//! contracts. Broker-backed drivers are hidden behind feature flags and are
//! always reachable through their constructor functions.
//!
//! Domain code must not depend on driver-specific types.

mod fanout;
mod inbox;
mod loopback;
mod redis;

pub use loopback::{create_loopback_driver, BlockingLoopbackDriver, ConcurrentLoopbackDriver};

pub use redis::create_redis_driver;

#[cfg(feature = "transport_redis")]
pub use redis::{BlockingRedisDriver, ConcurrentRedisDriver};
