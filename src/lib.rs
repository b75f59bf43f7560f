//! Pluggable pub/sub drivers with explicit execution contracts.
//!
//! A driver adapts one message broker (an in-process loopback, Redis, ...)
//! to a common consumer API. Every driver advertises a single [`Flag`] that
//! tells its consumer how it may be used:
//!
//! - [`Flag::RequiresBlockingExecution`] drivers implement
//!   [`BlockingPubSubDriver`] and must be driven by one caller at a time.
//! - [`Flag::RequiresConcurrentExecution`] drivers implement
//!   [`ConcurrentPubSubDriver`] and hand out one-directional
//!   [`MessageWriter`] / [`MessageReader`] handles usable from many tasks.
//!
//! [`Driver`] tags a driver with its contract, and [`SubscriberHost`] fans an
//! inbound stream out to independently registered handlers.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use brokerutil::{DriverBuilder, Message, SubscriberHost};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> brokerutil::Result<()> {
//! let driver = DriverBuilder::new()
//!     .driver_id("doc")
//!     .concurrent()
//!     .build()
//!     .await?;
//! driver.open_stream().await?;
//!
//! let host = Arc::new(SubscriberHost::new());
//! let mut reports = host.add_subscriber(|msg: Message| async move {
//!     assert_eq!(msg.as_str(), Some("ping"));
//!     Ok(())
//! });
//!
//! let runner = brokerutil::subscriber::run(&driver, host.clone()).await?;
//!
//! let writer = driver.as_concurrent().unwrap().message_writer().await?;
//! writer.send("ping").await?;
//! assert!(reports.recv().await.unwrap().is_ok());
//!
//! driver.close_stream().await?;
//! runner.await.expect("runner panicked")?;
//! # Ok(())
//! # }
//! ```

// Import all sub modules once...
mod macros;

mod domain;
mod driver;
pub mod subscriber;

mod driver_builder;
mod driver_config;

mod error;

pub(crate) use macros::{log_debug, log_error, log_info, log_trace, log_warn};

pub use error::{DriverError, Result};

pub use driver_builder::DriverBuilder;
pub use driver_config::{DriverConfig, DEFAULT_CAPACITY, DEFAULT_CHANNEL, DEFAULT_PENDING_TIMEOUT};

pub use driver::{
    //
    create_loopback_driver,
    create_redis_driver,
    BlockingLoopbackDriver,
    ConcurrentLoopbackDriver,
};

#[cfg(feature = "transport_redis")]
pub use driver::{BlockingRedisDriver, ConcurrentRedisDriver};

pub use subscriber::{HandlerError, HandlerResult, SubscriberHost, SubscriberReports};

// --- public re-exports
pub use domain::{
    //
    BlockingAccess,
    BlockingDriverPtr,
    BlockingPubSubDriver,
    ConcurrentDriverPtr,
    ConcurrentPubSubDriver,
    Driver,
    DriverBase,
    Flag,
    Message,
    MessageReader,
    MessageWriter,
    PubSubDriver,
    StreamPhase,
    StreamState,
};

pub(crate) fn lock_ignore_poison<T>(m: &std::sync::Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    match m.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
