//! Transport-agnostic driver configuration.
//!
//! Passed to driver factory functions (`create_*_driver()`). Usually built
//! through [`DriverBuilder`](crate::DriverBuilder) rather than by hand.

use std::time::Duration;

use crate::{BlockingAccess, Flag};

/// Default capacity of every internal message queue.
pub const DEFAULT_CAPACITY: usize = 64;

/// Default upper bound for `check_for_pending_message()`.
pub const DEFAULT_PENDING_TIMEOUT: Duration = Duration::from_millis(100);

/// Default broker channel name.
pub const DEFAULT_CHANNEL: &str = "brokerutil";

/// Configuration for creating a driver instance.
#[derive(Clone, Debug)]
pub struct DriverConfig {
    /// Broker URI (e.g. `"redis://127.0.0.1:6379"`). Empty for loopback.
    pub uri: String,

    /// Identifier for this driver instance, used for logging.
    pub driver_id: String,

    /// Broker channel subscribed to on open and published to by default.
    pub channel: String,

    /// Execution contract the driver is constructed for.
    pub flag: Flag,

    /// Overlapping-caller policy for blocking drivers.
    ///
    /// Ignored by concurrent drivers.
    pub access: BlockingAccess,

    /// Capacity of the driver's bounded queues (inbox, writer, readers).
    pub capacity: usize,

    /// How long `check_for_pending_message()` waits before answering `false`.
    pub pending_timeout: Duration,

    /// Optional driver type override (`"loopback"`, `"redis"`).
    ///
    /// If `None`, the type is inferred from the URI scheme.
    pub driver_type: Option<String>,
}

impl DriverConfig {
    /// Loopback configuration with defaults for everything else.
    pub fn loopback(driver_id: impl Into<String>, flag: Flag) -> Self {
        Self {
            uri: String::new(),
            driver_id: driver_id.into(),
            channel: DEFAULT_CHANNEL.to_string(),
            flag,
            access: BlockingAccess::default(),
            capacity: DEFAULT_CAPACITY,
            pending_timeout: DEFAULT_PENDING_TIMEOUT,
            driver_type: Some("loopback".to_string()),
        }
    }

    /// Broker configuration with defaults for everything else.
    pub fn with_broker(uri: impl Into<String>, driver_id: impl Into<String>, flag: Flag) -> Self {
        Self {
            uri: uri.into(),
            driver_id: driver_id.into(),
            channel: DEFAULT_CHANNEL.to_string(),
            flag,
            access: BlockingAccess::default(),
            capacity: DEFAULT_CAPACITY,
            pending_timeout: DEFAULT_PENDING_TIMEOUT,
            driver_type: None,
        }
    }

    pub fn with_channel(mut self, channel: impl Into<String>) -> Self {
        self.channel = channel.into();
        self
    }

    pub fn with_access(mut self, access: BlockingAccess) -> Self {
        self.access = access;
        self
    }

    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity.max(1);
        self
    }

    pub fn with_pending_timeout(mut self, timeout: Duration) -> Self {
        self.pending_timeout = timeout;
        self
    }
}
