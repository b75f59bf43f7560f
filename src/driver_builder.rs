//! Driver builder for creating driver instances.
//!
//! Provides a fluent builder API for constructing drivers with clear
//! separation between required and optional configuration.

use std::time::Duration;

use crate::{
    // ---
    create_loopback_driver,
    create_redis_driver,
    BlockingAccess,
    Driver,
    DriverConfig,
    DriverError,
    Flag,
    Result,
    DEFAULT_CAPACITY,
    DEFAULT_CHANNEL,
    DEFAULT_PENDING_TIMEOUT,
};

/// Builder for creating driver instances.
///
/// The built driver is closed; call `open_stream()` before use.
///
/// # Examples
///
/// ## Concurrent loopback driver
/// ```
/// use brokerutil::{DriverBuilder, Flag};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> brokerutil::Result<()> {
/// let driver = DriverBuilder::new()
///     .driver_id("local")
///     .concurrent()
///     .build()
///     .await?;
///
/// assert_eq!(driver.flag(), Flag::RequiresConcurrentExecution);
/// # Ok(())
/// # }
/// ```
///
/// ## Blocking Redis driver with exclusive access
/// ```no_run
/// use brokerutil::DriverBuilder;
///
/// # async fn example() -> brokerutil::Result<()> {
/// let driver = DriverBuilder::new()
///     .uri("redis://127.0.0.1:6379")
///     .driver_id("sensor-feed")
///     .channel("sensors")
///     .blocking()
///     .exclusive_access()
///     .build()
///     .await?;
///
/// driver.open_stream().await?;
/// # Ok(())
/// # }
/// ```
pub struct DriverBuilder {
    uri: Option<String>,
    driver_id: Option<String>,
    channel: Option<String>,
    flag: Option<Flag>,
    capacity: Option<usize>,
    pending_timeout: Option<Duration>,
    driver_type: Option<String>,

    // Track which sugar methods were called (conflicts detected at build())
    called_blocking: bool,
    called_concurrent: bool,
    called_exclusive: bool,
    called_permissive: bool,
}

impl DriverBuilder {
    /// Create a new driver builder.
    pub fn new() -> Self {
        Self {
            uri: None,
            driver_id: None,
            channel: None,
            flag: None,
            capacity: None,
            pending_timeout: None,
            driver_type: None,
            called_blocking: false,
            called_concurrent: false,
            called_exclusive: false,
            called_permissive: false,
        }
    }

    /// Set the broker URI.
    ///
    /// Examples:
    /// - `"redis://127.0.0.1:6379"`
    /// - `"loopback://"` (or no URI at all)
    pub fn uri(mut self, uri: impl Into<String>) -> Self {
        self.uri = Some(uri.into());
        self
    }

    /// Set the driver ID (required). Used in log lines.
    pub fn driver_id(mut self, id: impl Into<String>) -> Self {
        self.driver_id = Some(id.into());
        self
    }

    /// Set the broker channel to subscribe and publish to.
    ///
    /// Default: `"brokerutil"`.
    pub fn channel(mut self, channel: impl Into<String>) -> Self {
        self.channel = Some(channel.into());
        self
    }

    /// Set the execution contract explicitly.
    ///
    /// Cannot be used together with `blocking()` / `concurrent()`.
    pub fn flag(mut self, flag: Flag) -> Self {
        self.flag = Some(flag);
        self
    }

    /// Build a [`Flag::RequiresBlockingExecution`] driver (sugar method).
    pub fn blocking(mut self) -> Self {
        self.called_blocking = true;
        self
    }

    /// Build a [`Flag::RequiresConcurrentExecution`] driver (sugar method).
    pub fn concurrent(mut self) -> Self {
        self.called_concurrent = true;
        self
    }

    /// Reject overlapping calls on a blocking driver with `DriverError::Busy`.
    ///
    /// Only valid for blocking drivers.
    pub fn exclusive_access(mut self) -> Self {
        self.called_exclusive = true;
        self
    }

    /// Leave blocking-call exclusivity to the caller (the default).
    pub fn permissive_access(mut self) -> Self {
        self.called_permissive = true;
        self
    }

    /// Set the capacity of the driver's internal queues.
    ///
    /// Default: 64. Values below 1 are raised to 1.
    pub fn capacity(mut self, capacity: usize) -> Self {
        self.capacity = Some(capacity);
        self
    }

    /// Set how long `check_for_pending_message()` waits.
    ///
    /// Default: 100ms.
    pub fn pending_timeout(mut self, timeout: Duration) -> Self {
        self.pending_timeout = Some(timeout);
        self
    }

    /// Set explicit driver type.
    ///
    /// Valid values: `"loopback"`, `"redis"`
    ///
    /// If not specified, the type is inferred from the URI scheme.
    pub fn driver_type(mut self, driver_type: impl Into<String>) -> Self {
        self.driver_type = Some(driver_type.into());
        self
    }

    /// Validate the settings into a [`DriverConfig`] without creating a driver.
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - `driver_id` is missing
    /// - no execution contract was chosen
    /// - more than one contract or access mode was requested
    /// - an access mode was requested for a concurrent driver
    pub fn into_config(self) -> Result<DriverConfig> {
        // Validate required fields
        let driver_id = self
            .driver_id
            .ok_or_else(|| DriverError::MissingConfig("driver_id".into()))?;

        // Check how many contract selections were made
        let contract_count = [
            self.called_blocking,
            self.called_concurrent,
            self.flag.is_some(),
        ]
        .iter()
        .filter(|&&x| x)
        .count();

        if contract_count > 1 {
            return Err(DriverError::ConfigConflict(
                "choose exactly one of blocking(), concurrent() or flag()".into(),
            ));
        }

        let flag = if self.called_blocking {
            Flag::RequiresBlockingExecution
        } else if self.called_concurrent {
            Flag::RequiresConcurrentExecution
        } else {
            self.flag.ok_or_else(|| {
                DriverError::MissingConfig("execution contract (blocking() or concurrent())".into())
            })?
        };

        if self.called_exclusive && self.called_permissive {
            return Err(DriverError::ConfigConflict(
                "cannot call both exclusive_access() and permissive_access()".into(),
            ));
        }

        if self.called_exclusive && flag.is_concurrent() {
            return Err(DriverError::ConfigConflict(
                "exclusive_access() applies to blocking drivers only".into(),
            ));
        }

        let access = if self.called_exclusive {
            BlockingAccess::Exclusive
        } else {
            BlockingAccess::Permissive
        };

        Ok(DriverConfig {
            uri: self.uri.unwrap_or_default(),
            driver_id,
            channel: self.channel.unwrap_or_else(|| DEFAULT_CHANNEL.to_string()),
            flag,
            access,
            capacity: self.capacity.unwrap_or(DEFAULT_CAPACITY).max(1),
            pending_timeout: self.pending_timeout.unwrap_or(DEFAULT_PENDING_TIMEOUT),
            driver_type: self.driver_type,
        })
    }

    /// Build the driver (consumes self).
    ///
    /// # Errors
    ///
    /// Everything [`into_config`](Self::into_config) rejects, plus an
    /// unrecognized driver type or URI scheme, and driver creation failures.
    pub async fn build(self) -> Result<Driver> {
        // ---
        let config = self.into_config()?;

        // Dispatch to the appropriate driver factory.
        //
        // When driver_type is explicit, use it directly; otherwise infer it
        // from the URI scheme.
        let driver_type = match config.driver_type.as_deref() {
            Some(explicit) => explicit.to_string(),
            None => infer_driver_type(&config.uri)?.to_string(),
        };

        match driver_type.as_str() {
            "loopback" => create_loopback_driver(config).await,
            "redis" => create_redis_driver(config).await,
            other => Err(DriverError::ConfigConflict(format!(
                "unrecognized driver_type: {other}, valid values: loopback, redis"
            ))),
        }
    }
}

impl Default for DriverBuilder {
    fn default() -> Self {
        Self::new()
    }
}

fn infer_driver_type(uri: &str) -> Result<&'static str> {
    // ---
    if uri.is_empty() {
        return Ok("loopback");
    }

    match uri.split_once("://").map(|(scheme, _)| scheme) {
        Some("loopback") => Ok("loopback"),
        Some("redis") | Some("rediss") | Some("redis+unix") | Some("unix") => Ok("redis"),
        _ => Err(DriverError::ConfigConflict(format!(
            "cannot infer driver type from URI {uri}, set driver_type()"
        ))),
    }
}
