// src/domain/driver.rs

//! Driver domain abstractions.
//!
//! This module defines the contracts every pub/sub driver satisfies. It
//! intentionally avoids any reference to concrete brokers or client
//! libraries; concrete adapters live under `src/driver/`.
//!
//! ## Two disjoint contracts
//!
//! A driver is consumed through exactly one of two traits, selected by the
//! [`Flag`] it advertises:
//!
//! - [`BlockingPubSubDriver`]: poll, receive and publish calls made one at a
//!   time by a single caller. Used for transports that cannot interleave
//!   publishing and receiving.
//! - [`ConcurrentPubSubDriver`]: a send-only [`MessageWriter`] and
//!   receive-only [`MessageReader`] usable from any number of tasks.
//!
//! Concrete adapters expose one type per contract, and [`Driver`] is a tagged
//! union over both. Channel calls on a blocking driver (or blocking calls on
//! a concurrent one) therefore do not type-check.
//!
//! ## Lifecycle
//!
//! ```text
//! Idle ──open_stream──► Open ──close_stream──► Closed
//!                        ▲                       │
//!                        └──────open_stream──────┘
//! ```
//!
//! Data operations are valid only while `Open`. Before the first open they
//! fail with [`DriverError::NotOpen`](crate::DriverError::NotOpen), after a
//! close with [`DriverError::StreamClosed`](crate::DriverError::StreamClosed).
//! Closing is the only cancellation primitive: it releases every pending
//! receive and ends every reader.

use std::sync::Arc;
use std::time::Duration;

use super::access::AccessGate;
use super::stream::StreamState;
use crate::{
    // ---
    BlockingAccess,
    DriverConfig,
    Flag,
    Message,
    MessageReader,
    MessageWriter,
    Result,
};

/// Shared base state for all driver implementations.
///
/// Each concrete driver embeds this as a field named `base` and returns it
/// from [`PubSubDriver::base`], which lets the default trait methods report
/// flags and lifecycle without per-driver code.
#[derive(Debug)]
pub struct DriverBase {
    /// Identifier for logging.
    pub driver_id: String,
    /// Capability flag, fixed for the driver's lifetime.
    pub flag: Flag,
    /// Capacity used for the driver's bounded queues.
    pub capacity: usize,
    /// Upper bound for `check_for_pending_message()`.
    pub pending_timeout: Duration,
    state: StreamState,
    access: AccessGate,
}

impl DriverBase {
    // ---
    pub fn new(driver_id: impl Into<String>, flag: Flag, config: &DriverConfig) -> Self {
        Self {
            driver_id: driver_id.into(),
            flag,
            capacity: config.capacity.max(1),
            pending_timeout: config.pending_timeout,
            state: StreamState::new(),
            access: AccessGate::new(config.access),
        }
    }

    pub fn state(&self) -> &StreamState {
        &self.state
    }

    pub fn access_mode(&self) -> BlockingAccess {
        self.access.mode()
    }

    pub(crate) fn access(&self) -> &AccessGate {
        &self.access
    }
}

/// Lifecycle contract common to every driver.
///
/// # Notes
///
/// This trait uses `async_trait`; consumers should treat methods as normal
/// `async fn`s.
#[async_trait::async_trait]
pub trait PubSubDriver: Send + Sync {
    // ---
    /// Returns a reference to the shared base state.
    fn base(&self) -> &DriverBase;

    fn driver_id(&self) -> &str {
        &self.base().driver_id
    }

    /// The driver's single capability flag.
    fn driver_flag(&self) -> Flag {
        self.base().flag
    }

    /// Capability set of the driver.
    ///
    /// Always holds exactly one flag; the set form is kept for callers that
    /// expect a collection.
    fn driver_flags(&self) -> Vec<Flag> {
        vec![self.driver_flag()]
    }

    fn is_open(&self) -> bool {
        self.base().state().is_open()
    }

    /// Acquire the transport and start the stream.
    ///
    /// Opening an already open stream is a no-op. Fails with
    /// [`DriverError::Connection`](crate::DriverError::Connection) when the
    /// transport cannot be established; the driver stays closed and the call
    /// may be retried.
    async fn open_stream(&self) -> Result<()>;

    /// Release the transport and end the stream.
    ///
    /// Closing a driver that is not open succeeds without doing anything.
    async fn close_stream(&self) -> Result<()>;
}

/// Contract for drivers advertising
/// [`Flag::RequiresBlockingExecution`].
///
/// # Caller contract
///
/// At most one of [`check_for_pending_message`](Self::check_for_pending_message),
/// [`receive_pending_message`](Self::receive_pending_message) and
/// [`publish_message`](Self::publish_message) may be in flight on a driver
/// at any time. With [`BlockingAccess::Permissive`] (the default) a violation
/// is not detected and the driver's behaviour is undefined. With
/// [`BlockingAccess::Exclusive`] the overlapping call fails with
/// [`DriverError::Busy`](crate::DriverError::Busy).
///
/// `close_stream()` is exempt and may be called from another task to
/// interrupt a pending call.
#[async_trait::async_trait]
pub trait BlockingPubSubDriver: PubSubDriver {
    // ---
    /// Waits up to the configured pending timeout for a message.
    ///
    /// Returns true iff the next `receive_pending_message()` will return
    /// without waiting. This is a hint for a single caller; it does not
    /// reserve the message against other consumers.
    async fn check_for_pending_message(&self) -> Result<bool>;

    /// Waits for the next message.
    ///
    /// Fails with [`DriverError::StreamClosed`](crate::DriverError::StreamClosed)
    /// if the stream is closed before or while waiting.
    async fn receive_pending_message(&self) -> Result<Message>;

    /// Waits until the broker accepted the message.
    async fn publish_message(&self, msg: Message) -> Result<()>;
}

/// Contract for drivers advertising
/// [`Flag::RequiresConcurrentExecution`].
#[async_trait::async_trait]
pub trait ConcurrentPubSubDriver: PubSubDriver {
    // ---
    /// Handle for publishing. The driver drains it in the background.
    async fn message_writer(&self) -> Result<MessageWriter>;

    /// Handle receiving every message that arrives after this call.
    ///
    /// The handle ends (returns `None`) when the stream closes.
    async fn message_reader(&self) -> Result<MessageReader>;
}

/// Shared blocking driver pointer.
pub type BlockingDriverPtr = Arc<dyn BlockingPubSubDriver>;

/// Shared concurrent driver pointer.
pub type ConcurrentDriverPtr = Arc<dyn ConcurrentPubSubDriver>;

/// A driver, tagged by the contract it must be used through.
///
/// Cloning is cheap and shares the underlying driver, which is how a close
/// issued from one task reaches a call pending in another.
#[derive(Clone)]
pub enum Driver {
    Blocking(BlockingDriverPtr),
    Concurrent(ConcurrentDriverPtr),
}

impl Driver {
    // ---
    pub fn flag(&self) -> Flag {
        match self {
            Driver::Blocking(d) => d.driver_flag(),
            Driver::Concurrent(d) => d.driver_flag(),
        }
    }

    pub fn driver_id(&self) -> &str {
        match self {
            Driver::Blocking(d) => d.driver_id(),
            Driver::Concurrent(d) => d.driver_id(),
        }
    }

    pub fn is_open(&self) -> bool {
        match self {
            Driver::Blocking(d) => d.is_open(),
            Driver::Concurrent(d) => d.is_open(),
        }
    }

    pub async fn open_stream(&self) -> Result<()> {
        match self {
            Driver::Blocking(d) => d.open_stream().await,
            Driver::Concurrent(d) => d.open_stream().await,
        }
    }

    pub async fn close_stream(&self) -> Result<()> {
        match self {
            Driver::Blocking(d) => d.close_stream().await,
            Driver::Concurrent(d) => d.close_stream().await,
        }
    }

    pub fn as_blocking(&self) -> Option<&BlockingDriverPtr> {
        match self {
            Driver::Blocking(d) => Some(d),
            Driver::Concurrent(_) => None,
        }
    }

    pub fn as_concurrent(&self) -> Option<&ConcurrentDriverPtr> {
        match self {
            Driver::Blocking(_) => None,
            Driver::Concurrent(d) => Some(d),
        }
    }
}

impl std::fmt::Debug for Driver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Driver")
            .field("driver_id", &self.driver_id())
            .field("flag", &self.flag())
            .field("open", &self.is_open())
            .finish()
    }
}
