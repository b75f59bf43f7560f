// src/subscriber/host.rs

//! Fan-out of one inbound stream to independently registered handlers.
//!
//! ## Dispatch
//!
//! ```text
//! notify_on_message_receive(msg)
//!     │
//!     ├──► handler 0 ──► reports 0  (Ok / Err(Handler))
//!     ├──► handler 1 ──► reports 1
//!     └──► handler N ──► reports N
//! ```
//!
//! ## Rules
//! - Handlers run sequentially, in registration order, once per message.
//! - A failing or panicking handler is reported on its own channel only; the
//!   remaining handlers still run and the call itself succeeds.
//! - Report channels are unbounded: an unread report never stalls dispatch.
//! - The host does not order concurrent `notify_on_message_receive` calls.
//!   Whatever drains the driver must call it sequentially (see
//!   [`run`](crate::subscriber::run)).
//! - Registrations live as long as the host. There is no unsubscribe;
//!   dropping a [`SubscriberReports`] only stops reading the reports.

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::sync::{Arc, Mutex};

use futures_util::FutureExt;
use tokio::sync::mpsc;

use crate::{
    // ---
    lock_ignore_poison,
    log_debug,
    log_warn,
    DriverError,
    Message,
    Result,
};

/// Error type handlers may return; anything implementing `std::error::Error`
/// converts into it with `?`.
pub type HandlerError = Box<dyn std::error::Error + Send + Sync>;

/// Outcome of one handler run.
pub type HandlerResult = std::result::Result<(), HandlerError>;

type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

// Handler trait for type-erased async functions
trait HandlerFn: Send + Sync {
    fn call(&self, msg: Message) -> BoxFuture<'static, HandlerResult>;
}

impl<F, Fut> HandlerFn for F
where
    F: Fn(Message) -> Fut + Send + Sync,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    fn call(&self, msg: Message) -> BoxFuture<'static, HandlerResult> {
        Box::pin(self(msg))
    }
}

#[derive(Clone)]
struct Registration {
    subscriber: usize,
    handler: Arc<dyn HandlerFn>,
    reports: mpsc::UnboundedSender<Result<()>>,
}

#[derive(Default)]
struct HostState {
    registrations: Vec<Registration>,
    next_id: usize,
    closed: bool,
}

/// Receive side of one handler's report channel.
///
/// Yields `Ok(())` for every successful run and
/// `Err(DriverError::Handler { .. })` for every failed one. `recv()` returns
/// `None` once the host signalled end of stream and every report was read.
#[derive(Debug)]
pub struct SubscriberReports {
    subscriber: usize,
    rx: mpsc::UnboundedReceiver<Result<()>>,
}

impl SubscriberReports {
    /// Registration index of the handler these reports belong to.
    pub fn subscriber(&self) -> usize {
        self.subscriber
    }

    pub async fn recv(&mut self) -> Option<Result<()>> {
        self.rx.recv().await
    }

    /// Next report if one is already queued.
    pub fn try_recv(&mut self) -> Option<Result<()>> {
        self.rx.try_recv().ok()
    }
}

/// Dispatches every message of one inbound stream to all registered handlers.
///
/// # Example
///
/// ```
/// # use brokerutil::{Message, SubscriberHost};
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> brokerutil::Result<()> {
/// let host = SubscriberHost::new();
///
/// let mut reports = host.add_subscriber(|msg: Message| async move {
///     println!("got {:?}", msg.as_str());
///     Ok(())
/// });
///
/// host.notify_on_message_receive(Message::from("x")).await?;
/// assert!(reports.recv().await.unwrap().is_ok());
///
/// host.notify_on_stream_close().await?;
/// assert!(reports.recv().await.is_none());
/// # Ok(())
/// # }
/// ```
#[derive(Default)]
pub struct SubscriberHost {
    state: Mutex<HostState>,
}

impl SubscriberHost {
    // ---
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler and return its private report channel.
    ///
    /// Handlers are invoked in registration order. Registering on a host
    /// whose stream already ended returns reports that are already finished.
    pub fn add_subscriber<F, Fut>(&self, handler: F) -> SubscriberReports
    where
        F: Fn(Message) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        // ---
        let (tx, rx) = mpsc::unbounded_channel();
        let mut state = lock_ignore_poison(&self.state);

        let subscriber = state.next_id;
        state.next_id += 1;

        if state.closed {
            log_warn!("subscriber {subscriber} registered after stream close; it will never run");
            return SubscriberReports { subscriber, rx };
        }

        state.registrations.push(Registration {
            subscriber,
            handler: Arc::new(handler),
            reports: tx,
        });
        log_debug!("subscriber {subscriber} registered");

        SubscriberReports { subscriber, rx }
    }

    /// Number of live registrations.
    pub fn subscriber_count(&self) -> usize {
        lock_ignore_poison(&self.state).registrations.len()
    }

    pub fn is_closed(&self) -> bool {
        lock_ignore_poison(&self.state).closed
    }

    /// Run every handler once with `msg`, in registration order.
    ///
    /// Handler failures never fail this call; they go to the handler's own
    /// reports. Fails with [`DriverError::StreamClosed`] after
    /// [`notify_on_stream_close`](Self::notify_on_stream_close).
    pub async fn notify_on_message_receive(&self, msg: Message) -> Result<()> {
        // ---
        let registrations = {
            let state = lock_ignore_poison(&self.state);
            if state.closed {
                return Err(DriverError::StreamClosed);
            }
            state.registrations.clone()
        };

        for reg in registrations {
            let started = std::panic::catch_unwind(AssertUnwindSafe(|| reg.handler.call(msg.clone())));
            let outcome = match started {
                Ok(fut) => AssertUnwindSafe(fut).catch_unwind().await,
                Err(panic) => Err(panic),
            };

            let report = match outcome {
                Ok(Ok(())) => Ok(()),
                Ok(Err(err)) => {
                    log_debug!("subscriber {} failed: {err}", reg.subscriber);
                    Err(DriverError::Handler {
                        subscriber: reg.subscriber,
                        reason: err.to_string(),
                    })
                }
                Err(panic) => {
                    let reason = panic_message(panic.as_ref());
                    log_warn!("subscriber {} panicked: {reason}", reg.subscriber);
                    Err(DriverError::Handler {
                        subscriber: reg.subscriber,
                        reason: format!("handler panicked: {reason}"),
                    })
                }
            };

            // A dropped SubscriberReports only means nobody reads this handler's reports.
            let _ = reg.reports.send(report);
        }

        Ok(())
    }

    /// Signal end of stream to every handler.
    ///
    /// Closes every report channel; queued reports stay readable. Calling it
    /// again is a no-op.
    pub async fn notify_on_stream_close(&self) -> Result<()> {
        // ---
        let mut state = lock_ignore_poison(&self.state);
        if state.closed {
            log_debug!("notify_on_stream_close: already closed");
            return Ok(());
        }

        state.closed = true;
        let count = state.registrations.len();
        state.registrations.clear();

        log_debug!("stream closed, {count} subscriber(s) notified");
        Ok(())
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(msg) = panic.downcast_ref::<&'static str>() {
        (*msg).to_string()
    } else if let Some(msg) = panic.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic".to_string()
    }
}
