//! Driver ingestion runner.
//!
//! This module provides the glue between a [`Driver`] and a
//! [`SubscriberHost`]: it drains the driver's inbound stream and pushes every
//! message into the host, one at a time, in the order the driver delivered
//! them.
//!
//! The loop it spawns depends on the driver's contract:
//!
//! - **Concurrent** drivers: a [`MessageReader`](crate::MessageReader) is
//!   obtained up front and read until it ends.
//! - **Blocking** drivers: the runner becomes the driver's single caller and
//!   alternates `check_for_pending_message()` and
//!   `receive_pending_message()`. Publishing from another task while the
//!   runner owns a blocking driver breaks the blocking contract.
//!
//! ## Lifecycle
//!
//! The driver must be open before [`run`] is called. Closing the driver
//! ends the loop: the runner calls
//! [`notify_on_stream_close`](SubscriberHost::notify_on_stream_close) and the
//! task finishes with `Ok(())`.
//!
//! ## Error handling
//!
//! Handler failures never reach the runner; the host reports them per
//! handler. Any other driver error (for example a lost connection) also
//! closes the host, is logged, and is returned from the task.

use std::sync::Arc;

use tokio::task::JoinHandle;

use crate::{
    // ---
    log_debug,
    log_error,
    BlockingDriverPtr,
    Driver,
    DriverError,
    MessageReader,
    Result,
    SubscriberHost,
};

/// Start feeding `host` from `driver`.
///
/// Returns once the ingestion task is running. The returned [`JoinHandle`]
/// represents the lifetime of the loop; dropping it does not stop the loop.
///
/// # Errors
///
/// Fails immediately if the driver is not open (concurrent drivers refuse to
/// hand out a reader).
pub async fn run(driver: &Driver, host: Arc<SubscriberHost>) -> Result<JoinHandle<Result<()>>> {
    // ---
    match driver {
        Driver::Concurrent(d) => {
            let reader = d.message_reader().await?;
            let driver_id = d.driver_id().to_string();
            Ok(tokio::spawn(drain_reader(driver_id, reader, host)))
        }
        Driver::Blocking(d) => {
            d.base().state().ensure_open()?;
            Ok(tokio::spawn(poll_blocking(Arc::clone(d), host)))
        }
    }
}

async fn drain_reader(
    driver_id: String,
    mut reader: MessageReader,
    host: Arc<SubscriberHost>,
) -> Result<()> {
    // ---
    while let Some(msg) = reader.recv().await {
        if let Err(err) = host.notify_on_message_receive(msg).await {
            log_debug!("{driver_id}: host stopped accepting messages: {err}");
            return Ok(());
        }
    }

    log_debug!("{driver_id}: reader ended, closing subscriber host");
    host.notify_on_stream_close().await
}

async fn poll_blocking(driver: BlockingDriverPtr, host: Arc<SubscriberHost>) -> Result<()> {
    // ---
    let result = loop {
        match driver.check_for_pending_message().await {
            Ok(true) => {}
            Ok(false) => continue,
            Err(err) => break err,
        }

        match driver.receive_pending_message().await {
            Ok(msg) => {
                if host.notify_on_message_receive(msg).await.is_err() {
                    log_debug!("{}: host stopped accepting messages", driver.driver_id());
                    return Ok(());
                }
            }
            Err(err) => break err,
        }
    };

    host.notify_on_stream_close().await?;

    match result {
        DriverError::StreamClosed => {
            log_debug!("{}: stream closed, runner finished", driver.driver_id());
            Ok(())
        }
        err => {
            log_error!("{}: runner stopped: {err}", driver.driver_id());
            Err(err)
        }
    }
}
