// src/domain/channel.rs

//! One-directional message handles of the concurrent contract.

use tokio::sync::mpsc;

use crate::{DriverError, Message, Result};

/// Send-only handle returned by
/// [`ConcurrentPubSubDriver::message_writer`](crate::ConcurrentPubSubDriver::message_writer).
///
/// Messages written here are drained by the driver and published to the
/// broker asynchronously. Publish failures are not reported back through the
/// handle; drivers log them.
///
/// Cheap to clone; every clone feeds the same driver.
#[derive(Clone, Debug)]
pub struct MessageWriter {
    tx: mpsc::Sender<Message>,
}

impl MessageWriter {
    pub(crate) fn new(tx: mpsc::Sender<Message>) -> Self {
        Self { tx }
    }

    /// Queue a message for publishing.
    ///
    /// Waits while the driver's outbound queue is full. Fails with
    /// [`DriverError::StreamClosed`] once the stream has been closed.
    pub async fn send(&self, msg: impl Into<Message>) -> Result<()> {
        self.tx
            .send(msg.into())
            .await
            .map_err(|_| DriverError::StreamClosed)
    }

    /// Queue a message without waiting.
    ///
    /// Fails with [`DriverError::Busy`] when the outbound queue is full and
    /// with [`DriverError::StreamClosed`] once the stream has been closed.
    pub fn try_send(&self, msg: impl Into<Message>) -> Result<()> {
        self.tx.try_send(msg.into()).map_err(|err| match err {
            mpsc::error::TrySendError::Full(_) => DriverError::Busy("message_writer"),
            mpsc::error::TrySendError::Closed(_) => DriverError::StreamClosed,
        })
    }

    /// Returns true once the driver stopped draining this handle.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Receive-only handle returned by
/// [`ConcurrentPubSubDriver::message_reader`](crate::ConcurrentPubSubDriver::message_reader).
///
/// Sees every message the driver receives after the handle was obtained.
/// `recv()` returning `None` means end of stream: the driver was closed or
/// lost its transport. That is not an error.
#[derive(Debug)]
pub struct MessageReader {
    rx: mpsc::Receiver<Message>,
}

impl MessageReader {
    pub(crate) fn new(rx: mpsc::Receiver<Message>) -> Self {
        Self { rx }
    }

    /// Wait for the next message, or `None` at end of stream.
    pub async fn recv(&mut self) -> Option<Message> {
        self.rx.recv().await
    }

    /// Stop accepting messages; already queued ones can still be drained.
    pub fn close(&mut self) {
        self.rx.close();
    }
}
